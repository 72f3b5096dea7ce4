use gamstafi::app::App;
use gamstafi::domain_model::*;
use gamstafi::infra_memory::MemoryBackend;
use gamstafi::logger::*;
use gamstafi::session::{Route, guard, nav_links};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let logger = Logger::new_bootstrap()?;
    logger.reload_from_config(&LogConfig {
        filter: "gamstafi=debug".to_string(),
    })?;

    let backend = Arc::new(MemoryBackend::new());
    let app = App::from_parts(backend.clone(), backend.clone()).await?;

    let mut form = RegistrationForm::new(AccountKind::Driver);
    for (field, value) in [
        ("email", "demo@gamstafi.test"),
        ("password", "secret"),
        ("phone", "0600000000"),
        ("firstName", "Sam"),
        ("lastName", "Rider"),
        ("vehicleType", "scooter"),
    ] {
        form.set_field(field, value)?;
    }
    form.set_day_available(Day::Monday, true)?;

    let registration = app.registration_service.register(&form).await?;
    info!("{}", registration.success_message());

    let snapshot = app
        .sign_in("demo@gamstafi.test", "secret", Duration::from_secs(2))
        .await?;
    info!(role = ?snapshot.role(), links = ?nav_links(&snapshot));
    for route in [Route::DriverDashboard, Route::AdminDashboard] {
        info!(route = route.path(), access = ?guard(route, &snapshot));
    }

    app.session_store.sign_out().await?;
    info!(signed_in = app.session_store.snapshot().is_signed_in());

    app.shutdown().await;
    Ok(())
}
