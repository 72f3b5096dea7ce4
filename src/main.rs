use gamstafi::app::App;
use gamstafi::application_port::{Registration, RegistrationError};
use gamstafi::domain_model::RegistrationForm;
use gamstafi::logger::*;
use gamstafi::session::{Route, nav_links};
use gamstafi::settings::*;
use std::time::Duration;

const ROLE_WAIT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logger = Logger::new_bootstrap()?;

    let project_settings = parse_settings(cli.settings.as_deref())?;
    debug!(?project_settings);
    logger.reload_from_config(&LogConfig::from(&project_settings.log))?;

    let app = App::try_new(&project_settings).await?;
    let outcome = run(&app, cli.command).await;

    let shutdown_timeout = Duration::from_secs(5);
    if tokio::time::timeout(shutdown_timeout, app.shutdown()).await.is_err() {
        error!("shutdown timed out");
    }
    outcome
}

async fn run(app: &App, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Whoami => print_snapshot(app),
        Command::SignIn { email, password } => {
            app.sign_in(&email, &password, ROLE_WAIT).await?;
            print_snapshot(app);
        }
        Command::SignOut => {
            app.session_store.sign_out().await?;
            println!("signed out");
        }
        Command::Register { form } => {
            let raw = tokio::fs::read(&form).await?;
            let form: RegistrationForm = serde_json::from_slice(&raw)?;
            let outcome = app.registration_service.register(&form).await;
            println!("{}", registration_report(outcome)?);
        }
    }
    Ok(())
}

/// Success text, or an error carrying the message meant for the user so the
/// process exits non-zero.
fn registration_report(outcome: Result<Registration, RegistrationError>) -> anyhow::Result<String> {
    match outcome {
        Ok(registration) => Ok(registration.success_message()),
        Err(e) => {
            warn!("registration failed: {e}");
            Err(anyhow::anyhow!(e.user_message()))
        }
    }
}

fn print_snapshot(app: &App) {
    let snapshot = app.session_store.snapshot();
    match snapshot.identity() {
        None => println!("signed out"),
        Some(identity) => {
            println!("user:  {}", identity.id);
            if let Some(email) = &identity.email {
                println!("email: {email}");
            }
            match snapshot.role() {
                Some(role) => println!(
                    "role:  {role} ({})",
                    Route::dashboard_for(role).path()
                ),
                None => println!("role:  unresolved"),
            }
        }
    }
    let links: Vec<String> = nav_links(&snapshot)
        .iter()
        .map(|link| match link.target() {
            Some(target) => format!("{link:?} -> {target}"),
            None => format!("{link:?}"),
        })
        .collect();
    println!("nav:   {}", links.join(", "));
}
