use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use serde_json::json;
use std::sync::Arc;

pub struct RealRegistrationService {
    auth: Arc<dyn AuthBackend>,
    table_store: Arc<dyn TableStore>,
}

impl RealRegistrationService {
    pub fn new(auth: Arc<dyn AuthBackend>, table_store: Arc<dyn TableStore>) -> Self {
        Self { auth, table_store }
    }

    fn profile_record(user_id: UserId, form: &RegistrationForm) -> ProfileRecord {
        let (first_name, last_name) = match form {
            RegistrationForm::Client(f) => (Some(&f.first_name), Some(&f.last_name)),
            RegistrationForm::Driver(f) => (Some(&f.first_name), Some(&f.last_name)),
            RegistrationForm::Restaurant(_) => (None, None),
        };
        ProfileRecord {
            user_id,
            role: form.kind().into(),
            phone: form.account().phone.clone(),
            first_name: first_name.cloned(),
            last_name: last_name.cloned(),
        }
    }

    /// The kind-specific row, if the kind has one.
    fn role_record(
        user_id: UserId,
        form: &RegistrationForm,
    ) -> Result<Option<(Table, Row)>, BackendError> {
        match form {
            RegistrationForm::Client(_) => Ok(None),
            RegistrationForm::Restaurant(f) => {
                let record = RestaurantRecord {
                    profile_id: user_id,
                    name: f.restaurant_name.clone(),
                    cuisine_type: f.cuisine_type.clone(),
                    address: f.address.clone(),
                    opening_hours: f.opening_hours.clone(),
                };
                Ok(Some((Table::Restaurants, to_row(&record)?)))
            }
            RegistrationForm::Driver(f) => {
                // Unreachable after validate(), which requires a vehicle.
                let Some(vehicle_type) = f.vehicle_type else {
                    return Ok(None);
                };
                let record = DriverRecord {
                    profile_id: user_id,
                    vehicle_type,
                    availability: f.availability.clone(),
                };
                Ok(Some((Table::Drivers, to_row(&record)?)))
            }
        }
    }

    async fn row_exists(
        &self,
        table: Table,
        column: &str,
        user_id: UserId,
    ) -> Result<bool, BackendError> {
        let row = self
            .table_store
            .query_one(table, &[(column, user_id.to_string())])
            .await?;
        Ok(row.is_some())
    }

    /// Inserts the profile and role record. With `skip_existing`, rows that
    /// are already present are left alone so the call can be repeated.
    async fn write_records(
        &self,
        user_id: UserId,
        form: &RegistrationForm,
        skip_existing: bool,
    ) -> Result<(), RegistrationError> {
        let profile_stage = incomplete(user_id, RegistrationStage::Profile);
        let profile_exists = skip_existing
            && self
                .row_exists(Table::Profiles, "user_id", user_id)
                .await
                .map_err(profile_stage)?;
        if profile_exists {
            tracing::debug!(%user_id, "profile already present, skipping");
        } else {
            let row = to_row(&Self::profile_record(user_id, form)).map_err(profile_stage)?;
            self.table_store
                .insert(Table::Profiles, row)
                .await
                .map_err(profile_stage)?;
        }

        let record_stage = incomplete(user_id, RegistrationStage::RoleRecord);
        let Some((table, row)) = Self::role_record(user_id, form).map_err(record_stage)? else {
            return Ok(());
        };
        let record_exists = skip_existing
            && self
                .row_exists(table, "profile_id", user_id)
                .await
                .map_err(record_stage)?;
        if record_exists {
            tracing::debug!(%user_id, %table, "role record already present, skipping");
            return Ok(());
        }
        self.table_store
            .insert(table, row)
            .await
            .map_err(record_stage)?;
        Ok(())
    }
}

fn incomplete(
    user_id: UserId,
    stage: RegistrationStage,
) -> impl Fn(BackendError) -> RegistrationError + Copy {
    move |source| RegistrationError::Incomplete {
        user_id,
        stage,
        source,
    }
}

#[async_trait::async_trait]
impl RegistrationService for RealRegistrationService {
    async fn register(&self, form: &RegistrationForm) -> Result<Registration, RegistrationError> {
        form.validate()?;
        let kind = form.kind();
        let account = form.account();

        let identity = self
            .auth
            .sign_up(SignUpRequest {
                email: account.email.clone(),
                password: account.password.clone(),
                metadata: json!({ "role": Role::from(kind) }),
            })
            .await
            .inspect_err(|e| tracing::warn!(%kind, "sign-up failed: {e}"))?;
        tracing::info!(user_id = %identity.id, %kind, "identity created");

        self.write_records(identity.id, form, false)
            .await
            .inspect_err(|e| tracing::error!("registration left incomplete: {e}"))?;

        Ok(Registration {
            user_id: identity.id,
            kind,
        })
    }

    async fn resume(
        &self,
        user_id: UserId,
        form: &RegistrationForm,
    ) -> Result<Registration, RegistrationError> {
        form.validate()?;
        self.write_records(user_id, form, true).await?;
        tracing::info!(%user_id, kind = %form.kind(), "registration resumed");
        Ok(Registration {
            user_id,
            kind: form.kind(),
        })
    }
}
