use crate::application_port::{RoleLookupError, RoleResolver};
use crate::domain_model::{Role, UserId};
use crate::domain_port::{Table, TableStore};
use std::sync::Arc;

/// Reads the role column of the user's `profiles` row.
pub struct ProfileRoleResolver {
    table_store: Arc<dyn TableStore>,
}

impl ProfileRoleResolver {
    pub fn new(table_store: Arc<dyn TableStore>) -> Self {
        Self { table_store }
    }
}

#[async_trait::async_trait]
impl RoleResolver for ProfileRoleResolver {
    async fn resolve(&self, user_id: UserId) -> Result<Role, RoleLookupError> {
        let row = self
            .table_store
            .query_one(Table::Profiles, &[("user_id", user_id.to_string())])
            .await?
            .ok_or(RoleLookupError::NotFound(user_id))?;

        let role = row
            .get("role")
            .and_then(|value| value.as_str())
            .ok_or_else(|| RoleLookupError::Malformed("missing role column".to_owned()))?;

        role.parse::<Role>()
            .map_err(|e| RoleLookupError::Malformed(e.to_string()))
    }
}
