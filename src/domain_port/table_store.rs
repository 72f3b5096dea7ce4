use crate::domain_model::*;
use crate::domain_port::BackendError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Profiles,
    Restaurants,
    Drivers,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Profiles => "profiles",
            Table::Restaurants => "restaurants",
            Table::Drivers => "drivers",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Equality filter on one column, e.g. `("user_id", id)`.
pub type Filter<'a> = (&'a str, String);

/// Remote row store. Rows are plain JSON objects; typed records below
/// convert to and from them.
#[async_trait::async_trait]
pub trait TableStore: Send + Sync {
    /// Returns the single row matching every filter, `None` if nothing matches.
    async fn query_one(
        &self,
        table: Table,
        filters: &[Filter<'_>],
    ) -> Result<Option<Row>, BackendError>;

    async fn insert(&self, table: Table, row: Row) -> Result<(), BackendError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub user_id: UserId,
    pub role: Role,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestaurantRecord {
    pub profile_id: UserId,
    pub name: String,
    pub cuisine_type: String,
    pub address: String,
    pub opening_hours: WeeklyOpeningHours,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverRecord {
    pub profile_id: UserId,
    pub vehicle_type: VehicleType,
    pub availability: WeeklyAvailability,
}

pub fn to_row<T: Serialize>(record: &T) -> Result<Row, BackendError> {
    match serde_json::to_value(record) {
        Ok(serde_json::Value::Object(row)) => Ok(row),
        Ok(other) => Err(BackendError::Decode(format!(
            "record did not serialize to an object: {other}"
        ))),
        Err(e) => Err(BackendError::Decode(e.to_string())),
    }
}

pub fn from_row<T: for<'de> Deserialize<'de>>(row: Row) -> Result<T, BackendError> {
    serde_json::from_value(serde_json::Value::Object(row))
        .map_err(|e| BackendError::Decode(e.to_string()))
}
