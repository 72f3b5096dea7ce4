use crate::domain_model::{
    AccountKind, ClockTime, Day, Shift, VehicleType, WeeklyAvailability, WeeklyOpeningHours,
};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FormError {
    #[error("field `{field}` does not exist on the {kind} form")]
    UnknownField { kind: AccountKind, field: String },
    #[error("field `{0}` is required")]
    Missing(&'static str),
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Fields every registration variant carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountFields {
    pub email: String,
    pub password: String,
    pub phone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientForm {
    #[serde(flatten)]
    pub account: AccountFields,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub delivery_address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantForm {
    #[serde(flatten)]
    pub account: AccountFields,
    pub restaurant_name: String,
    pub address: String,
    pub cuisine_type: String,
    #[serde(default)]
    pub opening_hours: WeeklyOpeningHours,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverForm {
    #[serde(flatten)]
    pub account: AccountFields,
    pub first_name: String,
    pub last_name: String,
    /// An empty string means "not chosen yet", as in a fresh form.
    #[serde(default, deserialize_with = "blank_as_none")]
    pub vehicle_type: Option<VehicleType>,
    #[serde(default)]
    pub availability: WeeklyAvailability,
}

/// Registration form state. The variant is the chosen account kind; picking
/// another kind rebuilds the form from scratch rather than patching fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum RegistrationForm {
    Client(ClientForm),
    Restaurant(RestaurantForm),
    Driver(DriverForm),
}

impl Default for RegistrationForm {
    fn default() -> Self {
        RegistrationForm::new(AccountKind::Client)
    }
}

impl RegistrationForm {
    pub fn new(kind: AccountKind) -> Self {
        match kind {
            AccountKind::Client => RegistrationForm::Client(ClientForm::default()),
            AccountKind::Restaurant => RegistrationForm::Restaurant(RestaurantForm::default()),
            AccountKind::Driver => RegistrationForm::Driver(DriverForm::default()),
        }
    }

    pub fn kind(&self) -> AccountKind {
        match self {
            RegistrationForm::Client(_) => AccountKind::Client,
            RegistrationForm::Restaurant(_) => AccountKind::Restaurant,
            RegistrationForm::Driver(_) => AccountKind::Driver,
        }
    }

    /// Switches account kind. Everything typed so far is discarded.
    pub fn select_role(&mut self, kind: AccountKind) {
        *self = RegistrationForm::new(kind);
    }

    pub fn account(&self) -> &AccountFields {
        match self {
            RegistrationForm::Client(f) => &f.account,
            RegistrationForm::Restaurant(f) => &f.account,
            RegistrationForm::Driver(f) => &f.account,
        }
    }

    fn account_mut(&mut self) -> &mut AccountFields {
        match self {
            RegistrationForm::Client(f) => &mut f.account,
            RegistrationForm::Restaurant(f) => &mut f.account,
            RegistrationForm::Driver(f) => &mut f.account,
        }
    }

    /// Sets a text field by its form name, as an input's change event would.
    pub fn set_field(&mut self, field: &str, value: &str) -> Result<(), FormError> {
        let kind = self.kind();
        let unknown = || FormError::UnknownField {
            kind,
            field: field.to_owned(),
        };
        let value = value.to_owned();

        match field {
            "email" => self.account_mut().email = value,
            "password" => self.account_mut().password = value,
            "phone" => self.account_mut().phone = value,
            _ => match self {
                RegistrationForm::Client(f) => match field {
                    "firstName" => f.first_name = value,
                    "lastName" => f.last_name = value,
                    "deliveryAddress" => f.delivery_address = value,
                    _ => return Err(unknown()),
                },
                RegistrationForm::Restaurant(f) => match field {
                    "restaurantName" => f.restaurant_name = value,
                    "address" => f.address = value,
                    "cuisineType" => f.cuisine_type = value,
                    _ => return Err(unknown()),
                },
                RegistrationForm::Driver(f) => match field {
                    "firstName" => f.first_name = value,
                    "lastName" => f.last_name = value,
                    "vehicleType" if value.is_empty() => f.vehicle_type = None,
                    "vehicleType" => {
                        let vehicle = value.parse().map_err(|reason| FormError::Invalid {
                            field: "vehicleType",
                            reason,
                        })?;
                        f.vehicle_type = Some(vehicle);
                    }
                    _ => return Err(unknown()),
                },
            },
        }
        Ok(())
    }

    pub fn set_opening_hours(
        &mut self,
        day: Day,
        open: ClockTime,
        close: ClockTime,
    ) -> Result<(), FormError> {
        match self {
            RegistrationForm::Restaurant(f) => {
                let hours = f.opening_hours.get_mut(day);
                hours.open = open;
                hours.close = close;
                Ok(())
            }
            _ => Err(self.not_on_form("openingHours")),
        }
    }

    pub fn set_day_available(&mut self, day: Day, available: bool) -> Result<(), FormError> {
        match self {
            RegistrationForm::Driver(f) => {
                f.availability.get_mut(day).available = available;
                Ok(())
            }
            _ => Err(self.not_on_form("availability")),
        }
    }

    /// Edits the first shift of `day`; the form exposes one shift per day.
    pub fn set_shift(&mut self, day: Day, start: ClockTime, end: ClockTime) -> Result<(), FormError> {
        match self {
            RegistrationForm::Driver(f) => {
                let hours = &mut f.availability.get_mut(day).hours;
                let shift = Shift { start, end };
                match hours.first_mut() {
                    Some(first) => *first = shift,
                    None => hours.push(shift),
                }
                Ok(())
            }
            _ => Err(self.not_on_form("availability")),
        }
    }

    fn not_on_form(&self, field: &str) -> FormError {
        FormError::UnknownField {
            kind: self.kind(),
            field: field.to_owned(),
        }
    }

    /// Presence checks only; the auth backend owns e-mail and password rules.
    pub fn validate(&self) -> Result<(), FormError> {
        let account = self.account();
        require("email", &account.email)?;
        require("password", &account.password)?;
        require("phone", &account.phone)?;

        match self {
            RegistrationForm::Client(f) => {
                require("firstName", &f.first_name)?;
                require("lastName", &f.last_name)?;
            }
            RegistrationForm::Restaurant(f) => {
                require("restaurantName", &f.restaurant_name)?;
                require("address", &f.address)?;
                require("cuisineType", &f.cuisine_type)?;
            }
            RegistrationForm::Driver(f) => {
                require("firstName", &f.first_name)?;
                require("lastName", &f.last_name)?;
                if f.vehicle_type.is_none() {
                    return Err(FormError::Missing("vehicleType"));
                }
            }
        }
        Ok(())
    }
}

fn blank_as_none<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<VehicleType>, D::Error> {
    match Option::<String>::deserialize(deserializer)?.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

fn require(field: &'static str, value: &str) -> Result<(), FormError> {
    if value.trim().is_empty() {
        Err(FormError::Missing(field))
    } else {
        Ok(())
    }
}
