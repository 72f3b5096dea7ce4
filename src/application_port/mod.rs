mod registration_service;
mod role_resolver;

pub use registration_service::*;
pub use role_resolver::*;
