mod registration_service_impl;
mod role_resolver_impl;

pub use registration_service_impl::*;
pub use role_resolver_impl::*;
