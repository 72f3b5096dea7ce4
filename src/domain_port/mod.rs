// auth

mod auth_backend;

pub use auth_backend::*;

// rows

mod table_store;

pub use table_store::*;
