//! Backend speaking the hosted auth (`auth/v1`) and REST (`rest/v1`) APIs.

mod rest;
mod supabase_backend;
mod wire;

pub use supabase_backend::*;
