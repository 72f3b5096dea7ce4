//! Settings are read from a TOML file (see `settings/dev.toml`) with
//! `GAMSTAFI__SECTION__KEY` environment overrides on top.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;
