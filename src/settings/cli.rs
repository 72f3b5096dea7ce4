use super::Parser;
use clap::Subcommand;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gamstafi", about = "Session and registration client for Gamstafi Eats")]
pub struct Cli {
    #[arg(long)]
    pub settings: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the current session snapshot and the dashboard it unlocks.
    Whoami,
    SignIn {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    SignOut,
    /// Register an account from a JSON registration form.
    Register {
        #[arg(long)]
        form: PathBuf,
    },
}
