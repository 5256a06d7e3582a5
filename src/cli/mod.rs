//! CLI module for fleet-cache
//!
//! Operator commands against the shared cache configured in `config/` and
//! `APP__CACHE__*` environment variables.

pub mod cache;

use clap::{Args, Parser, Subcommand};

/// fleet-cache - inspect and operate the shared device coordination cache
#[derive(Parser)]
#[command(name = "fleet-cache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check that the backing store is reachable
    Ping,

    /// Print the value of a key
    Get(KeyArgs),

    /// Report whether a key holds a live entry
    Exists(KeyArgs),

    /// Write a value unconditionally
    Set(WriteArgs),

    /// Write a value only if the key is vacant
    SetIfAbsent(WriteArgs),

    /// Delete a key
    Remove(KeyArgs),

    /// Block until the key changes or the timeout elapses, then print its value
    Wait(WaitArgs),
}

#[derive(Args, Debug, Clone)]
pub struct KeyArgs {
    /// Key within the namespace
    pub key: String,

    /// Namespace (defaults to "default")
    #[arg(short, long)]
    pub namespace: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct WriteArgs {
    #[command(flatten)]
    pub target: KeyArgs,

    /// Value to store
    pub value: String,

    /// Time to live in seconds
    #[arg(short, long)]
    pub ttl: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct WaitArgs {
    #[command(flatten)]
    pub target: KeyArgs,

    /// Seconds to wait for a change
    #[arg(short, long, default_value_t = 30)]
    pub timeout: u64,
}
