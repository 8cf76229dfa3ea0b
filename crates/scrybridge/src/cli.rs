//! Clap derive structures for the `scrybridge` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use scrybridge_config::Overrides;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// scrybridge -- mirror a Scrypted hub and serve its device state locally
#[derive(Debug, Parser)]
#[command(
    name = "scrybridge",
    version,
    about = "Mirror a Scrypted hub's device state and serve it over local HTTP",
    long_about = "Logs in to a Scrypted hub, keeps a realtime connection open, and\n\
        serves the latest state of every device as JSON on a local port.\n\
        Camera snapshots are fetched from the hub on demand.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Hub base URL (e.g. https://192.168.1.10:10443)
    #[arg(long, short = 'H', env = "SCRYBRIDGE_HOST", global = true)]
    pub host: Option<String>,

    /// Hub username
    #[arg(long, short = 'u', env = "SCRYBRIDGE_USERNAME", global = true)]
    pub username: Option<String>,

    /// Hub password (prompted for when omitted on a terminal)
    #[arg(long, env = "SCRYBRIDGE_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Facade port
    #[arg(long, env = "SCRYBRIDGE_PORT", global = true)]
    pub port: Option<u16>,

    /// Facade bind address
    #[arg(long, env = "SCRYBRIDGE_BIND", global = true)]
    pub bind: Option<String>,

    /// Config file (default: platform config dir)
    #[arg(long, env = "SCRYBRIDGE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Accept self-signed hub certificates (the default unless ca_cert is set)
    #[arg(long, short = 'k', global = true, conflicts_with = "verify_tls")]
    pub insecure: bool,

    /// Verify hub certificates against the system roots or ca_cert
    #[arg(long, global = true)]
    pub verify_tls: bool,

    /// Login timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log output format
    #[arg(
        long,
        env = "SCRYBRIDGE_LOG_FORMAT",
        default_value = "text",
        global = true
    )]
    pub log_format: LogFormat,
}

impl GlobalOpts {
    /// Flags that override the config file and environment.
    pub fn overrides(&self) -> Overrides {
        let insecure = if self.verify_tls {
            Some(false)
        } else if self.insecure {
            Some(true)
        } else {
            None
        };

        Overrides {
            host: self.host.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            bind: self.bind.clone(),
            port: self.port,
            insecure,
            timeout: self.timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in, mirror the hub, and serve the HTTP facade
    Serve,

    /// Log in once and print the hub's login response
    Check,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
