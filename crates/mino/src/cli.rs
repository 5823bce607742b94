//! Clap derive structures for the `mino` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// mino -- run and manage Amino chat bots
#[derive(Debug, Parser)]
#[command(
    name = "mino",
    version,
    about = "Run and manage Amino chat bots from the command line",
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
    /// Bot profile to use
    #[arg(long, short = 'p', env = "MINO_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "MINO_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in with the active profile and show the account
    Login(LoginArgs),

    /// Measure round-trip latency to the service
    Ping,

    /// Run the built-in bot until interrupted
    Run(RunArgs),

    /// Generate or migrate device ids
    Device(DeviceArgs),

    /// Manage configuration and stored credentials
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Ignore the login cache and always use the password
    #[arg(long)]
    pub no_cache: bool,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Command prefix (overrides the profile)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Community id or invite link to work in
    #[arg(long)]
    pub community: Option<String>,

    /// Enable the message mailbox used by interactive commands
    #[arg(long)]
    pub intents: bool,

    /// Report online status for every community the bot hears from
    #[arg(long)]
    pub online: bool,
}

// ── Device ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DeviceArgs {
    #[command(subcommand)]
    pub command: DeviceCommand,
}

#[derive(Debug, Subcommand)]
pub enum DeviceCommand {
    /// Print a fresh device id
    Generate {
        /// Derive the id from this seed instead of random bytes
        #[arg(long)]
        seed: Option<String>,
    },

    /// Re-sign an existing device id with the current keys
    Migrate {
        /// The device id to migrate
        device_id: String,
    },
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Print the resolved configuration (secrets redacted)
    Show,

    /// Create or update a profile
    Init {
        /// Account email
        #[arg(long)]
        email: String,

        /// Command prefix
        #[arg(long)]
        prefix: Option<String>,

        /// Community id
        #[arg(long)]
        community: Option<i64>,

        /// Make this the default profile
        #[arg(long)]
        default: bool,
    },

    /// Store the profile password in the system keyring
    SetPassword,

    /// Remove the profile password from the system keyring
    ClearPassword,

    /// List profiles
    Profiles,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: Shell,
}
