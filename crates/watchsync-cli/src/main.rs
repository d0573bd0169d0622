use clap::{ArgAction, Parser, Subcommand};
use commands::{config, daemon, links, sync};
use watch_sync_config::PathManager;

mod commands;
mod logging;
mod output;

#[derive(Parser)]
#[command(name = "watchsync")]
#[command(about = "WatchSync - keep watched state in step across library accounts and watch history")]
#[command(version)]
struct Cli {
    /// Enable verbose output (use multiple times for more verbosity: -v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "human", value_enum)]
    output: output::OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync pass over every link
    #[command(long_about = "Run one reconciliation pass over all configured links. Without flags, the engines enabled in the [sync] section of the configuration run.")]
    Sync {
        /// Sync account-to-account links
        #[arg(long, action = ArgAction::SetTrue)]
        account: bool,

        /// Sync account-to-history links
        #[arg(long, action = ArgAction::SetTrue)]
        history: bool,
    },
    /// Run as a daemon, syncing on a fixed interval
    #[command(long_about = "Run in the foreground and sync every link periodically until interrupted. An initial sync runs on startup unless --no-startup-sync is given.")]
    Daemon {
        /// Skip the initial sync on startup
        #[arg(long, action = ArgAction::SetTrue)]
        no_startup_sync: bool,

        /// Minutes between sync passes (overrides the configured interval)
        #[arg(long, value_name = "MINUTES")]
        interval_minutes: Option<u64>,

        /// Write logs to the daily rotating daemon log file instead of stderr
        #[arg(long, action = ArgAction::SetTrue)]
        log_to_file: bool,
    },
    /// List account and history links with their sync state
    Links,
    /// Manage configuration and account tokens
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(long, action = ArgAction::SetTrue)]
        force: bool,
    },

    /// Store the auth token for an account
    Token {
        /// Account id as used in the link files
        #[arg(long)]
        account: String,

        /// Auth token (library auth key or history access token)
        #[arg(long)]
        token: String,

        /// Expiry time in RFC 3339, e.g. 2026-01-01T00:00:00Z
        #[arg(long)]
        expires: Option<String>,
    },

    /// Forget the stored token for an account
    RemoveToken {
        #[arg(long)]
        account: String,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let log_file = match &cli.command {
        Commands::Daemon { log_to_file: true, .. } => Some(PathManager::default().daemon_log_file()),
        _ => None,
    };
    logging::init_logging(cli.verbose, cli.quiet, log_file.as_deref())
        .map_err(|e| color_eyre::eyre::eyre!("{}", e))?;

    let output = output::Output::new(cli.output, cli.quiet);

    let result = match cli.command {
        Commands::Sync { account, history } => sync::run_sync(account, history, &output).await,
        Commands::Daemon {
            no_startup_sync,
            interval_minutes,
            ..
        } => {
            let args = daemon::DaemonArgs {
                no_startup_sync,
                interval_minutes,
            };
            daemon::run_daemon(args, &output).await
        }
        Commands::Links => links::run_links(&output).await,
        Commands::Config { cmd } => config::run_config(cmd, &output).await,
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Command failed");
    }
    result
}
