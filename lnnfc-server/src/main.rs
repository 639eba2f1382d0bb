use std::path::PathBuf;

use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use lnnfc_core::AppConfig;

mod commands;
mod context;

use commands::Output;
use context::AppContext;

#[derive(Parser, Debug, Clone)]
#[command(name = "lnnfc")]
#[command(author, version, about = "Load LNURL-withdraw links onto NFC tags and watch for their presentation")]
struct Args {
    /// Read settings from this file instead of ./.env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Create a withdraw link and write it to a tag
    LoadTag(LoadTagArgs),

    /// Show the LNURL stored on a tag
    ReadTag {
        #[arg(long, default_value_t = 30.0)]
        timeout: f64,
    },

    /// Erase a tag (the withdraw link itself is kept)
    ClearTag {
        #[arg(long, default_value_t = 30.0)]
        timeout: f64,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
        #[arg(long)]
        pin: Option<String>,
    },

    /// Check LNbits connectivity, wallet balance and the reader
    Status,

    /// Watch the reader and report every new tag presentation
    Daemon(DaemonArgs),

    /// List withdraw links on the wallet
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Dump the raw contents of a tag
    Info {
        #[arg(long, default_value_t = 30.0)]
        timeout: f64,
    },

    /// Check that a tag carries the given withdraw link
    Verify {
        #[arg(long)]
        claim_id: String,
        #[arg(long, default_value_t = 30.0)]
        timeout: f64,
    },
}

#[derive(ClapArgs, Debug, Clone)]
pub struct LoadTagArgs {
    /// Amount per use, in sats
    #[arg(long)]
    pub amount: u64,
    /// Number of withdrawals allowed (default: DEFAULT_TAG_USES)
    #[arg(long)]
    pub uses: Option<u32>,
    #[arg(long)]
    pub title: Option<String>,
    /// Seconds to wait for a tag
    #[arg(long, default_value_t = 30.0)]
    pub timeout: f64,
    /// Write the plain URL instead of a bech32 LNURL
    #[arg(long)]
    pub plain: bool,
    #[arg(long)]
    pub pin: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct DaemonArgs {
    /// Seconds per reader poll (default: POLL_INTERVAL)
    #[arg(long)]
    pub poll_interval: Option<f64>,
    /// Seconds before the same tag is reported again (default: RATE_LIMIT_SECONDS)
    #[arg(long)]
    pub cooldown: Option<f64>,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("warn,lnnfc={level},lnnfc_core={level},lnnfc_common={level}"))
    });
    // a second init (e.g. from tests) keeps the first subscriber
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

impl Command {
    fn uses_reader(&self) -> bool {
        !matches!(self, Command::List { .. } | Command::Daemon(_))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match AppConfig::load(args.env_file.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            init_tracing("info");
            return Err(e.into());
        }
    };
    init_tracing(&config.log_level);
    tracing::debug!("Loaded configuration: {config:?}");

    let ctx = AppContext::new(config)?;
    let out = Output { json: args.json };

    let needs_reader = args.command.uses_reader();
    if needs_reader {
        ctx.connect_reader().await?;
    }

    let result = match args.command {
        Command::LoadTag(a) => commands::load_tag(&ctx, out, a).await,
        Command::ReadTag { timeout } => commands::read_tag(&ctx, out, timeout).await,
        Command::ClearTag { timeout, yes, pin } => commands::clear_tag(&ctx, out, timeout, yes, pin).await,
        Command::Status => commands::status(&ctx, out).await,
        Command::Daemon(a) => commands::daemon(&ctx, out, a).await,
        Command::List { limit } => commands::list(&ctx, out, limit).await,
        Command::Info { timeout } => commands::info(&ctx, out, timeout).await,
        Command::Verify { claim_id, timeout } => commands::verify(&ctx, out, &claim_id, timeout).await,
    };

    if needs_reader {
        ctx.disconnect_reader().await;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn load_tag_flags_parse() {
        let args = Args::parse_from([
            "lnnfc", "--env-file", "prod.env", "load-tag", "--amount", "2100", "--uses", "3", "--plain",
        ]);
        assert_eq!(args.env_file, Some(PathBuf::from("prod.env")));
        match args.command {
            Command::LoadTag(a) => {
                assert_eq!(a.amount, 2100);
                assert_eq!(a.uses, Some(3));
                assert!(a.plain);
                assert_eq!(a.timeout, 30.0);
                assert!(a.pin.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn verify_requires_claim_id() {
        assert!(Args::try_parse_from(["lnnfc", "verify"]).is_err());
        let args = Args::try_parse_from(["lnnfc", "verify", "--claim-id", "abc", "--json"]).unwrap();
        assert!(args.json);
        assert!(args.command.uses_reader());
    }

    #[test]
    fn list_and_daemon_leave_the_reader_alone() {
        let list = Args::try_parse_from(["lnnfc", "list", "--limit", "5"]).unwrap();
        assert!(!list.command.uses_reader());
        let daemon = Args::try_parse_from(["lnnfc", "daemon", "--cooldown", "2"]).unwrap();
        assert!(!daemon.command.uses_reader());
        let status = Args::try_parse_from(["lnnfc", "status"]).unwrap();
        assert!(status.command.uses_reader());
    }
}
