//! Island Rewards CLI
//!
//! Claim Satoshi Stacker rewards and inspect the rewards server.

mod client;
mod commands;
mod style;
mod wizard;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use style::*;

const BANNER: &str = r#"
  ██╗███████╗██╗      █████╗ ███╗   ██╗██████╗
  ██║██╔════╝██║     ██╔══██╗████╗  ██║██╔══██╗
  ██║███████╗██║     ███████║██╔██╗ ██║██║  ██║
  ██║╚════██║██║     ██╔══██║██║╚██╗██║██║  ██║
  ██║███████║███████╗██║  ██║██║ ╚████║██████╔╝
  ╚═╝╚══════╝╚══════╝╚═╝  ╚═╝╚═╝  ╚═══╝╚═════╝
"#;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "island")]
#[command(author = "Island Bitcoin")]
#[command(version)]
#[command(about = "Island Rewards - Stack sats for your Satoshi Stacker high scores", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Rewards server URL
    #[arg(
        short,
        long,
        env = "ISLAND_REWARDS_URL",
        default_value = "http://localhost:8080",
        global = true
    )]
    server: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive reward claim wizard (default)
    #[command(visible_aliases = ["c", "wizard"])]
    Claim {
        /// Nostr pubkey (64 hex characters)
        #[arg(short = 'k', long, env = "ISLAND_PUBKEY")]
        pubkey: Option<String>,

        /// Final game score
        #[arg(long)]
        score: Option<u64>,

        /// Level reached
        #[arg(long)]
        level: Option<u32>,
    },

    /// Solve a proof-of-work challenge offline
    Solve {
        /// Challenge string
        #[arg(short, long)]
        challenge: String,

        /// Required leading zero hex digits
        #[arg(short, long)]
        difficulty: u32,
    },

    /// Encode or decode LNURL strings
    Lnurl {
        #[command(subcommand)]
        action: LnurlAction,
    },

    /// Show claimed scores and rate-limit state for a pubkey
    #[command(visible_alias = "st")]
    Status {
        /// Nostr pubkey (64 hex characters)
        #[arg(short = 'k', long, env = "ISLAND_PUBKEY")]
        pubkey: String,
    },

    /// List reward tiers
    Tiers,

    /// Show server configuration
    Config,

    /// Migrate browser localStorage claims into or out of a claim ledger
    Ledger {
        /// SQLite ledger file
        #[arg(long, env = "REWARDS_DB_PATH", default_value = "island-rewards.db")]
        db: String,

        #[command(subcommand)]
        action: LedgerAction,
    },
}

#[derive(Subcommand)]
enum LedgerAction {
    /// Import a localStorage JSON dump
    Import { file: PathBuf },
    /// Export claims and attempts in localStorage layout
    Export {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum LnurlAction {
    /// Bech32-encode a URL as an LNURL
    Encode { url: String },
    /// Decode an LNURL back to its URL
    Decode { lnurl: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt().with_env_filter("info").init();
    }

    // Default to the claim wizard if no command specified
    let command = cli.command.unwrap_or(Commands::Claim {
        pubkey: None,
        score: None,
        level: None,
    });

    let result = match command {
        Commands::Claim {
            pubkey,
            score,
            level,
        } => wizard::run_claim_wizard(&cli.server, pubkey, score, level).await,
        Commands::Solve {
            challenge,
            difficulty,
        } => commands::solve::run(&challenge, difficulty).await,
        Commands::Lnurl { action } => match action {
            LnurlAction::Encode { url } => commands::lnurl::encode(&url),
            LnurlAction::Decode { lnurl } => commands::lnurl::decode(&lnurl),
        },
        Commands::Status { pubkey } => commands::status::run(&cli.server, &pubkey).await,
        Commands::Tiers => commands::tiers::run(&cli.server).await,
        Commands::Config => commands::config::run(&cli.server).await,
        Commands::Ledger { db, action } => match action {
            LedgerAction::Import { file } => commands::ledger::import(&db, &file),
            LedgerAction::Export { out } => commands::ledger::export(&db, out.as_deref()),
        },
    };

    if let Err(e) = result {
        print_error(&format!("{}", e));
        std::process::exit(1);
    }
}

pub fn print_banner() {
    println!("{}", style_cyan(BANNER));
    println!(
        "  {} {}",
        style_dim("Island Rewards"),
        style_dim(&format!("v{}", VERSION))
    );
    println!();
}
