//! safe-print - Print selected KeePass secrets
//!
//! Decrypts a KDBX file, renders the entries carrying the match key into a
//! printable page and serves it once over loopback.
//!
//! Commands:
//! - gen --kdbx <FILE>: Render the sheet, open it in the browser, wait for
//!   the page to close the server (or for the deadline)

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use safe_print::browser::SystemBrowser;
use safe_print::{Config, KdbxFile, Orchestrator, ShutdownReason};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "safe-print")]
#[command(about = "Print selected KeePass secrets through a one-shot local page")]
#[command(version)]
#[command(after_help = r#"SELECTING ENTRIES:
    Tag an entry with the match key (default: safe-print) to put it on the
    sheet. An entry titled exactly with the match key describes the store
    itself: its username, URL and notes go into the store section.

SECURITY:
    - The page is rendered in memory and served from 127.0.0.1 only
    - The URL carries a random 128-bit token; wrong tokens get 404
    - The page is served once, then the server waits for the close request
    - The server stops on its own after the deadline (default 120s)
    - The sheet includes the store passphrase - keep the paper safe"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the print sheet and serve it once
    Gen {
        /// KDBX file to open
        #[arg(long)]
        kdbx: PathBuf,

        /// Match key for entry titles and tags
        #[arg(long, env = "SAFE_PRINT_TAG")]
        tag: Option<String>,

        /// Seconds before the server stops on its own
        #[arg(long)]
        timeout: Option<u64>,

        /// Don't launch a browser, only print the URL
        #[arg(long)]
        no_browser: bool,

        /// Config file (default: ~/.config/safe-print/config.json)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout is for the operator
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Gen {
            kdbx,
            tag,
            timeout,
            no_browser,
            config,
        } => {
            let config = load_config(config.as_deref(), tag, timeout, no_browser)?;
            cmd_gen(&kdbx, config)
        }
    }
}

/// Load the config file and apply command line overrides
fn load_config(
    path: Option<&Path>,
    tag: Option<String>,
    timeout: Option<u64>,
    no_browser: bool,
) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Some(tag) = tag {
        config.tag = tag;
    }
    if let Some(timeout) = timeout {
        config.deadline_secs = timeout;
    }
    if no_browser {
        config.open_browser = false;
    }

    Ok(config)
}

/// Render the sheet and serve it
fn cmd_gen(kdbx: &Path, config: Config) -> Result<()> {
    let started = Instant::now();
    let deadline_secs = config.deadline_secs;

    let orchestrator =
        Orchestrator::new(config, Arc::new(SystemBrowser)).context("Invalid configuration")?;

    if !kdbx.exists() {
        bail!("Store file not found: {}", kdbx.display());
    }

    let passphrase = Zeroizing::new(
        rpassword::prompt_password("Password: ").context("Failed to read password")?,
    );

    let store = KdbxFile::new(kdbx);
    let document = orchestrator.prepare(&store, &passphrase)?;
    println!("info: Store decrypted");

    let deadline = started + orchestrator.config().deadline();
    let rt = tokio::runtime::Runtime::new()?;
    let reason = rt.block_on(orchestrator.deliver(document, deadline, |url| {
        println!("Open {}", url);
    }))?;

    match reason {
        ShutdownReason::Closed => println!("success: Page closed, server stopped"),
        ShutdownReason::TimedOut => {
            println!("info: No close request within {}s, server stopped", deadline_secs)
        }
    }

    Ok(())
}
