#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Bloomlink entrypoint: tokenize, decrypt, intersect, and the full
//! two-party linkage session.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};

use bloomlink::core::config::LinkConfig;
use bloomlink::core::runtime::session::{
    decrypt_store, run_linkage, run_local_intersect, tokenize_file,
};
use bloomlink::networking::peer::shutdown_channel;

#[derive(Debug, Parser)]
#[clap(name = "bloomlink")]
#[clap(version = env!("CARGO_PKG_VERSION"))]
#[clap(about = "Privacy-preserving record linkage between two peers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Tokenize the configured dataset into a token store
    Tokenize {
        /// Config file (TOML)
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
        /// Output store; a `.enc` suffix encrypts and writes a companion `.key`
        #[arg(short, long)]
        out: PathBuf,
        /// Persist q-gram multisets in the store (debugging pipelines)
        #[arg(long)]
        keep_qgrams: bool,
    },
    /// Decrypt an encrypted token store to plaintext
    Decrypt {
        /// Encrypted store (`.enc`)
        input: PathBuf,
        /// Plaintext output store
        #[arg(short, long)]
        out: PathBuf,
        /// Key file; defaults to the companion `.key` next to the input
        #[arg(long)]
        key: Option<PathBuf>,
    },
    /// Intersect two local token stores without a peer
    Intersect {
        /// Config file (TOML); supplies thresholds and output directory
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
        /// This party's token store
        #[arg(long)]
        local: PathBuf,
        /// The other extract's token store
        #[arg(long)]
        peer: PathBuf,
    },
    /// Run a full two-party linkage session
    Pprl {
        /// Config file (TOML)
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
        /// Keep the session temp directory and q-gram debug data
        #[arg(long)]
        debug: bool,
    },
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Tokenize { config, out, keep_qgrams } => {
            let cfg = LinkConfig::load(&config)?;
            let n = tokenize_file(&cfg, &out, keep_qgrams)?;
            println!("tokenized {n} records -> {}", out.display());
        }
        Command::Decrypt { input, out, key } => {
            let n = decrypt_store(&input, key.as_deref(), &out)?;
            println!("decrypted {n} records -> {}", out.display());
        }
        Command::Intersect { config, local, peer } => {
            let cfg = LinkConfig::load(&config)?;
            cfg.validate()?;
            let out_dir = Path::new(&cfg.output.directory);
            let (path, matches) =
                run_local_intersect(&local, &peer, &cfg.match_options(), out_dir)?;
            println!("{} matches -> {}", matches.len(), path.display());
        }
        Command::Pprl { config, debug } => {
            let cfg = LinkConfig::load(&config)?;
            let (tx, rx) = shutdown_channel();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let _ = tx.send(true);
                }
            });
            let outcome = run_linkage(&cfg, rx, debug).await?;
            println!(
                "linkage confirmed: {} matches -> {}",
                outcome.matches.len(),
                outcome.results_path.display()
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .compact()
        .try_init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
