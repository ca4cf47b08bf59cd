//! Validator subprocess entry point.
//!
//! `chi-node validate <block>` validates a fetched block against the
//! persisted tip and, on success, commits it. Exit codes follow the
//! subprocess contract: 0 valid and committed, 1 retryable I/O fault,
//! 2 invalid (drop silently), 3 hostile (punish the source peer).

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use chi_node::arith::Value64;
use chi_node::blockchain::chain::{commit_block, reindex_tags};
use chi_node::blockchain::{neogen, ChainTip};
use chi_node::config::Paths;
use chi_node::consensus::validate_block;
use chi_node::database::{Ledger, TagIndex};

#[derive(Parser)]
#[command(name = "chi-node", version, about = "chi block validator and chain core")]
struct Cli {
    /// Data directory holding the ledger, tip state, and trailer history.
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a candidate block file and commit it on success.
    Validate {
        /// The block file to validate.
        block: PathBuf,
        /// Validate only; leave the ledger and tip untouched.
        #[arg(long)]
        no_commit: bool,
    },
    /// Build the next neogenesis block from the current ledger.
    Neogen {
        /// Output path for the generated block.
        out: PathBuf,
    },
    /// Print the persisted chain tip.
    Tip,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    let paths = Paths::new(&cli.data_dir);

    match cli.command {
        Command::Validate { block, no_commit } => validate_cmd(&paths, &block, no_commit),
        Command::Neogen { out } => run_anyhow(neogen_cmd(&paths, &out)),
        Command::Tip => run_anyhow(tip_cmd(&paths)),
    }
}

fn validate_cmd(paths: &Paths, block: &PathBuf, no_commit: bool) -> ExitCode {
    let outcome = (|| -> chi_node::Result<()> {
        let mut tip = ChainTip::load_or_genesis(&paths.tip())?;
        let mut ledger = Ledger::open(&paths.ledger())?;
        let tags = TagIndex::build(&mut ledger)?;

        let eval = validate_block(block, &tip, &mut ledger, &tags, paths)?;
        log::info!("block valid: {} transactions", eval.tx_count);

        if no_commit {
            return Ok(());
        }
        drop(ledger);
        commit_block(paths, &mut tip, &eval, block)?;
        reindex_tags(paths)?;
        println!("{}", eval.haiku);
        Ok(())
    })();

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn neogen_cmd(paths: &Paths, out: &PathBuf) -> anyhow::Result<()> {
    let trailers = chi_node::blockchain::block::scan_trailers(&paths.trailers())
        .context("reading trailer history")?;
    let prev = trailers.last().context("empty trailer history")?;
    let mut ledger = Ledger::open(&paths.ledger())?;
    let bt = neogen::build(&mut ledger, prev, out)
        .map_err(|e| anyhow::anyhow!("neogenesis build failed: {e}"))?;
    println!(
        "neogenesis block {} written to {}",
        Value64::from_bytes(&bt.bnum),
        out.display()
    );
    Ok(())
}

fn tip_cmd(paths: &Paths) -> anyhow::Result<()> {
    let tip = ChainTip::load_or_genesis(&paths.tip())?;
    println!("block:      {}", Value64::from_bytes(&tip.bnum));
    println!("hash:       {}", hex::encode(tip.bhash));
    println!("prev:       {}", hex::encode(tip.phash));
    println!("difficulty: {}", tip.difficulty);
    println!("weight:     {}", hex::encode(tip.weight));
    println!("eon:        {}", tip.eon);
    Ok(())
}

fn run_anyhow(result: anyhow::Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
