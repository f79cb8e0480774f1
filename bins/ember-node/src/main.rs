//! Ember index node binary.
//!
//! Opens the transaction database and block files, loads and verifies the
//! block index, rewinds the best chain if verification finds a bad block,
//! and reports the resulting tip.

use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use ember_core::checkpoint::ChainParams;
use ember_core::constants::NetworkType;
use ember_core::error::EmberError;
use ember_core::shutdown::ShutdownFlag;
use ember_core::validation::{BasicValidator, CompactTargetTrust};
use ember_index::store::RocksEngine;
use ember_index::{
    FlatBlockFiles, IndexConfig, LoadMode, LoadOptions, LoadOutcome, RewindBestChain,
    SchemaStatus, Services, TxDb, finish_block_index, load_block_index,
};
use tracing::{error, info, warn};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LoadModeArg {
    Full,
    CheckpointWindow,
}

impl From<LoadModeArg> for LoadMode {
    fn from(arg: LoadModeArg) -> Self {
        match arg {
            LoadModeArg::Full => LoadMode::Full,
            LoadModeArg::CheckpointWindow => LoadMode::CheckpointWindow,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "ember-node",
    version,
    about = "Load and verify the Ember block index"
)]
struct Args {
    /// Data directory holding txleveldb/ and the blkNNNN.dat files
    #[arg(long)]
    datadir: Option<PathBuf>,

    /// TOML configuration file (EMBER_* environment variables apply on top)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Database block cache in MiB
    #[arg(long)]
    dbcache: Option<usize>,

    /// How thorough the startup verification is (0-7)
    #[arg(long)]
    checklevel: Option<u8>,

    /// How many blocks back from the tip to verify (0 = all)
    #[arg(long)]
    checkblocks: Option<u64>,

    /// Block index load strategy
    #[arg(long, value_enum)]
    load_mode: Option<LoadModeArg>,

    /// After a checkpoint-window load, backfill the older records
    #[arg(long)]
    backfill: bool,

    /// Refuse to open an outdated index instead of rebuilding it
    #[arg(long)]
    no_migrate: bool,

    /// Use the test network.
    #[arg(long, conflicts_with = "regtest")]
    testnet: bool,

    /// Use a local regression-test network.
    #[arg(long, conflicts_with = "testnet")]
    regtest: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format ("text" or "json")
    #[arg(long, default_value = "text")]
    log_format: String,
}

struct RunSettings {
    config: IndexConfig,
    backfill: bool,
    log_level: String,
    log_format: String,
}

impl Args {
    /// Layer command-line flags over the file/environment configuration.
    fn into_config(self) -> Result<RunSettings, EmberError> {
        let mut config = IndexConfig::load(self.config.as_deref())?;

        if self.regtest {
            config.network = NetworkType::Regtest;
        } else if self.testnet {
            config.network = NetworkType::Testnet;
        }
        if let Some(dir) = self.datadir {
            config.data_dir = Some(dir);
        }
        if let Some(mb) = self.dbcache {
            config.db_cache_mb = mb;
        }
        if let Some(level) = self.checklevel {
            config.check_level = level;
        }
        if let Some(depth) = self.checkblocks {
            config.check_depth = depth;
        }
        if let Some(mode) = self.load_mode {
            config.load_mode = mode.into();
        }
        if self.no_migrate {
            config.migrate_schema = false;
        }

        Ok(RunSettings {
            config: config.clamped(),
            backfill: self.backfill,
            log_level: self.log_level,
            log_format: self.log_format,
        })
    }
}

#[tokio::main]
async fn main() {
    let settings = match Args::parse().into_config() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            process::exit(1);
        }
    };

    init_logging(&settings.log_level, &settings.log_format);

    let config = settings.config;
    info!("Ember index node v{}", env!("CARGO_PKG_VERSION"));
    info!("network: {:?}", config.network);
    info!("data_dir: {:?}", config.data_dir());
    info!(
        "check_level: {} check_depth: {} load_mode: {:?}",
        config.check_level, config.check_depth, config.load_mode
    );

    if let Err(e) = std::fs::create_dir_all(config.data_dir()) {
        error!("failed to create data_dir: {}", e);
        process::exit(1);
    }

    let shutdown = ShutdownFlag::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received Ctrl+C, shutting down...");
                shutdown.request();
            }
        });
    }

    let backfill = settings.backfill;
    let task = tokio::task::spawn_blocking(move || run(&config, backfill, &shutdown));
    match task.await {
        Ok(Ok(())) => info!("Ember index node shutdown complete"),
        Ok(Err(e)) => {
            error!("failed to load block index: {}", e);
            process::exit(1);
        }
        Err(e) => {
            error!("block index task failed: {}", e);
            process::exit(1);
        }
    }
}

fn run(config: &IndexConfig, backfill: bool, shutdown: &ShutdownFlag) -> Result<(), EmberError> {
    let engine = RocksEngine::open(config.db_path(), config.db_cache_mb)?;
    let (mut db, status) = TxDb::open(engine, config.migrate_schema)?;
    let files = FlatBlockFiles::open(config.blocks_dir())?;
    if let SchemaStatus::Rebuilt { previous } = status {
        let removed = files.remove_all()?;
        warn!(previous, removed, "discarded block files of the outdated index");
    }

    let params = ChainParams::for_network(config.network);
    let trust = CompactTargetTrust;
    let selector = RewindBestChain::new(&files);
    let services = Services {
        source: &files,
        validator: &BasicValidator,
        trust: &trust,
        selector: &selector,
    };

    let mut outcome = load_block_index(&mut db, &params, &services, &LoadOptions::from(config), shutdown)?;
    if backfill && !shutdown.is_requested() {
        finish_block_index(&db, &mut outcome.index, &trust, shutdown)?;
    }
    report(&outcome);

    db.close();
    Ok(())
}

fn report(outcome: &LoadOutcome) {
    if let Some(report) = &outcome.verify {
        info!(
            "verified {} blocks, {} violations",
            report.blocks_checked,
            report.violations.len()
        );
    }
    if let Some(hash) = outcome.fell_back_to {
        warn!("best chain moved back to {}", hex::encode(hash.as_bytes()));
    }
    match outcome.index.best {
        Some(best) => info!(
            "best_chain: height={} hash={} trust={}",
            best.height,
            hex::encode(best.hash.as_bytes()),
            best.trust
        ),
        None => info!("block index is empty"),
    }
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// `format = "json"` selects structured JSON output; anything else is
/// human-readable text.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
