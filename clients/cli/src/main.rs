//! Timelock CLI
//!
//! Create, lock, distribute and solve sequential-hash timelock puzzles.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use console::{style, Emoji};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use timelock_chain::{ChainSet, SecretProvenance, SequentialHashEngine, UnlockPolicy};
use timelock_crypto::kernel::AlgorithmRegistry;
use timelock_crypto::keys::SecretKey;

mod config;
mod storage;

use config::CliConfig;
use storage::RecordFile;

static LOCK: Emoji<'_, '_> = Emoji("🔐 ", "");
static UNLOCK: Emoji<'_, '_> = Emoji("🔓 ", "");
static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK] ");
static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR] ");
static KEY: Emoji<'_, '_> = Emoji("🔑 ", "[KEY] ");
static CLOCK: Emoji<'_, '_> = Emoji("⏳ ", "");

const BAR_TEMPLATE: &str = concat!(
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] ",
    "{pos}/{len} steps ({per_sec}, eta {eta})"
);

/// Timelock CLI - Sequential-hash time-lock puzzles
#[derive(Parser)]
#[command(name = "timelock")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new, unsolved chain set with random seeds
    New {
        /// Record file to create
        #[arg(short, long)]
        output: PathBuf,

        /// Number of chains
        #[arg(short = 'n', long)]
        chains: Option<usize>,

        /// Steps per chain
        #[arg(short, long)]
        steps: Option<u64>,

        /// Hash algorithm
        #[arg(short, long)]
        algorithm: Option<String>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Work on a record until its secret is known
    Unlock {
        /// Record file; progress is saved back to it
        file: PathBuf,

        /// Chain traversal order
        #[arg(short, long, value_enum)]
        policy: Option<PolicyArg>,

        /// Stop after this many seconds
        #[arg(short, long)]
        max_secs: Option<u64>,
    },

    /// Produce the distributable form of a fully solved record
    Lock {
        /// Solved record
        input: PathBuf,

        /// Locked record to write
        #[arg(short, long)]
        output: PathBuf,

        /// Leave chain 0's seed out and print it instead
        #[arg(short, long)]
        withhold_seed: bool,
    },

    /// Add a secret learned out of band
    AddSecret {
        /// Record file
        file: PathBuf,

        /// Secret or public key as hex, or a `tlsk1` secret key
        value: String,
    },

    /// Supply a withheld chain 0 seed
    SupplySeed {
        /// Record file
        file: PathBuf,

        /// Seed as hex
        seed: String,
    },

    /// Show the state of a record
    Info {
        /// Record file
        file: PathBuf,

        /// Print the secret if it is known
        #[arg(short, long)]
        show_secret: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    /// Last chain first
    Backward,
    /// First chain first
    Forward,
}

impl From<PolicyArg> for UnlockPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Backward => UnlockPolicy::BackwardFirst,
            PolicyArg::Forward => UnlockPolicy::ForwardFirst,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    // Load config
    let config_path = cli.config.unwrap_or_else(CliConfig::default_path);
    let config = CliConfig::load_or_default(&config_path)?;
    debug!(path = %config_path.display(), "configuration loaded");

    // Execute command
    match cli.command {
        Commands::New {
            output,
            chains,
            steps,
            algorithm,
            force,
        } => {
            new_set(&config, &output, chains, steps, algorithm, force)?;
        }
        Commands::Unlock {
            file,
            policy,
            max_secs,
        } => {
            unlock_set(&config, &file, policy, max_secs)?;
        }
        Commands::Lock {
            input,
            output,
            withhold_seed,
        } => {
            lock_set(&input, &output, withhold_seed)?;
        }
        Commands::AddSecret { file, value } => {
            add_secret(&file, &value)?;
        }
        Commands::SupplySeed { file, seed } => {
            supply_seed(&file, &seed)?;
        }
        Commands::Info { file, show_secret } => {
            show_info(&file, show_secret)?;
        }
    }

    Ok(())
}

fn new_set(
    config: &CliConfig,
    output: &Path,
    chains: Option<usize>,
    steps: Option<u64>,
    algorithm: Option<String>,
    force: bool,
) -> anyhow::Result<()> {
    let file = RecordFile::new(output);
    if file.exists() && !force {
        anyhow::bail!("{} already exists; pass --force to overwrite", output.display());
    }

    let chains = chains.unwrap_or(config.default_chains);
    let steps = steps.unwrap_or(config.default_steps);
    let algorithm = algorithm.unwrap_or_else(|| config.default_algorithm.clone());

    let registry = AlgorithmRegistry::default();
    let algorithm = registry.get(&algorithm).with_context(|| {
        format!("known algorithms: {}", registry.names().join(", "))
    })?;

    let set = ChainSet::new(chains, steps, algorithm)?;
    file.save(&set)?;

    println!("{} Created {} chains of {} steps", LOCK, chains, steps);
    println!("  File: {}", style(output.display()).cyan());
    println!();
    println!(
        "{}",
        style("Solve it with `timelock unlock --policy forward`, then `timelock lock`.").dim()
    );

    Ok(())
}

fn unlock_set(
    config: &CliConfig,
    path: &Path,
    policy: Option<PolicyArg>,
    max_secs: Option<u64>,
) -> anyhow::Result<()> {
    let file = RecordFile::new(path);
    let mut unlock_config = config.unlock.clone();
    if let Some(policy) = policy {
        unlock_config.policy = policy.into();
    }
    let mut set = file.load()?.with_config(unlock_config)?;

    if set.secret().is_some() {
        println!("{} Already unlocked", CHECK);
        return Ok(());
    }

    let pb = ProgressBar::new(set.steps_total());
    pb.set_style(
        ProgressStyle::default_bar()
            .template(BAR_TEMPLATE)?
            .progress_chars("#>-"),
    );
    pb.set_position(set.steps_done());

    let deadline = max_secs.map(|secs| Instant::now() + Duration::from_secs(secs));

    loop {
        let computed = set.hashes_computed();
        let slice = match deadline {
            Some(deadline) => config
                .slice()
                .min(deadline.saturating_duration_since(Instant::now())),
            None => config.slice(),
        };

        let unlocked = set.unlock(slice)?;
        file.save(&set)?;
        pb.set_position(set.steps_done());

        if unlocked {
            pb.finish_and_clear();
            println!("{} Unlocked {}", UNLOCK, style(path.display()).cyan());
            println!(
                "{}",
                style("Run `timelock info --show-secret` to print the secret.").dim()
            );
            return Ok(());
        }

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            pb.abandon();
            println!(
                "{} Stopped at {}/{} steps; progress saved",
                CLOCK,
                set.steps_done(),
                set.steps_total()
            );
            return Ok(());
        }

        if set.hashes_computed() == computed {
            pb.abandon();
            println!("{} No chain can make progress", CROSS);
            println!(
                "{}",
                style("Chain 0's seed is missing; add it with `timelock supply-seed`.").yellow()
            );
            return Ok(());
        }
    }
}

fn lock_set(input: &Path, output: &Path, withhold_seed: bool) -> anyhow::Result<()> {
    let solved = RecordFile::new(input).load()?;
    let mut locked = solved
        .make_locked()
        .context("every chain must be solved first; run `timelock unlock --policy forward`")?;

    let withheld = if withhold_seed {
        let mut record = locked.to_record();
        let seed = record.chains[0].iv.take();
        record.chains[0].midstate = None;
        locked = ChainSet::from_record(&record, &AlgorithmRegistry::default())?;
        seed
    } else {
        None
    };

    RecordFile::new(output).save(&locked)?;

    println!("{} Locked record written", LOCK);
    println!("  File: {}", style(output.display()).cyan());
    if let Some(seed) = withheld {
        println!(
            "  {} Withheld seed: {}",
            KEY,
            style(hex::encode(seed)).yellow()
        );
        println!(
            "{}",
            style("Nobody can start solving until this seed is released.").dim()
        );
    }

    Ok(())
}

fn add_secret(path: &Path, value: &str) -> anyhow::Result<()> {
    let file = RecordFile::new(path);
    let mut set = file.load()?;

    let accepted = if value.starts_with("tlsk1") {
        let seckey: SecretKey = value.parse().context("invalid secret key")?;
        set.add_provenance(&SecretProvenance::SecretKey(seckey))?
    } else {
        let bytes = hex::decode(value.trim()).context("value must be hex or a tlsk1 key")?;
        set.add_secret(&bytes)?
    };

    if accepted {
        file.save(&set)?;
        println!("{} Secret accepted", CHECK);
    } else {
        println!("{} Secret matches no chain", CROSS);
    }

    Ok(())
}

fn supply_seed(path: &Path, seed: &str) -> anyhow::Result<()> {
    let file = RecordFile::new(path);
    let mut set = file.load()?;

    let seed = hex::decode(seed.trim()).context("seed must be hex")?;
    set.supply_seed(seed)?;
    file.save(&set)?;

    println!("{} Seed supplied; solving can start", CHECK);
    Ok(())
}

fn show_info(path: &Path, show_secret: bool) -> anyhow::Result<()> {
    let set = RecordFile::new(path).load()?;

    println!("{} {}", KEY, style(path.display()).cyan());
    println!();
    for (index, chain) in set.chains().iter().enumerate() {
        println!(
            "  Chain {:>3}  {:<9} {:>12}/{:<12} {}",
            index,
            chain.algorithm().short_name(),
            chain.i(),
            chain.n(),
            chain_state(chain)
        );
    }
    println!();
    println!(
        "  Progress:    {}/{} steps",
        set.steps_done(),
        set.steps_total()
    );

    match set.secret() {
        Some(secret) if show_secret => {
            println!("  Secret:      {}", style(hex::encode(secret)).yellow());
        }
        Some(_) => println!("  Secret:      {}", style("known").green()),
        None => println!("  Secret:      {}", style("locked").red()),
    }

    Ok(())
}

fn chain_state(chain: &SequentialHashEngine) -> console::StyledObject<&'static str> {
    if chain.is_solved() {
        style("solved").green()
    } else if chain.i() > 0 {
        style("in progress").cyan()
    } else if chain.iv().is_some() {
        style("ready").cyan()
    } else if chain.encrypted_iv().is_some() {
        style("waiting on previous chain").dim()
    } else {
        style("seed missing").yellow()
    }
}
