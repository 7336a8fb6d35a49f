use crate::config::types::{InputEncoding, RunConfig};
use crate::config::validator::{validate_config, OracleKind};
use crate::distribution::csv::{read_distribution, write_distribution};
use crate::distribution::Distribution;
use crate::guess::{optimal_guess_curve, write_curve, CurveMode};
use crate::oracle::client::OracleClient;
use crate::oracle::local::{CompositionPolicy, LocalComplianceOracle, SpecialRule};
use crate::oracle::DecisionOracle;
use crate::pipeline::{self, RunOutcome, RunSummary};
use crate::redistribution::registry::ModeRegistry;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Filter a password distribution and redistribute the removed mass", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Delegate accept/reject decisions to an external oracle process
    Authority {
        /// Oracle executable
        #[arg(short = 'a', long = "authority")]
        executable: Option<PathBuf>,
        /// Policy name passed to the oracle
        #[arg(short, long)]
        policy: Option<String>,
        /// Query ceiling announced to the oracle
        #[arg(short, long = "batch")]
        batch_size: Option<usize>,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Evaluate a character-class composition policy in process
    Policy {
        /// Minimum length
        #[arg(short = 'n', long, default_value_t = 0)]
        length: usize,
        /// Minimum lowercase letters
        #[arg(short = 'l', long, default_value_t = 0)]
        lowers: usize,
        /// Minimum uppercase letters
        #[arg(short = 'u', long, default_value_t = 0)]
        uppers: usize,
        /// Minimum digits
        #[arg(short = 'd', long, default_value_t = 0)]
        digits: usize,
        /// Minimum symbols
        #[arg(short = 's', long, default_value_t = 0)]
        symbols: usize,
        /// Minimum letters
        #[arg(short = 'a', long, default_value_t = 0)]
        letters: usize,
        /// Minimum character classes
        #[arg(short = 'c', long, default_value_t = 0)]
        classes: usize,
        /// Minimum words
        #[arg(short = 'w', long, default_value_t = 0)]
        words: usize,
        /// Special requirement: norep, noconsec, nodate or dict:<file>
        #[arg(long = "special", value_name = "RULE")]
        special: Vec<String>,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Print the optimal guessing curve of a distribution
    Guess {
        /// Emit 100 cumulative points only
        #[arg(short = 'c', long = "percentile")]
        percentile: bool,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Input encoding: latin1 or utf8
        #[arg(long, default_value = "latin1")]
        encoding: InputEncoding,
        /// Distribution CSV with password and probability columns
        infile: PathBuf,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Redistribution mode: none, proportional, uniform, convergent, extraneous or 0-4
    #[arg(short, long)]
    mode: Option<String>,
    /// Keep rows the policy rejects instead
    #[arg(short, long)]
    invert: bool,
    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// JSON run configuration; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print a JSON run summary to stderr
    #[arg(long)]
    summary: bool,
    /// Input encoding: latin1 or utf8
    #[arg(long)]
    encoding: Option<InputEncoding>,
    /// Seed for synthetic passwords
    #[arg(long)]
    seed: Option<u64>,
    /// Input distribution CSV with password and probability columns
    infile: PathBuf,
}

impl CommonArgs {
    fn load_config(&self) -> Result<RunConfig> {
        let mut config = match self.config {
            Some(ref path) => RunConfig::load_from_file(path)?,
            None => RunConfig::default(),
        };
        if let Some(ref mode) = self.mode {
            config.mode = mode.clone();
        }
        if self.invert {
            config.invert = true;
        }
        if let Some(encoding) = self.encoding {
            config.encoding = encoding;
        }
        if self.seed.is_some() {
            config.extraneous.seed = self.seed;
        }
        Ok(config)
    }
}

pub fn run() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Authority {
            executable,
            policy,
            batch_size,
            common,
        } => {
            let mut config = common.load_config()?;
            if executable.is_some() {
                config.oracle.executable = executable;
            }
            if let Some(policy) = policy {
                config.oracle.policy = policy;
            }
            if let Some(batch_size) = batch_size {
                config.oracle.batch_size = batch_size;
            }
            check(&config, OracleKind::External)?;

            let registry = ModeRegistry::new(&config.extraneous);
            registry.resolve(&config.mode)?;
            let distribution = load_input(&common, &config)?;
            let mut oracle = OracleClient::from_settings(&config.oracle)
                .context("Failed to start the oracle")?;
            execute(&common, &config, &registry, distribution, &mut oracle)
        }
        Commands::Policy {
            length,
            lowers,
            uppers,
            digits,
            symbols,
            letters,
            classes,
            words,
            special,
            common,
        } => {
            let config = common.load_config()?;
            check(&config, OracleKind::Local)?;

            let special = special
                .iter()
                .map(|rule| rule.parse::<SpecialRule>())
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let policy = CompositionPolicy {
                length,
                lowers,
                uppers,
                digits,
                symbols,
                letters,
                classes,
                words,
                special,
            };

            let registry = ModeRegistry::new(&config.extraneous);
            registry.resolve(&config.mode)?;
            let mut oracle = LocalComplianceOracle::new(policy)?;
            let distribution = load_input(&common, &config)?;
            execute(&common, &config, &registry, distribution, &mut oracle)
        }
        Commands::Guess {
            percentile,
            output,
            encoding,
            infile,
        } => {
            let distribution = read_distribution(&infile, encoding)
                .with_context(|| format!("Failed to read {}", infile.display()))?;
            let mode = if percentile {
                CurveMode::Percentile
            } else {
                CurveMode::Full
            };
            let curve = optimal_guess_curve(&distribution, mode);
            info!(
                "Guessing curve of {} rows has {} points",
                distribution.len(),
                curve.len()
            );
            match output {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    write_curve(&mut BufWriter::new(file), &curve)?;
                }
                None => write_curve(&mut BufWriter::new(std::io::stdout().lock()), &curve)?,
            }
            Ok(())
        }
    }
}

fn check(config: &RunConfig, kind: OracleKind) -> Result<()> {
    let validation = validate_config(config, kind)?;
    for warning in &validation.warnings {
        warn!("{}", warning);
    }
    Ok(())
}

fn load_input(common: &CommonArgs, config: &RunConfig) -> Result<Distribution> {
    let distribution = read_distribution(&common.infile, config.encoding)
        .with_context(|| format!("Failed to read {}", common.infile.display()))?;
    info!(
        "Read {} rows (mass {:.6}) from {}",
        distribution.len(),
        distribution.total_mass(),
        common.infile.display()
    );
    Ok(distribution)
}

fn execute(
    common: &CommonArgs,
    config: &RunConfig,
    registry: &ModeRegistry,
    distribution: Distribution,
    oracle: &mut dyn DecisionOracle,
) -> Result<()> {
    let law = registry.resolve(&config.mode)?;
    let outcome = pipeline::run(distribution, oracle, law, config.invert)?;

    if common.summary {
        let summary =
            RunSummary::from_outcome(&outcome, law.name(), config.invert, oracle.relaunch_count());
        eprintln!("{}", summary.to_json()?);
    }

    match outcome {
        RunOutcome::Degenerate(summary) => {
            eprintln!(
                "All probability mass was filtered out ({} of {} rows rejected); no output written",
                summary.rejected_rows, summary.input_rows
            );
            Ok(())
        }
        RunOutcome::Redistributed(report) => match common.output {
            Some(ref path) => {
                let file = File::create(path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                let mut writer = BufWriter::new(file);
                write_distribution(&mut writer, &report.output)?;
                writer.flush()?;
                Ok(())
            }
            None => {
                let stdout = std::io::stdout();
                let mut writer = BufWriter::new(stdout.lock());
                write_distribution(&mut writer, &report.output)?;
                writer.flush()?;
                Ok(())
            }
        },
    }
}
