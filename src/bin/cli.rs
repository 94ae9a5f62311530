//! Overtake CLI - build the training table, train, and estimate overtakes

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use overtake::analysis::{CorrelationMatrix, DEFAULT_REDUNDANCY_THRESHOLD};
use overtake::artifacts::{
    ArtifactStore, CORRELATION_FILE, MODEL_FILE, MODEL_INFO_FILE, TRAINING_REPORT_FILE,
};
use overtake::config::PipelineConfig;
use overtake::data::{parse_pace, LapRecordNormalizer, LapTable};
use overtake::pipeline::{OvertakePipeline, PipelineOutput};
use overtake::training::{default_candidates, ModelTrainer, OvertakeClassifier, SelectionMetric};
use overtake::{
    AttackerState, Compound, DefenderState, EstimationContext, OvertakeEstimate, OvertakeQuery,
    ProbabilityBand,
};

/// Default lap export (relative to project root)
const DEFAULT_DATA: &str = "data/laps.csv";
const DEFAULT_ARTIFACTS: &str = "models";

const COMPOUNDS: [&str; 5] = ["SOFT", "MEDIUM", "HARD", "INTERMEDIATE", "WET"];

#[derive(Parser)]
#[command(name = "overtake")]
#[command(author, version, about = "Overtake probability estimation CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Run in interactive mode
    #[arg(short, long)]
    interactive: bool,

    /// Artifact directory (training table, scaler, model)
    #[arg(long, global = true, default_value = DEFAULT_ARTIFACTS)]
    artifacts: PathBuf,

    /// Pipeline configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the training table from a lap export
    Build {
        /// Lap-by-lap CSV export
        #[arg(short, long, default_value = DEFAULT_DATA)]
        data: PathBuf,
    },

    /// Train candidate models on the built table
    Train {
        /// Selection metric: accuracy, precision, recall, f1, roc_auc
        #[arg(long, default_value = "f1")]
        metric: SelectionMetric,
    },

    /// Build then train
    Run {
        #[arg(short, long, default_value = DEFAULT_DATA)]
        data: PathBuf,

        #[arg(long, default_value = "f1")]
        metric: SelectionMetric,
    },

    /// Feature correlation analysis
    Analyze {
        #[arg(short, long, default_value = DEFAULT_DATA)]
        data: PathBuf,

        /// |r| above which two features are reported as redundant
        #[arg(long, default_value_t = DEFAULT_REDUNDANCY_THRESHOLD)]
        threshold: f64,
    },

    /// Estimate one overtake
    Estimate {
        /// Your current standing
        #[arg(short, long)]
        standing: u32,

        /// Your lap time (seconds or m:ss.fff)
        #[arg(short, long, value_parser = parse_pace_arg)]
        pace: f64,

        /// Laps on your current tires
        #[arg(short, long)]
        tire_age: u32,

        /// Your compound
        #[arg(short, long, default_value = "MEDIUM")]
        compound: String,

        /// Opponent lap time (seconds or m:ss.fff)
        #[arg(long, value_parser = parse_pace_arg)]
        opponent_pace: f64,

        /// Laps on the opponent's tires
        #[arg(long)]
        opponent_tire_age: u32,

        /// Opponent compound
        #[arg(long, default_value = "MEDIUM")]
        opponent_compound: String,

        /// You defend against the car one place behind instead of attacking the car ahead
        #[arg(long)]
        defense: bool,
    },
}

/// Your car and the opponent's, before roles are assigned
struct Matchup {
    standing: u32,
    pace: f64,
    tire_age: u32,
    compound: Compound,
    opponent_pace: f64,
    opponent_tire_age: u32,
    opponent_compound: Compound,
    defense: bool,
}

impl Matchup {
    /// Attack: you are the attacker. Defense: the opponent attacks from one place behind.
    fn to_query(&self) -> Result<OvertakeQuery> {
        if self.defense {
            let Some(attacker_standing) = self.standing.checked_add(1) else {
                bail!("standing {} has no place behind it", self.standing);
            };
            Ok(OvertakeQuery {
                attacker: AttackerState {
                    standing: attacker_standing,
                    pace: self.opponent_pace,
                    tire_age: self.opponent_tire_age,
                    compound: self.opponent_compound,
                },
                defender: DefenderState {
                    pace: self.pace,
                    tire_age: self.tire_age,
                    compound: self.compound,
                },
            })
        } else {
            Ok(OvertakeQuery {
                attacker: AttackerState {
                    standing: self.standing,
                    pace: self.pace,
                    tire_age: self.tire_age,
                    compound: self.compound,
                },
                defender: DefenderState {
                    pace: self.opponent_pace,
                    tire_age: self.opponent_tire_age,
                    compound: self.opponent_compound,
                },
            })
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    println!("{}", "Overtake Predictor CLI".cyan().bold());
    println!();

    let store = ArtifactStore::new(&cli.artifacts);
    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => PipelineConfig::default(),
    };

    if cli.interactive {
        run_interactive(&store)?;
    } else if let Some(command) = cli.command {
        match command {
            Commands::Build { data } => {
                run_build(&data, &store, config)?;
            }
            Commands::Train { metric } => {
                run_train(&store, metric)?;
            }
            Commands::Run { data, metric } => {
                run_build(&data, &store, config)?;
                println!();
                run_train(&store, metric)?;
            }
            Commands::Analyze { data, threshold } => {
                run_analyze(&data, &store, config, threshold)?;
            }
            Commands::Estimate {
                standing,
                pace,
                tire_age,
                compound,
                opponent_pace,
                opponent_tire_age,
                opponent_compound,
                defense,
            } => {
                let matchup = Matchup {
                    standing,
                    pace,
                    tire_age,
                    compound: Compound::parse(&compound),
                    opponent_pace,
                    opponent_tire_age,
                    opponent_compound: Compound::parse(&opponent_compound),
                    defense,
                };
                match load_context(&store)? {
                    Some(context) => run_estimate(&context, &matchup)?,
                    None => return Ok(()),
                }
            }
        }
    } else {
        println!("Use --help for usage information or --interactive for interactive mode.");
    }

    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

fn parse_pace_arg(raw: &str) -> std::result::Result<f64, String> {
    parse_pace(raw).ok_or_else(|| format!("invalid lap time '{}', use seconds or m:ss.fff", raw))
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(message.to_string());
    Ok(pb)
}

fn run_build(data: &Path, store: &ArtifactStore, config: PipelineConfig) -> Result<PipelineOutput> {
    println!("{} {:?}", "Building training table from".green(), data);

    let pb = spinner("Loading lap data...")?;
    let laps = LapTable::load(data).with_context(|| format!("Failed to load laps from {:?}", data))?;

    pb.set_message("Pairing, labeling and balancing...");
    let pipeline = OvertakePipeline::new(config)?;
    let output = pipeline.run(&laps).context("Pipeline failed")?;
    pb.finish_and_clear();

    store
        .save_pipeline_output(&output)
        .with_context(|| format!("Failed to save artifacts to {:?}", store.dir()))?;

    print_pipeline_summary(&output);
    println!("Artifacts written to {:?}", store.dir());

    Ok(output)
}

fn print_pipeline_summary(output: &PipelineOutput) {
    let report = &output.report;

    println!();
    println!("{}", "Pipeline summary:".yellow().bold());
    println!("{}", "-".repeat(50));
    println!("{:<28} {:>10}", "Raw rows", report.ingested_rows);
    println!("{:<28} {:>10}", "Normalized lap records", report.normalized_records);
    println!("{:<28} {:>10}", "Dropped (missing fields)", report.dropped_rows);
    if let Some(threshold) = report.outlier_threshold {
        println!("{:<28} {:>9.3}s", "Outlier pace threshold", threshold);
    }
    println!("{:<28} {:>10}", "Candidate pairs", report.filter.candidates);
    println!("{:<28} {:>10}", "  outlier pairs", report.filter.outlier_pairs);
    println!("{:<28} {:>10}", "  no next lap", report.filter.missing_next);
    println!("{:<28} {:>10}", "  ambiguous", report.filter.ambiguous);
    println!("{:<28} {:>10}", "Labeled pairs", report.filter.kept);
    println!(
        "{:<28} {:>9.1}%",
        "Overtake rate",
        report.label_balance.positive_rate() * 100.0
    );
    println!(
        "{:<28} {:>4} / {:<4}",
        "Train (before balancing)", report.train_balance_before.negative, report.train_balance_before.positive
    );
    println!(
        "{:<28} {:>4} / {:<4}",
        "Train (after balancing)", report.train_balance_after.negative, report.train_balance_after.positive
    );
    println!(
        "{:<28} {:>4} / {:<4}",
        "Test", report.test_balance.negative, report.test_balance.positive
    );

    for warning in output.warnings() {
        println!("{} {}", "warning:".yellow().bold(), warning);
    }
    println!();
}

fn run_train(store: &ArtifactStore, metric: SelectionMetric) -> Result<()> {
    println!("{} (selection by {})", "Training models...".green(), metric);

    let table = store
        .load_table()
        .context("No training table, run `overtake build` first")?;
    println!(
        "Train: {} rows, Test: {} rows, {} features",
        table.x_train.nrows(),
        table.x_test.nrows(),
        table.feature_names.len()
    );

    let candidates = default_candidates();
    let pb = ProgressBar::new(candidates.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let trainer = ModelTrainer::new(metric);
    let outcome = trainer.train(&table, candidates, |result| {
        pb.set_message(result.name.clone());
        pb.inc(1);
    })?;
    pb.finish_and_clear();

    outcome.best.save(store.path(MODEL_FILE))?;
    store.save_json(MODEL_INFO_FILE, &outcome.info)?;
    store.save_json(TRAINING_REPORT_FILE, &outcome.report)?;

    println!();
    println!("{}", "Model comparison (test partition):".yellow().bold());
    println!(
        "{:<32} {:>8} {:>9} {:>7} {:>7} {:>7}",
        "Model", "Accuracy", "Precision", "Recall", "F1", "AUC"
    );
    println!("{}", "-".repeat(75));
    for (name, m) in &outcome.report.models {
        let line = format!(
            "{:<32} {:>8.3} {:>9.3} {:>7.3} {:>7.3} {:>7.3}",
            name, m.accuracy, m.precision, m.recall, m.f1, m.roc_auc
        );
        if *name == outcome.report.best_model {
            println!("{}", line.green().bold());
        } else {
            println!("{}", line);
        }
    }
    for (name, reason) in &outcome.report.failed {
        println!("{} {}: {}", "failed:".red(), name, reason);
    }

    let cm = &outcome.info.metrics.confusion;
    println!();
    println!("Best model: {}", outcome.best.name().green().bold());
    println!("Confusion matrix: tp {} fp {} fn {} tn {}", cm.tp, cm.fp, cm.fn_, cm.tn);
    println!("Saved to {:?}", store.path(MODEL_FILE));

    Ok(())
}

fn run_analyze(data: &Path, store: &ArtifactStore, config: PipelineConfig, threshold: f64) -> Result<()> {
    println!("{} {:?}", "Analyzing features from".green(), data);

    let laps = LapTable::load(data).with_context(|| format!("Failed to load laps from {:?}", data))?;
    let normalized = LapRecordNormalizer::normalize(&laps)?;
    let labeled = OvertakePipeline::new(config)?.label_pairs(&normalized.records)?;

    let matrix = CorrelationMatrix::from_pairs(&labeled.pairs);
    let mut frame = matrix.to_frame()?;
    store.write_frame(CORRELATION_FILE, &mut frame)?;

    println!();
    println!("{}", "Correlation with overtake label:".yellow().bold());
    println!("{}", "-".repeat(40));
    for (name, r) in matrix.label_correlations() {
        println!("{:<24} {:>+8.3}", name, r);
    }

    let redundant = matrix.redundant_pairs(threshold);
    println!();
    println!(
        "{}",
        format!("Redundant feature pairs (|r| > {}):", threshold)
            .yellow()
            .bold()
    );
    if redundant.is_empty() {
        println!("{}", "(none)".dimmed());
    }
    for pair in redundant {
        println!("{:<20} {:<20} {:>+8.3}", pair.first, pair.second, pair.r);
    }

    println!();
    println!("Correlation matrix written to {:?}", store.path(CORRELATION_FILE));
    Ok(())
}

/// Load the estimation context, printing the not-ready state instead of failing
fn load_context(store: &ArtifactStore) -> Result<Option<EstimationContext>> {
    match EstimationContext::load(store.dir()) {
        Ok(context) => Ok(Some(context)),
        Err(e) if e.is_not_ready() => {
            println!("{}", "Model not ready.".yellow().bold());
            println!("{}", e);
            println!("Run `overtake run --data <laps.csv>` first.");
            Ok(None)
        }
        Err(e) => Err(e).context("Failed to load model artifacts"),
    }
}

fn run_estimate(context: &EstimationContext, matchup: &Matchup) -> Result<()> {
    let query = matchup.to_query()?;
    let estimate = context.estimate(&query)?;
    print_estimate(&estimate, matchup.defense);
    Ok(())
}

fn print_estimate(estimate: &OvertakeEstimate, defense: bool) {
    let headline = if defense {
        "Chance of being overtaken"
    } else {
        "Overtake probability"
    };
    let value = format!("{:.1}%", estimate.probability);
    let band = estimate.band.label();

    println!();
    println!("{}", "Duel analysis:".yellow().bold());
    println!("{}", "-".repeat(40));
    println!("{:<24} {:>+8.3}s", "Pace delta", estimate.delta_pace);
    println!("{:<24} {:>+8}", "Tire age delta", estimate.delta_tire_age);
    println!("{:<24} {:>+8}", "Compound advantage", estimate.compound_advantage);
    println!();

    // In defense mode a high value is bad news
    let good = match estimate.band {
        ProbabilityBand::High => !defense,
        ProbabilityBand::Low => defense,
        ProbabilityBand::Uncertain => false,
    };
    let line = format!("{}: {} ({})", headline, value, band);
    if estimate.band == ProbabilityBand::Uncertain {
        println!("{}", line.yellow().bold());
    } else if good {
        println!("{}", line.green().bold());
    } else {
        println!("{}", line.red().bold());
    }
    if defense {
        println!("Chance of holding position: {:.1}%", 100.0 - estimate.probability);
    }
}

fn prompt_pace(theme: &ColorfulTheme, prompt: &str) -> Result<f64> {
    let raw: String = Input::with_theme(theme)
        .with_prompt(prompt)
        .validate_with(|s: &String| parse_pace_arg(s).map(|_| ()))
        .interact_text()?;
    parse_pace_arg(&raw).map_err(anyhow::Error::msg)
}

fn prompt_compound(theme: &ColorfulTheme, prompt: &str) -> Result<Compound> {
    let selection = Select::with_theme(theme)
        .with_prompt(prompt)
        .items(&COMPOUNDS[..])
        .default(1)
        .interact()?;
    Ok(Compound::parse(COMPOUNDS[selection]))
}

fn run_interactive(store: &ArtifactStore) -> Result<()> {
    println!("{}", "Interactive mode".green().bold());

    let Some(context) = load_context(store)? else {
        return Ok(());
    };
    println!("Model: {}\n", context.model_name());

    let theme = ColorfulTheme::default();

    loop {
        let options = vec!["Attack the car ahead", "Defend from the car behind", "Quit"];

        let selection = Select::with_theme(&theme)
            .with_prompt("What would you like to estimate?")
            .items(&options)
            .default(0)
            .interact()?;

        if selection == 2 {
            println!("Goodbye!");
            break;
        }
        let defense = selection == 1;
        let min_standing = if defense { 1 } else { 2 };

        let standing: u32 = Input::with_theme(&theme)
            .with_prompt("Your standing")
            .default(5)
            .validate_with(|s: &u32| {
                if *s >= min_standing {
                    Ok(())
                } else {
                    Err(format!("standing must be at least {}", min_standing))
                }
            })
            .interact_text()?;
        let pace = prompt_pace(&theme, "Your lap time (s or m:ss.fff)")?;
        let tire_age: u32 = Input::with_theme(&theme)
            .with_prompt("Laps on your tires")
            .default(10)
            .interact_text()?;
        let compound = prompt_compound(&theme, "Your compound")?;

        let opponent_pace = prompt_pace(&theme, "Opponent lap time (s or m:ss.fff)")?;
        let opponent_tire_age: u32 = Input::with_theme(&theme)
            .with_prompt("Laps on opponent tires")
            .default(10)
            .interact_text()?;
        let opponent_compound = prompt_compound(&theme, "Opponent compound")?;

        let matchup = Matchup {
            standing,
            pace,
            tire_age,
            compound,
            opponent_pace,
            opponent_tire_age,
            opponent_compound,
            defense,
        };

        if let Err(e) = run_estimate(&context, &matchup) {
            println!("{} {}", "error:".red().bold(), e);
        }
        println!();
    }

    Ok(())
}
