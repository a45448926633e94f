//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use supramol_core::example::populate_example;
use supramol_core::import::{ExperimentRecord, import_experiment, read_json};
use supramol_core::ingest::{IngestOutcome, IngestReport, ProgressReporter, ingest_paths};
use supramol_core::pipeline::{AnalyseConfig, analyse_ms, predict_for_assembly};
use supramol_shared::{
    LoggerSettings, ReagentKind, ReagentRole, Settings, SupramolError, init_settings,
    load_settings, load_settings_from, settings_dir,
};
use supramol_storage::Storage;

/// Timestamp format of log lines.
const LOG_TIME_FORMAT: &str = "%d-%b-%y %H:%M:%S";

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Supramolecular Explorer: experiment results database for SAMOSA.
#[derive(Parser)]
#[command(
    name = "supramol-explorer",
    version,
    about = "Experiment results database: reagents, spectra and MS evidence for assemblies.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Settings file to use instead of the lookup in the working directory.
    #[arg(long, global = true, env = "SUPRAMOL_SETTINGS")]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Create the database and the raw data store.
    Init,

    /// Show where data lives and how many rows each table holds.
    Status,

    /// Fill the database with the example experiments.
    SeedExample,

    /// List reagents.
    Reagents {
        /// Only reagents of this role: amine, carbonyl or metal.
        #[arg(long)]
        role: Option<ReagentRole>,
    },

    /// List experiments with their reagents.
    Experiments,

    /// Copy raw data files into the store under UUID names.
    Ingest {
        /// Files named {NMR|LCMS}_SAMOSA_EXP{n}_B{n}_YYYY_MM_DD.ext
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Link the files to this experiment id.
        #[arg(long)]
        experiment: Option<i64>,
    },

    /// Import an experiment from a JSON document.
    Import {
        /// JSON file holding one experiment record.
        path: PathBuf,
    },

    /// Predict and store the m/z values of an assembly.
    Predict {
        /// Assembly id.
        #[arg(long)]
        assembly: i64,

        /// Lowest charge state (defaults to ms.min_charge).
        #[arg(long)]
        min_charge: Option<i64>,
    },

    /// Match a processed MS spectrum against the assemblies of its experiment.
    Analyse {
        /// Processed MS data id.
        #[arg(long)]
        ms_data: i64,

        /// MS decision parameter set id.
        #[arg(long)]
        decision_params: i64,

        /// Absolute m/z tolerance (defaults to ms.mz_tolerance).
        #[arg(long)]
        tolerance: Option<f64>,

        /// Lowest charge state for assemblies not yet predicted
        /// (defaults to ms.min_charge).
        #[arg(long)]
        min_charge: Option<i64>,
    },

    /// Settings management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a settings.toml with defaults.
    Init {
        /// Write to ~/.supramol instead of the working directory.
        #[arg(long)]
        user: bool,
    },
    /// Show resolved settings.
    Show,
}

// ---------------------------------------------------------------------------
// Settings and tracing setup
// ---------------------------------------------------------------------------

/// Resolve settings for commands that need them; `config init` does not.
pub(crate) fn resolve_settings(cli: &Cli) -> Result<Option<(Settings, PathBuf)>> {
    if matches!(
        cli.command,
        Command::Config {
            action: ConfigAction::Init { .. }
        }
    ) {
        return Ok(None);
    }
    let resolved = match &cli.settings {
        Some(path) => (load_settings_from(path)?, path.clone()),
        None => load_settings()?,
    };
    Ok(Some(resolved))
}

/// Initialize tracing from CLI flags and the `[logger]` section.
pub(crate) fn init_tracing(cli: &Cli, logger: &LoggerSettings) -> Result<()> {
    use tracing_subscriber::fmt::time::ChronoLocal;
    use tracing_subscriber::fmt::writer::BoxMakeWriter;
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => match logger.level.to_ascii_lowercase().as_str() {
            "warning" => "warn".to_string(),
            other => other.to_string(),
        },
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("supramol={level}")));

    let (writer, ansi) = match &logger.path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .wrap_err_with(|| format!("cannot create {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .wrap_err_with(|| format!("cannot open log file {}", path.display()))?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };
    let timer = ChronoLocal::new(LOG_TIME_FORMAT.to_string());

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_timer(timer)
                .with_ansi(ansi)
                .with_writer(writer)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_timer(timer)
                .with_writer(writer)
                .init();
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli, settings: Option<(Settings, PathBuf)>) -> Result<()> {
    if let Command::Config {
        action: ConfigAction::Init { user },
    } = cli.command
    {
        return cmd_config_init(user);
    }
    let (settings, settings_path) = settings.ok_or_else(|| eyre!("settings were not loaded"))?;

    match cli.command {
        Command::Init => cmd_init(&settings).await,
        Command::Status => cmd_status(&settings, &settings_path).await,
        Command::SeedExample => cmd_seed_example(&settings).await,
        Command::Reagents { role } => cmd_reagents(&settings, role).await,
        Command::Experiments => cmd_experiments(&settings).await,
        Command::Ingest { paths, experiment } => cmd_ingest(&settings, &paths, experiment).await,
        Command::Import { path } => cmd_import(&settings, &path).await,
        Command::Predict {
            assembly,
            min_charge,
        } => cmd_predict(&settings, assembly, min_charge).await,
        Command::Analyse {
            ms_data,
            decision_params,
            tolerance,
            min_charge,
        } => cmd_analyse(&settings, ms_data, decision_params, tolerance, min_charge).await,
        Command::Config { action } => match action {
            ConfigAction::Init { user } => cmd_config_init(user),
            ConfigAction::Show => cmd_config_show(&settings, &settings_path),
        },
    }
}

/// Open the database read-only, pointing at `init` when it does not exist.
async fn open_readonly(settings: &Settings) -> Result<Storage> {
    let path = &settings.paths.database;
    if !path.exists() {
        return Err(eyre!(
            "no database at {}; run `supramol-explorer init` first",
            path.display()
        ));
    }
    Ok(Storage::open_readonly(path).await?)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_init(settings: &Settings) -> Result<()> {
    let storage = Storage::open(&settings.paths.database).await?;
    let raw = &settings.paths.raw_data;
    std::fs::create_dir_all(raw).map_err(|e| SupramolError::io(raw, e))?;

    info!(database = %settings.paths.database.display(), "database ready");
    println!();
    println!("  Database:  {}", settings.paths.database.display());
    println!("  Schema:    v{}", storage.schema_version().await);
    println!("  Raw data:  {}", raw.display());
    println!();
    Ok(())
}

async fn cmd_status(settings: &Settings, settings_path: &Path) -> Result<()> {
    let storage = open_readonly(settings).await?;
    let counts = storage.table_counts().await?;

    println!();
    println!("  Settings:  {}", settings_path.display());
    println!("  Database:  {}", settings.paths.database.display());
    println!("  Schema:    v{}", storage.schema_version().await);
    println!("  Raw data:  {}", settings.paths.raw_data.display());
    println!();
    for (table, count) in counts {
        println!("  {table:<24} {count:>8}");
    }
    println!();
    Ok(())
}

async fn cmd_seed_example(settings: &Settings) -> Result<()> {
    let storage = Storage::open(&settings.paths.database).await?;
    let report = populate_example(&storage).await?;

    println!();
    for batch in &report.committed {
        println!("  committed  {batch}");
    }
    for batch in &report.skipped {
        println!("  skipped    {batch}");
    }
    println!();
    Ok(())
}

async fn cmd_reagents(settings: &Settings, role: Option<ReagentRole>) -> Result<()> {
    let storage = open_readonly(settings).await?;
    let reagents = storage.list_reagents(role).await?;

    println!("{:>5}  {:<9} {:<12} {:>10}  NAME", "ID", "ROLE", "CAS", "MASS");
    for reagent in &reagents {
        let detail = match &reagent.kind {
            ReagentKind::Metal {
                num_cations,
                num_anions,
                ..
            } => format!(" ({num_cations} cation : {num_anions} anion)"),
            ReagentKind::Amine { .. } | ReagentKind::Carbonyl { .. } => String::new(),
        };
        println!(
            "{:>5}  {:<9} {:<12} {:>10.4}  {}{detail}",
            reagent.id,
            reagent.role().as_str(),
            reagent.cas_number.as_deref().unwrap_or("-"),
            reagent.exact_mass,
            reagent.name,
        );
    }
    Ok(())
}

async fn cmd_experiments(settings: &Settings) -> Result<()> {
    let storage = open_readonly(settings).await?;
    let experiments = storage.list_experiments().await?;

    println!(
        "{:>5}  {:<19} {:<14} {:>7} {:>6}  REAGENTS",
        "ID", "DATE", "SOLVENT", "T (K)", "TIME"
    );
    for summary in &experiments {
        let e = &summary.experiment;
        println!(
            "{:>5}  {:<19} {:<14} {:>7.1} {:>5}h  {} + {} + {}",
            e.id,
            e.date.format("%Y-%m-%d %H:%M:%S"),
            e.solvent,
            e.temperature,
            e.time.num_hours(),
            summary.metal,
            summary.amine,
            summary.carbonyl,
        );
    }
    Ok(())
}

async fn cmd_ingest(
    settings: &Settings,
    paths: &[PathBuf],
    experiment: Option<i64>,
) -> Result<()> {
    let storage = Storage::open(&settings.paths.database).await?;
    let reporter = CliProgress::new();

    let report = ingest_paths(
        &storage,
        &settings.paths.raw_data,
        paths,
        experiment,
        &reporter,
    )
    .await;

    println!();
    for file in &report.ingested {
        println!("  stored     {} -> {}", file.original_name, file.stored_path);
    }
    for file in &report.duplicates {
        println!("  duplicate  {} (as {})", file.original_name, file.uuid);
    }
    for (path, error) in &report.failed {
        println!("  failed     {}: {error}", path.display());
    }
    println!();

    if report.failed.is_empty() {
        Ok(())
    } else {
        Err(eyre!("{} file(s) could not be ingested", report.failed.len()))
    }
}

async fn cmd_import(settings: &Settings, path: &Path) -> Result<()> {
    let record: ExperimentRecord = read_json(path)?;
    let storage = Storage::open(&settings.paths.database).await?;
    let summary = import_experiment(&storage, &record).await?;

    println!();
    println!("  Experiment:  {}", summary.experiment_id);
    println!(
        "  Reagents:    metal {}, amine {}, carbonyl {} ({} reused)",
        summary.metal_id, summary.amine_id, summary.carbonyl_id, summary.reused_reagents
    );
    println!("  Assemblies:  {:?}", summary.assembly_ids);
    println!();
    Ok(())
}

async fn cmd_predict(settings: &Settings, assembly: i64, min_charge: Option<i64>) -> Result<()> {
    let storage = Storage::open(&settings.paths.database).await?;
    let min_charge = min_charge.unwrap_or(settings.ms.min_charge);
    let predicted = predict_for_assembly(&storage, assembly, min_charge).await?;

    println!("{:>5}  {:>7} {:>8} {:>12} {:>10}", "ID", "ANIONS", "CHARGE", "MASS", "M/Z");
    for p in &predicted {
        println!(
            "{:>5}  {:>7} {:>8} {:>12.4} {:>10.4}",
            p.id, p.n_anions, p.charge, p.exact_mass, p.mz_value
        );
    }
    Ok(())
}

async fn cmd_analyse(
    settings: &Settings,
    ms_data: i64,
    decision_params: i64,
    tolerance: Option<f64>,
    min_charge: Option<i64>,
) -> Result<()> {
    let storage = Storage::open(&settings.paths.database).await?;
    let config = AnalyseConfig {
        ms_data_id: ms_data,
        ms_decision_params_id: decision_params,
        atol: tolerance.unwrap_or(settings.ms.mz_tolerance),
        min_charge: min_charge.unwrap_or(settings.ms.min_charge),
    };
    let verdicts = analyse_ms(&storage, &config).await?;

    println!("{:>8}  {:>7} {:>10}  CONFIDENCE", "ASSEMBLY", "MATCHES", "SUPPORTING");
    for v in &verdicts {
        println!(
            "{:>8}  {:>7} {:>10}  {}",
            v.assembly_id, v.matches, v.supporting, v.confidence
        );
    }
    Ok(())
}

fn cmd_config_init(user: bool) -> Result<()> {
    let dir = if user {
        settings_dir()?
    } else {
        std::env::current_dir().wrap_err("cannot determine working directory")?
    };
    let path = init_settings(&dir)?;
    println!("Settings initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(settings: &Settings, settings_path: &Path) -> Result<()> {
    println!("# {}", settings_path.display());
    println!("{}", toml::to_string_pretty(settings)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            let ticks = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
            spinner.set_style(style.tick_strings(&ticks));
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn file_started(&self, path: &Path, current: usize, total: usize) {
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        self.spinner
            .set_message(format!("Ingesting [{current}/{total}] {name}"));
    }

    fn file_ingested(&self, outcome: &IngestOutcome) {
        if outcome.duplicate {
            self.spinner
                .set_message(format!("Already stored {}", outcome.file.original_name));
        }
    }

    fn file_failed(&self, path: &Path, error: &SupramolError) {
        self.spinner
            .println(format!("  {}: {error}", path.display()));
    }

    fn done(&self, _report: &IngestReport) {
        self.spinner.finish_and_clear();
    }
}
