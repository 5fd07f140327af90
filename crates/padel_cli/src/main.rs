//! Padel CLI
//!
//! Annotation CSV → collapsed events → match report files

#[cfg(feature = "cli")]
use anyhow::{Context, Result};
#[cfg(feature = "cli")]
use clap::{Args, Parser, Subcommand};
#[cfg(feature = "cli")]
use padel_cli::IngestConfig;
#[cfg(feature = "cli")]
use padel_core::{collapse_events, reconcile_columns, validate_table, MatchPipeline};
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "padel")]
#[command(about = "Reconstruct padel match events and statistics from annotation CSVs", long_about = None)]
struct Cli {
    /// Debug-level logging (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Args)]
struct InputArgs {
    /// Input CSV file(s)
    #[arg(long = "input", short = 'i')]
    inputs: Vec<PathBuf>,

    /// YAML run configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Field delimiter (overrides the config)
    #[arg(long)]
    delimiter: Option<String>,

    /// Alias table YAML (overrides the config)
    #[arg(long)]
    aliases: Option<PathBuf>,

    /// Add a source file column when merging
    #[arg(long, default_value = "false")]
    source_column: bool,
}

#[cfg(feature = "cli")]
impl InputArgs {
    /// Config file (if any) with command-line overrides applied.
    fn resolve(&self) -> Result<IngestConfig> {
        let mut config = match &self.config {
            Some(path) => IngestConfig::load(path)?,
            None => IngestConfig::default(),
        };
        if !self.inputs.is_empty() {
            config.inputs = self.inputs.clone();
            config.raw_dir = None;
        }
        if let Some(d) = &self.delimiter {
            config.delimiter = d.clone();
        }
        if let Some(a) = &self.aliases {
            config.aliases = Some(a.clone());
        }
        config.add_source_column |= self.source_column;
        Ok(config)
    }
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Merge, reconcile and collapse annotation rows into one row per event
    Collapse {
        #[command(flatten)]
        input: InputArgs,

        /// Output CSV file path
        #[arg(long)]
        out: PathBuf,
    },

    /// Run the full pipeline and write every report file
    Process {
        #[command(flatten)]
        input: InputArgs,

        /// Output directory (overrides the config)
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Analyze only up to this many cumulative games
        #[arg(long)]
        games: Option<u32>,
    },

    /// Print the quality report of the collapsed events as JSON
    Validate {
        #[command(flatten)]
        input: InputArgs,
    },
}

#[cfg(feature = "cli")]
fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[cfg(feature = "cli")]
fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Collapse { input, out } => {
            let config = input.resolve()?;
            let files = config.input_files()?;
            println!("🔨 Collapsing annotation rows...");
            println!("   Inputs: {}", files.len());
            println!("   Output: {}", out.display());

            let raw = padel_cli::read_inputs(&files, &config)?;
            let aliases = padel_cli::load_aliases(config.aliases.as_deref())?;
            let reconciled = reconcile_columns(&raw, &aliases);
            let keys: Option<Vec<&str>> = config
                .pipeline
                .key_columns
                .as_ref()
                .map(|k| k.iter().map(String::as_str).collect());
            let mut events = collapse_events(&reconciled, keys.as_deref())
                .context("Failed to collapse events")?;
            if config.drop_empty_columns {
                events = events.drop_empty_columns();
            }
            padel_cli::write_csv(&events, &out, config.delimiter_byte()?)?;

            println!("\n✅ Collapsed {} rows into {} events", raw.len(), events.len());
        }

        Commands::Process {
            input,
            out_dir,
            games,
        } => {
            let mut config = input.resolve()?;
            if games.is_some() {
                config.pipeline.game_limit = games;
            }
            let out_dir = out_dir
                .or_else(|| config.out_dir.clone())
                .context("No output directory: pass --out-dir or set out_dir in the config")?;
            let files = config.input_files()?;
            println!("🔨 Processing match...");
            println!("   Inputs: {}", files.len());
            println!("   Output: {}", out_dir.display());
            if let Some(limit) = config.pipeline.game_limit {
                println!("   Games:  {}", limit);
            }

            let raw = padel_cli::read_inputs(&files, &config)?;
            let aliases = padel_cli::load_aliases(config.aliases.as_deref())?;
            let pipeline = MatchPipeline::new(aliases).with_options(config.pipeline.clone());
            let report = pipeline.run(&raw).context("Match pipeline failed")?;
            let quality = validate_table(&report.events, &config.quality)
                .context("Quality check failed")?;

            let manifest = padel_cli::write_match_outputs(
                &report,
                &quality,
                &out_dir,
                &files,
                config.delimiter_byte()?,
            )?;

            println!("\n✅ Match processed");
            println!("   Events:    {}", manifest.events);
            println!("   Scoreline: {}", manifest.scoreline);
            if let Some(cut) = &manifest.cut_scoreline {
                println!("   Cut at:    {}", cut);
            }
            for output in &manifest.outputs {
                println!("   📄 {} ({})", output.name, &output.checksum[..12]);
            }
            if !quality.is_clean() {
                println!("\n⚠️  Quality warnings, see quality_report.json");
            }
        }

        Commands::Validate { input } => {
            let config = input.resolve()?;
            let files = config.input_files()?;
            let raw = padel_cli::read_inputs(&files, &config)?;
            let aliases = padel_cli::load_aliases(config.aliases.as_deref())?;
            let pipeline = MatchPipeline::new(aliases).with_options(config.pipeline.clone());
            let events = pipeline.prepare(&raw).context("Failed to prepare events")?;
            let report = validate_table(&events, &config.quality)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("padel CLI is not available. Enable the 'cli' feature to use it.");
    std::process::exit(1);
}
