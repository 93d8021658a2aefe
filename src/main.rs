//! kgd CLI: schema extraction and instance sampling for triple dumps.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::Result;

use kg_distill::config::{CapBoundary, Feature, PipelineConfig};
use kg_distill::pipeline::{Pipeline, StageReport};

const DEFAULT_CONFIG: &str = "kgd.toml";

#[derive(Parser)]
#[command(
    name = "kgd",
    version,
    about = "Distill triple dumps into a schema graph and a sampled instance graph"
)]
struct Cli {
    /// Pipeline configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Override `sampling.instance_cap`.
    #[arg(long, global = true)]
    cap: Option<usize>,

    /// Override `sampling.boundary` (`truncate` or `atomic`).
    #[arg(long, global = true)]
    boundary: Option<CapBoundary>,

    /// Turn a feature on (repeatable).
    #[arg(long, global = true, value_name = "FEATURE")]
    enable: Vec<Feature>,

    /// Turn a feature off (repeatable).
    #[arg(long, global = true, value_name = "FEATURE")]
    disable: Vec<Feature>,

    /// Override `output.out_dir`.
    #[arg(long, global = true)]
    out_dir: Option<PathBuf>,

    /// Override `output.dump_dir`.
    #[arg(long, global = true)]
    dump_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Build the type dictionary, schema graph and predicate statistics.
    Schema,

    /// Sample instances and restrict the type dictionary to them.
    Sample,

    /// Assign ids and write the CSV tables.
    Export,

    /// Run every stage.
    Run,

    /// List the feature switches and their resolved state.
    Features,

    /// Show which checkpoints exist and whether they are current.
    Status,
}

impl Cli {
    /// The config file if it exists, defaults otherwise, then CLI overrides.
    fn resolve_config(&self) -> Result<PipelineConfig> {
        let mut config = if self.config.is_file() {
            PipelineConfig::load(&self.config)?
        } else {
            tracing::info!(
                path = %self.config.display(),
                "config file not found; using defaults"
            );
            PipelineConfig::default()
        };

        if let Some(cap) = self.cap {
            config.sampling.instance_cap = cap;
        }
        if let Some(boundary) = self.boundary {
            config.sampling.boundary = boundary;
        }
        for &feature in &self.enable {
            config.features.set(feature, true);
        }
        for &feature in &self.disable {
            config.features.set(feature, false);
        }
        if let Some(dir) = &self.out_dir {
            config.output.out_dir = dir.clone();
        }
        if let Some(dir) = &self.dump_dir {
            config.output.dump_dir = dir.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

fn print_reports(reports: &[StageReport]) {
    for report in reports {
        println!("  {report}");
    }
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        miette::bail!(
            help = "Pass --force to overwrite it.",
            "{} already exists",
            path.display()
        );
    }
    PipelineConfig::default().save(path)?;
    println!("Wrote default configuration to {}", path.display());
    println!("Fill in [sources] before running `kgd run`.");
    Ok(())
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Init { force } = cli.command {
        return init(&cli.config, force);
    }

    let config = cli.resolve_config()?;

    match cli.command {
        Commands::Init { .. } => {}

        Commands::Features => {
            println!("Features:");
            for feature in Feature::ALL {
                let state = if config.features.enabled(feature) {
                    "on"
                } else {
                    "off"
                };
                println!("  {:<24} {state}", feature.name());
            }
        }

        Commands::Status => {
            let pipeline = Pipeline::new(config)?;
            println!("Checkpoints:");
            for status in pipeline.status() {
                println!(
                    "  {:<22} {:<22} {}",
                    status.artifact.name(),
                    status.state.to_string(),
                    status.path.display()
                );
            }
        }

        Commands::Schema => {
            let mut pipeline = Pipeline::new(config)?;
            let reports = pipeline.run_schema()?;
            println!("Schema:");
            print_reports(&reports);
        }

        Commands::Sample => {
            let mut pipeline = Pipeline::new(config)?;
            let reports = pipeline.run_instances()?;
            println!("Sample:");
            print_reports(&reports);
        }

        Commands::Export => {
            let mut pipeline = Pipeline::new(config)?;
            let reports = pipeline.run_exports()?;
            println!("Export:");
            print_reports(&reports);
            println!("Tables written to {}", pipeline.layout().out_dir.display());
        }

        Commands::Run => {
            let mut pipeline = Pipeline::new(config)?;
            let reports = pipeline.run()?;
            println!("Pipeline:");
            print_reports(&reports);
            println!("Tables written to {}", pipeline.layout().out_dir.display());
        }
    }

    Ok(())
}
