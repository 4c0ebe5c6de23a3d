pub mod colors;
pub mod config;
pub mod data;
pub mod error;
pub mod processing;
pub mod render;
pub mod types;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::AppConfig;
use data::TableColumns;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the choropleth map to <FILENAME>-plot.png
    Render {
        /// Dataset name; also the value table unless --table is given
        filename: String,
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Value table to read instead of FILENAME
        #[arg(short, long, value_name = "FILE")]
        table: Option<PathBuf>,
    },
    /// Resolve region codes against the configured vintages without drawing
    Check {
        filename: String,
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        #[arg(short, long, value_name = "FILE")]
        table: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Render { filename, config, table } => {
            let app_config = load_config(config.as_deref())?;
            let records = load_table(&app_config, filename, table.as_deref())?;

            let summary = render::render_map(&records, filename, &app_config)?;
            info!("Map written to {:?}", summary.output);
        }
        Commands::Check { filename, config, table } => {
            let app_config = load_config(config.as_deref())?;
            let records = load_table(&app_config, filename, table.as_deref())?;
            let layers = render::MapLayers::load(&app_config.geometry)?;
            let scale = colors::ColorScale::new(&app_config.style.boundaries)?;

            let plan = processing::plan_fills(&records, &layers.chain, &scale);
            for (label, count) in plan.filled_per_vintage(&layers.chain) {
                info!("{} regions resolved from vintage {}", count, label);
            }
            info!("{} records without data", plan.skipped_no_data);
            for code in &plan.unmatched {
                info!("Unmatched region code: {}", code);
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => {
            info!("Using config: {:?}", path);
            AppConfig::load_from_file(path)
        }
        None => Ok(AppConfig::default()),
    }
}

/// `--table`, then `input.value_table`, then the dataset name itself.
fn table_path(config: &AppConfig, filename: &str, table: Option<&Path>) -> PathBuf {
    table
        .map(Path::to_path_buf)
        .or_else(|| config.input.value_table.clone())
        .unwrap_or_else(|| PathBuf::from(filename))
}

fn load_table(config: &AppConfig, filename: &str, table: Option<&Path>) -> Result<Vec<types::ValueRecord>> {
    data::load_values(&table_path(config, filename, table), &TableColumns::from(&config.input))
}
