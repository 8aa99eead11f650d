pub mod types;
pub mod config;
pub mod data;
pub mod projection;
pub mod store;
pub mod join;
pub mod render;
pub mod table;
pub mod state;
pub mod html;
pub mod server;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::fs;
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
    /// Serve the interactive dashboard
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Write the district geometry reprojected to lon/lat as GeoJSON
    Reproject {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },
    /// Fetch the sheet once and list which districts join
    Report {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

/// Geometry as served: loaded once and converted to lon/lat.
fn load_reprojected(app_config: &config::AppConfig) -> anyhow::Result<types::FeatureCollection> {
    let mut geometry = data::load_geometry(&app_config.input)?;
    projection::reproject_collection(&mut geometry, projection::Utm::from(&app_config.projection));
    Ok(geometry)
}

fn write_geojson(path: &Path, collection: &types::FeatureCollection, property: &str) -> anyhow::Result<()> {
    let geojson = geojson::GeoJson::FeatureCollection(collection.to_geojson(property));
    fs::write(path, geojson.to_string())
        .with_context(|| format!("Failed to write {:?}", path))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve { config } => {
            let app_config = config::AppConfig::load_or_default(config)?;
            let geometry = load_reprojected(&app_config)?;
            server::start_server(app_config, geometry).await?;
        }
        Commands::Reproject { config, output } => {
            let app_config = config::AppConfig::load_or_default(config)?;
            let geometry = load_reprojected(&app_config)?;
            write_geojson(output, &geometry, &app_config.input.join_column_shape)?;
            info!("Wrote {} districts to {:?}", geometry.len(), output);
        }
        Commands::Report { config } => {
            let app_config = config::AppConfig::load_or_default(config)?;
            let geometry = data::load_geometry(&app_config.input)?;

            let client = data::http_client(app_config.server.fetch_timeout_secs)?;
            let text = data::fetch_csv(&client, &app_config.input.sheet_csv_url).await?;
            let rows = data::parse_csv(&text, &app_config.input.join_column_csv)?;

            let report = join::JoinReport::build(&geometry, &rows);
            println!("Matched ({}): {}", report.matched.len(), report.matched.join(", "));
            println!("Geometry only ({}): {}", report.geometry_only.len(), report.geometry_only.join(", "));
            println!("Sheet only ({}): {}", report.table_only.len(), report.table_only.join(", "));
        }
    }

    Ok(())
}
