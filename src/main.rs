pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod kml;
pub mod pipeline;
pub mod projection;
pub mod render;
pub mod server;
pub mod types;
pub mod viewport;

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use config::AppConfig;
use data::{HttpFetcher, Source};
use std::fs;
use std::path::PathBuf;
use tracing::info;
use types::ParsedDocument;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct InputArgs {
    /// Optional TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// KML/KMZ path, URL or Google My Maps link (overrides `input.source`)
    #[arg(short, long, value_name = "PATH|URL")]
    input: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one SVG per folder and write them as a ZIP archive
    Export {
        #[command(flatten)]
        input: InputArgs,
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
        #[arg(long, allow_hyphen_values = true)]
        zoom: Option<i32>,
        #[arg(long, allow_hyphen_values = true)]
        pan_lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        pan_lon: Option<f64>,
        /// Folder to include; repeat for several (default: all)
        #[arg(long = "folder", value_name = "NAME")]
        folders: Vec<String>,
    },
    /// List folders, point counts and bounds
    Inspect {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Serve a live preview of the layers
    Serve {
        #[command(flatten)]
        input: InputArgs,
    },
}

fn load_config(args: &InputArgs) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load_or_default(args.config.as_deref())?;
    if let Some(input) = &args.input {
        config.input.source = Some(input.clone());
    }
    Ok(config)
}

async fn load_document(config: &AppConfig) -> anyhow::Result<ParsedDocument> {
    let reference = config
        .input
        .source
        .clone()
        .ok_or_else(|| anyhow!("No input given; pass --input or set input.source"))?;
    let options = config.parser.clone();

    // reqwest's blocking client must stay off the async runtime threads.
    let document = tokio::task::spawn_blocking(move || -> error::Result<ParsedDocument> {
        let fetcher = HttpFetcher::new()?;
        data::load_document(&Source::parse(&reference), &fetcher, &options)
    })
    .await?
    .context("Failed to load document")?;
    Ok(document)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Export {
            input,
            output,
            zoom,
            pan_lat,
            pan_lon,
            folders,
        } => {
            let mut app_config = load_config(&input)?;
            if let Some(zoom) = zoom {
                app_config.view.zoom = zoom;
            }
            if pan_lat.is_some() {
                app_config.view.pan_lat = pan_lat;
            }
            if pan_lon.is_some() {
                app_config.view.pan_lon = pan_lon;
            }
            if !folders.is_empty() {
                app_config.view.selected_folders = Some(folders);
            }
            let output = output.unwrap_or_else(|| app_config.output.archive.clone());

            let document = load_document(&app_config).await?;
            let archive = pipeline::export_archive(&document, &app_config.request())
                .context("Conversion failed")?;

            fs::write(&output, &archive)
                .with_context(|| format!("Failed to write archive: {:?}", output))?;
            info!("Wrote {:?}", output);
        }
        Commands::Inspect { input } => {
            let app_config = load_config(&input)?;
            let document = load_document(&app_config).await?;
            let bounds = document.bounds();

            println!(
                "Bounds: lon [{}, {}], lat [{}, {}]",
                bounds.min_lon, bounds.max_lon, bounds.min_lat, bounds.max_lat
            );
            for folder in document.folders() {
                println!("{:>6}  {}", folder.points.len(), folder.name);
            }
        }
        Commands::Serve { input } => {
            let app_config = load_config(&input)?;
            let document = load_document(&app_config).await?;
            server::start_server(app_config, document).await?;
        }
    }

    Ok(())
}
