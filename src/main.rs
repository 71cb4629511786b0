use clap::{Parser, Subcommand};
use hls_shim::{
    artifact::FsArtifactStore,
    batch::RewriteBatch,
    config::{Config, Overrides, parse_max_segments},
    error::ShimError,
    fetch::HttpFetcher,
    metrics, server,
    server::state::AppState,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hls-shim")]
#[command(version, about = "Rewrite HLS playlists to indirection artifacts and relay them back")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a media playlist and publish artifacts plus the rewritten playlist
    Rewrite {
        /// Source playlist URL (overrides SOURCE_URL)
        #[arg(long)]
        source: Option<String>,

        /// Output directory (overrides OUTPUT_DIR)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Maximum number of segments (overrides MAX_SEGMENTS)
        #[arg(long, value_parser = parse_limit)]
        limit: Option<usize>,
    },

    /// Run the playback relay
    Serve {
        /// Port to listen on (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

fn parse_limit(raw: &str) -> Result<usize, String> {
    parse_max_segments(raw).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let overrides = match &cli.command {
        Commands::Rewrite { source, out, limit } => Overrides {
            source_url: source.clone(),
            output_dir: out.clone(),
            max_segments: *limit,
            ..Default::default()
        },
        Commands::Serve { port } => Overrides {
            port: *port,
            ..Default::default()
        },
    };

    let config = match Config::from_env_with(overrides) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    info!("Running in {} mode", if config.is_dev { "DEV" } else { "PROD" });

    let result = match cli.command {
        Commands::Rewrite { .. } => rewrite(config).await,
        Commands::Serve { .. } => serve(config).await,
    };

    if let Err(e) = result {
        error!(kind = e.kind(), "{}", e);
        std::process::exit(1);
    }
}

async fn rewrite(config: Config) -> Result<(), ShimError> {
    let source_url = config.require_source_url()?.to_string();
    let fetcher = Arc::new(HttpFetcher::new(config.fetch_config())?);
    let store = Arc::new(FsArtifactStore::new(config.output_dir.clone()));

    let batch = RewriteBatch::new(fetcher, store, config.rewrite_options());
    let summary = batch.run(&source_url).await?;

    info!(
        "Done: {} of {} segments published, playlist at {}",
        summary.segments_selected,
        summary.segments_total,
        config.output_dir.join(&summary.playlist_path).display()
    );
    Ok(())
}

async fn serve(config: Config) -> Result<(), ShimError> {
    let port = config.require_port()?;
    let state = AppState::from_config(config)?.with_metrics(metrics::install_recorder());

    info!("Resolving /play requests against {}", state.distribution_base);

    server::start(state, port).await
}
