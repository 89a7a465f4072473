use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use floodwise_common::{LatLng, NetworkType};
use floodwise_route::config::{Config, NetworkSourceKind};
use floodwise_route::provider::FileSource;
use floodwise_route::server::{build_router, run_server, ServerOptions};
use floodwise_route::service::EvacuationRequest;
use floodwise_route::store::GraphStore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "floodwise-route")]
#[command(about = "Evacuation routes that avoid flooded roads", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API with OpenAPI docs
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Address to bind
        #[arg(long)]
        bind: Option<String>,
        /// Place to load before accepting requests
        #[arg(long)]
        default_place: Option<String>,
        /// Read saved graphs from this directory instead of the OSM APIs
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Compute one evacuation plan and print it as JSON
    Route {
        #[arg(long)]
        place: String,
        /// Origin (lat,lng)
        #[arg(long, allow_hyphen_values = true)]
        from: LatLng,
        /// Destination (lat,lng)
        #[arg(long, allow_hyphen_values = true)]
        to: LatLng,
        #[arg(long, default_value_t = 0.0)]
        water_level: f64,
        #[arg(long)]
        rain: Option<f64>,
        #[arg(long)]
        river_discharge: Option<f64>,
        #[arg(long, default_value = "drive")]
        network_type: NetworkType,
    },
    /// Download a road network with elevations and save it for offline use
    Fetch {
        #[arg(long)]
        place: String,
        #[arg(long, default_value = "drive")]
        network_type: NetworkType,
        /// Output file (defaults to the data directory naming scheme)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("floodwise_route=info,tower_http=info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve {
            port,
            bind,
            default_place,
            data_dir,
        } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if default_place.is_some() {
                config.server.default_place = default_place;
            }
            if let Some(dir) = data_dir {
                config.network.source = NetworkSourceKind::File;
                config.network.data_dir = dir;
            }

            let service = Arc::new(config.build_service()?);
            if let Some(place) = &config.server.default_place {
                let network_type = config.server.default_network_type;
                let start = Instant::now();
                match service.store().preload(place, network_type).await {
                    Ok(()) => tracing::info!(place = %place, elapsed_ms = start.elapsed().as_millis() as u64, "default place ready"),
                    Err(e) => tracing::warn!(place = %place, error = %e, "could not preload default place"),
                }
            }

            let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
                .parse()
                .context("Invalid bind address")?;
            let options = ServerOptions {
                request_timeout: Duration::from_secs(config.server.request_timeout_secs),
                cors_origins: config.server.cors_origins.clone(),
            };
            run_server(build_router(service, &options), addr).await?;
        }

        Commands::Route {
            place,
            from,
            to,
            water_level,
            rain,
            river_discharge,
            network_type,
        } => {
            let service = config.build_service()?;
            let request = EvacuationRequest {
                place,
                network_type,
                origin: from,
                destination: to,
                water_level,
                rain,
                river_discharge,
            };

            let plan = service.evacuate(&request, &CancellationToken::new()).await?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }

        Commands::Fetch {
            place,
            network_type,
            out,
        } => {
            let store = GraphStore::new(
                config.network_source()?,
                config.elevation_source()?,
                config.cache.clone(),
            );
            let start = Instant::now();
            let graph = store.get(&place, network_type).await?;

            let out = out.unwrap_or_else(|| FileSource::new(&config.network.data_dir).graph_path(&place, network_type));
            if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            graph.save(&out)?;

            tracing::info!(
                path = %out.display(),
                nodes = graph.node_count(),
                edges = graph.edge_count(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "saved road network"
            );
        }
    }

    Ok(())
}
