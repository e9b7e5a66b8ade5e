// SPDX-License-Identifier: GPL-3.0-or-later
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::serve;
use clap::{Parser, Subcommand};
use messybrainz_api::router;
use messybrainz_application::AppState;
use messybrainz_config::{load as load_config, HttpConfig, TelemetryConfig};
use messybrainz_domain::{RawRecord, RecordingId};
use messybrainz_infrastructure::init_database;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Listen submission and recording identity service
#[derive(Parser, Debug)]
#[command(name = "messybrainz")]
#[command(version)]
struct Cli {
    /// TOML configuration file; MESSYBRAINZ_* environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Declare two recordings to be the same
    Merge { a: RecordingId, b: RecordingId },
    /// Show every id known to be the same recording as ID
    Aka { id: RecordingId },
    /// Resolve one record to its recording id, creating it if needed
    Resolve {
        #[arg(long)]
        artist: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        release: Option<String>,
        #[arg(long)]
        recording_mbid: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.telemetry);

    let pool = init_database(&config).await?;
    let state = AppState::from_pool(config.clone(), pool);
    state.on_start();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(state, &config.http).await,
        Command::Merge { a, b } => {
            let outcome = state.merge(a, b).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Command::Aka { id } => {
            let cluster = state.cluster_of(id).await?;
            println!("root: {}", cluster.root);
            for other in cluster.others(id) {
                println!("{other}");
            }
            Ok(())
        }
        Command::Resolve {
            artist,
            title,
            release,
            recording_mbid,
        } => {
            let record = RawRecord {
                release,
                recording_mbid,
                ..RawRecord::new(artist, title)
            };
            let resolution = state.resolve(&record).await?;
            let status = if resolution.created { "created" } else { "existing" };
            println!("{} ({status})", resolution.recording.id);
            Ok(())
        }
    }
}

async fn run_server(state: AppState, http: &HttpConfig) -> Result<()> {
    let listener = TcpListener::bind(bind_addr(http)?).await?;
    let addr = listener.local_addr()?;
    info!(target: "cli", "listening on {}", addr);

    serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

fn init_tracing(telemetry: &TelemetryConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&telemetry.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if telemetry.json {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_names(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_names(true).with_level(true))
            .init();
    }
}

fn bind_addr(http: &HttpConfig) -> Result<SocketAddr> {
    let addr = format!("{}:{}", http.host, http.port);
    addr.parse()
        .with_context(|| format!("invalid listen address {addr}"))
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (Ok(mut interrupt), Ok(mut terminate)) =
            (signal(SignalKind::interrupt()), signal(SignalKind::terminate()))
        else {
            tracing::warn!(target: "cli", "could not install signal handlers, falling back to ctrl-c");
            let _ = tokio::signal::ctrl_c().await;
            return;
        };

        tokio::select! {
            _ = interrupt.recv() => {},
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!(target: "cli", "shutdown signal received");
}
