mod app;
mod config;
mod net;
mod util;

use anyhow::{Context, anyhow};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use config::Config;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Base URL of the hub service.
    #[arg(long, env = "HUBSCOPE_API", default_value = "http://localhost:8000")]
    api_endpoint: String,

    /// Log filter, e.g. `info` or `hubscope=debug`.
    #[arg(long, env = "HUBSCOPE_LOG", default_value = "info")]
    log_level: String,

    /// Skip the live update and detail streams.
    #[arg(long, env = "HUBSCOPE_NO_STREAM")]
    no_stream: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::from_args(&args)?;

    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(true).compact().init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        endpoint = %config.endpoint,
        live_updates = config.live_updates,
        "hubscope starting"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("hubscope-net")
        .build()
        .context("failed to start the network runtime")?;
    let handle = runtime.handle().clone();

    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default().with_inner_size([1440.0, 920.0]),
        ..Default::default()
    };

    eframe::run_native(
        "hubscope",
        options,
        Box::new(move |cc| Ok(Box::new(app::HubScopeApp::new(cc, config, handle)))),
    )
    .map_err(|error| anyhow!("viewer exited with an error: {error}"))?;

    runtime.shutdown_background();
    Ok(())
}
