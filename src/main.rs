use crate::state::{ControllerContext, ScanReport};
use std::env;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod config;
mod controller;
mod helm_release;
mod image_reference;
mod resolver;
mod state;
mod values;
mod webserver;
mod workload;

#[cfg(target_env = "musl")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const DEFAULT_CONFIG_PATH: &str = "/etc/helmrelease-image-scan/config.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    info!("Starting helmrelease-image-scan {}", env!("CARGO_PKG_VERSION"));

    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = config::load_config(&config_path)?;
    let name_filter = config.filters.build()?;

    let client = controller::create_client().await?;
    let report = Arc::new(RwLock::new(ScanReport::default()));
    let ctx = ControllerContext {
        kube_client: client,
        config: Arc::new(config.clone()),
        name_filter,
        report: report.clone(),
    };

    info!("Executing job scheduler at cron schedule {}", config.cron_schedule);
    let mut scheduler = JobScheduler::new().await?;

    let job = Job::new_async(config.cron_schedule.clone(), move |_uuid, _l| {
        let ctx = ctx.clone();
        Box::pin(async move {
            if let Err(e) = controller::run(ctx).await {
                error!("Error running image scan job: {:?}", e);
            }
        })
    })?;
    scheduler.add(job).await?;
    scheduler.start().await?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {:?}", e);
        }
        info!("Shutdown signal received");
        signal.cancel();
    });

    let app = webserver::create_app(report);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.webserver.port));
    info!("Starting webserver on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    scheduler.shutdown().await?;
    info!("Stopped");

    Ok(())
}
