use proxysync::config_cli::Config;
use proxysync::logging;
use proxysync::sync::SyncService;

use anyhow::Result;
use clap::Parser;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    logging::init(config.log_json);

    let health_port = config.health_port;
    let service = SyncService::new(config)?;

    if health_port != 0 {
        tokio::spawn(run_health_server(health_port, service.ready_flag()));
    }

    service.run().await
}

async fn run_health_server(port: u16, ready: Arc<AtomicBool>) {
    use warp::Filter;
    use warp::http::StatusCode;

    let health = warp::path("health").map(|| "OK");
    let readiness = warp::path("ready").map(move || {
        if ready.load(Ordering::Relaxed) {
            warp::reply::with_status("OK", StatusCode::OK)
        } else {
            warp::reply::with_status("Not ready", StatusCode::SERVICE_UNAVAILABLE)
        }
    });

    warp::serve(health.or(readiness))
        .run(([0, 0, 0, 0], port))
        .await;
}
