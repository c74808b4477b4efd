use std::net::SocketAddr;
use std::path::Path;
use anyhow::Context;
use log::{error, info};
use tokio::net::TcpListener;
use pvcast::initialization::init;
use pvcast::manager_model_service::{serve, PredictionService};
use pvcast::prediction::Pipeline;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = init("prediction_server")?;

    let model_dir = Path::new(&config.server.model_dir);
    let pipeline = Pipeline::load(model_dir)
        .inspect_err(|e| error!("unable to load models: {}", e))
        .with_context(|| format!("loading models from {}", model_dir.display()))?;

    let addr: SocketAddr = format!("{}:{}", config.server.bind_address, config.server.bind_port)
        .parse()
        .context("invalid bind address")?;
    let listener = TcpListener::bind(addr).await
        .with_context(|| format!("binding {}", addr))?;

    info!("serving predictions with {} workers", config.server.max_workers);
    let service = PredictionService::new(pipeline, config.server.max_workers);

    serve(listener, service, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("unable to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("server shutting down");
    })
        .await
        .context("prediction server failed")?;

    Ok(())
}
