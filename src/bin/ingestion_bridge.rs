use anyhow::Context;
use log::error;
use pvcast::initialization::init;
use pvcast::manager_model_client::RpcClient;
use pvcast::worker::run;

fn main() -> anyhow::Result<()> {
    let config = init("ingestion_bridge")?;

    let client = RpcClient::connect(&config.bridge)
        .inspect_err(|e| error!("failed to connect to prediction service: {}", e))
        .context("prediction service unavailable")?;

    run(&config.bridge, client).context("ingestion bridge stopped")?;

    Ok(())
}
