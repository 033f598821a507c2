pub mod fill;
pub mod gaps;
pub mod indices;
pub mod probe;
pub mod realtime;
pub mod sync;

use crate::error::{AppError, Result};
use crate::models::{AppConfig, RunSummary};
use crate::services::{IsahcTransport, ReqwestTransport, StorageClient, SyncDriver, VciClient};
use tokio::runtime::Runtime;

pub(crate) type LiveDriver = SyncDriver<IsahcTransport, ReqwestTransport>;

pub(crate) fn runtime() -> Result<Runtime> {
    Runtime::new().map_err(|e| AppError::Network(format!("Failed to create runtime: {}", e)))
}

pub(crate) fn vci_client(config: &AppConfig) -> Result<VciClient<IsahcTransport>> {
    VciClient::from_config(&config.upstream).map_err(|e| AppError::Network(e.to_string()))
}

pub(crate) fn storage_client(config: &AppConfig) -> Result<StorageClient<ReqwestTransport>> {
    StorageClient::from_config(&config.storage).map_err(|e| AppError::Network(e.to_string()))
}

pub(crate) fn build_driver(config: &AppConfig) -> Result<LiveDriver> {
    tracing::info!(
        upstream = %config.upstream.base_url,
        storage = %config.storage.base_url,
        price_scale = config.upstream.price_scale.factor(),
        timezone = %config.upstream.timezone,
        chunk_size = config.storage.chunk_size,
        "Run settings"
    );

    Ok(SyncDriver::new(
        vci_client(config)?,
        storage_client(config)?,
        config.driver.clone(),
    ))
}

/// Print the run summary; an aborted run is an error for the exit code
pub(crate) fn finish(summary: &RunSummary) -> Result<()> {
    println!("\n📊 Summary");
    for line in summary.format_display() {
        println!("   {}", line);
    }

    if summary.aborted {
        return Err(AppError::Blocked(format!(
            "{} symbols not attempted",
            summary.not_attempted()
        )));
    }
    println!("✅ Done");
    Ok(())
}
