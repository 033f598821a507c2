use crate::error::{AppError, Result};
use crate::models::AppConfig;
use crate::services::FetchError;

pub fn run(config: AppConfig) -> Result<()> {
    let client = super::vci_client(&config)?;
    println!("🔍 Probing {}", config.upstream.base_url);

    match super::runtime()?.block_on(client.probe()) {
        Ok(()) => {
            println!("✅ Upstream is accepting requests");
            Ok(())
        }
        Err(FetchError::Blocked) => Err(AppError::Blocked(
            "upstream answered 403, wait before syncing".to_string(),
        )),
        Err(e) => Err(AppError::Network(format!("probe failed: {}", e))),
    }
}
