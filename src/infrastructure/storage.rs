use crate::config::AppConfig;
use crate::services::storage::LocalStorageService;
use std::sync::Arc;
use tracing::info;

pub async fn setup_storage(config: &AppConfig) -> anyhow::Result<Arc<LocalStorageService>> {
    info!(
        "📁 Storage: uploads={} reports={}",
        config.upload_dir.display(),
        config.report_dir.display()
    );

    let storage = LocalStorageService::new(config.upload_dir.clone(), config.report_dir.clone());
    storage.ensure_dirs().await?;

    Ok(Arc::new(storage))
}
