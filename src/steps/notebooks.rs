use crate::core::context::{path_str, ProvisionContext};
use crate::core::sequence::ProvisionStep;
use crate::domain::ports::Storage;
use crate::utils::error::{LabError, Result};

use super::datasets::download_to;

/// 課程筆記本。選配工件：單一檔案抓不到只記警告，其餘照樣嘗試。
pub struct NotebooksStep;

#[async_trait::async_trait]
impl<S: Storage> ProvisionStep<S> for NotebooksStep {
    fn name(&self) -> &str {
        "notebooks"
    }

    fn required(&self) -> bool {
        false
    }

    async fn is_satisfied(&self, ctx: &ProvisionContext<S>) -> Result<bool> {
        for notebook in &ctx.profile.notebooks {
            let dest = ctx.profile.notebook_dir().join(&notebook.filename);
            if !ctx.storage.exists(&path_str(&dest)).await {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn apply(&self, ctx: &ProvisionContext<S>) -> Result<()> {
        let notebook_dir = ctx.profile.notebook_dir();
        let mut failed = Vec::new();

        for notebook in &ctx.profile.notebooks {
            let dest = notebook_dir.join(&notebook.filename);

            if ctx.storage.exists(&path_str(&dest)).await {
                continue;
            }

            tracing::info!("📓 Fetching notebook: {}", notebook.filename);
            if let Err(e) = download_to(ctx, &notebook.url, &dest).await {
                tracing::warn!("⚠️ Notebook {} failed: {} (continuing)", notebook.filename, e);
                failed.push(notebook.filename.clone());
            }
        }

        if !failed.is_empty() {
            return Err(LabError::StepError {
                step: "notebooks".to_string(),
                details: format!(
                    "{} of {} notebooks could not be fetched: {}",
                    failed.len(),
                    ctx.profile.notebooks.len(),
                    failed.join(", ")
                ),
            });
        }

        Ok(())
    }
}
