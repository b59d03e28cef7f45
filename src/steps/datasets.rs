use crate::core::context::{path_str, ProvisionContext};
use crate::core::sequence::ProvisionStep;
use crate::domain::ports::Storage;
use crate::utils::error::{LabError, Result};
use std::io::Read;
use std::path::Path;
use std::time::Duration;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// 把遠端檔案抓下來寫進 storage，非 2xx 一律視為下載失敗
pub(crate) async fn download_to<S: Storage>(
    ctx: &ProvisionContext<S>,
    url: &str,
    dest: &Path,
) -> Result<()> {
    tracing::debug!("📥 Downloading {} -> {}", url, dest.display());

    let response = ctx
        .http
        .get(url)
        .timeout(DOWNLOAD_TIMEOUT)
        .send()
        .await
        .map_err(|e| LabError::DownloadError {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    if !response.status().is_success() {
        return Err(LabError::DownloadError {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let data = response.bytes().await.map_err(|e| LabError::DownloadError {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    ctx.storage.write_file(&path_str(dest), &data).await?;
    Ok(())
}

/// 課程資料集。必要工件：任何一個缺了就是安裝失敗。
pub struct DatasetsStep;

#[async_trait::async_trait]
impl<S: Storage> ProvisionStep<S> for DatasetsStep {
    fn name(&self) -> &str {
        "datasets"
    }

    async fn is_satisfied(&self, ctx: &ProvisionContext<S>) -> Result<bool> {
        for dataset in &ctx.profile.datasets {
            let dest = ctx.profile.dataset_dir().join(&dataset.filename);
            if !ctx.storage.exists(&path_str(&dest)).await {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn apply(&self, ctx: &ProvisionContext<S>) -> Result<()> {
        let dataset_dir = ctx.profile.dataset_dir();

        for dataset in &ctx.profile.datasets {
            let dest = dataset_dir.join(&dataset.filename);

            if ctx.storage.exists(&path_str(&dest)).await {
                tracing::debug!("Dataset {} already present", dataset.filename);
                continue;
            }

            tracing::info!("📦 Fetching dataset: {}", dataset.filename);
            download_to(ctx, &dataset.url, &dest).await?;

            if dataset.unpack.unwrap_or(false) {
                unpack_archive(ctx, &dest, &dataset_dir).await?;
            }

            // 下載完成後再確認工件真的在
            if !ctx.storage.exists(&path_str(&dest)).await {
                return Err(LabError::DownloadError {
                    url: dataset.url.clone(),
                    reason: "file missing after download".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// 把 zip 內容展開到目標目錄，透過 storage 寫出以便測試。
/// bootstrap 的 payload bundle 也走這裡。
pub async fn unpack_archive<S: Storage>(
    ctx: &ProvisionContext<S>,
    archive_path: &Path,
    dest_dir: &Path,
) -> Result<()> {
    let data = ctx.storage.read_file(&path_str(archive_path)).await?;
    let cursor = std::io::Cursor::new(data);
    let mut archive = zip::ZipArchive::new(cursor)?;

    tracing::debug!(
        "🗜️ Unpacking {} ({} entries)",
        archive_path.display(),
        archive.len()
    );

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }

        // enclosed_name 擋掉 ../ 與絕對路徑的惡意項目
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!("⚠️ Skipping unsafe zip entry: {}", entry.name());
            continue;
        };

        let mut content = Vec::new();
        entry.read_to_end(&mut content)?;

        let target = dest_dir.join(relative);
        ctx.storage.write_file(&path_str(&target), &content).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::profile::LabProfile;
    use crate::domain::model::{CommandOutput, Platform};
    use crate::domain::ports::CommandRunner;
    use httpmock::prelude::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use zip::write::{FileOptions, ZipWriter};

    #[derive(Clone, Default)]
    struct MemoryStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl Storage for MemoryStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                LabError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            let mut files = self.files.lock().await;
            files.insert(path.to_string(), data.to_vec());
            Ok(())
        }

        async fn exists(&self, path: &str) -> bool {
            let files = self.files.lock().await;
            files.contains_key(path)
        }
    }

    struct NoopRunner;

    #[async_trait::async_trait]
    impl CommandRunner for NoopRunner {
        async fn run(&self, _program: &str, _args: &[&str]) -> Result<CommandOutput> {
            Ok(CommandOutput {
                status: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            })
        }

        fn spawn_detached(&self, _program: &str, _args: &[&str]) -> Result<()> {
            Ok(())
        }
    }

    fn context_with_datasets(server_url: &str, entries: &[(&str, bool)]) -> ProvisionContext<MemoryStorage> {
        let mut datasets = String::new();
        for (filename, unpack) in entries {
            datasets.push_str(&format!(
                "\n[[datasets]]\nurl = \"{}/{}\"\nfilename = \"{}\"\nunpack = {}\n",
                server_url, filename, filename, unpack
            ));
        }

        let profile = LabProfile::from_toml_str(&format!(
            r#"
[lab]
name = "t"
description = "t"
version = "1.0"

[paths]
lab_root = "/lab"

[jupyter]
port = 8888
token = "tok"
{}
"#,
            datasets
        ))
        .unwrap();

        ProvisionContext::new(
            profile,
            Platform::Linux,
            Arc::new(NoopRunner),
            MemoryStorage::default(),
            "test".to_string(),
        )
    }

    fn make_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, content) in entries {
            zip.start_file::<_, ()>(*name, FileOptions::default()).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[tokio::test]
    async fn test_download_and_unpack_dataset() {
        let server = MockServer::start();
        let zip_data = make_zip(&[("images/train.csv", b"1,2,3"), ("labels.csv", b"a,b")]);

        let mock = server.mock(|when, then| {
            when.method(GET).path("/cifar.zip");
            then.status(200).body(zip_data.clone());
        });

        let ctx = context_with_datasets(&server.base_url(), &[("cifar.zip", true)]);
        let step = DatasetsStep;

        assert!(!ProvisionStep::<MemoryStorage>::is_satisfied(&step, &ctx)
            .await
            .unwrap());

        ProvisionStep::<MemoryStorage>::apply(&step, &ctx)
            .await
            .unwrap();

        mock.assert();
        assert!(ctx.storage.exists("/lab/datasets/cifar.zip").await);
        assert!(ctx.storage.exists("/lab/datasets/images/train.csv").await);
        assert_eq!(
            ctx.storage.read_file("/lab/datasets/labels.csv").await.unwrap(),
            b"a,b"
        );

        assert!(ProvisionStep::<MemoryStorage>::is_satisfied(&step, &ctx)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_failed_download_is_an_error() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/cifar.zip");
            then.status(500);
        });

        let ctx = context_with_datasets(&server.base_url(), &[("cifar.zip", false)]);
        let step = DatasetsStep;

        let result = ProvisionStep::<MemoryStorage>::apply(&step, &ctx).await;
        mock.assert();

        match result.unwrap_err() {
            LabError::DownloadError { url, reason } => {
                assert!(url.contains("cifar.zip"));
                assert!(reason.contains("500"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_present_dataset_is_not_redownloaded() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/cifar.zip");
            then.status(200).body("zip");
        });

        let ctx = context_with_datasets(&server.base_url(), &[("cifar.zip", false)]);
        ctx.storage
            .write_file("/lab/datasets/cifar.zip", b"already-there")
            .await
            .unwrap();

        let step = DatasetsStep;
        assert!(ProvisionStep::<MemoryStorage>::is_satisfied(&step, &ctx)
            .await
            .unwrap());

        ProvisionStep::<MemoryStorage>::apply(&step, &ctx)
            .await
            .unwrap();

        // 沒有對伺服器發出請求
        mock.assert_hits(0);
        assert_eq!(
            ctx.storage
                .read_file("/lab/datasets/cifar.zip")
                .await
                .unwrap(),
            b"already-there"
        );
    }

    #[tokio::test]
    async fn test_corrupt_archive_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/cifar.zip");
            then.status(200).body("definitely-not-a-zip");
        });

        let ctx = context_with_datasets(&server.base_url(), &[("cifar.zip", true)]);
        let step = DatasetsStep;

        let result = ProvisionStep::<MemoryStorage>::apply(&step, &ctx).await;
        assert!(matches!(result.unwrap_err(), LabError::ZipError(_)));
    }
}
