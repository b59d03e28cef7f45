use crate::config::profile::LabProfile;
use crate::domain::model::Platform;
use crate::domain::ports::{CommandRunner, Storage};
use std::path::Path;
use std::sync::Arc;

/// 安裝步驟共用的執行上下文
pub struct ProvisionContext<S: Storage> {
    pub profile: LabProfile,
    pub platform: Platform,
    pub runner: Arc<dyn CommandRunner>,
    pub storage: S,
    pub http: reqwest::Client,
    pub execution_id: String,
}

impl<S: Storage> ProvisionContext<S> {
    pub fn new(
        profile: LabProfile,
        platform: Platform,
        runner: Arc<dyn CommandRunner>,
        storage: S,
        execution_id: String,
    ) -> Self {
        Self {
            profile,
            platform,
            runner,
            storage,
            http: reqwest::Client::new(),
            execution_id,
        }
    }
}

/// Storage 介面吃 &str，PathBuf 在邊界轉一次
pub fn path_str(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
