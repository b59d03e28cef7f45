use crate::domain::model::{CommandOutput, UnitSpec};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn exists(&self, path: &str) -> impl std::future::Future<Output = bool> + Send;
}

/// 外部工具呼叫的出入口，測試時以 mock 取代
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// 執行指令並等待結束，收集輸出
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;

    /// 啟動常駐背景程序，不等待（ollama serve 這類服務）
    fn spawn_detached(&self, program: &str, args: &[&str]) -> Result<()>;
}

/// 各平台服務管理器的薄介面：systemd / launchd / Task Scheduler
#[async_trait]
pub trait ServiceManager: Send + Sync {
    fn name(&self) -> &'static str;

    /// 服務定義檔應落在哪個路徑
    fn unit_path(&self, service_name: &str) -> PathBuf;

    /// 由固定的設定值渲染服務定義檔內容
    fn render_unit(&self, spec: &UnitSpec) -> String;

    async fn enable_and_start(&self, runner: &dyn CommandRunner, service_name: &str)
        -> Result<()>;

    async fn is_active(&self, runner: &dyn CommandRunner, service_name: &str) -> Result<bool>;

    async fn restart(&self, runner: &dyn CommandRunner, service_name: &str) -> Result<()>;
}
