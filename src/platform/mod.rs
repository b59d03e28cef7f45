pub mod launchd;
pub mod schtasks;
pub mod systemd;

use crate::domain::model::Platform;
use crate::domain::ports::ServiceManager;
use std::path::PathBuf;

/// 取得對應平台的服務管理器
pub fn manager_for(platform: Platform) -> Box<dyn ServiceManager> {
    match platform {
        Platform::Linux => Box::new(systemd::SystemdManager),
        Platform::Macos => Box::new(launchd::LaunchdManager),
        Platform::Windows => Box::new(schtasks::TaskSchedulerManager),
    }
}

pub(crate) fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}
