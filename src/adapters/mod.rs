// Adapters layer: concrete implementations for the filesystem and external tools.

use crate::domain::model::CommandOutput;
use crate::domain::ports::{CommandRunner, Storage};
use crate::utils::error::{LabError, Result};
use async_trait::async_trait;
use std::fs;
use std::path::Path;

/// 以實驗室根目錄為基底的本地儲存。絕對路徑直接使用（服務定義檔
/// 落在家目錄下，不在實驗室目錄內）。
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: String,
}

impl LocalStorage {
    pub fn new(base_path: String) -> Self {
        Self { base_path }
    }
}

impl Storage for LocalStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = Path::new(&self.base_path).join(path);
        let data = fs::read(full_path)?;
        Ok(data)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = Path::new(&self.base_path).join(path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(full_path, data)?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> bool {
        Path::new(&self.base_path).join(path).exists()
    }
}

/// 透過作業系統實際執行外部指令
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        tracing::debug!("🔧 Running: {} {}", program, args.join(" "));

        let output = tokio::process::Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| LabError::CommandError {
                program: program.to_string(),
                status: None,
                stderr: e.to_string(),
            })?;

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn spawn_detached(&self, program: &str, args: &[&str]) -> Result<()> {
        tracing::debug!("🔧 Spawning detached: {} {}", program, args.join(" "));

        let mut command = std::process::Command::new(program);
        command
            .args(args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());

        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            command.creation_flags(0x00000008); // DETACHED_PROCESS
        }

        command.spawn().map_err(|e| LabError::CommandError {
            program: program.to_string(),
            status: None,
            stderr: e.to_string(),
        })?;

        Ok(())
    }
}
