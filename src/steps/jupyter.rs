use crate::config::profile::LabProfile;
use crate::core::context::{path_str, ProvisionContext};
use crate::core::sequence::ProvisionStep;
use crate::domain::model::Platform;
use crate::domain::ports::Storage;
use crate::utils::error::Result;
use std::path::PathBuf;

use super::python::venv_tool_path;

pub struct EmittedFile {
    pub label: &'static str,
    pub path: PathBuf,
    pub content: String,
}

/// jupyter-config 步驟會寫出的三個工件。render 是純函式：
/// 同一份 profile 永遠得到相同的位元組。
pub fn emitted_files(profile: &LabProfile, platform: Platform) -> Vec<EmittedFile> {
    let root = profile.lab_root();
    let launcher_name = match platform {
        Platform::Windows => "start-lab.ps1",
        _ => "start-lab.sh",
    };

    vec![
        EmittedFile {
            label: "jupyter config",
            path: root.join("jupyter_server_config.py"),
            content: render_jupyter_config(profile),
        },
        EmittedFile {
            label: "lab shortcut",
            path: root.join("open-lab.html"),
            content: render_html_shortcut(profile),
        },
        EmittedFile {
            label: "backup launcher",
            path: root.join(launcher_name),
            content: render_backup_launcher(profile, platform),
        },
    ]
}

/// Jupyter 伺服器設定（Python 語法），token 取代登入頁
pub fn render_jupyter_config(profile: &LabProfile) -> String {
    format!(
        "c = get_config()  # noqa\n\
         \n\
         c.ServerApp.ip = \"{ip}\"\n\
         c.ServerApp.port = {port}\n\
         c.ServerApp.open_browser = False\n\
         c.ServerApp.root_dir = r\"{notebook_dir}\"\n\
         c.ServerApp.token = \"{token}\"\n\
         c.ServerApp.allow_origin = \"*\"\n\
         c.ServerApp.allow_remote_access = True\n",
        ip = profile.jupyter_ip(),
        port = profile.jupyter.port,
        notebook_dir = profile.notebook_dir().display(),
        token = profile.jupyter.token,
    )
}

/// 桌面捷徑：自動轉跳到帶 token 的 Jupyter 網址
pub fn render_html_shortcut(profile: &LabProfile) -> String {
    let url = profile.jupyter_url();
    format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head>\n\
         <meta charset=\"utf-8\">\n\
         <meta http-equiv=\"refresh\" content=\"0; url={url}\">\n\
         <title>{name}</title>\n\
         </head>\n\
         <body>\n\
         <p>Opening the lab… If nothing happens, <a href=\"{url}\">click here</a>.</p>\n\
         </body>\n\
         </html>\n",
        url = url,
        name = profile.lab.name,
    )
}

/// 服務沒起來時的手動備援啟動器
pub fn render_backup_launcher(profile: &LabProfile, platform: Platform) -> String {
    let config_path = profile.lab_root().join("jupyter_server_config.py");

    match platform {
        Platform::Windows => {
            let activate = profile.venv_dir().join("Scripts").join("Activate.ps1");
            format!(
                "# Backup launcher for the {name} lab.\n\
                 # Use this if the scheduled task did not start Jupyter.\n\
                 & \"{activate}\"\n\
                 jupyter lab --config=\"{config}\"\n",
                name = profile.lab.name,
                activate = activate.display(),
                config = config_path.display(),
            )
        }
        _ => {
            let activate = profile.venv_dir().join("bin").join("activate");
            format!(
                "#!/usr/bin/env bash\n\
                 # Backup launcher for the {name} lab.\n\
                 # Use this if the lab service did not start Jupyter.\n\
                 set -e\n\
                 source \"{activate}\"\n\
                 exec jupyter lab --config=\"{config}\"\n",
                name = profile.lab.name,
                activate = activate.display(),
                config = config_path.display(),
            )
        }
    }
}

/// 啟動服務要跑的指令，autostart 步驟也用它組 ExecStart
pub(crate) fn jupyter_exec_start(profile: &LabProfile, platform: Platform) -> String {
    let jupyter = venv_tool_path(profile, platform, "jupyter");
    let config_path = profile.lab_root().join("jupyter_server_config.py");
    format!(
        "{} lab --config={}",
        jupyter.display(),
        config_path.display()
    )
}

/// 寫出 Jupyter 設定、HTML 捷徑與備援啟動器
pub struct JupyterConfigStep;

#[async_trait::async_trait]
impl<S: Storage> ProvisionStep<S> for JupyterConfigStep {
    fn name(&self) -> &str {
        "jupyter-config"
    }

    async fn is_satisfied(&self, ctx: &ProvisionContext<S>) -> Result<bool> {
        // 內容比對：檔案在而且與本次 render 完全一致才算滿足，
        // 改過 profile 之後重跑會覆寫舊版
        for artifact in emitted_files(&ctx.profile, ctx.platform) {
            let path = path_str(&artifact.path);
            if !ctx.storage.exists(&path).await {
                return Ok(false);
            }
            match ctx.storage.read_file(&path).await {
                Ok(existing) if existing == artifact.content.as_bytes() => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    async fn apply(&self, ctx: &ProvisionContext<S>) -> Result<()> {
        for artifact in emitted_files(&ctx.profile, ctx.platform) {
            tracing::info!("📝 Writing {}: {}", artifact.label, artifact.path.display());
            ctx.storage
                .write_file(&path_str(&artifact.path), artifact.content.as_bytes())
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::CommandOutput;
    use crate::domain::ports::CommandRunner;
    use crate::utils::error::LabError;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

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

    fn test_profile() -> LabProfile {
        LabProfile::from_toml_str(
            r#"
[lab]
name = "mlsec"
description = "t"
version = "1.0"

[paths]
lab_root = "/lab"

[jupyter]
port = 8899
token = "lab-token-42"
"#,
        )
        .unwrap()
    }

    fn test_context() -> ProvisionContext<MemoryStorage> {
        ProvisionContext::new(
            test_profile(),
            Platform::Linux,
            Arc::new(NoopRunner),
            MemoryStorage::default(),
            "test".to_string(),
        )
    }

    #[test]
    fn test_jupyter_config_embeds_port_and_token() {
        let config = render_jupyter_config(&test_profile());
        assert!(config.contains("c.ServerApp.port = 8899"));
        assert!(config.contains("c.ServerApp.token = \"lab-token-42\""));
        assert!(config.contains("open_browser = False"));
    }

    #[test]
    fn test_html_shortcut_embeds_tokenized_url() {
        let html = render_html_shortcut(&test_profile());
        assert!(html.contains("http://127.0.0.1:8899/?token=lab-token-42"));
        assert!(html.contains("http-equiv=\"refresh\""));
    }

    #[test]
    fn test_backup_launcher_per_platform() {
        let profile = test_profile();

        let sh = render_backup_launcher(&profile, Platform::Linux);
        assert!(sh.starts_with("#!/usr/bin/env bash"));
        assert!(sh.contains("/lab/venv/bin/activate"));

        let ps1 = render_backup_launcher(&profile, Platform::Windows);
        assert!(ps1.contains("Activate.ps1"));
        assert!(!ps1.contains("#!/"));
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let profile = test_profile();
        assert_eq!(
            render_jupyter_config(&profile),
            render_jupyter_config(&profile)
        );
        assert_eq!(
            render_html_shortcut(&profile),
            render_html_shortcut(&profile)
        );
    }

    #[tokio::test]
    async fn test_apply_then_satisfied_then_overwrite_on_change() {
        let ctx = test_context();
        let step = JupyterConfigStep;

        assert!(!ProvisionStep::<MemoryStorage>::is_satisfied(&step, &ctx)
            .await
            .unwrap());

        ProvisionStep::<MemoryStorage>::apply(&step, &ctx)
            .await
            .unwrap();

        assert!(ctx.storage.exists("/lab/jupyter_server_config.py").await);
        assert!(ctx.storage.exists("/lab/open-lab.html").await);
        assert!(ctx.storage.exists("/lab/start-lab.sh").await);
        assert!(ProvisionStep::<MemoryStorage>::is_satisfied(&step, &ctx)
            .await
            .unwrap());

        // 檔案被改掉之後不再視為滿足，重跑會覆寫
        ctx.storage
            .write_file("/lab/open-lab.html", b"tampered")
            .await
            .unwrap();
        assert!(!ProvisionStep::<MemoryStorage>::is_satisfied(&step, &ctx)
            .await
            .unwrap());
    }
}
