use crate::domain::model::UnitSpec;
use crate::domain::ports::{CommandRunner, ServiceManager};
use crate::utils::error::{LabError, Result};
use async_trait::async_trait;
use std::path::PathBuf;

/// macOS LaunchAgent
pub struct LaunchdManager;

fn label_for(service_name: &str) -> String {
    format!("com.labstrap.{}", service_name)
}

#[async_trait]
impl ServiceManager for LaunchdManager {
    fn name(&self) -> &'static str {
        "launchd"
    }

    fn unit_path(&self, service_name: &str) -> PathBuf {
        super::home_dir()
            .join("Library/LaunchAgents")
            .join(format!("{}.plist", label_for(service_name)))
    }

    fn render_unit(&self, spec: &UnitSpec) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{label}</string>
    <key>ProgramArguments</key>
    <array>
        <string>/bin/sh</string>
        <string>-c</string>
        <string>{exec_start}</string>
    </array>
    <key>WorkingDirectory</key>
    <string>{working_dir}</string>
    <key>RunAtLoad</key>
    <true/>
    <key>KeepAlive</key>
    <true/>
</dict>
</plist>
"#,
            label = label_for(&spec.service_name),
            exec_start = spec.exec_start,
            working_dir = spec.working_dir,
        )
    }

    async fn enable_and_start(
        &self,
        runner: &dyn CommandRunner,
        service_name: &str,
    ) -> Result<()> {
        let plist = self.unit_path(service_name);
        let plist_str = plist.to_string_lossy().to_string();

        // 先卸載舊版本，重複 load 會報錯
        let _ = runner.run("launchctl", &["unload", &plist_str]).await;

        let output = runner.run("launchctl", &["load", "-w", &plist_str]).await?;
        if !output.success() {
            return Err(LabError::ServiceError {
                service: service_name.to_string(),
                message: format!("launchctl load failed: {}", output.stderr.trim()),
            });
        }
        Ok(())
    }

    async fn is_active(&self, runner: &dyn CommandRunner, service_name: &str) -> Result<bool> {
        let label = label_for(service_name);
        let output = runner.run("launchctl", &["list", &label]).await?;
        Ok(output.success())
    }

    async fn restart(&self, runner: &dyn CommandRunner, service_name: &str) -> Result<()> {
        let label = label_for(service_name);
        let _ = runner.run("launchctl", &["stop", &label]).await;

        let output = runner.run("launchctl", &["start", &label]).await?;
        if !output.success() {
            return Err(LabError::ServiceError {
                service: service_name.to_string(),
                message: format!("launchctl start failed: {}", output.stderr.trim()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_plist() {
        let manager = LaunchdManager;
        let plist = manager.render_unit(&UnitSpec {
            service_name: "mlsec-jupyter".to_string(),
            description: "Jupyter".to_string(),
            exec_start: "/Users/student/mlsec-lab/venv/bin/jupyter lab".to_string(),
            working_dir: "/Users/student/mlsec-lab".to_string(),
        });

        assert!(plist.contains("<string>com.labstrap.mlsec-jupyter</string>"));
        assert!(plist.contains("<key>RunAtLoad</key>"));
        assert!(plist.contains("jupyter lab"));
    }

    #[test]
    fn test_plist_path_uses_launch_agents() {
        std::env::set_var("HOME", "/home/student");
        let manager = LaunchdManager;
        assert_eq!(
            manager.unit_path("mlsec-jupyter"),
            PathBuf::from("/home/student/Library/LaunchAgents/com.labstrap.mlsec-jupyter.plist")
        );
    }
}
