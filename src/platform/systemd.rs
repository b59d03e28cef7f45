use crate::domain::model::UnitSpec;
use crate::domain::ports::{CommandRunner, ServiceManager};
use crate::utils::error::{LabError, Result};
use async_trait::async_trait;
use std::path::PathBuf;

/// systemd user unit（Ubuntu 與 Azure 實驗機共用）
pub struct SystemdManager;

impl SystemdManager {
    async fn systemctl(&self, runner: &dyn CommandRunner, args: &[&str]) -> Result<()> {
        let mut full_args = vec!["--user"];
        full_args.extend_from_slice(args);

        let output = runner.run("systemctl", &full_args).await?;
        if !output.success() {
            return Err(LabError::ServiceError {
                service: args.last().unwrap_or(&"?").to_string(),
                message: format!(
                    "systemctl --user {} failed: {}",
                    args.join(" "),
                    output.stderr.trim()
                ),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ServiceManager for SystemdManager {
    fn name(&self) -> &'static str {
        "systemd"
    }

    fn unit_path(&self, service_name: &str) -> PathBuf {
        super::home_dir()
            .join(".config/systemd/user")
            .join(format!("{}.service", service_name))
    }

    fn render_unit(&self, spec: &UnitSpec) -> String {
        format!(
            "[Unit]\n\
             Description={description}\n\
             After=network-online.target\n\
             \n\
             [Service]\n\
             Type=simple\n\
             ExecStart={exec_start}\n\
             WorkingDirectory={working_dir}\n\
             Restart=on-failure\n\
             RestartSec=5\n\
             \n\
             [Install]\n\
             WantedBy=default.target\n",
            description = spec.description,
            exec_start = spec.exec_start,
            working_dir = spec.working_dir,
        )
    }

    async fn enable_and_start(
        &self,
        runner: &dyn CommandRunner,
        service_name: &str,
    ) -> Result<()> {
        self.systemctl(runner, &["daemon-reload"]).await?;
        self.systemctl(runner, &["enable", "--now", service_name])
            .await
    }

    async fn is_active(&self, runner: &dyn CommandRunner, service_name: &str) -> Result<bool> {
        let output = runner
            .run("systemctl", &["--user", "is-active", service_name])
            .await?;
        Ok(output.success())
    }

    async fn restart(&self, runner: &dyn CommandRunner, service_name: &str) -> Result<()> {
        self.systemctl(runner, &["restart", service_name]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_unit_contains_exec_and_restart() {
        let manager = SystemdManager;
        let unit = manager.render_unit(&UnitSpec {
            service_name: "mlsec-jupyter".to_string(),
            description: "ML security lab Jupyter server".to_string(),
            exec_start: "/home/student/mlsec-lab/venv/bin/jupyter lab --config=/home/student/mlsec-lab/jupyter_server_config.py".to_string(),
            working_dir: "/home/student/mlsec-lab".to_string(),
        });

        assert!(unit.contains("[Unit]"));
        assert!(unit.contains("Description=ML security lab Jupyter server"));
        assert!(unit.contains("ExecStart=/home/student/mlsec-lab/venv/bin/jupyter lab"));
        assert!(unit.contains("Restart=on-failure"));
        assert!(unit.contains("WantedBy=default.target"));
    }

    #[test]
    fn test_unit_path_shape() {
        std::env::set_var("HOME", "/home/student");
        let manager = SystemdManager;
        let path = manager.unit_path("mlsec-jupyter");
        assert_eq!(
            path,
            PathBuf::from("/home/student/.config/systemd/user/mlsec-jupyter.service")
        );
    }
}
