use crate::domain::model::UnitSpec;
use crate::domain::ports::{CommandRunner, ServiceManager};
use crate::utils::error::{LabError, Result};
use async_trait::async_trait;
use std::path::PathBuf;

/// Windows Task Scheduler（登入時啟動的工作）
pub struct TaskSchedulerManager;

#[async_trait]
impl ServiceManager for TaskSchedulerManager {
    fn name(&self) -> &'static str {
        "schtasks"
    }

    fn unit_path(&self, service_name: &str) -> PathBuf {
        let base = std::env::var("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|_| super::home_dir().join("AppData/Roaming"));
        base.join("labstrap").join(format!("{}.xml", service_name))
    }

    fn render_unit(&self, spec: &UnitSpec) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-16"?>
<Task version="1.2" xmlns="http://schemas.microsoft.com/windows/2004/02/mit/task">
  <RegistrationInfo>
    <Description>{description}</Description>
  </RegistrationInfo>
  <Triggers>
    <LogonTrigger>
      <Enabled>true</Enabled>
    </LogonTrigger>
  </Triggers>
  <Settings>
    <StartWhenAvailable>true</StartWhenAvailable>
    <DisallowStartIfOnBatteries>false</DisallowStartIfOnBatteries>
  </Settings>
  <Actions Context="Author">
    <Exec>
      <Command>powershell.exe</Command>
      <Arguments>-WindowStyle Hidden -Command "{exec_start}"</Arguments>
      <WorkingDirectory>{working_dir}</WorkingDirectory>
    </Exec>
  </Actions>
</Task>
"#,
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
        let xml = self.unit_path(service_name);
        let xml_str = xml.to_string_lossy().to_string();

        let output = runner
            .run(
                "schtasks",
                &["/Create", "/TN", service_name, "/XML", &xml_str, "/F"],
            )
            .await?;
        if !output.success() {
            return Err(LabError::ServiceError {
                service: service_name.to_string(),
                message: format!("schtasks /Create failed: {}", output.stderr.trim()),
            });
        }

        let output = runner.run("schtasks", &["/Run", "/TN", service_name]).await?;
        if !output.success() {
            return Err(LabError::ServiceError {
                service: service_name.to_string(),
                message: format!("schtasks /Run failed: {}", output.stderr.trim()),
            });
        }
        Ok(())
    }

    async fn is_active(&self, runner: &dyn CommandRunner, service_name: &str) -> Result<bool> {
        let output = runner
            .run("schtasks", &["/Query", "/TN", service_name])
            .await?;
        Ok(output.success())
    }

    async fn restart(&self, runner: &dyn CommandRunner, service_name: &str) -> Result<()> {
        let _ = runner.run("schtasks", &["/End", "/TN", service_name]).await;

        let output = runner.run("schtasks", &["/Run", "/TN", service_name]).await?;
        if !output.success() {
            return Err(LabError::ServiceError {
                service: service_name.to_string(),
                message: format!("schtasks /Run failed: {}", output.stderr.trim()),
            });
        }
        Ok(())
    }
}
