use crate::config::profile::LabProfile;
use crate::core::context::{path_str, ProvisionContext};
use crate::core::sequence::ProvisionStep;
use crate::domain::model::Platform;
use crate::domain::ports::Storage;
use crate::utils::error::{LabError, Result};
use std::path::PathBuf;

/// venv 內工具的路徑：Unix 在 bin/，Windows 在 Scripts\ 且帶 .exe
pub(crate) fn venv_tool_path(profile: &LabProfile, platform: Platform, tool: &str) -> PathBuf {
    let (dir, suffix) = match platform {
        Platform::Windows => ("Scripts", ".exe"),
        _ => ("bin", ""),
    };
    profile.venv_dir().join(dir).join(format!("{}{}", tool, suffix))
}

/// pip 需求字串去掉版本界定後的套件名稱（"torch==2.1" -> "torch"）
fn requirement_name(requirement: &str) -> &str {
    requirement
        .split(['=', '>', '<', '~', '!', '['])
        .next()
        .unwrap_or(requirement)
        .trim()
}

/// 建立 Python 虛擬環境
pub struct VenvStep;

#[async_trait::async_trait]
impl<S: Storage> ProvisionStep<S> for VenvStep {
    fn name(&self) -> &str {
        "python-venv"
    }

    async fn is_satisfied(&self, ctx: &ProvisionContext<S>) -> Result<bool> {
        let cfg = ctx.profile.venv_dir().join("pyvenv.cfg");
        Ok(ctx.storage.exists(&path_str(&cfg)).await)
    }

    async fn apply(&self, ctx: &ProvisionContext<S>) -> Result<()> {
        let venv_dir = path_str(&ctx.profile.venv_dir());
        let interpreter = ctx.profile.python_interpreter();

        let output = ctx
            .runner
            .run(interpreter, &["-m", "venv", &venv_dir])
            .await?;
        if !output.success() {
            return Err(LabError::CommandError {
                program: interpreter.to_string(),
                status: output.status,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

/// 把課程用到的 ML 與對抗攻防套件裝進 venv
pub struct PipPackagesStep;

#[async_trait::async_trait]
impl<S: Storage> ProvisionStep<S> for PipPackagesStep {
    fn name(&self) -> &str {
        "pip-packages"
    }

    async fn is_satisfied(&self, ctx: &ProvisionContext<S>) -> Result<bool> {
        let packages = ctx.profile.python_packages();
        if packages.is_empty() {
            return Ok(true);
        }

        let pip = path_str(&venv_tool_path(&ctx.profile, ctx.platform, "pip"));
        for package in packages {
            let result = ctx
                .runner
                .run(&pip, &["show", requirement_name(package)])
                .await;
            match result {
                Ok(output) if output.success() => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    async fn apply(&self, ctx: &ProvisionContext<S>) -> Result<()> {
        let packages = ctx.profile.python_packages();
        let pip = path_str(&venv_tool_path(&ctx.profile, ctx.platform, "pip"));

        let output = ctx
            .runner
            .run(&pip, &["install", "--upgrade", "pip"])
            .await?;
        if !output.success() {
            tracing::warn!("⚠️ pip self-upgrade failed: {}", output.stderr.trim());
        }

        let mut args = vec!["install"];
        args.extend(packages.iter().map(|p| p.as_str()));

        let output = ctx.runner.run(&pip, &args).await?;
        if !output.success() {
            return Err(LabError::CommandError {
                program: "pip".to_string(),
                status: output.status,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}
