use crate::core::context::ProvisionContext;
use crate::core::sequence::ProvisionStep;
use crate::domain::model::Platform;
use crate::domain::ports::{CommandRunner, Storage};
use crate::utils::error::{LabError, Result};

/// 作業系統層的套件：apt-get / brew / winget
pub struct SystemPackagesStep;

async fn package_installed(
    runner: &dyn CommandRunner,
    platform: Platform,
    package: &str,
) -> bool {
    let result = match platform {
        Platform::Linux => runner.run("dpkg", &["-s", package]).await,
        Platform::Macos => runner.run("brew", &["list", "--versions", package]).await,
        Platform::Windows => {
            runner
                .run("winget", &["list", "--id", package, "--exact"])
                .await
        }
    };

    matches!(result, Ok(output) if output.success())
}

#[async_trait::async_trait]
impl<S: Storage> ProvisionStep<S> for SystemPackagesStep {
    fn name(&self) -> &str {
        "system-packages"
    }

    async fn is_satisfied(&self, ctx: &ProvisionContext<S>) -> Result<bool> {
        let packages = ctx.profile.system_packages();
        if packages.is_empty() {
            return Ok(true);
        }

        for package in packages {
            if !package_installed(ctx.runner.as_ref(), ctx.platform, package).await {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn apply(&self, ctx: &ProvisionContext<S>) -> Result<()> {
        let packages = ctx.profile.system_packages();
        let runner = ctx.runner.as_ref();

        match ctx.platform {
            Platform::Linux => {
                let output = runner.run("sudo", &["apt-get", "update", "-qq"]).await?;
                if !output.success() {
                    tracing::warn!("⚠️ apt-get update failed: {}", output.stderr.trim());
                }

                let mut args = vec!["apt-get", "install", "-y"];
                args.extend(packages.iter().map(|p| p.as_str()));
                let output = runner.run("sudo", &args).await?;
                if !output.success() {
                    return Err(LabError::CommandError {
                        program: "apt-get".to_string(),
                        status: output.status,
                        stderr: output.stderr.trim().to_string(),
                    });
                }
            }
            Platform::Macos => {
                for package in packages {
                    if package_installed(runner, ctx.platform, package).await {
                        continue;
                    }
                    let output = runner.run("brew", &["install", package]).await?;
                    if !output.success() {
                        return Err(LabError::CommandError {
                            program: "brew".to_string(),
                            status: output.status,
                            stderr: output.stderr.trim().to_string(),
                        });
                    }
                }
            }
            Platform::Windows => {
                for package in packages {
                    if package_installed(runner, ctx.platform, package).await {
                        continue;
                    }
                    let output = runner
                        .run(
                            "winget",
                            &[
                                "install",
                                "--id",
                                package,
                                "--exact",
                                "--silent",
                                "--accept-package-agreements",
                            ],
                        )
                        .await?;
                    if !output.success() {
                        return Err(LabError::CommandError {
                            program: "winget".to_string(),
                            status: output.status,
                            stderr: output.stderr.trim().to_string(),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}
