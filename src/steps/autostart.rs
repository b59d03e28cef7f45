use crate::core::context::{path_str, ProvisionContext};
use crate::core::sequence::ProvisionStep;
use crate::domain::model::UnitSpec;
use crate::domain::ports::Storage;
use crate::platform;
use crate::utils::error::{LabError, Result};

use super::jupyter::jupyter_exec_start;

fn unit_spec<S: Storage>(ctx: &ProvisionContext<S>) -> UnitSpec {
    UnitSpec {
        service_name: ctx.profile.service_name(),
        description: format!("{} Jupyter server", ctx.profile.lab.name),
        exec_start: jupyter_exec_start(&ctx.profile, ctx.platform),
        working_dir: path_str(&ctx.profile.lab_root()),
    }
}

/// 開機自動啟動：寫出服務定義並交給平台的服務管理器啟用。
/// 服務起不來只算警告，學生還有備援啟動器可用。
pub struct AutostartStep;

#[async_trait::async_trait]
impl<S: Storage> ProvisionStep<S> for AutostartStep {
    fn name(&self) -> &str {
        "autostart"
    }

    fn required(&self) -> bool {
        false
    }

    async fn is_satisfied(&self, ctx: &ProvisionContext<S>) -> Result<bool> {
        let manager = platform::manager_for(ctx.platform);
        let spec = unit_spec(ctx);
        let unit_path = path_str(&manager.unit_path(&spec.service_name));

        match ctx.storage.read_file(&unit_path).await {
            Ok(existing) if existing == manager.render_unit(&spec).as_bytes() => {}
            _ => return Ok(false),
        }

        manager
            .is_active(ctx.runner.as_ref(), &spec.service_name)
            .await
    }

    async fn apply(&self, ctx: &ProvisionContext<S>) -> Result<()> {
        let manager = platform::manager_for(ctx.platform);
        let spec = unit_spec(ctx);
        let unit_path = manager.unit_path(&spec.service_name);

        tracing::info!(
            "🧷 Installing {} unit: {}",
            manager.name(),
            unit_path.display()
        );
        ctx.storage
            .write_file(&path_str(&unit_path), manager.render_unit(&spec).as_bytes())
            .await?;

        manager
            .enable_and_start(ctx.runner.as_ref(), &spec.service_name)
            .await?;

        let active = manager
            .is_active(ctx.runner.as_ref(), &spec.service_name)
            .await?;
        if !active {
            return Err(LabError::ServiceError {
                service: spec.service_name,
                message: format!(
                    "service did not report active after {} start",
                    manager.name()
                ),
            });
        }

        Ok(())
    }
}
