use crate::core::context::{path_str, ProvisionContext};
use crate::domain::model::{ArtifactCheck, VerifyReport};
use crate::domain::ports::Storage;
use crate::platform;
use crate::steps::ollama::check_runtime_reachable;

/// 安裝收尾的驗證器：重新檢查每個預期的工件與服務並回報狀態
pub struct Verifier;

impl Verifier {
    pub async fn run<S: Storage>(ctx: &ProvisionContext<S>) -> VerifyReport {
        let mut checks = Vec::new();
        let order = ctx.profile.step_order();
        let has_step = |name: &str| order.iter().any(|s| s == name);

        if has_step("python-venv") {
            let cfg = ctx.profile.venv_dir().join("pyvenv.cfg");
            checks.push(ArtifactCheck {
                label: "python venv".to_string(),
                ok: ctx.storage.exists(&path_str(&cfg)).await,
                required: true,
                detail: Some(path_str(&cfg)),
            });
        }

        if has_step("datasets") {
            for dataset in &ctx.profile.datasets {
                let path = ctx.profile.dataset_dir().join(&dataset.filename);
                checks.push(ArtifactCheck {
                    label: format!("dataset {}", dataset.filename),
                    ok: ctx.storage.exists(&path_str(&path)).await,
                    required: true,
                    detail: Some(path_str(&path)),
                });
            }
        }

        if has_step("notebooks") {
            for notebook in &ctx.profile.notebooks {
                let path = ctx.profile.notebook_dir().join(&notebook.filename);
                checks.push(ArtifactCheck {
                    label: format!("notebook {}", notebook.filename),
                    ok: ctx.storage.exists(&path_str(&path)).await,
                    required: false,
                    detail: Some(path_str(&path)),
                });
            }
        }

        if has_step("jupyter-config") {
            for artifact in crate::steps::jupyter::emitted_files(&ctx.profile, ctx.platform) {
                checks.push(ArtifactCheck {
                    label: format!("emitted {}", artifact.label),
                    ok: ctx.storage.exists(&path_str(&artifact.path)).await,
                    required: true,
                    detail: Some(path_str(&artifact.path)),
                });
            }
        }

        if has_step("autostart") && ctx.profile.autostart_enabled() {
            let manager = platform::manager_for(ctx.platform);
            let service_name = ctx.profile.service_name();
            let unit_path = manager.unit_path(&service_name);

            checks.push(ArtifactCheck {
                label: format!("service unit {}", service_name),
                ok: ctx.storage.exists(&path_str(&unit_path)).await,
                required: false,
                detail: Some(path_str(&unit_path)),
            });

            let active = manager
                .is_active(ctx.runner.as_ref(), &service_name)
                .await
                .unwrap_or(false);
            checks.push(ArtifactCheck {
                label: format!("service active {}", service_name),
                ok: active,
                required: false,
                detail: None,
            });
        }

        if has_step("ollama") && ctx.profile.ollama_enabled() {
            let base_url = ctx.profile.ollama_base_url();
            let reachable = check_runtime_reachable(&ctx.http, &base_url).await;
            checks.push(ArtifactCheck {
                label: "ollama runtime".to_string(),
                ok: reachable,
                required: false,
                detail: Some(base_url),
            });
        }

        VerifyReport { checks }
    }
}
