use crate::core::context::ProvisionContext;
use crate::core::sequence::ProvisionStep;
use crate::domain::ports::{CommandRunner, Storage};
use crate::platform;
use crate::utils::error::{LabError, Result};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const REACHABLE_TIMEOUT: Duration = Duration::from_secs(3);
const PULL_TIMEOUT: Duration = Duration::from_secs(600);

/// 本地 LLM runtime 是否回應狀態端點
pub async fn check_runtime_reachable(client: &Client, base_url: &str) -> bool {
    let url = format!("{}/api/tags", base_url.trim_end_matches('/'));
    match client.get(url).timeout(REACHABLE_TIMEOUT).send().await {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

/// 以固定間隔輪詢到就緒或超出等待預算。迴圈次數在進入前就定死，
/// 不可能無窮輪詢。
pub async fn wait_until_reachable(
    client: &Client,
    base_url: &str,
    interval: Duration,
    budget: Duration,
) -> bool {
    let attempts = (budget.as_millis() / interval.as_millis().max(1)).max(1);

    for i in 0..attempts {
        tokio::time::sleep(interval).await;
        if check_runtime_reachable(client, base_url).await {
            tracing::info!(
                "🟢 LLM runtime became reachable after {:?}",
                interval * (i as u32 + 1)
            );
            return true;
        }
    }
    false
}

/// 查詢模型清單，名稱帶不帶 tag 都算相符
pub async fn model_available(client: &Client, base_url: &str, model: &str) -> Result<bool> {
    let url = format!("{}/api/tags", base_url.trim_end_matches('/'));
    let resp = client
        .get(&url)
        .timeout(Duration::from_secs(5))
        .send()
        .await?;

    if !resp.status().is_success() {
        return Err(LabError::ServiceError {
            service: "ollama".to_string(),
            message: format!("model listing returned HTTP {}", resp.status()),
        });
    }

    let v: Value = resp.json().await?;
    let model_base = model.split(':').next().unwrap_or(model);

    if let Some(models) = v["models"].as_array() {
        for m in models {
            for key in &["name", "model"] {
                if let Some(name) = m[key].as_str() {
                    let name_base = name.split(':').next().unwrap_or(name);
                    if name == model || name_base == model_base {
                        return Ok(true);
                    }
                }
            }
        }
    }
    Ok(false)
}

async fn pull_model(client: &Client, base_url: &str, model: &str) -> Result<()> {
    let url = format!("{}/api/pull", base_url.trim_end_matches('/'));
    let body = json!({
        "name": model,
        "stream": false,
    });

    tracing::info!("⬇️ Pulling model '{}' (first download can take minutes)...", model);

    let resp = client
        .post(&url)
        .json(&body)
        .timeout(PULL_TIMEOUT)
        .send()
        .await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        return Err(LabError::ServiceError {
            service: "ollama".to_string(),
            message: format!("pull of '{}' failed: HTTP {} — {}", model, status, text),
        });
    }

    tracing::info!("✅ Model '{}' pull complete", model);
    Ok(())
}

async fn runtime_binary_present(runner: &dyn CommandRunner) -> bool {
    matches!(
        runner.run("ollama", &["--version"]).await,
        Ok(output) if output.success()
    )
}

/// 明確重啟一次：ollama 被平台服務管理器託管時走 restart，
/// 沒被託管就直接重新 spawn
async fn restart_runtime<S: Storage>(ctx: &ProvisionContext<S>) -> Result<()> {
    let manager = platform::manager_for(ctx.platform);
    match manager.restart(ctx.runner.as_ref(), "ollama").await {
        Ok(()) => {
            tracing::info!("🔄 Restarted ollama via {}", manager.name());
            Ok(())
        }
        Err(e) => {
            tracing::debug!("Managed restart unavailable ({}), respawning directly", e);
            ctx.runner.spawn_detached("ollama", &["serve"])
        }
    }
}

/// 確保本地 LLM runtime 起得來並備妥課程模型。整個步驟是選配的：
/// 失敗降級為警告，課程其餘部分照常可用。
pub struct OllamaStep;

#[async_trait::async_trait]
impl<S: Storage> ProvisionStep<S> for OllamaStep {
    fn name(&self) -> &str {
        "ollama"
    }

    fn required(&self) -> bool {
        false
    }

    async fn is_satisfied(&self, ctx: &ProvisionContext<S>) -> Result<bool> {
        let base_url = ctx.profile.ollama_base_url();

        if !check_runtime_reachable(&ctx.http, &base_url).await {
            return Ok(false);
        }

        for model in ctx.profile.ollama_models() {
            match model_available(&ctx.http, &base_url, model).await {
                Ok(true) => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    async fn apply(&self, ctx: &ProvisionContext<S>) -> Result<()> {
        let base_url = ctx.profile.ollama_base_url();
        let interval = Duration::from_millis(ctx.profile.ollama_poll_interval_ms());
        let budget = Duration::from_secs(ctx.profile.ollama_max_wait_secs());

        if !check_runtime_reachable(&ctx.http, &base_url).await {
            if !runtime_binary_present(ctx.runner.as_ref()).await {
                return Err(LabError::ServiceError {
                    service: "ollama".to_string(),
                    message: "binary not found on PATH; install it from https://ollama.com/download"
                        .to_string(),
                });
            }

            tracing::info!("🚀 Starting LLM runtime: ollama serve");
            ctx.runner.spawn_detached("ollama", &["serve"])?;

            if !wait_until_reachable(&ctx.http, &base_url, interval, budget).await {
                // 還沒就緒：明確重啟一次再等一輪，仍失敗就放棄
                tracing::warn!(
                    "⚠️ Runtime not ready within {:?}, attempting one restart",
                    budget
                );
                restart_runtime(ctx).await?;

                if !wait_until_reachable(&ctx.http, &base_url, interval, budget).await {
                    return Err(LabError::ServiceError {
                        service: "ollama".to_string(),
                        message: format!(
                            "not reachable at {} after restart; start it manually with 'ollama serve'",
                            base_url
                        ),
                    });
                }
            }
        }

        for model in ctx.profile.ollama_models() {
            let present = model_available(&ctx.http, &base_url, model)
                .await
                .unwrap_or(false);
            if present {
                tracing::debug!("Model '{}' already available", model);
                continue;
            }
            pull_model(&ctx.http, &base_url, model).await?;
        }

        Ok(())
    }
}
