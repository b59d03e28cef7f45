use crate::core::context::ProvisionContext;
use crate::domain::model::{RunSummary, StepOutcome, StepReport};
use crate::domain::ports::Storage;
use crate::utils::error::{LabError, Result};
use crate::utils::monitor::SystemMonitor;
use std::time::Instant;

/// 單一安裝步驟。is_satisfied 是冪等性探針：目標已存在就跳過；
/// apply 執行實際動作，required 決定失敗是致命還是警告。
#[async_trait::async_trait]
pub trait ProvisionStep<S: Storage>: Send + Sync {
    fn name(&self) -> &str;

    fn required(&self) -> bool {
        true
    }

    async fn is_satisfied(&self, ctx: &ProvisionContext<S>) -> Result<bool>;

    async fn apply(&self, ctx: &ProvisionContext<S>) -> Result<()>;
}

/// 步驟序列，負責依序執行安裝步驟
pub struct StepSequence<S: Storage + 'static> {
    steps: Vec<Box<dyn ProvisionStep<S>>>,
    monitor: Option<SystemMonitor>,
    monitor_enabled: bool,
}

impl<S: Storage + 'static> StepSequence<S> {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            monitor: None,
            monitor_enabled: false,
        }
    }

    /// 啟用或禁用系統監控
    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor_enabled = enabled;
        if enabled {
            self.monitor = Some(SystemMonitor::new(enabled));
        }
        self
    }

    pub fn add_step(&mut self, step: Box<dyn ProvisionStep<S>>) {
        self.steps.push(step);
    }

    /// 依序執行所有步驟。必要步驟失敗即中止；選配步驟失敗降級為警告。
    pub async fn execute_all(&self, ctx: &ProvisionContext<S>) -> Result<Vec<StepReport>> {
        let mut reports = Vec::new();

        if self.monitor_enabled {
            if let Some(monitor) = &self.monitor {
                monitor.log_preflight();
            }
        }

        for step in &self.steps {
            let start_time = Instant::now();

            // 冪等性探針：目標已存在就不再動它
            match step.is_satisfied(ctx).await {
                Ok(true) => {
                    tracing::info!("⏭️ Skipping step: {} (already satisfied)", step.name());
                    reports.push(StepReport {
                        step_name: step.name().to_string(),
                        outcome: StepOutcome::Skipped,
                        duration: start_time.elapsed(),
                        detail: None,
                    });
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    // 探針本身失敗視同未滿足，交給 apply 決定成敗
                    tracing::debug!("Probe for '{}' failed ({}), applying anyway", step.name(), e);
                }
            }

            tracing::info!("🚧 Applying step: {}", step.name());

            match step.apply(ctx).await {
                Ok(()) => {
                    // 動作完成後再驗證一次工件確實存在
                    let satisfied = step.is_satisfied(ctx).await.unwrap_or(false);
                    let duration = start_time.elapsed();

                    if satisfied {
                        tracing::info!(
                            "✅ Step completed: {} (duration: {:?})",
                            step.name(),
                            duration
                        );
                        reports.push(StepReport {
                            step_name: step.name().to_string(),
                            outcome: StepOutcome::Applied,
                            duration,
                            detail: None,
                        });
                    } else if step.required() {
                        tracing::error!(
                            "❌ Step '{}' finished but its artifacts are missing",
                            step.name()
                        );
                        return Err(LabError::StepError {
                            step: step.name().to_string(),
                            details: "step completed without producing its artifacts".to_string(),
                        });
                    } else {
                        tracing::warn!(
                            "⚠️ Step '{}' finished but its artifacts are incomplete, continuing",
                            step.name()
                        );
                        reports.push(StepReport {
                            step_name: step.name().to_string(),
                            outcome: StepOutcome::Warned,
                            duration,
                            detail: Some("artifacts incomplete".to_string()),
                        });
                    }
                }
                Err(e) => {
                    if step.required() || ctx.profile.optional_failure_is_fatal() {
                        tracing::error!("❌ Step failed: {} - {}", step.name(), e);
                        return Err(LabError::StepError {
                            step: step.name().to_string(),
                            details: e.to_string(),
                        });
                    }

                    tracing::warn!("⚠️ Optional step failed: {} - {} (continuing)", step.name(), e);
                    reports.push(StepReport {
                        step_name: step.name().to_string(),
                        outcome: StepOutcome::Warned,
                        duration: start_time.elapsed(),
                        detail: Some(e.to_string()),
                    });
                }
            }

            if self.monitor_enabled {
                if let Some(monitor) = &self.monitor {
                    monitor.log_stats(step.name());
                }
            }
        }

        if self.monitor_enabled {
            if let Some(monitor) = &self.monitor {
                monitor.log_final_stats();
            }
        }

        let summary = RunSummary::from_reports(&reports);
        tracing::info!(
            "🏁 Sequence finished: {} applied, {} skipped, {} warned ({:?})",
            summary.applied,
            summary.skipped,
            summary.warned,
            summary.total_duration
        );

        Ok(reports)
    }
}

impl<S: Storage + 'static> Default for StepSequence<S> {
    fn default() -> Self {
        Self::new()
    }
}
