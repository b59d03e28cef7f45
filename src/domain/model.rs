use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// 目標平台。Azure 實驗機視為 Linux 變體（差異只在 profile 常數）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Macos,
    Windows,
}

impl Platform {
    pub fn detect() -> Self {
        if cfg!(target_os = "macos") {
            Platform::Macos
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "linux" | "ubuntu" | "azure" => Some(Platform::Linux),
            "macos" | "darwin" => Some(Platform::Macos),
            "windows" => Some(Platform::Windows),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::Macos => "macos",
            Platform::Windows => "windows",
        }
    }
}

/// 單一步驟的執行結果分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// 步驟實際執行並完成
    Applied,
    /// 目標已存在，略過
    Skipped,
    /// 非必要步驟失敗，降級為警告後繼續
    Warned,
}

#[derive(Debug, Clone)]
pub struct StepReport {
    pub step_name: String,
    pub outcome: StepOutcome,
    pub duration: Duration,
    pub detail: Option<String>,
}

/// 整趟安裝的彙總
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub applied: usize,
    pub skipped: usize,
    pub warned: usize,
    pub total_duration: Duration,
}

impl RunSummary {
    pub fn from_reports(reports: &[StepReport]) -> Self {
        Self {
            applied: reports
                .iter()
                .filter(|r| r.outcome == StepOutcome::Applied)
                .count(),
            skipped: reports
                .iter()
                .filter(|r| r.outcome == StepOutcome::Skipped)
                .count(),
            warned: reports
                .iter()
                .filter(|r| r.outcome == StepOutcome::Warned)
                .count(),
            total_duration: reports.iter().map(|r| r.duration).sum(),
        }
    }

    pub fn to_json(&self, reports: &[StepReport]) -> HashMap<String, serde_json::Value> {
        let mut summary = HashMap::new();
        summary.insert(
            "applied".to_string(),
            serde_json::Value::Number(self.applied.into()),
        );
        summary.insert(
            "skipped".to_string(),
            serde_json::Value::Number(self.skipped.into()),
        );
        summary.insert(
            "warned".to_string(),
            serde_json::Value::Number(self.warned.into()),
        );
        summary.insert(
            "total_duration_ms".to_string(),
            serde_json::Value::Number((self.total_duration.as_millis() as u64).into()),
        );

        let step_names: Vec<serde_json::Value> = reports
            .iter()
            .map(|r| serde_json::Value::String(r.step_name.clone()))
            .collect();
        summary.insert(
            "executed_steps".to_string(),
            serde_json::Value::Array(step_names),
        );

        summary
    }
}

/// 外部指令的輸出
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// 服務定義的渲染輸入，由 autostart 步驟組裝
#[derive(Debug, Clone)]
pub struct UnitSpec {
    pub service_name: String,
    pub description: String,
    pub exec_start: String,
    pub working_dir: String,
}

/// 最終驗證的單項檢查
#[derive(Debug, Clone)]
pub struct ArtifactCheck {
    pub label: String,
    pub ok: bool,
    pub required: bool,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    pub checks: Vec<ArtifactCheck>,
}

impl VerifyReport {
    pub fn missing_required(&self) -> Vec<&ArtifactCheck> {
        self.checks.iter().filter(|c| !c.ok && c.required).collect()
    }

    pub fn missing_optional(&self) -> Vec<&ArtifactCheck> {
        self.checks
            .iter()
            .filter(|c| !c.ok && !c.required)
            .collect()
    }

    pub fn all_required_ok(&self) -> bool {
        self.missing_required().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str, outcome: StepOutcome) -> StepReport {
        StepReport {
            step_name: name.to_string(),
            outcome,
            duration: Duration::from_millis(100),
            detail: None,
        }
    }

    #[test]
    fn test_run_summary_counts() {
        let reports = vec![
            report("python-venv", StepOutcome::Applied),
            report("datasets", StepOutcome::Skipped),
            report("notebooks", StepOutcome::Warned),
            report("jupyter-config", StepOutcome::Applied),
        ];

        let summary = RunSummary::from_reports(&reports);
        assert_eq!(summary.applied, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.warned, 1);
        assert_eq!(summary.total_duration, Duration::from_millis(400));

        let json = summary.to_json(&reports);
        assert_eq!(
            json.get("executed_steps").unwrap().as_array().unwrap().len(),
            4
        );
        assert_eq!(
            json.get("applied").unwrap(),
            &serde_json::Value::Number(2.into())
        );
    }

    #[test]
    fn test_platform_from_name() {
        assert_eq!(Platform::from_name("azure"), Some(Platform::Linux));
        assert_eq!(Platform::from_name("Darwin"), Some(Platform::Macos));
        assert_eq!(Platform::from_name("windows"), Some(Platform::Windows));
        assert_eq!(Platform::from_name("beos"), None);
    }

    #[test]
    fn test_verify_report_partition() {
        let report = VerifyReport {
            checks: vec![
                ArtifactCheck {
                    label: "dataset cifar10.zip".to_string(),
                    ok: false,
                    required: true,
                    detail: None,
                },
                ArtifactCheck {
                    label: "notebook lesson1.ipynb".to_string(),
                    ok: false,
                    required: false,
                    detail: None,
                },
                ArtifactCheck {
                    label: "jupyter config".to_string(),
                    ok: true,
                    required: true,
                    detail: None,
                },
            ],
        };

        assert_eq!(report.missing_required().len(), 1);
        assert_eq!(report.missing_optional().len(), 1);
        assert!(!report.all_required_ok());
    }
}
