use httpmock::prelude::*;
use labstrap::core::sequence::{ProvisionStep, StepSequence};
use labstrap::domain::model::{CommandOutput, StepOutcome};
use labstrap::domain::ports::CommandRunner;
use labstrap::steps::ollama::OllamaStep;
use labstrap::utils::error::{LabError, Result};
use labstrap::{LabProfile, LocalStorage, Platform, ProvisionContext};
use std::sync::Arc;
use tempfile::TempDir;

/// ollama binary 存在與否、有沒有被服務管理器託管，都由測試決定；
/// serve 的啟動是 no-op，但所有指令都留下記錄
struct FakeOllamaRunner {
    binary_present: bool,
    managed: bool,
    spawns: std::sync::atomic::AtomicUsize,
    calls: std::sync::Mutex<Vec<String>>,
}

impl FakeOllamaRunner {
    fn new(binary_present: bool) -> Self {
        Self {
            binary_present,
            managed: false,
            spawns: std::sync::atomic::AtomicUsize::new(0),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn managed(mut self) -> Self {
        self.managed = true;
        self
    }

    fn spawn_count(&self) -> usize {
        self.spawns.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn count_calls(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.contains(needle))
            .count()
    }
}

#[async_trait::async_trait]
impl CommandRunner for FakeOllamaRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", program, args.join(" ")));

        let status = if program == "ollama" && args == ["--version"] && !self.binary_present {
            Some(127)
        } else if program == "systemctl" && !self.managed {
            // 沒被託管：systemctl 找不到這個服務
            Some(5)
        } else {
            Some(0)
        };
        Ok(CommandOutput {
            status,
            stdout: String::new(),
            stderr: String::new(),
        })
    }

    fn spawn_detached(&self, _program: &str, _args: &[&str]) -> Result<()> {
        self.spawns
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}

fn ollama_profile(lab_root: &std::path::Path, base_url: &str, model: &str) -> LabProfile {
    LabProfile::from_toml_str(&format!(
        r#"
[lab]
name = "ollama-test"
description = "t"
version = "1.0"

[paths]
lab_root = "{root}"

[jupyter]
port = 8888
token = "tok"

[ollama]
base_url = "{base}"
models = ["{model}"]
poll_interval_ms = 10
max_wait_secs = 1

[sequence]
order = ["ollama"]
"#,
        root = lab_root.display(),
        base = base_url,
        model = model,
    ))
    .unwrap()
}

fn build_context(
    profile: LabProfile,
    runner: Arc<FakeOllamaRunner>,
) -> ProvisionContext<LocalStorage> {
    let storage = LocalStorage::new(profile.lab_root().to_string_lossy().to_string());
    ProvisionContext::new(
        profile,
        Platform::Linux,
        runner,
        storage,
        "ollama_run".to_string(),
    )
}

#[tokio::test]
async fn test_missing_model_is_pulled() {
    let temp_dir = TempDir::new().unwrap();
    let server = MockServer::start();

    server.mock(|when, then| {
        when.method(GET).path("/api/tags");
        then.status(200).json_body(serde_json::json!({"models": []}));
    });
    let pull_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/api/pull")
            .json_body(serde_json::json!({"name": "llama3.2:1b", "stream": false}));
        then.status(200).json_body(serde_json::json!({"status": "success"}));
    });

    let profile = ollama_profile(temp_dir.path(), &server.base_url(), "llama3.2:1b");
    let runner = Arc::new(FakeOllamaRunner::new(true));
    let ctx = build_context(profile, runner.clone());

    let step = OllamaStep;
    assert!(!ProvisionStep::<LocalStorage>::is_satisfied(&step, &ctx)
        .await
        .unwrap());

    ProvisionStep::<LocalStorage>::apply(&step, &ctx)
        .await
        .unwrap();

    pull_mock.assert();
    // runtime 本來就在線上，不該另外 spawn
    assert_eq!(runner.spawn_count(), 0);
}

#[tokio::test]
async fn test_present_model_is_not_pulled_again() {
    let temp_dir = TempDir::new().unwrap();
    let server = MockServer::start();

    server.mock(|when, then| {
        when.method(GET).path("/api/tags");
        then.status(200).json_body(serde_json::json!({
            "models": [{"name": "llama3.2:1b"}]
        }));
    });
    let pull_mock = server.mock(|when, then| {
        when.method(POST).path("/api/pull");
        then.status(200);
    });

    let profile = ollama_profile(temp_dir.path(), &server.base_url(), "llama3.2:1b");
    let ctx = build_context(profile, Arc::new(FakeOllamaRunner::new(true)));

    let step = OllamaStep;
    assert!(ProvisionStep::<LocalStorage>::is_satisfied(&step, &ctx)
        .await
        .unwrap());

    ProvisionStep::<LocalStorage>::apply(&step, &ctx)
        .await
        .unwrap();

    pull_mock.assert_hits(0);
}

#[tokio::test]
async fn test_unreachable_runtime_without_binary_degrades_to_warning() {
    let temp_dir = TempDir::new().unwrap();

    // 指向沒有服務的 port；binary 也不在
    let profile = ollama_profile(temp_dir.path(), "http://127.0.0.1:59998", "llama3.2:1b");
    let ctx = build_context(profile.clone(), Arc::new(FakeOllamaRunner::new(false)));

    let step = OllamaStep;
    let result = ProvisionStep::<LocalStorage>::apply(&step, &ctx).await;
    match result.unwrap_err() {
        LabError::ServiceError { service, message } => {
            assert_eq!(service, "ollama");
            assert!(message.contains("binary not found"));
        }
        other => panic!("unexpected error: {:?}", other),
    }

    // 整個序列跑下來是警告而不是失敗
    let mut sequence = StepSequence::new();
    for step in labstrap::steps::build_steps(&profile) {
        sequence.add_step(step);
    }
    let reports = sequence.execute_all(&ctx).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].outcome, StepOutcome::Warned);
}

#[tokio::test]
async fn test_unmanaged_runtime_gets_one_respawn_then_warning() {
    let temp_dir = TempDir::new().unwrap();

    // binary 在，但 serve 永遠起不來（無人監聽），也沒有託管服務可重啟
    let profile = ollama_profile(temp_dir.path(), "http://127.0.0.1:59997", "llama3.2:1b");
    let runner = Arc::new(FakeOllamaRunner::new(true));
    let ctx = build_context(profile, runner.clone());

    let step = OllamaStep;
    let start = std::time::Instant::now();
    let result = ProvisionStep::<LocalStorage>::apply(&step, &ctx).await;

    match result.unwrap_err() {
        LabError::ServiceError { message, .. } => {
            assert!(message.contains("after restart"));
        }
        other => panic!("unexpected error: {:?}", other),
    }

    // 託管重啟失敗退回 respawn：初次啟動一次、重啟 respawn 一次，不多不少
    assert_eq!(runner.count_calls("systemctl --user restart ollama"), 1);
    assert_eq!(runner.spawn_count(), 2);
    // 兩輪等待預算（各 1 秒）加上逾時餘裕內一定要收斂
    assert!(start.elapsed() < std::time::Duration::from_secs(30));
}

#[tokio::test]
async fn test_managed_runtime_is_restarted_through_service_manager() {
    let temp_dir = TempDir::new().unwrap();

    // 託管情境：重啟交給 systemd，不另外 respawn
    let profile = ollama_profile(temp_dir.path(), "http://127.0.0.1:59996", "llama3.2:1b");
    let runner = Arc::new(FakeOllamaRunner::new(true).managed());
    let ctx = build_context(profile, runner.clone());

    let step = OllamaStep;
    let result = ProvisionStep::<LocalStorage>::apply(&step, &ctx).await;

    match result.unwrap_err() {
        LabError::ServiceError { message, .. } => {
            assert!(message.contains("after restart"));
        }
        other => panic!("unexpected error: {:?}", other),
    }

    assert_eq!(runner.count_calls("systemctl --user restart ollama"), 1);
    // 初次啟動是唯一一次 spawn
    assert_eq!(runner.spawn_count(), 1);
}
