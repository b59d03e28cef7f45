use clap::Parser;
use labstrap::config::profile::{LabProfile, SequenceSettings};
use labstrap::utils::{logger, validation::Validate};
use labstrap::{
    CliConfig, LocalStorage, Platform, ProvisionContext, StepSequence, SystemRunner, Verifier,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = CliConfig::parse();

    // 載入 profile：沒指定就用內建的課程環境
    let mut profile = match &config.config {
        Some(path) => match LabProfile::from_file(path) {
            Ok(profile) => profile,
            Err(e) => {
                eprintln!("❌ Failed to load lab profile '{}': {}", path, e);
                eprintln!("💡 Make sure the file exists and is valid TOML format");
                std::process::exit(1);
            }
        },
        None => LabProfile::builtin(),
    };

    // 驗證配置
    if let Err(e) = profile.validate() {
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 Suggestion: {}", e.recovery_suggestion());
        std::process::exit(1);
    }

    // 初始化日誌：console 加一份 run log，致命錯誤會指向它
    let log_file = profile.log_file();
    logger::init_cli_logger(config.verbose, Some(&log_file));

    tracing::info!("🚀 Starting labstrap");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    let platform = match &config.platform {
        Some(name) => match Platform::from_name(name) {
            Some(platform) => platform,
            None => {
                eprintln!("❌ Unknown platform '{}' (use linux, macos or windows)", name);
                std::process::exit(1);
            }
        },
        None => Platform::detect(),
    };

    let execution_id = config
        .execution_id
        .clone()
        .unwrap_or_else(|| format!("lab_{}", chrono::Utc::now().format("%Y%m%d_%H%M%S")));

    // 決定要跑的步驟（--only / --skip 過濾）
    let selected_steps = determine_steps(&profile, &config);
    display_plan(&profile, platform, &selected_steps, &execution_id);

    if config.dry_run {
        tracing::info!("🔍 DRY RUN MODE - no provisioning will occur");
        return Ok(());
    }

    let monitor_enabled = config.monitor.unwrap_or_else(|| profile.monitoring_enabled());
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    profile.sequence = Some(SequenceSettings {
        order: selected_steps,
    });

    // 組引擎：本地儲存 + 系統指令執行器
    let storage = LocalStorage::new(profile.lab_root().to_string_lossy().to_string());
    let ctx = ProvisionContext::new(
        profile,
        platform,
        Arc::new(SystemRunner::new()),
        storage,
        execution_id,
    );

    let mut sequence = StepSequence::new().with_monitoring(monitor_enabled);
    for step in labstrap::steps::build_steps(&ctx.profile) {
        sequence.add_step(step);
    }

    match sequence.execute_all(&ctx).await {
        Ok(reports) => {
            let summary = labstrap::core::RunSummary::from_reports(&reports);
            tracing::debug!("Execution summary: {:?}", summary.to_json(&reports));
        }
        Err(e) => {
            tracing::error!(
                "❌ Provisioning failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("📄 See the log file at {} for details", log_file.display());

            // 根據錯誤嚴重程度決定退出碼
            let exit_code = match e.severity() {
                labstrap::utils::error::ErrorSeverity::Low => 0,
                labstrap::utils::error::ErrorSeverity::Medium => 2,
                labstrap::utils::error::ErrorSeverity::High => 1,
                labstrap::utils::error::ErrorSeverity::Critical => 3,
            };

            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    // 收尾驗證：重新檢查所有預期工件
    tracing::info!("🔎 Verifying provisioned artifacts");
    let report = Verifier::run(&ctx).await;

    for check in &report.checks {
        if check.ok {
            tracing::info!("✅ {}", check.label);
        } else if check.required {
            tracing::error!("❌ {} (missing: {:?})", check.label, check.detail);
        } else {
            tracing::warn!("⚠️ {} (missing: {:?})", check.label, check.detail);
        }
    }

    if !report.all_required_ok() {
        eprintln!("❌ The lab is incomplete; re-run the installer to retry");
        eprintln!("📄 See the log file at {} for details", log_file.display());
        std::process::exit(1);
    }

    tracing::info!("✅ Lab provisioned successfully!");
    println!("✅ Lab provisioned successfully!");
    println!("🌐 Jupyter: {}", ctx.profile.jupyter_url());

    Ok(())
}

/// 從 profile 的順序出發，套用 --only / --skip
fn determine_steps(profile: &LabProfile, config: &CliConfig) -> Vec<String> {
    let mut steps = profile.step_order();

    if let Some(only) = &config.only {
        let wanted: Vec<&str> = only.split(',').map(|s| s.trim()).collect();
        steps.retain(|s| wanted.contains(&s.as_str()));
    }

    if let Some(skip) = &config.skip {
        let unwanted: Vec<&str> = skip.split(',').map(|s| s.trim()).collect();
        steps.retain(|s| !unwanted.contains(&s.as_str()));
    }

    steps
}

fn display_plan(profile: &LabProfile, platform: Platform, steps: &[String], execution_id: &str) {
    tracing::info!("🧪 Lab: {} v{}", profile.lab.name, profile.lab.version);
    tracing::info!("🖥️ Platform: {}", platform.name());
    tracing::info!("🆔 Execution ID: {}", execution_id);
    tracing::info!("📁 Lab root: {}", profile.lab_root().display());
    tracing::info!("📋 Steps to run ({}):", steps.len());
    for (i, step) in steps.iter().enumerate() {
        tracing::info!("  {}. {}", i + 1, step);
    }
}
