use anyhow::{bail, Context};
use clap::Parser;
use labstrap::config::profile::LabProfile;
use labstrap::core::context::path_str;
use labstrap::domain::ports::Storage;
use labstrap::steps::datasets::unpack_archive;
use labstrap::utils::{logger, validation::Validate};
use labstrap::{LocalStorage, Platform, ProvisionContext, StepSequence, SystemRunner, Verifier};
use std::sync::Arc;
use std::time::Duration;

/// 啟動器：把遠端的 lab profile（與選配的 payload bundle）抓到本機後
/// 交給同一套安裝引擎，取代原本「下載安裝腳本再執行」的流程。
#[derive(Parser)]
#[command(name = "labstrap-bootstrap")]
#[command(about = "Fetch a remote lab profile and provision the lab from it")]
struct Args {
    /// Remote URL of the lab profile (TOML)
    #[arg(long)]
    url: String,

    /// Optional payload bundle (zip) unpacked into the lab root before provisioning
    #[arg(long)]
    bundle_url: Option<String>,

    /// Where to save the fetched profile
    #[arg(long, default_value = "./lab-profile.toml")]
    dest: String,

    /// Only fetch the profile, do not provision
    #[arg(long)]
    fetch_only: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    labstrap::utils::validation::validate_url("url", &args.url)
        .map_err(|e| anyhow::anyhow!(e.user_friendly_message()))?;
    if let Some(bundle_url) = &args.bundle_url {
        labstrap::utils::validation::validate_url("bundle-url", bundle_url)
            .map_err(|e| anyhow::anyhow!(e.user_friendly_message()))?;
    }

    let client = reqwest::Client::new();
    eprintln!("📥 Fetching lab profile from {}", args.url);

    let response = client
        .get(&args.url)
        .timeout(Duration::from_secs(60))
        .send()
        .await
        .with_context(|| format!("could not reach {}", args.url))?;

    if !response.status().is_success() {
        bail!("profile download failed: HTTP {}", response.status());
    }

    let body = response.text().await.context("reading profile body")?;

    // 先解析驗證再落地，壞掉的 profile 不該留在磁碟上
    let profile = LabProfile::from_toml_str(&body)
        .map_err(|e| anyhow::anyhow!(e.user_friendly_message()))?;
    profile
        .validate()
        .map_err(|e| anyhow::anyhow!("{} ({})", e.user_friendly_message(), e.recovery_suggestion()))?;

    std::fs::write(&args.dest, &body)
        .with_context(|| format!("writing profile to {}", args.dest))?;
    eprintln!("✅ Profile saved to {}", args.dest);

    if args.fetch_only {
        return Ok(());
    }

    let log_file = profile.log_file();
    logger::init_cli_logger(args.verbose, Some(&log_file));

    let platform = Platform::detect();
    let execution_id = format!("bootstrap_{}", chrono::Utc::now().format("%Y%m%d_%H%M%S"));

    tracing::info!("🚀 Bootstrapping lab '{}' on {}", profile.lab.name, platform.name());

    let storage = LocalStorage::new(profile.lab_root().to_string_lossy().to_string());
    let ctx = ProvisionContext::new(
        profile,
        platform,
        Arc::new(SystemRunner::new()),
        storage,
        execution_id,
    );

    // 選配 bundle：先於安裝序列展開到實驗室根目錄
    if let Some(bundle_url) = &args.bundle_url {
        tracing::info!("📦 Fetching lab bundle from {}", bundle_url);

        let response = client
            .get(bundle_url)
            .timeout(Duration::from_secs(300))
            .send()
            .await
            .with_context(|| format!("could not reach {}", bundle_url))?;
        if !response.status().is_success() {
            bail!("bundle download failed: HTTP {}", response.status());
        }
        let data = response.bytes().await.context("reading bundle body")?;

        let bundle_path = ctx.profile.lab_root().join("lab-bundle.zip");
        ctx.storage
            .write_file(&path_str(&bundle_path), &data)
            .await
            .map_err(|e| anyhow::anyhow!(e.user_friendly_message()))?;
        unpack_archive(&ctx, &bundle_path, &ctx.profile.lab_root())
            .await
            .map_err(|e| anyhow::anyhow!(e.user_friendly_message()))?;

        tracing::info!("✅ Bundle unpacked into {}", ctx.profile.lab_root().display());
    }

    let mut sequence = StepSequence::new().with_monitoring(ctx.profile.monitoring_enabled());
    for step in labstrap::steps::build_steps(&ctx.profile) {
        sequence.add_step(step);
    }

    if let Err(e) = sequence.execute_all(&ctx).await {
        eprintln!("📄 See the log file at {} for details", log_file.display());
        bail!("{}", e.user_friendly_message());
    }

    let report = Verifier::run(&ctx).await;
    if !report.all_required_ok() {
        eprintln!("📄 See the log file at {} for details", log_file.display());
        bail!("the lab is incomplete; re-run the bootstrap to retry");
    }

    println!("✅ Lab provisioned successfully!");
    println!("🌐 Jupyter: {}", ctx.profile.jupyter_url());
    Ok(())
}
