pub mod profile;

#[cfg(feature = "cli")]
use clap::Parser;

/// labstrap 主程式的命令列介面
#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "labstrap")]
#[command(about = "Provision the ML security teaching lab from a TOML profile")]
pub struct CliConfig {
    /// Path to the lab profile; the built-in course profile is used when omitted
    #[arg(short, long)]
    pub config: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Show the execution plan without provisioning anything
    #[arg(long)]
    pub dry_run: bool,

    /// Run only these steps (comma-separated)
    #[arg(long)]
    pub only: Option<String>,

    /// Skip these steps (comma-separated)
    #[arg(long)]
    pub skip: Option<String>,

    /// Override monitoring setting from the profile
    #[arg(long)]
    pub monitor: Option<bool>,

    /// Execution ID for this run
    #[arg(long)]
    pub execution_id: Option<String>,

    /// Override platform detection (linux, macos, windows)
    #[arg(long)]
    pub platform: Option<String>,
}
