use crate::utils::error::{LabError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 實驗室 profile：原本散在四份安裝腳本開頭的常數，集中成一份
/// 資料驅動的描述檔，由各平台共用。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabProfile {
    pub lab: LabInfo,
    pub paths: PathsConfig,
    pub jupyter: JupyterSettings,
    pub python: Option<PythonConfig>,
    pub system: Option<SystemConfig>,
    #[serde(default)]
    pub datasets: Vec<DatasetSpec>,
    #[serde(default)]
    pub notebooks: Vec<NotebookSpec>,
    pub ollama: Option<OllamaSettings>,
    pub autostart: Option<AutostartSettings>,
    pub sequence: Option<SequenceSettings>,
    pub monitoring: Option<MonitoringConfig>,
    pub error_handling: Option<ErrorHandlingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabInfo {
    pub name: String,
    pub description: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub lab_root: String,
    pub venv_dir: Option<String>,
    pub notebook_dir: Option<String>,
    pub dataset_dir: Option<String>,
    pub log_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JupyterSettings {
    pub port: u16,
    pub token: String,
    pub ip: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PythonConfig {
    pub interpreter: Option<String>,
    pub packages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub packages: Vec<String>,
}

/// 必要工件：缺了就是安裝失敗
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSpec {
    pub url: String,
    pub filename: String,
    pub unpack: Option<bool>,
}

/// 選配工件：抓不到只給警告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotebookSpec {
    pub url: String,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaSettings {
    pub enabled: Option<bool>,
    pub base_url: Option<String>,
    #[serde(default)]
    pub models: Vec<String>,
    pub poll_interval_ms: Option<u64>,
    pub max_wait_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutostartSettings {
    pub enabled: Option<bool>,
    pub service_name: Option<String>,
    pub platform: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceSettings {
    pub order: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorHandlingConfig {
    pub on_optional_failure: Option<String>, // "warn" 或 "stop"
}

impl LabProfile {
    /// 從 TOML 檔案載入 profile
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(LabError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析 profile
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| LabError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${LAB_TOKEN})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").unwrap();

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 內建 profile：對應原本腳本寫死的課程環境
    pub fn builtin() -> Self {
        Self {
            lab: LabInfo {
                name: "mlsec-lab".to_string(),
                description: "Adversarial ML teaching lab".to_string(),
                version: "1.0.0".to_string(),
            },
            paths: PathsConfig {
                lab_root: "~/mlsec-lab".to_string(),
                venv_dir: None,
                notebook_dir: None,
                dataset_dir: None,
                log_file: None,
            },
            jupyter: JupyterSettings {
                port: 8888,
                token: "mlsec-lab-2024".to_string(),
                ip: None,
            },
            python: Some(PythonConfig {
                interpreter: None,
                packages: vec![
                    "numpy".to_string(),
                    "pandas".to_string(),
                    "matplotlib".to_string(),
                    "scikit-learn".to_string(),
                    "torch".to_string(),
                    "torchvision".to_string(),
                    "adversarial-robustness-toolbox".to_string(),
                    "foolbox".to_string(),
                    "jupyterlab".to_string(),
                ],
            }),
            system: Some(SystemConfig {
                packages: vec![
                    "python3-venv".to_string(),
                    "python3-pip".to_string(),
                    "unzip".to_string(),
                    "curl".to_string(),
                ],
            }),
            datasets: vec![
                DatasetSpec {
                    url: "https://mlseclab.blob.core.windows.net/public/datasets/cifar10-subset.zip"
                        .to_string(),
                    filename: "cifar10-subset.zip".to_string(),
                    unpack: Some(true),
                },
                DatasetSpec {
                    url: "https://mlseclab.blob.core.windows.net/public/datasets/mnist-subset.zip"
                        .to_string(),
                    filename: "mnist-subset.zip".to_string(),
                    unpack: Some(true),
                },
            ],
            notebooks: vec![
                NotebookSpec {
                    url: "https://mlseclab.blob.core.windows.net/public/notebooks/01-fgsm.ipynb"
                        .to_string(),
                    filename: "01-fgsm.ipynb".to_string(),
                },
                NotebookSpec {
                    url: "https://mlseclab.blob.core.windows.net/public/notebooks/02-pgd.ipynb"
                        .to_string(),
                    filename: "02-pgd.ipynb".to_string(),
                },
                NotebookSpec {
                    url:
                        "https://mlseclab.blob.core.windows.net/public/notebooks/03-llm-prompts.ipynb"
                            .to_string(),
                    filename: "03-llm-prompts.ipynb".to_string(),
                },
            ],
            ollama: Some(OllamaSettings {
                enabled: Some(true),
                base_url: None,
                models: vec!["llama3.2:1b".to_string()],
                poll_interval_ms: None,
                max_wait_secs: None,
            }),
            autostart: Some(AutostartSettings {
                enabled: Some(true),
                service_name: None,
                platform: None,
            }),
            sequence: None,
            monitoring: None,
            error_handling: None,
        }
    }

    // ── 路徑解析 ──────────────────────────────────────────────

    pub fn lab_root(&self) -> PathBuf {
        expand_home(&self.paths.lab_root)
    }

    fn resolve_dir(&self, configured: &Option<String>, default_name: &str) -> PathBuf {
        match configured {
            Some(dir) => {
                let expanded = expand_home(dir);
                if expanded.is_absolute() {
                    expanded
                } else {
                    self.lab_root().join(expanded)
                }
            }
            None => self.lab_root().join(default_name),
        }
    }

    pub fn venv_dir(&self) -> PathBuf {
        self.resolve_dir(&self.paths.venv_dir, "venv")
    }

    pub fn notebook_dir(&self) -> PathBuf {
        self.resolve_dir(&self.paths.notebook_dir, "notebooks")
    }

    pub fn dataset_dir(&self) -> PathBuf {
        self.resolve_dir(&self.paths.dataset_dir, "datasets")
    }

    pub fn log_file(&self) -> PathBuf {
        self.resolve_dir(&self.paths.log_file, "labstrap.log")
    }

    // ── 其他預設值 ────────────────────────────────────────────

    pub fn jupyter_ip(&self) -> &str {
        self.jupyter.ip.as_deref().unwrap_or("127.0.0.1")
    }

    pub fn jupyter_url(&self) -> String {
        format!(
            "http://{}:{}/?token={}",
            self.jupyter_ip(),
            self.jupyter.port,
            self.jupyter.token
        )
    }

    pub fn python_interpreter(&self) -> &str {
        self.python
            .as_ref()
            .and_then(|p| p.interpreter.as_deref())
            .unwrap_or("python3")
    }

    pub fn python_packages(&self) -> &[String] {
        self.python.as_ref().map(|p| p.packages.as_slice()).unwrap_or(&[])
    }

    pub fn system_packages(&self) -> &[String] {
        self.system.as_ref().map(|s| s.packages.as_slice()).unwrap_or(&[])
    }

    pub fn ollama_enabled(&self) -> bool {
        self.ollama
            .as_ref()
            .map(|o| o.enabled.unwrap_or(true))
            .unwrap_or(false)
    }

    pub fn ollama_base_url(&self) -> String {
        self.ollama
            .as_ref()
            .and_then(|o| o.base_url.clone())
            .unwrap_or_else(|| "http://127.0.0.1:11434".to_string())
    }

    pub fn ollama_models(&self) -> &[String] {
        self.ollama.as_ref().map(|o| o.models.as_slice()).unwrap_or(&[])
    }

    pub fn ollama_poll_interval_ms(&self) -> u64 {
        self.ollama
            .as_ref()
            .and_then(|o| o.poll_interval_ms)
            .unwrap_or(500)
    }

    pub fn ollama_max_wait_secs(&self) -> u64 {
        self.ollama
            .as_ref()
            .and_then(|o| o.max_wait_secs)
            .unwrap_or(15)
    }

    pub fn autostart_enabled(&self) -> bool {
        self.autostart
            .as_ref()
            .map(|a| a.enabled.unwrap_or(true))
            .unwrap_or(false)
    }

    pub fn service_name(&self) -> String {
        self.autostart
            .as_ref()
            .and_then(|a| a.service_name.clone())
            .unwrap_or_else(|| "labstrap-jupyter".to_string())
    }

    /// 步驟執行順序，未指定時跑完整序列
    pub fn step_order(&self) -> Vec<String> {
        match &self.sequence {
            Some(seq) => seq.order.clone(),
            None => crate::steps::STEP_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    /// 選配步驟失敗時是否升級為致命錯誤
    pub fn optional_failure_is_fatal(&self) -> bool {
        self.error_handling
            .as_ref()
            .and_then(|e| e.on_optional_failure.as_deref())
            .map(|v| v == "stop")
            .unwrap_or(false)
    }

    // ── 驗證 ─────────────────────────────────────────────────

    pub fn validate_profile(&self) -> Result<()> {
        validation::validate_non_empty_string("lab.name", &self.lab.name)?;
        validation::validate_path("paths.lab_root", &self.paths.lab_root)?;
        validation::validate_port("jupyter.port", self.jupyter.port)?;
        validation::validate_non_empty_string("jupyter.token", &self.jupyter.token)?;

        for (i, dataset) in self.datasets.iter().enumerate() {
            validation::validate_url(&format!("datasets[{}].url", i), &dataset.url)?;
            validation::validate_plain_filename(
                &format!("datasets[{}].filename", i),
                &dataset.filename,
            )?;
        }

        for (i, notebook) in self.notebooks.iter().enumerate() {
            validation::validate_url(&format!("notebooks[{}].url", i), &notebook.url)?;
            validation::validate_plain_filename(
                &format!("notebooks[{}].filename", i),
                &notebook.filename,
            )?;
        }

        if let Some(ollama) = &self.ollama {
            if let Some(base_url) = &ollama.base_url {
                validation::validate_url("ollama.base_url", base_url)?;
            }
            validation::validate_positive_number(
                "ollama.poll_interval_ms",
                self.ollama_poll_interval_ms(),
                1,
            )?;
            validation::validate_positive_number(
                "ollama.max_wait_secs",
                self.ollama_max_wait_secs(),
                1,
            )?;
        }

        if let Some(sequence) = &self.sequence {
            for step_name in &sequence.order {
                if !crate::steps::STEP_NAMES.contains(&step_name.as_str()) {
                    return Err(LabError::ConfigValidationError {
                        field: "sequence.order".to_string(),
                        message: format!(
                            "Unknown step '{}'. Known steps: {}",
                            step_name,
                            crate::steps::STEP_NAMES.join(", ")
                        ),
                    });
                }
            }
        }

        if let Some(handling) = &self.error_handling {
            if let Some(policy) = &handling.on_optional_failure {
                if policy != "warn" && policy != "stop" {
                    return Err(LabError::InvalidConfigValueError {
                        field: "error_handling.on_optional_failure".to_string(),
                        value: policy.clone(),
                        reason: "Must be 'warn' or 'stop'".to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

impl Validate for LabProfile {
    fn validate(&self) -> Result<()> {
        self.validate_profile()
    }
}

/// 展開開頭的 ~，對應腳本裡的 $HOME
fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = home_dir() {
            return home;
        }
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL_PROFILE: &str = r#"
[lab]
name = "test-lab"
description = "Test lab"
version = "1.0.0"

[paths]
lab_root = "/tmp/test-lab"

[jupyter]
port = 8888
token = "secret-token"
"#;

    #[test]
    fn test_parse_minimal_profile() {
        let profile = LabProfile::from_toml_str(MINIMAL_PROFILE).unwrap();

        assert_eq!(profile.lab.name, "test-lab");
        assert_eq!(profile.jupyter.port, 8888);
        assert!(profile.datasets.is_empty());
        assert!(profile.validate_profile().is_ok());

        // 預設值
        assert_eq!(profile.python_interpreter(), "python3");
        assert_eq!(profile.venv_dir(), PathBuf::from("/tmp/test-lab/venv"));
        assert_eq!(profile.dataset_dir(), PathBuf::from("/tmp/test-lab/datasets"));
        assert!(!profile.ollama_enabled());
        assert!(!profile.autostart_enabled());
        assert_eq!(profile.step_order().len(), crate::steps::STEP_NAMES.len());
    }

    #[test]
    fn test_parse_full_profile() {
        let toml_content = r#"
[lab]
name = "mlsec"
description = "ML security lab"
version = "2.0.0"

[paths]
lab_root = "/opt/mlsec"
venv_dir = "env"
log_file = "/var/log/mlsec.log"

[jupyter]
port = 9999
token = "tok"
ip = "0.0.0.0"

[python]
packages = ["numpy", "torch"]

[system]
packages = ["unzip"]

[[datasets]]
url = "https://example.com/cifar.zip"
filename = "cifar.zip"
unpack = true

[[notebooks]]
url = "https://example.com/lesson1.ipynb"
filename = "lesson1.ipynb"

[ollama]
models = ["llama3.2:1b"]
poll_interval_ms = 250
max_wait_secs = 10

[autostart]
service_name = "mlsec-jupyter"

[sequence]
order = ["python-venv", "datasets"]
"#;

        let profile = LabProfile::from_toml_str(toml_content).unwrap();
        assert!(profile.validate_profile().is_ok());

        assert_eq!(profile.venv_dir(), PathBuf::from("/opt/mlsec/env"));
        assert_eq!(profile.log_file(), PathBuf::from("/var/log/mlsec.log"));
        assert_eq!(profile.jupyter_ip(), "0.0.0.0");
        assert_eq!(profile.jupyter_url(), "http://0.0.0.0:9999/?token=tok");
        assert!(profile.ollama_enabled());
        assert_eq!(profile.ollama_poll_interval_ms(), 250);
        assert_eq!(profile.service_name(), "mlsec-jupyter");
        assert_eq!(profile.step_order(), vec!["python-venv", "datasets"]);
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("TEST_LAB_TOKEN", "from-env");

        let toml_content = r#"
[lab]
name = "test"
description = "test"
version = "1.0"

[paths]
lab_root = "/tmp/lab"

[jupyter]
port = 8888
token = "${TEST_LAB_TOKEN}"
"#;

        let profile = LabProfile::from_toml_str(toml_content).unwrap();
        assert_eq!(profile.jupyter.token, "from-env");

        std::env::remove_var("TEST_LAB_TOKEN");
    }

    #[test]
    fn test_unknown_step_in_order_rejected() {
        let toml_content = r#"
[lab]
name = "test"
description = "test"
version = "1.0"

[paths]
lab_root = "/tmp/lab"

[jupyter]
port = 8888
token = "tok"

[sequence]
order = ["datasets", "no-such-step"]
"#;

        let profile = LabProfile::from_toml_str(toml_content).unwrap();
        assert!(profile.validate_profile().is_err());
    }

    #[test]
    fn test_bad_dataset_url_rejected() {
        let toml_content = r#"
[lab]
name = "test"
description = "test"
version = "1.0"

[paths]
lab_root = "/tmp/lab"

[jupyter]
port = 8888
token = "tok"

[[datasets]]
url = "ftp://example.com/data.zip"
filename = "data.zip"
"#;

        let profile = LabProfile::from_toml_str(toml_content).unwrap();
        assert!(profile.validate_profile().is_err());
    }

    #[test]
    fn test_privileged_port_rejected() {
        let mut profile = LabProfile::from_toml_str(MINIMAL_PROFILE).unwrap();
        profile.jupyter.port = 80;
        assert!(profile.validate_profile().is_err());
    }

    #[test]
    fn test_builtin_profile_is_valid() {
        let profile = LabProfile::builtin();
        assert!(profile.validate_profile().is_ok());
        assert!(!profile.python_packages().is_empty());
        assert!(!profile.datasets.is_empty());
        assert!(profile.ollama_enabled());
    }

    #[test]
    fn test_profile_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(MINIMAL_PROFILE.as_bytes()).unwrap();

        let profile = LabProfile::from_file(temp_file.path()).unwrap();
        assert_eq!(profile.lab.name, "test-lab");
    }

    #[test]
    fn test_expand_home() {
        std::env::set_var("HOME", "/home/student");
        assert_eq!(expand_home("~/lab"), PathBuf::from("/home/student/lab"));
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
    }
}
