pub mod autostart;
pub mod datasets;
pub mod jupyter;
pub mod notebooks;
pub mod ollama;
pub mod python;
pub mod system;

use crate::config::profile::LabProfile;
use crate::core::sequence::ProvisionStep;
use crate::domain::ports::Storage;

/// 完整序列的步驟名稱，profile 的 sequence.order 以此為準
pub const STEP_NAMES: &[&str] = &[
    "system-packages",
    "python-venv",
    "pip-packages",
    "datasets",
    "notebooks",
    "jupyter-config",
    "ollama",
    "autostart",
];

/// 依 profile 的順序組出步驟清單。ollama 與 autostart 在 profile
/// 中停用時不會進入序列。
pub fn build_steps<S: Storage + 'static>(profile: &LabProfile) -> Vec<Box<dyn ProvisionStep<S>>> {
    profile
        .step_order()
        .iter()
        .filter(|name| match name.as_str() {
            "ollama" => profile.ollama_enabled(),
            "autostart" => profile.autostart_enabled(),
            _ => true,
        })
        .filter_map(|name| build_step(name))
        .collect()
}

fn build_step<S: Storage + 'static>(name: &str) -> Option<Box<dyn ProvisionStep<S>>> {
    match name {
        "system-packages" => Some(Box::new(system::SystemPackagesStep)),
        "python-venv" => Some(Box::new(python::VenvStep)),
        "pip-packages" => Some(Box::new(python::PipPackagesStep)),
        "datasets" => Some(Box::new(datasets::DatasetsStep)),
        "notebooks" => Some(Box::new(notebooks::NotebooksStep)),
        "jupyter-config" => Some(Box::new(jupyter::JupyterConfigStep)),
        "ollama" => Some(Box::new(ollama::OllamaStep)),
        "autostart" => Some(Box::new(autostart::AutostartStep)),
        _ => None,
    }
}
