use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value for '{field}' ('{value}'): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Command '{program}' failed (status {status:?}): {stderr}")]
    CommandError {
        program: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("Download failed for {url}: {reason}")]
    DownloadError { url: String, reason: String },

    #[error("Step '{step}' failed: {details}")]
    StepError { step: String, details: String },

    #[error("Service '{service}': {message}")]
    ServiceError { service: String, message: String },

    #[error("Verification failed, missing artifact: {artifact}")]
    VerificationError { artifact: String },
}

/// 錯誤分類，對應不同的外部子系統
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Network,
    FileSystem,
    Command,
    Service,
    Verification,
}

/// 錯誤嚴重程度，main 據此決定退出碼
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,      // 警告性質，流程可以繼續
    Medium,   // 可重試
    High,     // 必要工件缺失，本次執行失敗
    Critical, // 系統層級問題
}

impl LabError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            LabError::IoError(_) | LabError::ZipError(_) => ErrorCategory::FileSystem,
            LabError::HttpError(_) | LabError::DownloadError { .. } => ErrorCategory::Network,
            LabError::SerializationError(_)
            | LabError::ConfigValidationError { .. }
            | LabError::InvalidConfigValueError { .. }
            | LabError::MissingConfigError { .. } => ErrorCategory::Configuration,
            LabError::CommandError { .. } => ErrorCategory::Command,
            LabError::ServiceError { .. } => ErrorCategory::Service,
            LabError::StepError { .. } | LabError::VerificationError { .. } => {
                ErrorCategory::Verification
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            LabError::ConfigValidationError { .. }
            | LabError::InvalidConfigValueError { .. }
            | LabError::MissingConfigError { .. }
            | LabError::SerializationError(_) => ErrorSeverity::Critical,
            LabError::HttpError(_) => ErrorSeverity::Medium,
            LabError::ServiceError { .. } => ErrorSeverity::Low,
            LabError::IoError(_)
            | LabError::ZipError(_)
            | LabError::CommandError { .. }
            | LabError::DownloadError { .. }
            | LabError::StepError { .. }
            | LabError::VerificationError { .. } => ErrorSeverity::High,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            LabError::IoError(_) => {
                "Check that the lab directory exists and is writable".to_string()
            }
            LabError::HttpError(_) | LabError::DownloadError { .. } => {
                "Check the network connection and the remote URL, then re-run the installer"
                    .to_string()
            }
            LabError::ZipError(_) => {
                "The downloaded archive looks corrupt, delete it and re-run to download again"
                    .to_string()
            }
            LabError::SerializationError(_) => {
                "The remote service returned unexpected data, try again later".to_string()
            }
            LabError::ConfigValidationError { field, .. }
            | LabError::InvalidConfigValueError { field, .. }
            | LabError::MissingConfigError { field } => {
                format!("Fix the '{}' entry in the lab profile", field)
            }
            LabError::CommandError { program, .. } => {
                format!(
                    "Make sure '{}' is installed and on PATH, then re-run the installer",
                    program
                )
            }
            LabError::StepError { step, .. } => {
                format!("Re-run the installer; already completed work before '{}' is skipped", step)
            }
            LabError::ServiceError { service, .. } => {
                format!("Start '{}' manually or re-run the installer", service)
            }
            LabError::VerificationError { .. } => {
                "Re-run the installer to retry the missing artifacts".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            LabError::DownloadError { url, .. } => {
                format!("Could not download a required file from {}", url)
            }
            LabError::StepError { step, details } => {
                format!("Provisioning step '{}' failed: {}", step, details)
            }
            LabError::VerificationError { artifact } => {
                format!("The lab is incomplete: '{}' is missing", artifact)
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LabError>;
