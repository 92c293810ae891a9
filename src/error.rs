use thiserror::Error;

/// Main error type for the Mask-Compositor library
#[derive(Error, Debug)]
pub enum CompositorError {
    #[error("Frame source error: {0}")]
    Source(#[from] SourceError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Effect processing error: {0}")]
    Effect(#[from] EffectError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Frame-source-specific errors
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to open source: {path}")]
    OpenFailed { path: String },

    #[error("Failed to probe source metadata: {path} - {reason}")]
    ProbeFailed { path: String, reason: String },

    #[error("Failed to decode frame {index}: {reason}")]
    DecodeFailed { index: i64, reason: String },

    #[error("Unsupported source format: {path}")]
    UnsupportedFormat { path: String },

    #[error("Invalid source parameters: {details}")]
    InvalidParameters { details: String },
}

/// Render-loop and encoder errors
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Composition has no drawable layers")]
    NoDrawableLayers,

    #[error("Invalid output parameters: {details}")]
    InvalidParameters { details: String },

    #[error("Video encoding failed: {reason}")]
    EncodingFailed { reason: String },
}

/// Effect configuration and processing errors
#[derive(Error, Debug)]
pub enum EffectError {
    #[error("Invalid effect target key: {key}")]
    InvalidTarget { key: String },

    #[error("Invalid color value: {value}")]
    InvalidColor { value: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Failed to parse project file: {path} - {reason}")]
    ProjectParseFailed { path: String, reason: String },
}

/// Convenience type alias for Results using CompositorError
pub type Result<T> = std::result::Result<T, CompositorError>;

impl CompositorError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Source(SourceError::OpenFailed { path }) => {
                format!(
                    "Could not open source '{}'. Please check the file exists and is a supported format.",
                    path
                )
            }
            Self::Render(RenderError::EncodingFailed { .. }) => {
                "Video encoding failed. Please check that FFmpeg is installed and on PATH.".to_string()
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}
