/// Core error types for the vrlink viewer.
use std::fmt;

/// A specialized Result type for vrlink operations.
pub type StereoResult<T> = Result<T, StereoError>;

/// The stage of render-context creation that failed.
///
/// Stages follow the order in which a display connection, configuration,
/// surface and context are brought up, so logs name the exact step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextStage {
    /// Opening the display connection (graphics instance).
    Display,
    /// Choosing a configuration with the requested color/depth/multisample attributes.
    ChooseConfig,
    /// Creating the drawing surface from the host's native window.
    CreateSurface,
    /// Creating the graphics context (device + queue).
    CreateContext,
    /// Binding the context to the surface on the calling thread.
    MakeCurrent,
    /// Enabling vertical-sync pacing.
    SwapInterval,
}

impl fmt::Display for ContextStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContextStage::Display => "display",
            ContextStage::ChooseConfig => "choose-config",
            ContextStage::CreateSurface => "create-surface",
            ContextStage::CreateContext => "create-context",
            ContextStage::MakeCurrent => "make-current",
            ContextStage::SwapInterval => "swap-interval",
        };
        f.write_str(name)
    }
}

/// Top-level error type encompassing every vrlink subsystem.
#[derive(Debug, thiserror::Error)]
pub enum StereoError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("upload error: {0}")]
    Upload(String),

    #[error("present error: {0}")]
    Present(String),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("render context error at {stage}: {message}")]
    Context { stage: ContextStage, message: String },

    #[error("packet error: {0}")]
    Packet(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config file error: {0}")]
    Config(#[from] toml::de::Error),
}

impl StereoError {
    /// Create a render-context error tagged with the failing stage.
    pub fn context(stage: ContextStage, message: impl Into<String>) -> Self {
        StereoError::Context {
            stage,
            message: message.into(),
        }
    }

    /// Whether the caller should log and carry on with the previous frame.
    pub fn is_transient(&self) -> bool {
        matches!(self, StereoError::Decode(_) | StereoError::Present(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_error_display_names_stage() {
        let err = StereoError::context(ContextStage::CreateSurface, "no native window");
        assert_eq!(
            err.to_string(),
            "render context error at create-surface: no native window"
        );
    }

    #[test]
    fn test_transient_errors() {
        assert!(StereoError::Decode("truncated".into()).is_transient());
        assert!(StereoError::Present("timeout".into()).is_transient());
        assert!(!StereoError::IllegalState("not attached".into()).is_transient());
        assert!(!StereoError::Configuration("zero width".into()).is_transient());
    }
}
