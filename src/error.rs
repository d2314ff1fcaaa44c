//! Error types for kernel synthesis.

use thiserror::Error;

use crate::frontend::FrontendError;

/// Result type alias using the synthesis error.
pub type Result<T> = std::result::Result<T, SynthError>;

/// Errors raised while synthesizing a reduction kernel.
///
/// Everything except `Frontend` is raised before a single statement of the
/// kernel tree is built, so no partial artifact exists.
#[derive(Error, Debug)]
pub enum SynthError {
    /// More parallel dimensions than the device index space provides.
    #[error("unsupported configuration: {requested} parallel dimensions (at most {max})")]
    UnsupportedDimensions { requested: usize, max: usize },

    /// A reduction operator outside the supported set.
    #[error("unsupported reduction operator '{op}' for variable '{var}'")]
    UnsupportedOperator { var: String, op: String },

    /// Work-group size must be a positive power of two.
    #[error("invalid work-group size {size}: must be a positive power of two")]
    InvalidWorkGroupSize { size: u32 },

    /// The description is structurally inconsistent.
    #[error("invalid reduction description: {0}")]
    InvalidDescription(String),

    /// A kernel, parameter or index name that cannot appear in kernel text.
    #[error("'{name}' is not a valid {role} identifier")]
    InvalidIdentifier { name: String, role: &'static str },

    /// A caller-supplied name the kernel body assigns or calls itself.
    #[error("{role} '{name}' is reserved for generated code")]
    ReservedName { name: String, role: &'static str },

    /// No kernel argument is correlated with the reduction variable.
    #[error("reduction variable '{var}' has no output argument")]
    MissingOutput { var: String },

    /// No lowering exists for the requested target.
    #[error("unknown kernel target '{0}'")]
    UnknownTarget(String),

    /// The front end rejected the generated kernel.
    #[error("front end rejected kernel: {source}")]
    Frontend {
        #[source]
        source: FrontendError,
        /// Generated kernel text, kept for diagnosis.
        text: String,
    },

    /// A description file could not be parsed.
    #[error("failed to parse description: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl SynthError {
    /// The generated kernel text attached to a front-end failure.
    pub fn kernel_text(&self) -> Option<&str> {
        match self {
            SynthError::Frontend { text, .. } => Some(text),
            _ => None,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        SynthError::InvalidDescription(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let e = SynthError::UnsupportedDimensions {
            requested: 4,
            max: 3,
        };
        assert_eq!(
            e.to_string(),
            "unsupported configuration: 4 parallel dimensions (at most 3)"
        );
        let e = SynthError::UnsupportedOperator {
            var: "acc".into(),
            op: "max".into(),
        };
        assert_eq!(
            e.to_string(),
            "unsupported reduction operator 'max' for variable 'acc'"
        );
    }

    #[test]
    fn test_kernel_text_only_on_frontend_errors() {
        let e = SynthError::Frontend {
            source: FrontendError::UndefinedName { name: "n".into() },
            text: "def k():\n".into(),
        };
        assert_eq!(e.kernel_text(), Some("def k():\n"));
        assert!(SynthError::invalid("x").kernel_text().is_none());
    }

    #[test]
    fn test_reserved_name_message() {
        let e = SynthError::ReservedName {
            name: "j".into(),
            role: "index variable",
        };
        assert_eq!(
            e.to_string(),
            "index variable 'j' is reserved for generated code"
        );
    }
}
