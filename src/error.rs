use thiserror::Error;

use crate::pipeline::Step;

#[derive(Debug, Error)]
pub enum RoundTripError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    TemplateBinding(#[from] TemplateBindingError),

    #[error("{step} step failed: {source}")]
    Generation {
        step: Step,
        #[source]
        source: GenerationError,
    },
}

impl RoundTripError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

/// Supplied bindings did not match the slots a template declares.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "template {template} binding mismatch (missing: [{}], unexpected: [{}], duplicate: [{}])",
    .missing.join(", "),
    .unexpected.join(", "),
    .duplicate.join(", ")
)]
pub struct TemplateBindingError {
    pub template: String,
    pub missing: Vec<String>,
    pub unexpected: Vec<String>,
    /// Slots bound more than once.
    pub duplicate: Vec<String>,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("authentication rejected (status {status}): {body}")]
    Authentication { status: u16, body: String },

    #[error("rate limit or quota exhausted (status {status}): {body}")]
    RateLimited { status: u16, body: String },

    #[error("generation service returned error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("malformed generation response: {0}")]
    MalformedResponse(String),
}

impl GenerationError {
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::Authentication { status, body },
            429 => Self::RateLimited { status, body },
            _ => Self::Api { status, body },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(matches!(
            GenerationError::from_status(401, String::new()),
            GenerationError::Authentication { status: 401, .. }
        ));
        assert!(matches!(
            GenerationError::from_status(403, String::new()),
            GenerationError::Authentication { .. }
        ));
        assert!(matches!(
            GenerationError::from_status(429, String::new()),
            GenerationError::RateLimited { .. }
        ));
        assert!(matches!(
            GenerationError::from_status(500, "boom".into()),
            GenerationError::Api { status: 500, .. }
        ));
    }

    #[test]
    fn binding_error_lists_slots() {
        let err = TemplateBindingError {
            template: "refine".into(),
            missing: vec!["analysis".into()],
            unexpected: vec!["phrase".into(), "extra".into()],
            duplicate: vec!["quebecois".into()],
        };
        assert_eq!(
            err.to_string(),
            "template refine binding mismatch \
             (missing: [analysis], unexpected: [phrase, extra], duplicate: [quebecois])"
        );
    }

    #[test]
    fn generation_error_names_step() {
        let err = RoundTripError::Generation {
            step: Step::Analyze,
            source: GenerationError::Http("connection reset".into()),
        };
        assert_eq!(
            err.to_string(),
            "analyze step failed: HTTP client error: connection reset"
        );
    }
}
