use crate::{
    compose::ComposeError, encode::EncodeError, legacy::LegacyError, library::TemplateError,
    perspective::SceneError,
};

/// Caller-facing failure kinds.
///
/// Every module keeps its own error enum; this one folds them into the
/// outcomes a caller has to tell apart.
#[derive(thiserror::Error, Debug)]
pub enum MockupError {
    #[error("Template not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Compositing failed: {0}")]
    Compositing(String),
}

impl MockupError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn compositing(msg: impl Into<String>) -> Self {
        Self::Compositing(msg.into())
    }
}

impl From<TemplateError> for MockupError {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::NotFound(id) => Self::NotFound(id),
            other => Self::Compositing(other.to_string()),
        }
    }
}

impl From<ComposeError> for MockupError {
    fn from(err: ComposeError) -> Self {
        match err {
            ComposeError::Template(inner) => inner.into(),
            ComposeError::InvalidParameters(msg) => Self::Validation(msg),
            ComposeError::UndecodableDesign(_) => Self::Validation(err.to_string()),
            ComposeError::Encode(_) => Self::Compositing(err.to_string()),
        }
    }
}

impl From<LegacyError> for MockupError {
    fn from(err: LegacyError) -> Self {
        match err {
            LegacyError::MalformedDataUrl(_)
            | LegacyError::Base64(_)
            | LegacyError::UndecodableArtwork(_) => Self::Validation(err.to_string()),
            LegacyError::MockupAsset(_) | LegacyError::MockupImage(_) | LegacyError::Encode(_) => {
                Self::Compositing(err.to_string())
            }
        }
    }
}

impl From<SceneError> for MockupError {
    fn from(err: SceneError) -> Self {
        match err {
            SceneError::InvalidScene(_) | SceneError::UndecodableDesign(_) => {
                Self::Validation(err.to_string())
            }
            SceneError::Encode(_) | SceneError::Panicked(_) => Self::Compositing(err.to_string()),
        }
    }
}

impl From<EncodeError> for MockupError {
    fn from(err: EncodeError) -> Self {
        Self::Compositing(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_not_found_stays_not_found() {
        let err: MockupError = TemplateError::NotFound("nonexistent".to_string()).into();
        assert!(matches!(err, MockupError::NotFound(id) if id == "nonexistent"));
    }

    #[test]
    fn undecodable_design_is_a_validation_error() {
        let decode_err = image::load_from_memory(b"not an image").unwrap_err();
        let err: MockupError = ComposeError::UndecodableDesign(decode_err).into();
        assert!(matches!(err, MockupError::Validation(_)));
    }
}
