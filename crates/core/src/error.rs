#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Unsupported target type: {0}")]
    UnsupportedTargetType(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Validation failed: {0}")]
    Validation(String),
}
