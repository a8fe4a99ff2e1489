/// Failures that reach the caller of the annotation pipeline.
///
/// Per-annotation problems never surface here; those are dropped with a
/// [`DropReason`](crate::annotations::DropReason) and the batch carries on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Text is empty")]
    EmptyText,
    #[error("Text is too long to check: {len} characters (max {max})")]
    TextTooLong { len: usize, max: usize },
    #[error("Annotation check failed: {0}")]
    CheckFailed(String),
    #[error("Malformed annotator response: {0}")]
    MalformedResponse(String),
}

impl EngineError {
    /// Input rejections are reported synchronously and never reach the annotator.
    pub fn is_input_rejection(&self) -> bool {
        matches!(self, EngineError::EmptyText | EngineError::TextTooLong { .. })
    }
}
