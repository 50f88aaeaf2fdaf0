use crate::engine::{EngineError, InferenceInput, OfflineEngine, RecognitionOutput};

/// An engine result that is freed when dropped
pub struct InferenceResult {
    output: Option<Box<dyn RecognitionOutput>>,
}

impl InferenceResult {
    pub fn new(output: Box<dyn RecognitionOutput>) -> Self {
        Self { output: Some(output) }
    }

    pub fn output(&self) -> &dyn RecognitionOutput {
        // Only `release` and `drop` take the output, and both consume the guard
        self.output.as_deref().unwrap_or_else(|| unreachable!("result already released"))
    }

    /// Free the result now
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(output) = self.output.take() {
            output.release();
        }
    }
}

impl Drop for InferenceResult {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// Run one inference call
///
/// `Ok(None)` is the engine's null result; an `Err` is an invocation failure.
pub async fn infer(
    engine: &dyn OfflineEngine,
    input: InferenceInput<'_>,
) -> Result<Option<InferenceResult>, EngineError> {
    let output = engine.infer(input).await?;
    Ok(output.map(InferenceResult::new))
}
