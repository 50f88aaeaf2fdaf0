use crate::engine::{DecoderParams, DecoderResource, OfflineEngine};

/// Scoped ownership of an optional decoder resource
///
/// The resource is released exactly once: by [`DecoderGuard::release`] or,
/// on any other exit path, when the guard is dropped.
pub struct DecoderGuard {
    resource: Option<Box<dyn DecoderResource>>,
}

impl DecoderGuard {
    /// Acquire a decoder when `params` is given
    ///
    /// An engine that offers no decoder yields an empty guard; inference then
    /// runs without one.
    pub fn acquire(engine: &dyn OfflineEngine, params: Option<&DecoderParams>) -> Self {
        let resource = params.and_then(|params| engine.create_decoder(params));

        if params.is_some() && resource.is_none() {
            tracing::debug!(engine = engine.name(), "no decoder resource available");
        }

        Self { resource }
    }

    pub fn resource(&self) -> Option<&dyn DecoderResource> {
        self.resource.as_deref()
    }

    pub fn is_acquired(&self) -> bool {
        self.resource.is_some()
    }

    /// Release the resource now
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(resource) = self.resource.take() {
            resource.release();
        }
    }
}

impl Drop for DecoderGuard {
    fn drop(&mut self) {
        self.release_inner();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::engine::testing::{Behavior, TestEngine};

    fn engine_with_decoder() -> TestEngine {
        let mut engine = TestEngine::new(Behavior::Null);
        engine.offers_decoder = true;
        engine
    }

    #[test]
    fn explicit_release_happens_once() {
        let engine = engine_with_decoder();

        let guard = DecoderGuard::acquire(&engine, Some(&DecoderParams::default()));
        assert!(guard.is_acquired());
        guard.release();

        assert_eq!(engine.counters.decoders_acquired.load(Ordering::SeqCst), 1);
        assert_eq!(engine.counters.decoders_released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_releases() {
        let engine = engine_with_decoder();

        {
            let _guard = DecoderGuard::acquire(&engine, Some(&DecoderParams::default()));
        }

        assert_eq!(engine.counters.decoders_released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn no_params_acquires_nothing() {
        let engine = engine_with_decoder();

        let guard = DecoderGuard::acquire(&engine, None);
        assert!(!guard.is_acquired());
        drop(guard);

        assert_eq!(engine.counters.decoders_acquired.load(Ordering::SeqCst), 0);
        assert_eq!(engine.counters.decoders_released.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn engine_without_decoder_yields_empty_guard() {
        let engine = TestEngine::new(Behavior::Null);

        let guard = DecoderGuard::acquire(&engine, Some(&DecoderParams::default()));
        assert!(guard.resource().is_none());
    }
}
