//! Fault-injectable engine that counts every resource it hands out

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use asr::{
    CompiledHotword, DecoderParams, DecoderResource, EngineError, HotwordEmbedding, InferenceInput, OfflineEngine,
    RecognitionOutput,
};
use async_trait::async_trait;

/// How an inference call misbehaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    None,
    /// The call itself fails
    Throw,
    /// The call succeeds without a result
    Null,
    /// The result's transcript cannot be read
    BrokenText,
    /// The sentence timestamps are not valid JSON
    BadStampSents,
}

/// Resource accounting shared with the test
#[derive(Debug, Default)]
pub struct EngineStats {
    pub inferences: AtomicUsize,
    pub hotword_compiles: AtomicUsize,
    pub decoders_acquired: AtomicUsize,
    pub decoders_released: AtomicUsize,
    pub results_freed: AtomicUsize,
    pub shutdowns: AtomicUsize,
}

impl EngineStats {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// What the engine saw for one inference call
#[derive(Debug, Clone)]
pub struct RecordedInput {
    pub pcm: Vec<u8>,
    pub sample_rate_hz: u32,
    pub hotword_phrases: Vec<String>,
    pub apply_itn: bool,
    pub had_decoder: bool,
    pub post_process_language: String,
    pub post_process_itn: bool,
}

pub struct StubEngine {
    transcript: String,
    fault: Fault,
    delay: Option<Duration>,
    offers_decoder: bool,
    fail_hotwords: bool,
    stats: Arc<EngineStats>,
    inputs: Mutex<Vec<RecordedInput>>,
}

impl StubEngine {
    pub fn new(transcript: &str) -> Self {
        Self {
            transcript: transcript.to_owned(),
            fault: Fault::None,
            delay: None,
            offers_decoder: false,
            fail_hotwords: false,
            stats: Arc::new(EngineStats::default()),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.fault = fault;
        self
    }

    /// Sleep inside every inference call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Hand out a decoder resource when asked for one
    pub fn with_decoder(mut self) -> Self {
        self.offers_decoder = true;
        self
    }

    pub fn failing_hotwords(mut self) -> Self {
        self.fail_hotwords = true;
        self
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn inputs(&self) -> Vec<RecordedInput> {
        self.inputs.lock().unwrap().clone()
    }

    pub fn last_input(&self) -> RecordedInput {
        self.inputs().pop().expect("engine was never called")
    }
}

struct StubDecoder(Arc<EngineStats>);

impl DecoderResource for StubDecoder {
    fn release(self: Box<Self>) {
        self.0.decoders_released.fetch_add(1, Ordering::SeqCst);
    }
}

struct StubOutput {
    transcript: String,
    fault: Fault,
    stats: Arc<EngineStats>,
}

impl RecognitionOutput for StubOutput {
    fn text(&self) -> Result<String, EngineError> {
        if self.fault == Fault::BrokenText {
            return Err(EngineError::InvalidOutput("transcript buffer missing".to_owned()));
        }
        Ok(self.transcript.clone())
    }

    fn timestamp(&self) -> Option<String> {
        Some("[[0,120],[120,480]]".to_owned())
    }

    fn stamp_sents(&self) -> Option<String> {
        if self.fault == Fault::BadStampSents {
            return Some("[{\"text_seg\": ".to_owned());
        }
        Some(
            serde_json::json!([{"text_seg": self.transcript, "punc": "", "start": 0, "end": 480, "ts_list": [[0, 120], [120, 480]]}])
                .to_string(),
        )
    }

    fn release(self: Box<Self>) {
        self.stats.results_freed.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl OfflineEngine for StubEngine {
    fn name(&self) -> &str {
        "stub"
    }

    fn compile_hotwords(&self, hotwords: &str) -> Result<HotwordEmbedding, EngineError> {
        self.stats.hotword_compiles.fetch_add(1, Ordering::SeqCst);

        if self.fail_hotwords {
            return Err(EngineError::Hotwords("vocabulary not loaded".to_owned()));
        }

        HotwordEmbedding::new(
            hotwords
                .split_whitespace()
                .map(|phrase| CompiledHotword {
                    phrase: phrase.to_owned(),
                    vector: vec![0.25; 8],
                })
                .collect(),
        )
    }

    fn create_decoder(&self, _params: &DecoderParams) -> Option<Box<dyn DecoderResource>> {
        if !self.offers_decoder {
            return None;
        }
        self.stats.decoders_acquired.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(StubDecoder(Arc::clone(&self.stats))))
    }

    async fn infer(&self, input: InferenceInput<'_>) -> Result<Option<Box<dyn RecognitionOutput>>, EngineError> {
        self.stats.inferences.fetch_add(1, Ordering::SeqCst);

        self.inputs.lock().unwrap().push(RecordedInput {
            pcm: input.pcm.to_vec(),
            sample_rate_hz: input.sample_rate_hz,
            hotword_phrases: input.hotwords.iter().map(|entry| entry.phrase.clone()).collect(),
            apply_itn: input.apply_itn,
            had_decoder: input.decoder.is_some(),
            post_process_language: input.post_process_language.to_owned(),
            post_process_itn: input.post_process_itn,
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.fault {
            Fault::Throw => Err(EngineError::Unavailable("model crashed".to_owned())),
            Fault::Null => Ok(None),
            Fault::None | Fault::BrokenText | Fault::BadStampSents => Ok(Some(Box::new(StubOutput {
                transcript: self.transcript.clone(),
                fault: self.fault,
                stats: Arc::clone(&self.stats),
            }))),
        }
    }

    fn shutdown(&self) {
        self.stats.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}
