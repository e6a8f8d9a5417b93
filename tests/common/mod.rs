//! Shared test utilities

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};

use colloquy::context::Prompt;
use colloquy::response::{GeneratorConfig, ResponseCache};
use colloquy::session::{MemorySessionStore, Scenario};
use colloquy::voice::{
    CaptureConfig, RecognizerConfig, RecognizerError, RecognizerSink, SpeechRecognizer,
    SpeechSynthesizer, SynthesisError, Utterance, VoiceTable,
};
use colloquy::{
    Config, EngineEvent, EngineParts, Persona, ResponseGenerator, SessionContext,
    SpeechCaptureController, SpeechSynthesisController, TextGenerator, TurnState,
};

/// Shared view of a [`MockRecognizer`], used to speak into the engine
#[derive(Default)]
pub struct RecognizerHandle {
    inner: Mutex<RecognizerInner>,
}

#[derive(Default)]
struct RecognizerInner {
    sink: Option<RecognizerSink>,
    starts: usize,
    refuse: Option<String>,
}

impl RecognizerHandle {
    /// Sink of the running recognition session
    pub fn sink(&self) -> RecognizerSink {
        self.inner
            .lock()
            .unwrap()
            .sink
            .clone()
            .expect("recognizer is not listening")
    }

    pub fn interim(&self, text: &str) {
        self.sink().result(text, false, 0.9);
    }

    pub fn say(&self, text: &str) {
        self.sink().result(text, true, 0.95);
    }

    pub fn fail(&self, code: &str) {
        self.sink().error(code);
    }

    pub fn is_listening(&self) -> bool {
        self.inner.lock().unwrap().sink.is_some()
    }

    /// How many times the recognizer was started
    pub fn starts(&self) -> usize {
        self.inner.lock().unwrap().starts
    }

    /// Make every later start fail with `code`
    pub fn refuse_with(&self, code: &str) {
        self.inner.lock().unwrap().refuse = Some(code.to_string());
    }
}

/// Recognizer driven from the test through a [`RecognizerHandle`]
pub struct MockRecognizer {
    handle: Arc<RecognizerHandle>,
}

impl SpeechRecognizer for MockRecognizer {
    fn start(
        &mut self,
        _config: &RecognizerConfig,
        sink: RecognizerSink,
    ) -> Result<(), RecognizerError> {
        let mut inner = self.handle.inner.lock().unwrap();
        inner.starts += 1;
        if let Some(code) = &inner.refuse {
            return Err(RecognizerError::new(code.clone(), "refused by test"));
        }
        inner.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        self.handle.inner.lock().unwrap().sink = None;
    }
}

/// Synthesizer that records utterances and "speaks" for a fixed time
pub struct MockSynthesizer {
    delay: Duration,
    failure: Option<String>,
    spoken: Mutex<Vec<Utterance>>,
    cancel: Notify,
}

impl MockSynthesizer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            failure: None,
            spoken: Mutex::new(Vec::new()),
            cancel: Notify::new(),
        }
    }

    /// Every playback fails with `reason` after the delay
    pub fn failing(delay: Duration, reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Self::new(delay)
        }
    }

    pub fn spoken(&self) -> Vec<Utterance> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn speak(&self, utterance: Utterance) -> Result<(), SynthesisError> {
        self.spoken.lock().unwrap().push(utterance);
        let cancelled = self.cancel.notified();
        tokio::select! {
            () = tokio::time::sleep(self.delay) => match &self.failure {
                Some(reason) => Err(SynthesisError::Failed(reason.clone())),
                None => Ok(()),
            },
            () = cancelled => Err(SynthesisError::Interrupted),
        }
    }

    fn cancel(&self) {
        self.cancel.notify_waiters();
    }
}

/// Text generator with a fixed reply and a configurable latency
pub struct MockGenerator {
    reply: String,
    delay: Duration,
    calls: AtomicUsize,
    prompts: Mutex<Vec<Prompt>>,
}

impl MockGenerator {
    pub fn new(reply: &str, delay: Duration) -> Self {
        Self {
            reply: reply.to_string(),
            delay,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, prompt: &Prompt) -> colloquy::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.clone());
        tokio::time::sleep(self.delay).await;
        Ok(self.reply.clone())
    }
}

/// Mocks wired into [`EngineParts`]
pub struct Harness {
    pub recognizer: Arc<RecognizerHandle>,
    pub synthesizer: Arc<MockSynthesizer>,
    pub generator: Arc<MockGenerator>,
    pub store: Arc<MemorySessionStore>,
    pub parts: EngineParts,
}

impl Harness {
    pub fn new(synthesizer: MockSynthesizer, generator: MockGenerator) -> Self {
        let recognizer = Arc::new(RecognizerHandle::default());
        let synthesizer = Arc::new(synthesizer);
        let generator = Arc::new(generator);
        let store = Arc::new(MemorySessionStore::new());

        let parts = EngineParts {
            capture: SpeechCaptureController::new(
                Box::new(MockRecognizer {
                    handle: Arc::clone(&recognizer),
                }),
                CaptureConfig::default(),
            ),
            synthesis: SpeechSynthesisController::new(
                Arc::clone(&synthesizer) as Arc<dyn SpeechSynthesizer>,
                VoiceTable::default(),
            ),
            generator: Arc::new(ResponseGenerator::new(
                Arc::clone(&generator) as Arc<dyn TextGenerator>,
                ResponseCache::new(Duration::from_secs(300), 100),
                GeneratorConfig::default(),
            )),
            store: Arc::clone(&store) as Arc<dyn colloquy::SessionStore>,
        };

        Self {
            recognizer,
            synthesizer,
            generator,
            store,
            parts,
        }
    }

    /// Quick replies, short playback
    pub fn quick(reply: &str) -> Self {
        Self::new(
            MockSynthesizer::new(Duration::from_millis(500)),
            MockGenerator::new(reply, Duration::from_millis(100)),
        )
    }
}

/// A cafe session with the embedded barista persona
pub fn cafe_session() -> SessionContext {
    let scenario: Scenario = Config::load_embedded_scenario("cafe-order").expect("scenario");
    let persona: Persona = Config::load_embedded_persona("maya").expect("persona");
    SessionContext::new(scenario, persona, 200, 10)
}

/// Receive events until one matches, failing if none arrives in time
pub async fn wait_for<F>(
    events: &mut mpsc::UnboundedReceiver<EngineEvent>,
    mut pred: F,
) -> EngineEvent
where
    F: FnMut(&EngineEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            let event = events.recv().await.expect("engine event stream closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for engine event")
}

pub async fn wait_for_state(events: &mut mpsc::UnboundedReceiver<EngineEvent>, state: TurnState) {
    wait_for(events, |e| matches!(e, EngineEvent::StateChanged(s) if *s == state)).await;
}
