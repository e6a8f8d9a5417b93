//! Console speech adapters
//!
//! Let a session run in a terminal: typed lines stand in for recognized
//! speech and replies are printed with a simulated speaking time.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::voice::{
    RecognizerConfig, RecognizerError, RecognizerSink, SpeechRecognizer, SpeechSynthesizer,
    SynthesisError, Utterance,
};

/// Error code reported once input is closed
const INPUT_CLOSED: &str = "device-unavailable";

#[derive(Default)]
struct LineState {
    sink: Option<RecognizerSink>,
    closed: bool,
}

/// Recognizer that treats each input line as a final transcript
///
/// Lines typed while capture is stopped are dropped, the same way speech
/// is not heard while the character talks.
pub struct LineRecognizer {
    state: Arc<Mutex<LineState>>,
    reader: Option<JoinHandle<()>>,
}

impl LineRecognizer {
    /// Read lines from standard input
    ///
    /// Reads on a detached thread so a pending read never holds up shutdown.
    #[must_use]
    pub fn stdin() -> Self {
        let state = Arc::new(Mutex::new(LineState::default()));
        let shared = Arc::clone(&state);

        std::thread::spawn(move || {
            for line in std::io::stdin().lines() {
                match line {
                    Ok(line) => deliver(&shared, line),
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to read input");
                        break;
                    }
                }
            }
            close(&shared);
        });

        Self {
            state,
            reader: None,
        }
    }

    /// Read lines from any async reader
    #[must_use]
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let state = Arc::new(Mutex::new(LineState::default()));
        let shared = Arc::clone(&state);

        let reader = tokio::spawn(async move {
            let mut lines = reader.lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => deliver(&shared, line),
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to read input");
                        break;
                    }
                }
            }
            close(&shared);
        });

        Self {
            state,
            reader: Some(reader),
        }
    }
}

fn deliver(state: &Mutex<LineState>, line: String) {
    let sink = lock(state).sink.clone();
    match sink {
        Some(sink) => sink.result(line, true, 1.0),
        None => tracing::debug!("input while not listening, dropped"),
    }
}

fn close(state: &Mutex<LineState>) {
    let mut state = lock(state);
    state.closed = true;
    if let Some(sink) = state.sink.take() {
        sink.error(INPUT_CLOSED);
    }
    tracing::debug!("input closed");
}

impl Drop for LineRecognizer {
    fn drop(&mut self) {
        if let Some(reader) = &self.reader {
            reader.abort();
        }
    }
}

impl SpeechRecognizer for LineRecognizer {
    fn start(
        &mut self,
        _config: &RecognizerConfig,
        sink: RecognizerSink,
    ) -> Result<(), RecognizerError> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(RecognizerError::new(INPUT_CLOSED, "input stream closed"));
        }
        state.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        lock(&self.state).sink = None;
    }
}

fn lock(state: &Mutex<LineState>) -> std::sync::MutexGuard<'_, LineState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Speaking pace used to simulate playback time
const WORDS_PER_MINUTE: f32 = 180.0;

/// Synthesizer that prints utterances and waits as long as speaking would take
pub struct ConsoleSynthesizer<W = tokio::io::Stdout> {
    out: tokio::sync::Mutex<W>,
    cancel: Notify,
    pace: f32,
}

impl ConsoleSynthesizer {
    /// Print to standard output at a natural pace
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout(), 1.0)
    }
}

impl<W> ConsoleSynthesizer<W> {
    /// Print to `out`; `pace` scales the simulated speaking time (0 disables it)
    #[must_use]
    pub fn new(out: W, pace: f32) -> Self {
        Self {
            out: tokio::sync::Mutex::new(out),
            cancel: Notify::new(),
            pace,
        }
    }

    /// Simulated time to speak an utterance
    #[must_use]
    pub fn speaking_time(&self, utterance: &Utterance) -> Duration {
        #[allow(clippy::cast_precision_loss)]
        let words = utterance.text.split_whitespace().count() as f32;
        let rate = utterance.rate.max(0.1);
        Duration::from_secs_f32((words / (WORDS_PER_MINUTE * rate) * 60.0 * self.pace).max(0.0))
    }
}

#[async_trait]
impl<W> SpeechSynthesizer for ConsoleSynthesizer<W>
where
    W: AsyncWrite + Unpin + Send + Sync,
{
    async fn speak(&self, utterance: Utterance) -> Result<(), SynthesisError> {
        let line = format!(
            "[{} rate {:.2} pitch {:.2}] {}\n",
            utterance.voice, utterance.rate, utterance.pitch, utterance.text
        );
        {
            let mut out = self.out.lock().await;
            out.write_all(line.as_bytes())
                .await
                .map_err(|e| SynthesisError::Failed(e.to_string()))?;
            out.flush()
                .await
                .map_err(|e| SynthesisError::Failed(e.to_string()))?;
        }

        let cancelled = self.cancel.notified();
        tokio::select! {
            () = tokio::time::sleep(self.speaking_time(&utterance)) => Ok(()),
            () = cancelled => Err(SynthesisError::Interrupted),
        }
    }

    fn cancel(&self) {
        self.cancel.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::BufReader;
    use tokio::sync::mpsc;

    use super::*;
    use crate::voice::{RecognizerEvent, TaggedRecognizerEvent};

    fn utterance(text: &str) -> Utterance {
        Utterance {
            text: text.to_string(),
            voice: "nova".to_string(),
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            language: None,
        }
    }

    #[tokio::test]
    async fn lines_become_final_results_while_listening() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut recognizer = LineRecognizer::from_reader(BufReader::new(server));
        let (tx, mut rx) = mpsc::unbounded_channel();

        recognizer
            .start(&RecognizerConfig::default(), RecognizerSink::new(7, tx))
            .unwrap();
        client.write_all(b"hello there\n").await.unwrap();

        let TaggedRecognizerEvent { epoch, event } = rx.recv().await.unwrap();
        assert_eq!(epoch, 7);
        assert_eq!(
            event,
            RecognizerEvent::Result {
                text: "hello there".to_string(),
                is_final: true,
                confidence: 1.0,
            }
        );
    }

    #[tokio::test]
    async fn closed_input_reports_error_and_refuses_restart() {
        let (client, server) = tokio::io::duplex(64);
        let mut recognizer = LineRecognizer::from_reader(BufReader::new(server));
        let (tx, mut rx) = mpsc::unbounded_channel();

        recognizer
            .start(&RecognizerConfig::default(), RecognizerSink::new(1, tx.clone()))
            .unwrap();
        drop(client);

        let tagged = rx.recv().await.unwrap();
        assert_eq!(tagged.event, RecognizerEvent::Error(INPUT_CLOSED.to_string()));

        let err = recognizer
            .start(&RecognizerConfig::default(), RecognizerSink::new(2, tx))
            .unwrap_err();
        assert_eq!(err.code, INPUT_CLOSED);
    }

    #[tokio::test(start_paused = true)]
    async fn console_synthesizer_prints_and_waits() {
        let synth = ConsoleSynthesizer::new(Vec::new(), 1.0);
        let u = utterance("one two three");
        assert!((synth.speaking_time(&u).as_secs_f32() - 1.0).abs() < 1e-3);

        synth.speak(u).await.unwrap();
        let out = synth.out.lock().await;
        assert_eq!(
            String::from_utf8_lossy(&out),
            "[nova rate 1.00 pitch 1.00] one two three\n"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_playback() {
        let synth = Arc::new(ConsoleSynthesizer::new(Vec::new(), 1.0));
        let speaking = {
            let synth = Arc::clone(&synth);
            tokio::spawn(async move { synth.speak(utterance("a fairly long reply")).await })
        };

        // Let the speaker reach its wait
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        synth.cancel();

        assert_eq!(speaking.await.unwrap(), Err(SynthesisError::Interrupted));
    }
}
