//! Turn engine event loop
//!
//! One task owns the [`TurnMachine`] and both controllers. Recognizer
//! callbacks, generation and playback completions, retry timers and host
//! commands all arrive over channels and are applied one at a time, so no
//! two transitions ever interleave.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::machine::{Effect, EndReason, MachineConfig, TurnMachine, TurnState};
use crate::response::{Reply, ResponseGenerator};
use crate::session::{ConversationMessage, SessionContext, SessionStore};
use crate::voice::{
    CaptureError, CaptureEvent, PlaybackOutcome, SpeechCaptureController,
    SpeechSynthesisController, TaggedRecognizerEvent,
};
use crate::{Error, Result};

/// Notifications for the host
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The turn state changed
    StateChanged(TurnState),
    /// Partial user transcript, for live captions
    InterimTranscript(String),
    /// A message joined the conversation history
    MessageAppended(ConversationMessage),
    /// Capture failed; the session is ending
    CaptureFailed(CaptureError),
    /// A reply could not be spoken; the engine listens again
    SynthesisFailed(String),
    /// The session is over
    Ended { reason: EndReason, summary: String },
}

/// External collaborators the engine drives
pub struct EngineParts {
    pub capture: SpeechCaptureController,
    pub synthesis: SpeechSynthesisController,
    pub generator: Arc<ResponseGenerator>,
    pub store: Arc<dyn SessionStore>,
}

enum Command {
    End,
}

/// Completions posted back into the loop
enum Completion {
    Generated { epoch: u64, reply: Box<Reply> },
    Played { epoch: u64, result: Result<PlaybackOutcome> },
    CaptureDue { epoch: u64 },
}

enum PersistJob {
    Append(ConversationMessage),
    End { summary: String, duration_minutes: u32 },
}

/// Handle to a running conversation
pub struct TurnEngine {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<TurnState>,
    task: JoinHandle<()>,
}

impl TurnEngine {
    /// Start a session and return the engine with its event stream
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(
        session: SessionContext,
        parts: EngineParts,
        config: MachineConfig,
    ) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(TurnState::Starting);
        let (recognizer_tx, recognizer_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        let persist = spawn_persistence(session.session_id.clone(), Arc::clone(&parts.store));

        let event_loop = EventLoop {
            machine: TurnMachine::new(session, config),
            capture: parts.capture,
            synthesis: parts.synthesis,
            generator: parts.generator,
            events: events_tx,
            state: state_tx,
            published: TurnState::Starting,
            recognizer_tx,
            completions_tx,
            persist: persist.jobs,
            generation: None,
            playback: None,
            sweeper: None,
        };

        let task = tokio::spawn(async move {
            event_loop.run(commands_rx, recognizer_rx, completions_rx).await;
            if let Err(e) = persist.task.await {
                tracing::warn!(error = %e, "session persistence task failed");
            }
        });

        let engine = Self {
            commands: commands_tx,
            state: state_rx,
            task,
        };
        (engine, events_rx)
    }

    /// Current turn state
    #[must_use]
    pub fn state(&self) -> TurnState {
        *self.state.borrow()
    }

    /// Watch turn state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TurnState> {
        self.state.clone()
    }

    /// Request the session to end; safe to call repeatedly
    pub fn end(&self) {
        // Loop already gone means the session already ended
        let _ = self.commands.send(Command::End);
    }

    /// Wait for the session to end and its records to be written
    ///
    /// # Errors
    ///
    /// Returns error if the engine task panicked
    pub async fn join(self) -> Result<()> {
        self.task.await.map_err(|e| {
            tracing::error!(error = %e, "turn engine task failed");
            Error::EngineStopped
        })
    }
}

struct Persistence {
    jobs: mpsc::UnboundedSender<PersistJob>,
    task: JoinHandle<()>,
}

/// Write session records in order on a dedicated task
fn spawn_persistence(session_id: String, store: Arc<dyn SessionStore>) -> Persistence {
    let (jobs, mut rx) = mpsc::unbounded_channel::<PersistJob>();

    let task = tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            match job {
                PersistJob::Append(message) => {
                    if let Err(e) = store.append_messages(&session_id, &[message]).await {
                        tracing::warn!(session_id, error = %e, "failed to persist message");
                    }
                }
                PersistJob::End {
                    summary,
                    duration_minutes,
                } => {
                    if let Err(e) = store
                        .end_session(&session_id, &summary, duration_minutes)
                        .await
                    {
                        tracing::warn!(session_id, error = %e, "failed to close session");
                    }
                }
            }
        }
    });

    Persistence { jobs, task }
}

struct EventLoop {
    machine: TurnMachine,
    capture: SpeechCaptureController,
    synthesis: SpeechSynthesisController,
    generator: Arc<ResponseGenerator>,
    events: mpsc::UnboundedSender<EngineEvent>,
    state: watch::Sender<TurnState>,
    /// Last state announced to the host
    published: TurnState,
    recognizer_tx: mpsc::UnboundedSender<TaggedRecognizerEvent>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    persist: mpsc::UnboundedSender<PersistJob>,
    generation: Option<JoinHandle<()>>,
    playback: Option<JoinHandle<()>>,
    sweeper: Option<JoinHandle<()>>,
}

impl EventLoop {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut recognizer: mpsc::UnboundedReceiver<TaggedRecognizerEvent>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        self.sweeper = Some(self.generator.spawn_sweeper());
        let effects = self.machine.start();
        self.apply(effects);

        while self.machine.state() != TurnState::Ended {
            let silence = self.capture.silence_deadline();

            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::End) => tracing::debug!("end requested"),
                    None => tracing::debug!("engine handle dropped, ending session"),
                },
                Some(tagged) = recognizer.recv() => {
                    let epoch = tagged.epoch;
                    if let Some(event) = self.capture.handle(tagged, Instant::now()) {
                        self.on_capture_event(epoch, event);
                    }
                    continue;
                }
                Some(completion) = completions.recv() => {
                    self.on_completion(completion);
                    continue;
                }
                () = sleep_until(silence) => {
                    if let (Some(epoch), Some(event)) =
                        (self.capture.epoch(), self.capture.on_silence(Instant::now()))
                    {
                        self.on_capture_event(epoch, event);
                    }
                    continue;
                }
            }

            // Only the command branch falls through
            let effects = self.machine.end();
            self.apply(effects);
        }

        self.shutdown();
    }

    fn on_capture_event(&mut self, epoch: u64, event: CaptureEvent) {
        match event {
            CaptureEvent::Interim(transcript) => {
                self.emit(EngineEvent::InterimTranscript(transcript.text));
            }
            CaptureEvent::Final(transcript) => {
                let effects = self.machine.on_final_transcript(epoch, &transcript.text);
                let discarded = effects.is_empty();
                self.apply(effects);

                // A discarded utterance from a session that already ended
                // leaves nobody listening
                if discarded && !self.capture.is_active() {
                    let effects = self.machine.on_capture_restart(epoch, Duration::ZERO);
                    self.apply(effects);
                }
            }
            CaptureEvent::Restart { delay, .. } => {
                let effects = self.machine.on_capture_restart(epoch, delay);
                self.apply(effects);
            }
            CaptureEvent::Failed(error) => {
                let effects = self.machine.on_capture_failed(epoch, error);
                self.apply(effects);
            }
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Generated { epoch, reply } => {
                tracing::debug!(epoch, source = reply.source.as_str(), "reply ready");
                let effects = self.machine.on_generation_complete(epoch, *reply);
                self.apply(effects);
            }
            Completion::Played { epoch, result } => {
                if let Err(e) = result
                    && epoch == self.machine.epoch()
                {
                    tracing::warn!(epoch, error = %e, "playback failed");
                    self.emit(EngineEvent::SynthesisFailed(e.to_string()));
                }
                let effects = self.machine.on_playback_complete(epoch);
                self.apply(effects);
            }
            Completion::CaptureDue { epoch } => {
                if epoch == self.machine.epoch() {
                    self.arm(epoch);
                } else {
                    tracing::debug!(epoch, "dropping stale capture timer");
                }
            }
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            self.execute(effect);
        }
        self.publish_state();
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::StartCapture { epoch, delay } => {
                if delay.is_zero() {
                    self.arm(epoch);
                } else {
                    let tx = self.completions_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(Completion::CaptureDue { epoch });
                    });
                }
            }
            Effect::StopCapture => self.capture.stop(),
            Effect::Generate {
                epoch,
                message,
                session,
            } => {
                let generator = Arc::clone(&self.generator);
                let tx = self.completions_tx.clone();
                self.generation = Some(tokio::spawn(async move {
                    let reply = generator.generate(&message, &session).await;
                    let _ = tx.send(Completion::Generated {
                        epoch,
                        reply: Box::new(reply),
                    });
                }));
            }
            Effect::Speak {
                epoch,
                reply,
                persona,
            } => {
                let synthesis = self.synthesis.clone();
                let tx = self.completions_tx.clone();
                self.playback = Some(tokio::spawn(async move {
                    let result = synthesis.speak(&reply.text, &persona, reply.emotion).await;
                    let _ = tx.send(Completion::Played { epoch, result });
                }));
            }
            Effect::StopPlayback => self.synthesis.stop(),
            Effect::Persist(message) => {
                self.emit(EngineEvent::MessageAppended(message.clone()));
                let _ = self.persist.send(PersistJob::Append(message));
            }
            Effect::Finish {
                reason,
                summary,
                duration_minutes,
            } => {
                self.capture.stop();
                if let EndReason::CaptureFailed(error) = &reason {
                    self.emit(EngineEvent::CaptureFailed(error.clone()));
                }
                let _ = self.persist.send(PersistJob::End {
                    summary: summary.clone(),
                    duration_minutes,
                });
                self.publish_state();
                self.emit(EngineEvent::Ended { reason, summary });
            }
        }
    }

    fn arm(&mut self, epoch: u64) {
        match self.capture.listen(epoch, self.recognizer_tx.clone()) {
            Ok(()) => {
                let effects = self.machine.on_capture_armed(epoch);
                self.apply(effects);
            }
            Err(event) => self.on_capture_event(epoch, event),
        }
    }

    fn publish_state(&mut self) {
        let state = self.machine.state();
        if state != self.published {
            self.published = state;
            self.state.send_replace(state);
            self.emit(EngineEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: EngineEvent) {
        // Host may have stopped listening
        let _ = self.events.send(event);
    }

    fn shutdown(&mut self) {
        if let Some(task) = self.generation.take() {
            task.abort();
        }
        if let Some(task) = self.playback.take() {
            task.abort();
        }
        if let Some(task) = self.sweeper.take() {
            task.abort();
        }
        self.capture.stop();
        tracing::debug!("turn engine stopped");
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
