//! Turn-taking state machine
//!
//! Pure and I/O free: every transition returns the [`Effect`]s the driver
//! must carry out. Each capture arm, generation request and playback request
//! gets a fresh epoch; callers pass back the epoch their event belongs to and
//! anything that does not match the current epoch is ignored.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::persona::Persona;
use crate::response::Reply;
use crate::session::{ConversationMessage, SessionContext};
use crate::voice::CaptureError;

/// Default minimum transcript length, in characters, to count as a turn
pub const DEFAULT_MIN_TRANSCRIPT_CHARS: usize = 3;

/// Whose turn it is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnState {
    /// Session created, capture not yet armed
    Starting,
    /// Waiting for the user to speak
    Listening,
    /// Producing a reply
    Processing,
    /// The character is talking
    Speaking,
    /// Session over; terminal
    Ended,
}

impl TurnState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Listening => "listening",
            Self::Processing => "processing",
            Self::Speaking => "speaking",
            Self::Ended => "ended",
        }
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum EndReason {
    /// The host asked to end
    Requested,
    /// Capture failed and could not be recovered
    CaptureFailed(CaptureError),
}

/// Work the driver performs on behalf of the machine
#[derive(Debug, Clone)]
pub enum Effect {
    /// Arm capture for `epoch` after `delay`
    StartCapture { epoch: u64, delay: Duration },
    StopCapture,
    /// Produce a reply to `message` given the session before it was added
    Generate {
        epoch: u64,
        message: String,
        session: Box<SessionContext>,
    },
    /// Speak `reply` in `persona`'s voice
    Speak {
        epoch: u64,
        reply: Reply,
        persona: Box<Persona>,
    },
    StopPlayback,
    /// Hand an appended message to the session store
    Persist(ConversationMessage),
    /// Close the session
    Finish {
        reason: EndReason,
        summary: String,
        duration_minutes: u32,
    },
}

/// Machine settings
#[derive(Debug, Clone, Copy)]
pub struct MachineConfig {
    /// Final transcripts must be longer than this, after trimming
    pub min_transcript_chars: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            min_transcript_chars: DEFAULT_MIN_TRANSCRIPT_CHARS,
        }
    }
}

/// The single owner of turn state
#[derive(Debug)]
pub struct TurnMachine {
    state: TurnState,
    epoch: u64,
    session: SessionContext,
    config: MachineConfig,
    capture_active: bool,
    playback_active: bool,
    /// User message awaiting a reply
    awaiting_reply: Option<String>,
}

impl TurnMachine {
    #[must_use]
    pub const fn new(session: SessionContext, config: MachineConfig) -> Self {
        Self {
            state: TurnState::Starting,
            epoch: 0,
            session,
            config,
            capture_active: false,
            playback_active: false,
            awaiting_reply: None,
        }
    }

    #[must_use]
    pub const fn state(&self) -> TurnState {
        self.state
    }

    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub const fn session(&self) -> &SessionContext {
        &self.session
    }

    #[must_use]
    pub const fn capture_active(&self) -> bool {
        self.capture_active
    }

    #[must_use]
    pub const fn playback_active(&self) -> bool {
        self.playback_active
    }

    /// Mutual exclusion between capture and playback
    ///
    /// Capture and playback are never active together; `Speaking` owns
    /// playback, `Processing` and `Ended` own neither, and `Listening` never
    /// has playback running.
    #[must_use]
    pub const fn invariant_holds(&self) -> bool {
        if self.capture_active && self.playback_active {
            return false;
        }
        match self.state {
            TurnState::Starting | TurnState::Listening => !self.playback_active,
            TurnState::Speaking => self.playback_active && !self.capture_active,
            TurnState::Processing | TurnState::Ended => {
                !self.capture_active && !self.playback_active
            }
        }
    }

    /// Begin the session by arming capture
    pub fn start(&mut self) -> Vec<Effect> {
        if self.state != TurnState::Starting || self.epoch != 0 {
            tracing::debug!(state = %self.state, "start ignored");
            return Vec::new();
        }

        tracing::info!(
            session_id = %self.session.session_id,
            scenario = %self.session.scenario.id,
            persona = %self.session.persona.id(),
            "session starting"
        );
        vec![self.arm(Duration::ZERO)]
    }

    /// Capture for `epoch` is running
    pub fn on_capture_armed(&mut self, epoch: u64) -> Vec<Effect> {
        if !self.is_current(epoch, &[TurnState::Starting, TurnState::Listening]) {
            return Vec::new();
        }

        self.capture_active = true;
        self.transition(TurnState::Listening);
        Vec::new()
    }

    /// A final transcript arrived
    pub fn on_final_transcript(&mut self, epoch: u64, text: &str) -> Vec<Effect> {
        if !self.is_current(epoch, &[TurnState::Listening]) {
            return Vec::new();
        }

        let text = text.trim();
        if text.chars().count() <= self.config.min_transcript_chars {
            tracing::debug!(
                epoch,
                chars = text.chars().count(),
                "transcript too short, discarded"
            );
            return Vec::new();
        }

        let snapshot = Box::new(self.session.clone());
        let message = ConversationMessage::user(text);
        self.session.history.push(message.clone());
        self.awaiting_reply = Some(text.to_string());

        self.epoch += 1;
        self.capture_active = false;
        self.transition(TurnState::Processing);

        vec![
            Effect::StopCapture,
            Effect::Persist(message),
            Effect::Generate {
                epoch: self.epoch,
                message: text.to_string(),
                session: snapshot,
            },
        ]
    }

    /// The reply for `epoch` is ready
    pub fn on_generation_complete(&mut self, epoch: u64, reply: Reply) -> Vec<Effect> {
        if !self.is_current(epoch, &[TurnState::Processing]) {
            return Vec::new();
        }

        let message = ConversationMessage::character(reply.text.clone());
        self.session.history.push(message.clone());
        if let Some(user_message) = self.awaiting_reply.take() {
            self.session
                .memory
                .record(&user_message, &reply.text, reply.analysis.tags());
        }

        self.epoch += 1;
        self.playback_active = true;
        self.transition(TurnState::Speaking);

        vec![
            Effect::Persist(message),
            Effect::Speak {
                epoch: self.epoch,
                persona: Box::new(self.session.persona.clone()),
                reply,
            },
        ]
    }

    /// Playback for `epoch` ended, whatever the outcome
    pub fn on_playback_complete(&mut self, epoch: u64) -> Vec<Effect> {
        if !self.is_current(epoch, &[TurnState::Speaking]) {
            return Vec::new();
        }

        self.playback_active = false;
        self.transition(TurnState::Listening);
        vec![self.arm(Duration::ZERO)]
    }

    /// Capture for `epoch` stopped and should be re-armed after `delay`
    pub fn on_capture_restart(&mut self, epoch: u64, delay: Duration) -> Vec<Effect> {
        if !self.is_current(epoch, &[TurnState::Starting, TurnState::Listening]) {
            return Vec::new();
        }

        vec![self.arm(delay)]
    }

    /// Capture for `epoch` hit an error retrying cannot fix
    pub fn on_capture_failed(&mut self, epoch: u64, error: CaptureError) -> Vec<Effect> {
        if !self.is_current(epoch, &[TurnState::Starting, TurnState::Listening]) {
            return Vec::new();
        }

        self.finish(EndReason::CaptureFailed(error))
    }

    /// End the session; a no-op once ended
    pub fn end(&mut self) -> Vec<Effect> {
        self.finish(EndReason::Requested)
    }

    fn finish(&mut self, reason: EndReason) -> Vec<Effect> {
        if self.state == TurnState::Ended {
            return Vec::new();
        }

        let mut effects = Vec::new();
        match self.state {
            TurnState::Starting | TurnState::Listening => effects.push(Effect::StopCapture),
            TurnState::Speaking => effects.push(Effect::StopPlayback),
            TurnState::Processing | TurnState::Ended => {}
        }

        self.epoch += 1;
        self.capture_active = false;
        self.playback_active = false;
        self.awaiting_reply = None;
        self.transition(TurnState::Ended);

        let summary = self.session.summary();
        let duration_minutes = self.session.duration_minutes(Utc::now());
        tracing::info!(
            session_id = %self.session.session_id,
            ?reason,
            %summary,
            duration_minutes,
            "session ended"
        );

        effects.push(Effect::Finish {
            reason,
            summary,
            duration_minutes,
        });
        effects
    }

    fn arm(&mut self, delay: Duration) -> Effect {
        self.epoch += 1;
        self.capture_active = false;
        Effect::StartCapture {
            epoch: self.epoch,
            delay,
        }
    }

    fn is_current(&self, epoch: u64, states: &[TurnState]) -> bool {
        if epoch != self.epoch || !states.contains(&self.state) {
            tracing::debug!(
                epoch,
                current = self.epoch,
                state = %self.state,
                "ignoring stale event"
            );
            return false;
        }
        true
    }

    fn transition(&mut self, next: TurnState) {
        if self.state != next {
            tracing::info!(
                from = %self.state,
                to = %next,
                epoch = self.epoch,
                "turn state changed"
            );
            self.state = next;
        }
        debug_assert!(self.invariant_holds(), "capture/playback exclusion violated");
    }
}
