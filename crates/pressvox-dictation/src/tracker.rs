//! Press session tracking and long-press qualification.
//!
//! The tracker consumes raw pointer transitions and turns them into press
//! sessions: a Down opens a session and arms a one-shot long-press timer, an
//! Up closes it. A session whose button is still held when the timer fires is
//! qualified as a long press, at most once per session.
//!
//! `on_pointer_event` never blocks and never awaits. Timers run as spawned
//! tasks that re-check both the generation counter and the session identity
//! before qualifying, so a release always wins the race against a timer that
//! has already woken up.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use pressvox_core::events::DictationEvent;
use pressvox_core::types::{SessionId, Timestamp};
use tokio::sync::mpsc;

use crate::pointer::{PointerEvent, PointerEventKind};
use crate::state::{PressState, StateMachine};

/// One press currently in progress.
#[derive(Debug, Clone, Copy)]
struct PressSession {
    id: SessionId,
    started_at: Instant,
}

/// Tracks the lifecycle of pointer presses and emits press events.
///
/// Clones share the same underlying session, so a clone can be handed to the
/// event pump while another is queried by the orchestrator.
#[derive(Debug, Clone)]
pub struct PressSessionTracker {
    session: Arc<Mutex<Option<PressSession>>>,
    /// Bumped on every release. An armed timer records the value at arm time
    /// and refuses to qualify if it changed.
    generation: Arc<AtomicU64>,
    state: StateMachine,
    events: mpsc::UnboundedSender<DictationEvent>,
    /// Runtime the long-press timers are spawned onto. Captured at
    /// construction so `on_pointer_event` can be called from any thread.
    handle: tokio::runtime::Handle,
    long_press: Duration,
}

impl PressSessionTracker {
    /// Creates a tracker that emits press events into `events`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new(long_press: Duration, events: mpsc::UnboundedSender<DictationEvent>) -> Self {
        Self {
            session: Arc::new(Mutex::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
            state: StateMachine::new(),
            events,
            handle: tokio::runtime::Handle::current(),
            long_press,
        }
    }

    /// Feed one pointer transition into the tracker.
    ///
    /// Non-blocking: the heaviest thing this does is an uncontended mutex
    /// lock and an unbounded channel send.
    pub fn on_pointer_event(&self, event: PointerEvent) {
        match event.kind {
            PointerEventKind::Down => self.handle_down(event),
            PointerEventKind::Up => self.handle_up(event),
        }
    }

    /// Whether a press session is currently open.
    pub fn is_pressed(&self) -> bool {
        self.session
            .lock()
            .expect("press session mutex poisoned")
            .is_some()
    }

    /// Identity of the open press session, if any.
    pub fn current_session_id(&self) -> Option<SessionId> {
        self.session
            .lock()
            .expect("press session mutex poisoned")
            .as_ref()
            .map(|s| s.id)
    }

    /// Current phase of the press lifecycle.
    pub fn state(&self) -> PressState {
        self.state.current()
    }

    // -------------------------------------------------------------------
    // Event handlers
    // -------------------------------------------------------------------

    fn handle_down(&self, event: PointerEvent) {
        let mut session = self.session.lock().expect("press session mutex poisoned");
        if session.is_some() {
            // Duplicate Down (button repeat, hook replay). The open session
            // keeps its original start time and timer.
            tracing::debug!("Pointer down ignored, press session already active");
            return;
        }

        let id = SessionId::new();
        let armed_generation = self.generation.load(Ordering::SeqCst);
        *session = Some(PressSession {
            id,
            started_at: event.timestamp,
        });

        if let Err(e) = self.state.transition(PressState::Pressed) {
            tracing::warn!("Press state out of sync on down: {}", e);
        }

        tracing::debug!("Press session {} started at ({}, {})", id, event.x, event.y);

        // Emitted while the session lock is held so bus order matches the
        // state transitions.
        self.emit(DictationEvent::PressStarted {
            session_id: id,
            x: event.x,
            y: event.y,
            timestamp: Timestamp::now(),
        });

        self.arm_long_press_timer(id, armed_generation);
    }

    fn handle_up(&self, event: PointerEvent) {
        // Invalidate any armed timer before touching the session. The timer
        // re-checks the generation, so bumping it here cancels a pending
        // qualification even if the timer task already woke up.
        self.generation.fetch_add(1, Ordering::SeqCst);

        let mut session = self.session.lock().expect("press session mutex poisoned");
        let ended = match session.take() {
            Some(s) => s,
            None => {
                // Up with no session: startup mid-press, or a duplicate Up.
                tracing::debug!("Pointer up with no active press session");
                return;
            }
        };

        let duration_ms = event
            .timestamp
            .saturating_duration_since(ended.started_at)
            .as_millis() as u64;

        if let Err(e) = self.state.transition(PressState::Idle) {
            tracing::warn!("Press state out of sync on up: {}", e);
        }

        tracing::debug!("Press session {} ended after {} ms", ended.id, duration_ms);

        self.emit(DictationEvent::PressEnded {
            session_id: ended.id,
            duration_ms,
            timestamp: Timestamp::now(),
        });
    }

    // -------------------------------------------------------------------
    // Long-press timer
    // -------------------------------------------------------------------

    fn arm_long_press_timer(&self, session_id: SessionId, armed_generation: u64) {
        let tracker = self.clone();
        let threshold = self.long_press;
        self.handle.spawn(async move {
            tokio::time::sleep(threshold).await;
            tracker.qualify_if_still_pressed(session_id, armed_generation);
        });
    }

    fn qualify_if_still_pressed(&self, session_id: SessionId, armed_generation: u64) {
        let session = self.session.lock().expect("press session mutex poisoned");

        if self.generation.load(Ordering::SeqCst) != armed_generation {
            // Released (or released and re-pressed) while the timer slept.
            return;
        }
        let still_pressed = matches!(&*session, Some(s) if s.id == session_id);
        if !still_pressed {
            return;
        }

        if let Err(e) = self.state.transition(PressState::Qualified) {
            tracing::warn!("Press state out of sync on qualification: {}", e);
            return;
        }

        tracing::info!("Press session {} qualified as long press", session_id);

        self.emit(DictationEvent::LongPressQualified {
            session_id,
            timestamp: Timestamp::now(),
        });
    }

    fn emit(&self, event: DictationEvent) {
        if self.events.send(event).is_err() {
            tracing::warn!("Event bus closed, dropping press event");
        }
    }
}
