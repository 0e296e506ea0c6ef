use serde::{Deserialize, Serialize};

use crate::types::{AudioFormat, InjectionMode, SessionId, Timestamp};

/// All domain events emitted by the press-to-talk pipeline.
///
/// Events are emitted by the session tracker and the orchestrator after state
/// changes and consumed by:
/// - The orchestrator event loop (session sequencing)
/// - The status log (operator-visible notifications)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DictationEvent {
    // =========================================================================
    // Press Session Events
    // =========================================================================
    /// A pointer button went down and a press session began.
    PressStarted {
        session_id: SessionId,
        x: i32,
        y: i32,
        timestamp: Timestamp,
    },

    /// The press was held past the long-press threshold.
    LongPressQualified {
        session_id: SessionId,
        timestamp: Timestamp,
    },

    /// The pointer button came up and the press session ended.
    PressEnded {
        session_id: SessionId,
        duration_ms: u64,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Capture Events
    // =========================================================================
    /// Audio capture started for a qualified session.
    CaptureStarted {
        session_id: SessionId,
        format: AudioFormat,
        timestamp: Timestamp,
    },

    /// Audio capture stopped and the buffer was drained.
    CaptureStopped {
        session_id: SessionId,
        frames: usize,
        bytes: usize,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Recognition Events
    // =========================================================================
    /// The recognizer produced non-empty text for a session.
    TextRecognized {
        session_id: SessionId,
        text: String,
        timestamp: Timestamp,
    },

    /// The recognizer failed for a session.
    RecognitionFailed {
        session_id: SessionId,
        reason: String,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Injection Events
    // =========================================================================
    /// Recognized text was delivered to the focused application.
    TextInjected {
        session_id: SessionId,
        mode: InjectionMode,
        chars: usize,
        timestamp: Timestamp,
    },

    /// Text delivery failed.
    InjectionFailed {
        session_id: SessionId,
        reason: String,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Status Events
    // =========================================================================
    /// Operator-visible status message (errors recovered at the orchestrator,
    /// empty recognitions, stuck-state warnings).
    StatusChanged {
        message: String,
        timestamp: Timestamp,
    },
}

impl DictationEvent {
    /// Returns the timestamp of the event.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            DictationEvent::PressStarted { timestamp, .. }
            | DictationEvent::LongPressQualified { timestamp, .. }
            | DictationEvent::PressEnded { timestamp, .. }
            | DictationEvent::CaptureStarted { timestamp, .. }
            | DictationEvent::CaptureStopped { timestamp, .. }
            | DictationEvent::TextRecognized { timestamp, .. }
            | DictationEvent::RecognitionFailed { timestamp, .. }
            | DictationEvent::TextInjected { timestamp, .. }
            | DictationEvent::InjectionFailed { timestamp, .. }
            | DictationEvent::StatusChanged { timestamp, .. } => *timestamp,
        }
    }

    /// Returns a human-readable event name for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            DictationEvent::PressStarted { .. } => "press_started",
            DictationEvent::LongPressQualified { .. } => "long_press_qualified",
            DictationEvent::PressEnded { .. } => "press_ended",
            DictationEvent::CaptureStarted { .. } => "capture_started",
            DictationEvent::CaptureStopped { .. } => "capture_stopped",
            DictationEvent::TextRecognized { .. } => "text_recognized",
            DictationEvent::RecognitionFailed { .. } => "recognition_failed",
            DictationEvent::TextInjected { .. } => "text_injected",
            DictationEvent::InjectionFailed { .. } => "injection_failed",
            DictationEvent::StatusChanged { .. } => "status_changed",
        }
    }

    /// The session this event belongs to, if any.
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            DictationEvent::PressStarted { session_id, .. }
            | DictationEvent::LongPressQualified { session_id, .. }
            | DictationEvent::PressEnded { session_id, .. }
            | DictationEvent::CaptureStarted { session_id, .. }
            | DictationEvent::CaptureStopped { session_id, .. }
            | DictationEvent::TextRecognized { session_id, .. }
            | DictationEvent::RecognitionFailed { session_id, .. }
            | DictationEvent::TextInjected { session_id, .. }
            | DictationEvent::InjectionFailed { session_id, .. } => Some(*session_id),
            DictationEvent::StatusChanged { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_timestamp() {
        let ts = Timestamp::now();
        let event = DictationEvent::PressStarted {
            session_id: SessionId::new(),
            x: 100,
            y: 200,
            timestamp: ts,
        };
        assert_eq!(event.timestamp(), ts);
    }

    #[test]
    fn test_event_names() {
        let ts = Timestamp::now();
        let sid = SessionId::new();

        let cases: Vec<(DictationEvent, &str)> = vec![
            (
                DictationEvent::PressStarted {
                    session_id: sid,
                    x: 0,
                    y: 0,
                    timestamp: ts,
                },
                "press_started",
            ),
            (
                DictationEvent::LongPressQualified {
                    session_id: sid,
                    timestamp: ts,
                },
                "long_press_qualified",
            ),
            (
                DictationEvent::PressEnded {
                    session_id: sid,
                    duration_ms: 1800,
                    timestamp: ts,
                },
                "press_ended",
            ),
            (
                DictationEvent::CaptureStarted {
                    session_id: sid,
                    format: AudioFormat::default(),
                    timestamp: ts,
                },
                "capture_started",
            ),
            (
                DictationEvent::CaptureStopped {
                    session_id: sid,
                    frames: 5,
                    bytes: 16_000,
                    timestamp: ts,
                },
                "capture_stopped",
            ),
            (
                DictationEvent::TextRecognized {
                    session_id: sid,
                    text: "hello".to_string(),
                    timestamp: ts,
                },
                "text_recognized",
            ),
            (
                DictationEvent::RecognitionFailed {
                    session_id: sid,
                    reason: "model missing".to_string(),
                    timestamp: ts,
                },
                "recognition_failed",
            ),
            (
                DictationEvent::TextInjected {
                    session_id: sid,
                    mode: InjectionMode::Type,
                    chars: 5,
                    timestamp: ts,
                },
                "text_injected",
            ),
            (
                DictationEvent::InjectionFailed {
                    session_id: sid,
                    reason: "SendInput truncated".to_string(),
                    timestamp: ts,
                },
                "injection_failed",
            ),
            (
                DictationEvent::StatusChanged {
                    message: "no speech detected".to_string(),
                    timestamp: ts,
                },
                "status_changed",
            ),
        ];

        for (event, expected) in cases {
            assert_eq!(event.event_name(), expected);
        }
    }

    #[test]
    fn test_event_session_id_accessor() {
        let ts = Timestamp::now();
        let sid = SessionId::new();

        let press = DictationEvent::PressStarted {
            session_id: sid,
            x: 1,
            y: 2,
            timestamp: ts,
        };
        assert_eq!(press.session_id(), Some(sid));

        let status = DictationEvent::StatusChanged {
            message: "ok".to_string(),
            timestamp: ts,
        };
        assert_eq!(status.session_id(), None);
    }

    #[test]
    fn test_event_json_round_trip() {
        let ts = Timestamp(1_700_000_000);
        let sid = SessionId::new();

        let event = DictationEvent::TextRecognized {
            session_id: sid,
            text: "hello world".to_string(),
            timestamp: ts,
        };

        let json = serde_json::to_string(&event).unwrap();
        let rt: DictationEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(rt.event_name(), "text_recognized");
        assert_eq!(rt.timestamp(), ts);
        if let DictationEvent::TextRecognized { text, session_id, .. } = rt {
            assert_eq!(text, "hello world");
            assert_eq!(session_id, sid);
        } else {
            panic!("Round trip changed variant");
        }
    }

    #[test]
    fn test_event_json_round_trip_all_variants() {
        let ts = Timestamp::now();
        let sid = SessionId::new();

        let events: Vec<DictationEvent> = vec![
            DictationEvent::PressStarted { session_id: sid, x: 10, y: 20, timestamp: ts },
            DictationEvent::LongPressQualified { session_id: sid, timestamp: ts },
            DictationEvent::PressEnded { session_id: sid, duration_ms: 2000, timestamp: ts },
            DictationEvent::CaptureStarted {
                session_id: sid,
                format: AudioFormat::default(),
                timestamp: ts,
            },
            DictationEvent::CaptureStopped { session_id: sid, frames: 3, bytes: 9600, timestamp: ts },
            DictationEvent::TextRecognized {
                session_id: sid,
                text: "t".to_string(),
                timestamp: ts,
            },
            DictationEvent::RecognitionFailed {
                session_id: sid,
                reason: "e".to_string(),
                timestamp: ts,
            },
            DictationEvent::TextInjected {
                session_id: sid,
                mode: InjectionMode::Clipboard,
                chars: 1,
                timestamp: ts,
            },
            DictationEvent::InjectionFailed {
                session_id: sid,
                reason: "e".to_string(),
                timestamp: ts,
            },
            DictationEvent::StatusChanged { message: "m".to_string(), timestamp: ts },
        ];
        assert_eq!(events.len(), 10);

        for event in events {
            let json = serde_json::to_string(&event).unwrap();
            let rt: DictationEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(rt.event_name(), event.event_name());
            assert_eq!(rt.timestamp(), event.timestamp());
        }
    }

    #[test]
    fn test_event_ordering_fields_within_session() {
        // PressStarted carries position, PressEnded carries the measured hold
        let sid = SessionId::new();
        let started = DictationEvent::PressStarted {
            session_id: sid,
            x: 640,
            y: 480,
            timestamp: Timestamp(100),
        };
        let ended = DictationEvent::PressEnded {
            session_id: sid,
            duration_ms: 1750,
            timestamp: Timestamp(102),
        };

        assert!(started.timestamp() < ended.timestamp());
        assert_eq!(started.session_id(), ended.session_id());
    }
}
