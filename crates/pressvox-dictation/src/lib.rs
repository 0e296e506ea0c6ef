//! Pressvox Dictation crate - press tracking, orchestration, and text delivery.
//!
//! This crate hosts the press-to-talk pipeline: the global pointer listener,
//! the press session tracker with long-press qualification, the orchestrator
//! that sequences capture, recognition, and injection, and the text injector
//! that delivers recognized text to the focused application.

pub mod engine;
pub mod pointer;
pub mod state;
pub mod text_inject;
pub mod tracker;

pub use engine::DictationOrchestrator;
pub use pointer::{PointerEvent, PointerEventKind, PointerListener};
pub use state::{PressState, StateMachine};
pub use text_inject::{MockTextInjector, SystemTextInjector, TextInjector};
pub use tracker::PressSessionTracker;
