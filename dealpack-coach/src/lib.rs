#![doc = include_str!("../README.md")]

pub mod client;
pub mod config;
pub(crate) mod error;
pub mod frame;
pub mod session;
pub mod streaming;

pub use client::CoachClient;
pub use config::CoachConfig;
pub use frame::{CoachEvent, FRAME_PREFIX, FrameError, parse_frame};
pub use session::SessionSlot;
pub use streaming::{DecodeSession, DecodeStats, DecodeSummary, SessionOutcome, decode};

// Re-export dealpack-types for convenience
pub use dealpack_types::{CoachError, CoachReport, CoachRequest, CoachSink, FnSink, StreamEvent};
