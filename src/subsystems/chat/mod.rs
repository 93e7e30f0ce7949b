//! Chat subsystem: the per-turn state machine and its canned replies.

pub mod controller;
pub mod special;

pub use controller::{ChatTurnController, TurnOutcome, fallback_reply};
pub use special::SpecialReplyTable;
