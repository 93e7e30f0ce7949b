//! Comms subsystem: the HTTP surface of the bot.
//!
//! The axum channel implements
//! [`Component`](crate::subsystems::runtime::Component) and captures an
//! `Arc<CommsState>` at construction; `main` spawns it alongside the other
//! components.

pub mod axum_channel;
mod state;

pub use axum_channel::{AxumChannel, build_router};
pub use state::{CommsState, RebuildReport, SessionSnapshot, TurnReply};
