//! Subsystem modules for HelpBot.

pub mod chat;
pub mod comms;
pub mod docs;
pub mod maintenance;
pub mod memory;
pub mod runtime;
