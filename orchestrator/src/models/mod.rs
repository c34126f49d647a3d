//! Data models for sessions, confirmations and progress

pub mod confirmation;
pub mod progress;
pub mod session;
