//! HTTP and WebSocket surface over the scheduler.

pub mod handler;
pub mod messages;
pub mod socket;
