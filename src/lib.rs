#![forbid(unsafe_code)]

// Scrum poker server — realtime planning poker over WebSocket.

pub mod metrics;
pub mod poker;
pub mod signaling;
