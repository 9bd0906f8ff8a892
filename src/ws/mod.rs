//! WebSocket transport, wire protocol and message dispatch

pub mod dispatch;
pub mod handler;
pub mod protocol;
