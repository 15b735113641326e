//! WebSocket transport

pub mod connection;
pub mod handler;
pub mod protocol;
