//! Integration tests for tickbar-source.
//!
//! These tests drive real sources against in-process peers:
//! - WebSocket connection lifecycle
//! - Reconnection and stall reporting

pub mod common;
