//! Metric helpers for `wampframe`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. With the `metrics` feature
//! disabled every helper compiles to a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking open connections.
pub const CONNECTIONS_ACTIVE: &str = "wampframe_connections_active";
/// Name of the counter tracking WebSocket frames.
pub const FRAMES_PROCESSED: &str = "wampframe_frames_total";
/// Name of the counter tracking complete messages delivered to handlers.
pub const MESSAGES_DELIVERED: &str = "wampframe_messages_delivered_total";
/// Name of the counter tracking protocol violations raised by peers.
pub const PROTOCOL_VIOLATIONS: &str = "wampframe_protocol_violations_total";
/// Name of the counter tracking panics raised by handler callbacks.
pub const HANDLER_PANICS: &str = "wampframe_handler_panics_total";

/// Direction of frame processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Frames received from the server.
    Inbound,
    /// Frames sent to the server.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), expect(dead_code, reason = "metrics feature disabled"))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the open connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the open connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a frame for the given direction.
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_PROCESSED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a message handed to the application, labelled by kind.
pub fn inc_messages(kind: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(MESSAGES_DELIVERED, "kind" => kind).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}

/// Record a protocol violation.
pub fn inc_violations() {
    #[cfg(feature = "metrics")]
    counter!(PROTOCOL_VIOLATIONS).increment(1);
}

/// Record a panic caught while running a handler callback.
pub fn inc_handler_panics() {
    #[cfg(feature = "metrics")]
    counter!(HANDLER_PANICS).increment(1);
}
