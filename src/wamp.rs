//! JSON RPC and publish/subscribe session layer.
//!
//! A [`WampSession`] owns one WebSocket connection and exchanges JSON array
//! [envelopes](WampEnvelope) over its text channel. Calls are correlated
//! with their results through a table of [pending calls](PendingCalls).

pub mod call_id;
pub mod envelope;
pub mod error;
pub mod pending;
pub mod session;

pub use call_id::{CALL_ID_LEN, new_call_id};
pub use envelope::{EnvelopeError, WampEnvelope};
pub use error::{CallError, WampError};
pub use pending::{Completion, PendingCalls};
pub use session::{SessionHandler, WAMP_SUBPROTOCOL, WampSession, WampSessionBuilder};
