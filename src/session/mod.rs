//! Building blocks shared by the XMPP and Matrix session loops.
//!
//! - [`SessionMachine`]: the connection lifecycle of one network
//! - [`Backoff`] and [`RetryPolicy`]: delays between reconnections and retried requests
//! - [`OutboundQueue`]: bounded buffer of outbound items while a session is down

mod backoff;
mod outbound_queue;
mod state;

pub use crate::session::{
    backoff::{Backoff, RetryPolicy},
    outbound_queue::OutboundQueue,
    state::{SessionEvent, SessionMachine, SessionState},
};
