//! Event forwarding between the two networks.

mod event_relay;

pub use crate::relay::event_relay::{EventRelay, RelayOptions};
