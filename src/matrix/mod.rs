//! Matrix side of the bridge.
//!
//! The [`MatrixClient`] logs the bridge account in, reusing the session
//! saved in the data directory, implements [`MatrixApi`] on top of the
//! Matrix SDK and runs the sync loop producing [`MatrixEvent`]s.

mod api;
mod client;
mod event;
mod session;
mod sync;

pub use crate::matrix::{
    api::{JoinedRoom, MatrixApi},
    client::MatrixClient,
    event::{MatrixEvent, Membership},
    session::SessionStore,
};

#[cfg(test)]
pub use crate::matrix::api::MockMatrixApi;

/// Login settings of the bridge account
#[derive(Debug, Clone)]
pub struct MatrixCredentials {
    /// URL of the homeserver
    pub base_url: String,
    /// Check the TLS certificate of the homeserver
    pub valid_cert_check: bool,
    /// Full user ID or localpart of the bridge account
    pub username: String,
    pub password: String,
}
