//! The first gate of every JID-addressed event.

use std::collections::HashSet;

use log::debug;

use crate::{
    error::BridgeError,
    identity::{NormalizedJid, jid},
};

/// Placeholder in `disabled_jids` standing for the bridge's own XMPP account.
pub const LOGIN_JID_SENTINEL: &str = "xmpp_login_jid";

/// The set of JIDs the bridge refuses to relay to or from.
///
/// The set is resolved once at startup and never changes afterwards.
#[derive(Debug, Clone, Default)]
pub struct FilterPolicy {
    disabled: HashSet<NormalizedJid>,
}

impl FilterPolicy {
    /// Builds the policy from the configured entries.
    ///
    /// # Arguments
    ///
    /// * `disabled_jids` - The configured JIDs, possibly containing [`LOGIN_JID_SENTINEL`]
    /// * `login_jid` - The JID the bridge logs into XMPP with
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::MalformedJid`] if an entry or the login JID is
    /// not a valid JID.
    pub fn new<S: AsRef<str>>(disabled_jids: &[S], login_jid: &str) -> Result<Self, BridgeError> {
        let disabled = disabled_jids
            .iter()
            .map(|entry| match entry.as_ref() {
                LOGIN_JID_SENTINEL => jid::normalize(login_jid),
                entry => jid::normalize(entry),
            })
            .collect::<Result<HashSet<_>, _>>()?;

        Ok(FilterPolicy { disabled })
    }

    /// Whether events about this JID may be relayed.
    ///
    /// Only the fact of filtering is logged, never the content of the event.
    pub fn is_allowed(&self, jid: &NormalizedJid) -> bool {
        if self.disabled.contains(jid) {
            debug!("filtered event about disabled jid {}", jid);
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_allowed() {
        let policy = FilterPolicy::new(&["spam@example.com"], "bot@x.com").unwrap();

        assert!(!policy.is_allowed(&jid::normalize("spam@example.com").unwrap()));
        assert!(!policy.is_allowed(&jid::normalize("spam@EXAMPLE.com/phone").unwrap()));
        assert!(policy.is_allowed(&jid::normalize("alice@example.com").unwrap()));
        assert!(policy.is_allowed(&jid::normalize("bot@x.com").unwrap()));
    }

    #[test]
    fn test_login_sentinel_matches_literal_entry() {
        let from_sentinel = FilterPolicy::new(&[LOGIN_JID_SENTINEL], "bot@x.com").unwrap();
        let literal = FilterPolicy::new(&["bot@x.com"], "bot@x.com").unwrap();

        let bot = jid::normalize("bot@x.com").unwrap();
        let alice = jid::normalize("alice@x.com").unwrap();
        assert!(!from_sentinel.is_allowed(&bot));
        assert_eq!(from_sentinel.is_allowed(&bot), literal.is_allowed(&bot));
        assert_eq!(from_sentinel.is_allowed(&alice), literal.is_allowed(&alice));
    }

    #[test]
    fn test_malformed_entry_is_rejected() {
        let result = FilterPolicy::new(&["not a jid"], "bot@x.com");
        assert!(matches!(result, Err(BridgeError::MalformedJid(_))));
    }

    #[test]
    fn test_empty_policy_allows_everything() {
        let policy = FilterPolicy::default();
        assert!(policy.is_allowed(&jid::normalize("anyone@example.com").unwrap()));
    }
}
