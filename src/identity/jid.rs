//! JID parsing and normalization.
//!
//! A JID normalizes by lower-casing its domain, preserving the case of its
//! local part and dropping its resource. The normalized form is the key of
//! every mapping, the topic of direct contact rooms and the unit of filtering.

use std::fmt;

use crate::error::BridgeError;

/// Characters that may never appear in the local part of a JID.
pub const JID_ILLEGAL_CHARS: [char; 8] = ['"', '&', '\'', '/', ':', '<', '>', '@'];

/// A bare JID in its canonical `local@domain` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedJid(String);

impl NormalizedJid {
    /// Returns the canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the local part of the JID.
    pub fn local(&self) -> &str {
        self.0.split_once('@').map(|(local, _)| local).unwrap_or("")
    }

    /// Returns the domain part of the JID.
    pub fn domain(&self) -> &str {
        self.0.split_once('@').map(|(_, domain)| domain).unwrap_or("")
    }
}

impl fmt::Display for NormalizedJid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A parsed JID that still carries its resource.
///
/// The resource is irrelevant for room identity but holds the occupant
/// nickname of groupchat messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedJid {
    /// The normalized bare JID
    pub bare: NormalizedJid,
    /// The resource, if any
    pub resource: Option<String>,
}

/// Parses a JID of the form `local@domain[/resource]`.
///
/// # Errors
///
/// Returns [`BridgeError::MalformedJid`] when the local part or the domain
/// is missing, when the local part contains an illegal character, or when
/// the bare part contains whitespace.
///
/// # Examples
///
/// ```ignore
/// let jid = parse("Alice@Example.COM/phone")?;
/// assert_eq!(jid.bare.as_str(), "Alice@example.com");
/// assert_eq!(jid.resource.as_deref(), Some("phone"));
/// ```
pub fn parse(jid: &str) -> Result<ParsedJid, BridgeError> {
    let malformed = || BridgeError::MalformedJid(jid.to_owned());

    let trimmed = jid.trim();
    let (bare, resource) = match trimmed.split_once('/') {
        Some((bare, resource)) => (bare, Some(resource)),
        None => (trimmed, None),
    };

    let (local, domain) = bare.split_once('@').ok_or_else(malformed)?;

    if local.is_empty()
        || domain.is_empty()
        || local.contains(JID_ILLEGAL_CHARS)
        || domain.contains(['@', '/'])
        || bare.chars().any(char::is_whitespace)
    {
        return Err(malformed());
    }

    // An empty resource is as malformed as an empty local part
    if resource.is_some_and(str::is_empty) {
        return Err(malformed());
    }

    // Domains are case insensitive, local parts keep their case
    let bare = NormalizedJid(format!("{}@{}", local, domain.to_lowercase()));

    Ok(ParsedJid {
        bare,
        resource: resource.map(str::to_owned),
    })
}

/// Normalizes a JID into its bare canonical form.
///
/// # Errors
///
/// Returns [`BridgeError::MalformedJid`] when the input is not a valid JID.
pub fn normalize(jid: &str) -> Result<NormalizedJid, BridgeError> {
    parse(jid).map(|parsed| parsed.bare)
}
