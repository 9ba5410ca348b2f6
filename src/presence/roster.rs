//! Names of the roster contacts.

use std::collections::HashMap;

use log::debug;
use tokio::sync::RwLock;

use crate::identity::NormalizedJid;

/// The contacts of the bridge account and their roster names.
#[derive(Debug, Default)]
pub struct RosterDirectory {
    contacts: RwLock<HashMap<NormalizedJid, Option<String>>>,
}

impl RosterDirectory {
    pub fn new() -> Self {
        RosterDirectory::default()
    }

    /// Records a contact and its roster name.
    pub async fn insert(&self, jid: NormalizedJid, name: Option<String>) {
        debug!("roster contact {} named {:?}", jid, name);
        self.contacts.write().await.insert(jid, name);
    }

    pub async fn remove(&self, jid: &NormalizedJid) {
        self.contacts.write().await.remove(jid);
    }

    /// Whether a JID is a roster contact.
    pub async fn contains(&self, jid: &NormalizedJid) -> bool {
        self.contacts.read().await.contains_key(jid)
    }

    /// Returns the roster name of a contact, or its JID when it has none.
    pub async fn name_of(&self, jid: &NormalizedJid) -> String {
        match self.contacts.read().await.get(jid) {
            Some(Some(name)) if !name.is_empty() => name.clone(),
            _ => jid.to_string(),
        }
    }
}
