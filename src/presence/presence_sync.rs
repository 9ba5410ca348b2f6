//! Presence notices and roster subscriptions.
//!
//! The [`PresenceSync`] keeps the roster of the XMPP account and the
//! managed rooms aligned:
//! - every roster contact gets a room named after its roster name
//! - subscription requests are accepted, and returned, per the roster options
//! - presence changes become notices in the control room

use std::sync::Arc;

use log::{debug, info, warn};

use crate::{
    error::BridgeError,
    filter::FilterPolicy,
    identity::{NormalizedJid, jid},
    mapping::{MappingKey, MappingKind},
    presence::RosterDirectory,
    provisioner::RoomProvisioner,
    xmpp::{PresenceState, RosterItem, XmppApi},
};

/// Presence and roster switches, taken from the configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresenceOptions {
    /// Accept subscription requests automatically
    pub auto_authorize: bool,
    /// Request a subscription back after accepting one
    pub auto_subscribe: bool,
    /// Post presence changes into the control room
    pub send_presences_to_control: bool,
}

/// Synchronizes presences and the roster with the managed rooms.
pub struct PresenceSync {
    xmpp: Arc<dyn XmppApi>,
    provisioner: Arc<RoomProvisioner>,
    roster: Arc<RosterDirectory>,
    filter: Arc<FilterPolicy>,
    options: PresenceOptions,
}

impl PresenceSync {
    pub fn new(
        xmpp: Arc<dyn XmppApi>,
        provisioner: Arc<RoomProvisioner>,
        roster: Arc<RosterDirectory>,
        filter: Arc<FilterPolicy>,
        options: PresenceOptions,
    ) -> Self {
        PresenceSync {
            xmpp,
            provisioner,
            roster,
            filter,
            options,
        }
    }

    /// Handles a contact asking to see the presence of the bridge account.
    ///
    /// Without `auto_authorize`, the request is only announced in the
    /// control room and left pending.
    pub async fn on_roster_request(&self, jid: &NormalizedJid) -> Result<(), BridgeError> {
        if !self.options.auto_authorize {
            info!("subscription request from {} left pending", jid);
            self.provisioner
                .notify_control(&format!("{} asks to subscribe to your presence", jid))
                .await;
            return Ok(());
        }

        info!("accepting subscription request from {}", jid);
        self.xmpp.accept_subscription(jid.as_str()).await?;

        if self.options.auto_subscribe {
            info!("subscribing back to {}", jid);
            self.xmpp.request_subscription(jid.as_str()).await?;
        }
        Ok(())
    }

    /// Handles a contact becoming available or unavailable.
    ///
    /// An available contact missing from the roster means the roster is
    /// stale: it is requested again instead of posting a notice.
    pub async fn on_presence_change(
        &self,
        jid: &NormalizedJid,
        state: PresenceState,
    ) -> Result<(), BridgeError> {
        let key = MappingKey::Jid(jid.clone());
        if let Some(mapping) = self.provisioner.store().resolve(&key).await
            && mapping.kind == MappingKind::Groupchat
        {
            debug!("ignoring occupant presence of groupchat {}", jid);
            return Ok(());
        }

        if state == PresenceState::Available && !self.roster.contains(jid).await {
            warn!("{} is available but not in the roster, requesting it", jid);
            return self.xmpp.request_roster().await;
        }

        if !self.options.send_presences_to_control {
            return Ok(());
        }

        let name = self.roster.name_of(jid).await;
        let notice = match state {
            PresenceState::Available => format!("{} available ({})", name, jid),
            PresenceState::Unavailable => format!("{} unavailable ({})", name, jid),
        };
        self.provisioner.notify_control(&notice).await;
        Ok(())
    }

    /// Handles a roster result or push.
    ///
    /// Each contact gets a room, renamed when its roster name changed, and
    /// the invites of every managed room are repaired. Entries that are not
    /// `local@domain` JIDs and disabled contacts are skipped.
    ///
    /// # Returns
    ///
    /// The number of contacts whose room exists after the update.
    pub async fn on_roster(&self, items: Vec<RosterItem>) -> Result<usize, BridgeError> {
        let mut synchronized = 0;

        for item in items {
            let jid = match jid::normalize(&item.jid) {
                Ok(jid) => jid,
                Err(e) => {
                    warn!("skipping roster entry: {}", e);
                    continue;
                }
            };
            if !self.filter.is_allowed(&jid) {
                continue;
            }
            if item.removed {
                info!("{} removed from the roster", jid);
                self.roster.remove(&jid).await;
                continue;
            }

            self.roster.insert(jid.clone(), item.name.clone()).await;
            let name = self.roster.name_of(&jid).await;
            let key = MappingKey::Jid(jid);

            let mapping = match self
                .provisioner
                .ensure_room(&key, MappingKind::DirectContact, &name)
                .await
            {
                Ok(mapping) => mapping,
                Err(e) => {
                    self.provisioner.report_failure(&e).await;
                    continue;
                }
            };
            if mapping.kind == MappingKind::DirectContact
                && let Err(e) = self.provisioner.rename(&key, &name).await
            {
                warn!("failed to rename room of {}: {}", key, e);
            }
            synchronized += 1;
        }

        debug!("repairing invites after roster update");
        self.provisioner.repair_all_invites().await;

        Ok(synchronized)
    }
}
