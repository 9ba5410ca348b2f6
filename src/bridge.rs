//! Assembly and lifecycle of the bridge.
//!
//! [`Bridge::new`] logs into both networks and wires the components
//! together. [`Bridge::start`] adopts the rooms left by a previous run,
//! makes sure the special rooms exist, then runs until interrupted:
//!
//! ```text
//! XmppSession ──XmppEvent──► xmpp relay task ──┐
//!                                             ├──► EventRelay ──► RoomProvisioner / XmppClient / MatrixClient
//! MatrixSync ──MatrixEvent──► matrix relay task┘
//! ```
//!
//! Each network has a single consumer task, so events of one network are
//! relayed in the order they were received.

use std::{path::Path, sync::Arc, time::Duration};

use log::{error, info, warn};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    Args,
    config::Config,
    filter::FilterPolicy,
    identity::{TopicCodec, jid},
    mapping::MappingStore,
    matrix::{MatrixApi, MatrixClient, MatrixCredentials, MatrixEvent, SessionStore},
    presence::{PresenceOptions, PresenceSync, RosterDirectory},
    provisioner::{InviteRoster, ProvisionerOptions, RoomProvisioner},
    relay::{EventRelay, RelayOptions},
    session::RetryPolicy,
    xmpp::{XmppApi, XmppEvent, XmppSession, XmppSessionOptions},
};

/// Events waiting for the relay, per network.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Time given to the XMPP session to close its stream on shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Bridge {
    matrix_client: Arc<MatrixClient>,
    xmpp_session: XmppSession,
    xmpp_events: mpsc::Receiver<XmppEvent>,
    provisioner: Arc<RoomProvisioner>,
    filter: Arc<FilterPolicy>,
    relay: Arc<EventRelay>,
}

impl Bridge {
    pub async fn new(config: Config, args: Args) -> Result<Self, anyhow::Error> {
        let filter = Arc::new(FilterPolicy::new(
            &config.disabled_jids,
            &config.xmpp.login.jid,
        )?);
        let login_jid = jid::normalize(&config.xmpp.login.jid)?;

        // Matrix
        let session_store = SessionStore::open(&Path::new(&args.data).join("session")).await?;
        let matrix_client = Arc::new(
            MatrixClient::new(
                &MatrixCredentials {
                    base_url: config.matrix.server.base_url.clone(),
                    valid_cert_check: config.matrix.server.valid_cert_check,
                    username: config.matrix.login.username.clone(),
                    password: config.matrix.login.password.clone(),
                },
                session_store,
                config.matrix.users_to_invite.clone(),
            )
            .await?,
        );

        // Xmpp
        let (xmpp_sender, xmpp_events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (xmpp_session, xmpp_client) = XmppSession::new(
            XmppSessionOptions {
                jid: config.xmpp.login.jid.clone(),
                password: config.xmpp.login.password.clone(),
                host: config.xmpp.server.host.clone(),
                port: config.xmpp.server.port,
                queue_capacity: config.xmpp.queue_capacity,
                reconnect_delay: Duration::from_secs(1),
                max_reconnect_delay: Duration::from_secs(300),
            },
            xmpp_sender,
        )?;

        let matrix: Arc<dyn MatrixApi> = matrix_client.clone();
        let xmpp: Arc<dyn XmppApi> = Arc::new(xmpp_client);

        let provisioner = Arc::new(RoomProvisioner::new(
            matrix,
            Arc::new(MappingStore::new()),
            TopicCodec::new(
                &config.matrix.groupchat_flag,
                &config.matrix.room_topics.control,
                &config.matrix.room_topics.all_chat,
            ),
            InviteRoster::new(&config.matrix.users_to_invite),
            ProvisionerOptions {
                all_chat_enabled: config.all_chat_enabled(),
                restore_room_topic: config.matrix.restore_room_topic,
                groupchat_nick: config.xmpp.groupchat_nick.clone(),
                retry: RetryPolicy::default(),
            },
        ));

        let roster = Arc::new(RosterDirectory::new());
        let presence = PresenceSync::new(
            Arc::clone(&xmpp),
            Arc::clone(&provisioner),
            Arc::clone(&roster),
            Arc::clone(&filter),
            PresenceOptions {
                auto_authorize: config.xmpp.roster_options.auto_authorize,
                auto_subscribe: config.xmpp.roster_options.auto_subscribe,
                send_presences_to_control: config.send_presences_to_control,
            },
        );

        let relay = Arc::new(EventRelay::new(
            xmpp,
            Arc::clone(&provisioner),
            presence,
            roster,
            Arc::clone(&filter),
            RelayOptions {
                send_messages_to_all_chat: config.send_messages_to_all_chat,
                groupchat_mute_own_nick: config.groupchat_mute_own_nick,
                groupchat_nick: config.xmpp.groupchat_nick,
                login_jid,
            },
        ));

        Ok(Bridge {
            matrix_client,
            xmpp_session,
            xmpp_events,
            provisioner,
            filter,
            relay,
        })
    }

    /// Adopts the existing rooms and creates the special ones.
    async fn prepare_rooms(&self) {
        match self.provisioner.discover_rooms(&self.filter).await {
            Ok(count) => info!("adopted {} existing rooms", count),
            Err(e) => error!("failed to scan joined rooms: {}", e),
        }

        if let Err(e) = self.provisioner.ensure_control_room().await {
            error!("failed to provision the control room: {}", e);
        }
        if let Err(e) = self.provisioner.ensure_all_chat_room().await {
            error!("failed to provision the all-chat room: {}", e);
        }
    }

    /// Runs the bridge until the process is interrupted.
    pub async fn start(self) {
        self.prepare_rooms().await;

        let Bridge {
            matrix_client,
            xmpp_session,
            mut xmpp_events,
            relay,
            ..
        } = self;

        let xmpp_task = tokio::spawn(xmpp_session.run());

        let xmpp_relay_task: JoinHandle<()> = tokio::spawn({
            let relay = Arc::clone(&relay);
            async move {
                while let Some(event) = xmpp_events.recv().await {
                    relay.relay_xmpp(event).await;
                }
            }
        });

        let (matrix_sender, mut matrix_events) = mpsc::channel::<MatrixEvent>(EVENT_CHANNEL_CAPACITY);
        let matrix_relay_task: JoinHandle<()> = tokio::spawn(async move {
            while let Some(event) = matrix_events.recv().await {
                relay.relay_matrix(event).await;
            }
        });

        tokio::select! {
            _ = matrix_client.sync(matrix_sender) => warn!("matrix sync ended"),
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => info!("interrupted, stopping the bridge"),
                Err(e) => error!("failed to listen for the interrupt signal: {}", e),
            },
        }

        // Dropping the relay drops the last xmpp client handle, which closes the session
        xmpp_relay_task.abort();
        matrix_relay_task.abort();
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, xmpp_task)
            .await
            .is_err()
        {
            warn!("xmpp session did not close in time");
        }

        info!("bridge stopped");
    }
}
