//! Configuration of the bridge.
//!
//! The configuration is read from a YAML file, any value of which can be
//! overridden by an environment variable prefixed with `MXPP_`, nested keys
//! being separated by `__` (`MXPP_XMPP__LOGIN__PASSWORD`).
//!
//! ```yaml
//! matrix:
//!   server:
//!     base_url: "https://matrix.org"
//!     valid_cert_check: true
//!   login:
//!     username: "@xmpp-bridge:matrix.org"
//!     password: "matrix-password"
//!   users_to_invite: ["@me:matrix.org"]
//!   room_topics:
//!     control: "control"
//!     all_chat: "all_chat"
//!   groupchat_flag: "groupchat: "
//!   restore_room_topic: true
//!
//! xmpp:
//!   server:
//!     host: "xmpp.example.com"
//!     port: 5222
//!   login:
//!     jid: "bridge@example.com"
//!     password: "xmpp-password"
//!   roster_options:
//!     auto_authorize: true
//!     auto_subscribe: true
//!   groupchat_nick: "bridge"
//!
//! send_presences_to_control: true
//! send_messages_to_all_chat: true
//! disable_all_chat_room: false
//! groupchat_mute_own_nick: true
//! disabled_jids: ["xmpp_login_jid", "spam@example.com"]
//! ```

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use matrix_sdk::ruma::UserId;
use serde::Deserialize;

use crate::{error::BridgeError, filter::FilterPolicy, identity::TopicCodec, identity::jid};

fn default_true() -> bool {
    true
}

fn default_xmpp_port() -> u16 {
    5222
}

fn default_queue_capacity() -> usize {
    256
}

/// Root of the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub matrix: Matrix,
    pub xmpp: Xmpp,
    /// Post contact presence changes in the control room
    #[serde(default = "default_true")]
    pub send_presences_to_control: bool,
    /// Copy every relayed message into the all-chat room
    #[serde(default = "default_true")]
    pub send_messages_to_all_chat: bool,
    /// Skip the all-chat room, honoured only when messages are not copied to it
    #[serde(default)]
    pub disable_all_chat_room: bool,
    /// Drop the groupchat messages sent under `xmpp.groupchat_nick`
    #[serde(default = "default_true")]
    pub groupchat_mute_own_nick: bool,
    /// JIDs never bridged; `xmpp_login_jid` stands for `xmpp.login.jid`
    #[serde(default)]
    pub disabled_jids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Matrix {
    pub server: MatrixServer,
    pub login: MatrixLogin,
    /// Users invited in every managed room
    #[serde(default)]
    pub users_to_invite: Vec<String>,
    pub room_topics: RoomTopics,
    /// Prefix of the topic of groupchat rooms
    pub groupchat_flag: String,
    /// Put back the topic of a managed room when someone else changes it
    #[serde(default = "default_true")]
    pub restore_room_topic: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatrixServer {
    pub base_url: String,
    #[serde(default = "default_true")]
    pub valid_cert_check: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatrixLogin {
    pub username: String,
    pub password: String,
}

/// Topics identifying the two special rooms.
#[derive(Debug, Clone, Deserialize)]
pub struct RoomTopics {
    pub control: String,
    pub all_chat: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Xmpp {
    pub server: XmppServer,
    pub login: XmppLogin,
    #[serde(default)]
    pub roster_options: RosterOptions,
    /// Nickname of the bridge in groupchats
    pub groupchat_nick: String,
    /// Stanzas kept while the connection is down
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct XmppServer {
    pub host: String,
    #[serde(default = "default_xmpp_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct XmppLogin {
    pub jid: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RosterOptions {
    /// Accept every subscription request
    #[serde(default)]
    pub auto_authorize: bool,
    /// Subscribe back to the contacts asking for a subscription
    #[serde(default)]
    pub auto_subscribe: bool,
}

impl Config {
    /// Loads the YAML file at `path` with its environment overrides, then validates it.
    pub fn load(path: &str) -> Result<Config, BridgeError> {
        let config: Config = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("MXPP_").split("__"))
            .extract()
            .map_err(|e| BridgeError::ConfigInvalid(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Whether the all-chat room exists.
    ///
    /// Copying messages to the all-chat room requires it, whatever
    /// `disable_all_chat_room` says.
    pub fn all_chat_enabled(&self) -> bool {
        !(self.disable_all_chat_room && !self.send_messages_to_all_chat)
    }

    /// Checks what deserialization cannot.
    pub fn validate(&self) -> Result<(), BridgeError> {
        let invalid = |reason: &str| Err(BridgeError::ConfigInvalid(reason.to_owned()));

        if self.matrix.login.username.is_empty() || self.matrix.login.password.is_empty() {
            return invalid("empty matrix credentials");
        }
        if self.xmpp.login.password.is_empty() {
            return invalid("empty xmpp password");
        }
        jid::normalize(&self.xmpp.login.jid)
            .map_err(|e| BridgeError::ConfigInvalid(format!("xmpp login: {}", e)))?;
        if self.xmpp.groupchat_nick.is_empty() {
            return invalid("empty groupchat nick");
        }

        let topics = &self.matrix.room_topics;
        if topics.control.is_empty() || topics.all_chat.is_empty() {
            return invalid("empty room topic");
        }
        if topics.control == topics.all_chat {
            return invalid("control and all_chat room topics are equal");
        }
        if !TopicCodec::is_unambiguous_flag(&self.matrix.groupchat_flag) {
            return Err(BridgeError::ConfigInvalid(format!(
                "groupchat flag `{}` could be the beginning of a jid",
                self.matrix.groupchat_flag
            )));
        }
        for topic in [&topics.control, &topics.all_chat] {
            if jid::normalize(topic).is_ok() || topic.starts_with(&self.matrix.groupchat_flag) {
                return Err(BridgeError::ConfigInvalid(format!(
                    "room topic `{}` could be a contact topic",
                    topic
                )));
            }
        }

        for user_id in &self.matrix.users_to_invite {
            UserId::parse(user_id.as_str()).map_err(|e| {
                BridgeError::ConfigInvalid(format!("user to invite `{}`: {}", user_id, e))
            })?;
        }

        FilterPolicy::new(&self.disabled_jids, &self.xmpp.login.jid)
            .map_err(|e| BridgeError::ConfigInvalid(format!("disabled jids: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serial_test::serial;
    use tempfile::NamedTempFile;

    use super::*;

    const TEST_CONFIG: &str = r#"
matrix:
  server:
    base_url: "https://matrix.org"
  login:
    username: "@bridge:matrix.org"
    password: "matrix-password"
  users_to_invite: ["@me:matrix.org", "@partner:matrix.org"]
  room_topics:
    control: "control"
    all_chat: "all_chat"
  groupchat_flag: "groupchat: "
xmpp:
  server:
    host: "xmpp.example.com"
  login:
    jid: "bridge@example.com"
    password: "xmpp-password"
  groupchat_nick: "bridge"
disabled_jids: ["xmpp_login_jid", "spam@example.com"]
"#;

    fn create_test_config_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn create_test_config() -> Config {
        let file = create_test_config_file(TEST_CONFIG);
        Config::load(file.path().to_str().unwrap()).unwrap()
    }

    #[test]
    #[serial]
    fn test_load_with_defaults() {
        let config = create_test_config();

        assert_eq!(config.matrix.server.base_url, "https://matrix.org");
        assert!(config.matrix.server.valid_cert_check);
        assert!(config.matrix.restore_room_topic);
        assert_eq!(config.matrix.users_to_invite.len(), 2);
        assert_eq!(config.xmpp.server.port, 5222);
        assert_eq!(config.xmpp.queue_capacity, 256);
        assert!(!config.xmpp.roster_options.auto_authorize);
        assert!(!config.xmpp.roster_options.auto_subscribe);
        assert!(config.send_presences_to_control);
        assert!(config.send_messages_to_all_chat);
        assert!(!config.disable_all_chat_room);
        assert!(config.groupchat_mute_own_nick);
        assert_eq!(config.disabled_jids, vec!["xmpp_login_jid", "spam@example.com"]);
    }

    #[test]
    #[serial]
    fn test_load_with_environment_override() {
        let file = create_test_config_file(TEST_CONFIG);
        unsafe {
            std::env::set_var("MXPP_XMPP__LOGIN__PASSWORD", "from-env");
            std::env::set_var("MXPP_SEND_MESSAGES_TO_ALL_CHAT", "false");
        }

        let config = Config::load(file.path().to_str().unwrap());

        unsafe {
            std::env::remove_var("MXPP_XMPP__LOGIN__PASSWORD");
            std::env::remove_var("MXPP_SEND_MESSAGES_TO_ALL_CHAT");
        }
        let config = config.unwrap();
        assert_eq!(config.xmpp.login.password, "from-env");
        assert!(!config.send_messages_to_all_chat);
    }

    #[test]
    #[serial]
    fn test_all_chat_enabled() {
        let mut config = create_test_config();
        assert!(config.all_chat_enabled());

        // Copies still need the room
        config.disable_all_chat_room = true;
        assert!(config.all_chat_enabled());

        config.send_messages_to_all_chat = false;
        assert!(!config.all_chat_enabled());

        config.disable_all_chat_room = false;
        assert!(config.all_chat_enabled());
    }

    #[test]
    #[serial]
    fn test_load_missing_section() {
        let file = create_test_config_file("matrix:\n  groupchat_flag: \"groupchat: \"\n");

        assert!(matches!(
            Config::load(file.path().to_str().unwrap()),
            Err(BridgeError::ConfigInvalid(_))
        ));
    }

    #[test]
    #[serial]
    fn test_validate_ambiguous_groupchat_flag() {
        let mut config = create_test_config();
        config.matrix.groupchat_flag = "muc".to_string();

        assert!(matches!(
            config.validate(),
            Err(BridgeError::ConfigInvalid(_))
        ));
    }

    #[test]
    #[serial]
    fn test_validate_flag_prefixing_contact_topics() {
        let mut config = create_test_config();
        config.matrix.groupchat_flag = "bob@".to_string();

        assert!(matches!(
            config.validate(),
            Err(BridgeError::ConfigInvalid(_))
        ));
    }

    #[test]
    #[serial]
    fn test_validate_room_topics() {
        let mut config = create_test_config();
        config.matrix.room_topics.all_chat = "control".to_string();
        assert!(config.validate().is_err());

        let mut config = create_test_config();
        config.matrix.room_topics.control = String::new();
        assert!(config.validate().is_err());

        // Would be taken for the room of a contact
        let mut config = create_test_config();
        config.matrix.room_topics.control = "control@example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_validate_malformed_disabled_jid() {
        let mut config = create_test_config();
        config.disabled_jids.push("not a jid".to_string());

        assert!(matches!(
            config.validate(),
            Err(BridgeError::ConfigInvalid(_))
        ));
    }

    #[test]
    #[serial]
    fn test_validate_malformed_user_to_invite() {
        let mut config = create_test_config();
        config.matrix.users_to_invite.push("me".to_string());

        assert!(matches!(
            config.validate(),
            Err(BridgeError::ConfigInvalid(_))
        ));
    }

    #[test]
    #[serial]
    fn test_validate_empty_credentials() {
        let mut config = create_test_config();
        config.matrix.login.password = String::new();
        assert!(config.validate().is_err());

        let mut config = create_test_config();
        config.xmpp.login.jid = "bridge".to_string();
        assert!(config.validate().is_err());
    }
}
