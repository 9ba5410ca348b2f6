//! mxpp - A bridge between XMPP and Matrix.
//!
//! Every XMPP contact and groupchat of the bridge account gets its own
//! Matrix room, in which the configured Matrix users are invited. Messages
//! flow both ways: what a contact writes appears in their room, and what is
//! written in the room is sent to the contact.
//!
//! # Rooms
//!
//! The topic of a room identifies what it is bridged to:
//!
//! - `alice@example.com` - a contact
//! - `<groupchat_flag>room@conference.example.com` - a groupchat
//! - `<room_topics.control>` - the control room, receiving presences and commands
//! - `<room_topics.all_chat>` - the all-chat room, a copy of every relayed message
//!
//! Rooms are found again from their topic when the bridge restarts, so no
//! state is kept besides the Matrix session.
//!
//! # Usage
//!
//! ```bash
//! mxpp --config config.yaml --data ./mxpp-data
//! ```
//!
//! See the [`config`] module for the configuration file, and the
//! [`commands`] module for the commands accepted in the control room.
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Controls logging level (default: `info`)
//! - `MXPP_*` - Override configuration values, `MXPP_XMPP__LOGIN__PASSWORD` for `xmpp.login.password`

use clap::Parser;
use env_logger::Env;
use log::{error, info};

use crate::{bridge::Bridge, config::Config};

mod bridge;
mod commands;
mod config;
mod error;
mod filter;
mod identity;
mod mapping;
mod matrix;
mod presence;
mod provisioner;
mod relay;
mod session;
mod xmpp;

/// Command-line arguments of the bridge.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: String,

    /// Path to the directory for storing persistent data.
    ///
    /// The Matrix session is kept in its `session/` subdirectory: keep it
    /// private, it holds the access token of the bridge account.
    #[arg(short, long)]
    data: String,
}

#[tokio::main]
async fn main() {
    // Put logger at info level by default
    let env = Env::default().filter_or("RUST_LOG", "info");
    env_logger::init_from_env(env);

    info!("starting mxpp {}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load config file: {}", e);
            return;
        }
    };

    let bridge = match Bridge::new(config, args).await {
        Ok(bridge) => bridge,
        Err(e) => {
            error!("failed to initialize bridge: {}", e);
            return;
        }
    };
    bridge.start().await;
}
