use std::path::{Path, PathBuf};

use tokio::fs;

use log::{debug, trace};
use matrix_sdk::authentication::matrix;
use serde::{Deserialize, Serialize};

/// Login data written next to the SDK store.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Session {
    user_session: matrix::MatrixSession,

    /// Where the next sync resumes
    #[serde(skip_serializing_if = "Option::is_none")]
    sync_token: Option<String>,
}

/// Persisted Matrix login of the bridge.
///
/// The session directory contains:
/// - `session`: JSON file with the access token and the last sync token
/// - `sqlite`: SQLite store of the Matrix SDK
///
/// Reusing the login across restarts keeps the same device and avoids a
/// fresh login on every start.
#[derive(Debug, Clone)]
pub struct SessionStore {
    session: Option<Session>,
    sqlite_path: PathBuf,
    session_path: PathBuf,
}

impl SessionStore {
    /// Opens the session directory, creating it when missing, and loads
    /// the saved login if there is one.
    pub async fn open(dir_path: &Path) -> Result<SessionStore, anyhow::Error> {
        debug!("read session at {}", dir_path.display());
        fs::create_dir_all(dir_path).await?;

        let sqlite_path = dir_path.join("sqlite");
        let session_path = dir_path.join("session");

        let session = match SessionStore::read_session(&session_path).await {
            Ok(session) => session,
            Err(e) => {
                debug!("ignoring saved session: {}", e);
                None
            }
        };
        debug!("found user session: {}", session.is_some());

        Ok(SessionStore {
            session,
            sqlite_path,
            session_path,
        })
    }

    /// Reads the session file, `None` when there is none yet.
    async fn read_session(session_path: &Path) -> Result<Option<Session>, anyhow::Error> {
        if !fs::try_exists(session_path).await.unwrap_or_default() {
            return Ok(None);
        }

        let session_data = fs::read_to_string(session_path).await?;
        let session: Session = serde_json::from_str(&session_data)?;
        Ok(Some(session))
    }

    pub fn sqlite_path(&self) -> &Path {
        &self.sqlite_path
    }

    pub fn user_session(&self) -> Option<&matrix::MatrixSession> {
        self.session.as_ref().map(|s| &s.user_session)
    }

    pub fn sync_token(&self) -> Option<String> {
        self.session.as_ref().and_then(|s| s.sync_token.clone())
    }

    /// Saves the token the next sync resumes from, keeping the login.
    pub async fn save_sync_token(&self, sync_token: String) -> anyhow::Result<()> {
        trace!("persist sync token {}", sync_token);

        let serialized_session = fs::read_to_string(&self.session_path).await?;
        let mut full_session: Session = serde_json::from_str(&serialized_session)?;

        full_session.sync_token = Some(sync_token);
        let serialized_session = serde_json::to_string(&full_session)?;
        fs::write(&self.session_path, serialized_session).await?;

        Ok(())
    }

    /// Saves a fresh login. Any previous sync token is discarded.
    pub async fn save_user_session(
        &mut self,
        user_session: &matrix::MatrixSession,
    ) -> anyhow::Result<()> {
        trace!("persist user session");

        let session = Session {
            user_session: user_session.clone(),
            sync_token: None,
        };

        let serialized_session = serde_json::to_string(&session)?;
        fs::write(&self.session_path, serialized_session).await?;
        self.session = Some(session);

        Ok(())
    }
}
