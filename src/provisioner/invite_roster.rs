//! Matrix users that must be present in every managed room.

use log::{debug, warn};

use crate::{error::BridgeError, matrix::MatrixApi};

/// The configured `users_to_invite`.
#[derive(Debug, Clone, Default)]
pub struct InviteRoster {
    users: Vec<String>,
}

impl InviteRoster {
    /// Creates the roster, ignoring repeated user IDs.
    pub fn new(users: &[String]) -> Self {
        let mut deduplicated: Vec<String> = Vec::with_capacity(users.len());
        for user in users {
            if !deduplicated.contains(user) {
                deduplicated.push(user.clone());
            }
        }
        InviteRoster {
            users: deduplicated,
        }
    }

    pub fn users(&self) -> &[String] {
        &self.users
    }

    /// Returns the roster users absent from `members`.
    pub fn missing<'a>(&'a self, members: &[String]) -> Vec<&'a str> {
        self.users
            .iter()
            .filter(|user| !members.contains(user))
            .map(String::as_str)
            .collect()
    }

    /// Invites every roster user into a room the bridge just created.
    ///
    /// Returns the number of invites sent. Failed invites are logged and
    /// left to the next repair.
    pub async fn invite_all(&self, matrix: &dyn MatrixApi, room_id: &str) -> usize {
        let own_user_id = matrix.own_user_id();
        let mut invited = 0;

        for user in self.users.iter().filter(|user| **user != own_user_id) {
            match matrix.invite(room_id, user).await {
                Ok(()) => invited += 1,
                Err(e) => warn!("failed to invite {} into {}: {}", user, room_id, e),
            }
        }

        invited
    }

    /// Invites the roster users that are neither joined nor invited.
    ///
    /// # Errors
    ///
    /// Returns an error if the members of the room cannot be listed.
    pub async fn repair(&self, matrix: &dyn MatrixApi, room_id: &str) -> Result<usize, BridgeError> {
        let members = matrix.members(room_id).await?;
        let mut invited = 0;

        for user in self.missing(&members) {
            debug!("{} is missing from {}, inviting", user, room_id);
            match matrix.invite(room_id, user).await {
                Ok(()) => invited += 1,
                Err(e) => warn!("failed to invite {} into {}: {}", user, room_id, e),
            }
        }

        Ok(invited)
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;

    use super::*;
    use crate::matrix::MockMatrixApi;

    fn create_roster() -> InviteRoster {
        InviteRoster::new(&[
            "@me:matrix.org".to_string(),
            "@partner:matrix.org".to_string(),
            "@me:matrix.org".to_string(),
        ])
    }

    #[test]
    fn test_new_deduplicates() {
        assert_eq!(
            create_roster().users(),
            ["@me:matrix.org", "@partner:matrix.org"]
        );
    }

    #[test]
    fn test_missing() {
        let roster = create_roster();
        let members = vec!["@bridge:matrix.org".to_string(), "@me:matrix.org".to_string()];

        assert_eq!(roster.missing(&members), vec!["@partner:matrix.org"]);
    }

    #[tokio::test]
    async fn test_invite_all_skips_own_user() {
        let roster = InviteRoster::new(&[
            "@bridge:matrix.org".to_string(),
            "@me:matrix.org".to_string(),
        ]);
        let mut matrix = MockMatrixApi::new();
        matrix
            .expect_own_user_id()
            .returning(|| "@bridge:matrix.org".to_string());
        matrix
            .expect_invite()
            .with(eq("!a:matrix.org"), eq("@me:matrix.org"))
            .times(1)
            .returning(|_, _| Ok(()));

        assert_eq!(roster.invite_all(&matrix, "!a:matrix.org").await, 1);
    }

    #[tokio::test]
    async fn test_repair_invites_missing_users_only() {
        let roster = create_roster();
        let mut matrix = MockMatrixApi::new();
        matrix
            .expect_members()
            .with(eq("!a:matrix.org"))
            .returning(|_| Ok(vec!["@me:matrix.org".to_string()]));
        matrix
            .expect_invite()
            .with(eq("!a:matrix.org"), eq("@partner:matrix.org"))
            .times(1)
            .returning(|_, _| Ok(()));

        assert_eq!(roster.repair(&matrix, "!a:matrix.org").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_repair_keeps_going_after_failed_invite() {
        let roster = create_roster();
        let mut matrix = MockMatrixApi::new();
        matrix.expect_members().returning(|_| Ok(vec![]));
        matrix
            .expect_invite()
            .withf(|_: &str, user: &str| user == "@me:matrix.org")
            .times(1)
            .returning(|_, _| Err(BridgeError::Matrix("forbidden".to_string())));
        matrix
            .expect_invite()
            .withf(|_: &str, user: &str| user == "@partner:matrix.org")
            .times(1)
            .returning(|_, _| Ok(()));

        assert_eq!(roster.repair(&matrix, "!a:matrix.org").await.unwrap(), 1);
    }
}
