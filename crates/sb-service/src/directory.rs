//! Room membership and profile lookups.
//!
//! The membership store is the source of truth for who may enter which
//! room; the relay caches nothing and asks once per admission. Both lookups
//! run before the registry lock is ever taken.
//!
//! All queries use parameterized statements.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::time::Instant;
use tracing::instrument;

use crate::errors::SbError;
use crate::observability::metrics;
use crate::protocol::{Profile, UserId};

/// Trait for membership and profile lookups (enables mocking).
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    /// Whether `user_id` is on the member list of `room_id`.
    async fn is_member(&self, user_id: UserId, room_id: &str) -> Result<bool, SbError>;

    /// The display profile for `user_id`, `None` when no such user exists.
    async fn fetch_profile(&self, user_id: UserId) -> Result<Option<Profile>, SbError>;
}

/// Postgres-backed directory.
pub struct PgRoomDirectory {
    pool: PgPool,
}

impl PgRoomDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoomDirectory for PgRoomDirectory {
    #[instrument(skip_all, name = "sb.repo.is_member", fields(user_id, room_id))]
    async fn is_member(&self, user_id: UserId, room_id: &str) -> Result<bool, SbError> {
        let start = Instant::now();

        let row = sqlx::query(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM room_members
                WHERE room_id = $1 AND user_id = $2
            ) AS is_member
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let duration = start.elapsed();
            metrics::record_db_query("is_member", "error", duration);
            SbError::Database(e.to_string())
        })?;

        let duration = start.elapsed();
        metrics::record_db_query("is_member", "success", duration);

        Ok(row.get("is_member"))
    }

    #[instrument(skip_all, name = "sb.repo.fetch_profile", fields(user_id))]
    async fn fetch_profile(&self, user_id: UserId) -> Result<Option<Profile>, SbError> {
        let start = Instant::now();

        let row = sqlx::query(
            r#"
            SELECT id, name, email, profile, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            let duration = start.elapsed();
            metrics::record_db_query("fetch_profile", "error", duration);
            SbError::Database(e.to_string())
        })?;

        let duration = start.elapsed();
        metrics::record_db_query("fetch_profile", "success", duration);

        Ok(row.map(map_row_to_profile))
    }
}

/// Map a database row to a Profile.
fn map_row_to_profile(row: sqlx::postgres::PgRow) -> Profile {
    Profile {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        profile: row.get("profile"),
        created_at: row.get("created_at"),
    }
}

/// Mock directory for testing (exposed for integration tests).
pub mod mock {
    use std::collections::{HashMap, HashSet};

    use super::{async_trait, Profile, RoomDirectory, SbError, UserId};

    /// In-memory directory with a fixed membership table.
    ///
    /// The failure switches turn lookups into `Database` errors to exercise
    /// the collaborator-failure admission paths.
    #[derive(Debug, Default)]
    pub struct InMemoryDirectory {
        members: HashSet<(UserId, String)>,
        profiles: HashMap<UserId, Profile>,
        fail_membership: bool,
        fail_profiles: bool,
    }

    impl InMemoryDirectory {
        pub fn new() -> Self {
            Self::default()
        }

        /// Directory whose every lookup fails.
        pub fn failing() -> Self {
            Self {
                fail_membership: true,
                fail_profiles: true,
                ..Self::default()
            }
        }

        /// Make profile lookups fail while membership checks keep working.
        #[must_use]
        pub fn with_failing_profiles(mut self) -> Self {
            self.fail_profiles = true;
            self
        }

        /// Register a profile (without any room membership).
        #[must_use]
        pub fn with_profile(mut self, profile: Profile) -> Self {
            self.profiles.insert(profile.id, profile);
            self
        }

        /// Put `user_id` on the member list of `room_id`.
        #[must_use]
        pub fn with_member(mut self, user_id: UserId, room_id: &str) -> Self {
            self.members.insert((user_id, room_id.to_string()));
            self
        }

        /// Register a profile and a membership in one step.
        #[must_use]
        pub fn with_user_in_room(self, profile: Profile, room_id: &str) -> Self {
            let user_id = profile.id;
            self.with_profile(profile).with_member(user_id, room_id)
        }
    }

    #[async_trait]
    impl RoomDirectory for InMemoryDirectory {
        async fn is_member(&self, user_id: UserId, room_id: &str) -> Result<bool, SbError> {
            if self.fail_membership {
                return Err(SbError::Database("simulated lookup failure".to_string()));
            }
            Ok(self.members.contains(&(user_id, room_id.to_string())))
        }

        async fn fetch_profile(&self, user_id: UserId) -> Result<Option<Profile>, SbError> {
            if self.fail_profiles {
                return Err(SbError::Database("simulated lookup failure".to_string()));
            }
            Ok(self.profiles.get(&user_id).cloned())
        }
    }
}
