//! Admission control: the ordered gate a connection passes before it exists.
//!
//! Gate order is fixed and short-circuiting:
//!
//! 1. a credential and a room id were presented at all,
//! 2. the credential verifies to a user id,
//! 3. that user is on the room's member list,
//! 4. a display profile exists for the user,
//! 5. the room has a free slot (checked-and-committed atomically by the
//!    registry).
//!
//! Gates 2-4 call external collaborators and complete before the registry
//! lock is taken. A refusal at any gate leaves no trace: the connection is
//! never visible to other members and no presence event is produced.
//! Collaborator failures refuse the connection at the gate where they
//! occurred (membership lookup failure reads as "not a member", profile
//! lookup failure as "profile unavailable"); the underlying error is logged
//! server-side only.

use std::time::Instant;

use tracing::instrument;

use crate::auth::TokenVerifier;
use crate::directory::RoomDirectory;
use crate::errors::SbError;
use crate::observability::metrics;
use crate::protocol::{ConnectionId, Profile, UserId};
use crate::registry::{OutboundSender, RoomRegistry};

/// A connection that passed every gate and is committed to its room.
#[derive(Debug)]
pub struct Admitted {
    pub user_id: UserId,
    pub profile: Profile,
}

/// Runs the full admission pipeline for one connection.
///
/// On success the connection is a room member and its welcome frames are
/// already queued on `tx`. On refusal the error says which gate failed;
/// nothing was recorded and nothing was sent.
#[instrument(skip_all, name = "sb.admission", fields(%handle))]
pub async fn admit(
    verifier: &dyn TokenVerifier,
    directory: &dyn RoomDirectory,
    registry: &RoomRegistry,
    handle: ConnectionId,
    credential: Option<&str>,
    room_id: Option<&str>,
    tx: OutboundSender,
) -> Result<Admitted, SbError> {
    let started = Instant::now();
    let result = run_gates(verifier, directory, registry, handle, credential, room_id, tx).await;

    let outcome = match &result {
        Ok(_) => "admitted",
        Err(error) => error.error_type_label(),
    };
    metrics::record_admission(outcome, started.elapsed());

    match &result {
        Ok(admitted) => {
            tracing::info!(
                target: "sb.admission",
                %handle,
                user_id = admitted.user_id,
                "connection admitted"
            );
        }
        Err(error @ (SbError::Database(_) | SbError::Config(_) | SbError::Internal(_))) => {
            tracing::warn!(target: "sb.admission", %handle, %error, "admission failed internally");
        }
        Err(error) => {
            tracing::info!(target: "sb.admission", %handle, %error, outcome, "admission refused");
        }
    }

    result
}

async fn run_gates(
    verifier: &dyn TokenVerifier,
    directory: &dyn RoomDirectory,
    registry: &RoomRegistry,
    handle: ConnectionId,
    credential: Option<&str>,
    room_id: Option<&str>,
    tx: OutboundSender,
) -> Result<Admitted, SbError> {
    let credential = credential.filter(|c| !c.is_empty());
    let room_id = room_id.filter(|r| !r.is_empty());
    let (Some(credential), Some(room_id)) = (credential, room_id) else {
        return Err(SbError::MissingCredentials);
    };

    let user_id = verifier.verify(credential).await.map_err(|e| match e {
        refusal @ SbError::Unauthenticated(_) => refusal,
        other => SbError::Unauthenticated(other.to_string()),
    })?;

    let is_member = directory.is_member(user_id, room_id).await.unwrap_or_else(|error| {
        tracing::warn!(target: "sb.admission", %error, user_id, room_id, "membership lookup failed");
        false
    });
    if !is_member {
        return Err(SbError::NotAMember {
            user_id,
            room_id: room_id.to_string(),
        });
    }

    let profile = directory
        .fetch_profile(user_id)
        .await
        .unwrap_or_else(|error| {
            tracing::warn!(target: "sb.admission", %error, user_id, "profile lookup failed");
            None
        })
        .ok_or(SbError::ProfileUnavailable(user_id))?;

    registry.join(handle, user_id, room_id, profile.clone(), tx)?;

    Ok(Admitted { user_id, profile })
}
