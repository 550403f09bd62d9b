//! Participant registrar.

use std::sync::{Arc, Mutex, MutexGuard};

use hublink_hub_api::ParticipantApi;
use hublink_protocol::Participant;
use tracing::{debug, info, trace};

use crate::BoxFuture;
use crate::error::ConnectionError;
use crate::preferences::Preferences;

/// Outcome of a registration request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Registered(Participant),
    /// No display name is configured; guest participation is not supported.
    Skipped,
}

/// Registers this client as a participant of the active hub.
pub trait ParticipantRegistrar: Send + Sync {
    /// Registers a participant, or adopts `existing` without a network call.
    fn register(
        &self,
        existing: Option<Participant>,
    ) -> BoxFuture<'_, Result<Registration, ConnectionError>>;

    /// Forgets the current participant and deletes it on the hub in the
    /// background. Errors are ignored.
    fn unregister(&self);

    /// Deletes a participant whose registration finished after it stopped
    /// being wanted. It stays current only if it is not `participant`.
    fn discard(&self, participant: &Participant);

    fn current_participant(&self) -> Option<Participant>;
}

/// A registration and the hub address it was made against.
struct Held {
    participant: Participant,
    endpoint: Option<String>,
}

/// Registrar backed by the hub's participant API.
pub struct ParticipantsService {
    api: Arc<dyn ParticipantApi>,
    preferences: Arc<dyn Preferences>,
    current: Mutex<Option<Held>>,
}

impl ParticipantsService {
    pub fn new(api: Arc<dyn ParticipantApi>, preferences: Arc<dyn Preferences>) -> Self {
        Self {
            api,
            preferences,
            current: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Held>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sends the delete to the address the participant was registered at.
    /// The request is built before returning, so it does not depend on the
    /// active path still being there.
    fn delete_in_background(&self, held: Held) {
        let Held {
            participant,
            endpoint,
        } = held;
        let delete = match &endpoint {
            Some(endpoint) => self.api.delete_participant_at(endpoint, &participant.id),
            None => self.api.delete_participant(&participant.id),
        };
        tokio::spawn(async move {
            if let Err(e) = delete.await {
                debug!(participant = %participant.id, error = %e, "participant delete failed");
            }
        });
    }
}

impl ParticipantRegistrar for ParticipantsService {
    fn register(
        &self,
        existing: Option<Participant>,
    ) -> BoxFuture<'_, Result<Registration, ConnectionError>> {
        Box::pin(async move {
            let endpoint = self.api.endpoint();
            if let Some(participant) = existing {
                debug!(participant = %participant.id, "reusing registered participant");
                *self.lock() = Some(Held {
                    participant: participant.clone(),
                    endpoint,
                });
                return Ok(Registration::Registered(participant));
            }
            let Some(user_name) = self.preferences.user_name() else {
                debug!("no display name configured, skipping registration");
                return Ok(Registration::Skipped);
            };
            let participant = self
                .api
                .create_participant(&user_name)
                .await
                .map_err(|e| ConnectionError::ParticipantRegistrationFailed(e.to_string()))?;
            info!(participant = %participant.id, user = %participant.user_name, "participant registered");
            *self.lock() = Some(Held {
                participant: participant.clone(),
                endpoint,
            });
            Ok(Registration::Registered(participant))
        })
    }

    fn unregister(&self) {
        let Some(held) = self.lock().take() else {
            trace!("no participant to unregister");
            return;
        };
        debug!(participant = %held.participant.id, "unregistering participant");
        self.delete_in_background(held);
    }

    fn discard(&self, participant: &Participant) {
        let held = {
            let mut current = self.lock();
            if current.as_ref().map(|h| &h.participant) == Some(participant) {
                current.take()
            } else {
                None
            }
        };
        debug!(participant = %participant.id, "discarding late registration");
        let held = held.unwrap_or_else(|| Held {
            participant: participant.clone(),
            endpoint: None,
        });
        self.delete_in_background(held);
    }

    fn current_participant(&self) -> Option<Participant> {
        self.lock().as_ref().map(|h| h.participant.clone())
    }
}
