use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use thiserror::Error;
use tracing::{info, warn};

use crate::api::{ApiError, ParticipationApi};
use crate::auth::AuthProvider;
use crate::collection::CollectionController;
use crate::config::{ConfigError, ConfigStore};
use crate::models::Participation;

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("sign in to manage event registrations")]
    NotAuthenticated,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegisterOutcome {
    Registered(Participation),
    /// The user is signed out; the event was saved and is registered by
    /// [`RegistrationTracker::resume_pending`] after sign-in.
    LoginRequired { event_id: i64 },
}

/// Tracks which events the current user is registered for.
pub struct RegistrationTracker {
    api: Arc<dyn ParticipationApi>,
    auth: Arc<dyn AuthProvider>,
    store: Arc<ConfigStore>,
    registered: Mutex<HashSet<i64>>,
}

impl RegistrationTracker {
    pub fn new(
        api: Arc<dyn ParticipationApi>,
        auth: Arc<dyn AuthProvider>,
        store: Arc<ConfigStore>,
    ) -> Self {
        Self {
            api,
            auth,
            store,
            registered: Mutex::new(HashSet::new()),
        }
    }

    /// Reloads the registered set from the server. Signed-out users have
    /// no registrations.
    pub async fn refresh(&self) -> Result<usize, RegistrationError> {
        let auth = self.auth.auth_state();
        if !auth.is_authenticated {
            self.lock().clear();
            return Ok(0);
        }
        let participations = self.api.my_registrations(auth.user_id).await?;
        let ids: HashSet<i64> = participations
            .iter()
            .map(Participation::registered_event_id)
            .collect();
        let count = ids.len();
        *self.lock() = ids;
        Ok(count)
    }

    pub async fn register(&self, event_id: i64) -> Result<RegisterOutcome, RegistrationError> {
        let auth = self.auth.auth_state();
        if !auth.is_authenticated {
            self.store
                .update(|config| config.pending_registration = Some(event_id))?;
            info!(event_id, "registration deferred until sign-in");
            return Ok(RegisterOutcome::LoginRequired { event_id });
        }

        let participation = self
            .api
            .register_for_event(event_id, auth.user_id)
            .await
            .inspect_err(|err| warn!(event_id, "registration failed: {err}"))?;
        self.lock().insert(event_id);
        Ok(RegisterOutcome::Registered(participation))
    }

    /// Returns true when the server confirmed the cancellation.
    pub async fn cancel(&self, event_id: i64) -> Result<bool, RegistrationError> {
        let auth = self.auth.auth_state();
        if !auth.is_authenticated {
            return Err(RegistrationError::NotAuthenticated);
        }
        let confirmed = self.api.cancel_registration(event_id, auth.user_id).await?;
        if confirmed {
            self.lock().remove(&event_id);
        }
        Ok(confirmed)
    }

    /// Completes a registration deferred by a signed-out attempt. The saved
    /// event is kept if the call fails.
    pub async fn resume_pending(&self) -> Result<Option<Participation>, RegistrationError> {
        let Some(event_id) = self.store.read().pending_registration else {
            return Ok(None);
        };
        if !self.auth.auth_state().is_authenticated {
            return Ok(None);
        }
        match self.register(event_id).await? {
            RegisterOutcome::Registered(participation) => {
                self.store
                    .update(|config| config.pending_registration = None)?;
                Ok(Some(participation))
            }
            RegisterOutcome::LoginRequired { .. } => Ok(None),
        }
    }

    /// Asks the server whether the user is registered for `event_id`.
    /// Lookup failures count as not registered.
    pub async fn verify(&self, event_id: i64) -> bool {
        let auth = self.auth.auth_state();
        if !auth.is_authenticated {
            return false;
        }
        match self.api.my_registrations(auth.user_id).await {
            Ok(participations) => participations
                .iter()
                .any(|participation| participation.registered_event_id() == event_id),
            Err(err) => {
                warn!(event_id, "registration check failed: {err}");
                false
            }
        }
    }

    pub async fn participants(&self, event_id: i64) -> Result<Vec<Participation>, RegistrationError> {
        Ok(self.api.event_registrations(event_id).await?)
    }

    pub fn is_registered(&self, event_id: i64) -> bool {
        self.lock().contains(&event_id)
    }

    pub fn registered_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.lock().iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Pushes the registered set into the controller for badge rendering.
    pub fn publish_to(&self, controller: &CollectionController) {
        controller.set_registered_ids(self.registered_ids());
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<i64>> {
        self.registered.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiResult;
    use crate::auth::AuthState;
    use crate::models::ParticipationEvent;
    use async_trait::async_trait;

    #[derive(Default)]
    struct FakeParticipation {
        existing: Vec<Participation>,
        fail_register: bool,
    }

    fn participation(event_id: i64, nested: Option<i64>) -> Participation {
        Participation {
            id: event_id * 10,
            user_id: 5,
            event_id,
            registered_at: None,
            event: nested.map(|id| ParticipationEvent { id, name: None }),
        }
    }

    #[async_trait]
    impl ParticipationApi for FakeParticipation {
        async fn register_for_event(
            &self,
            event_id: i64,
            user_id: Option<i64>,
        ) -> ApiResult<Participation> {
            assert_eq!(user_id, Some(5));
            if self.fail_register {
                return Err(ApiError::Status {
                    status: 409,
                    body: "ya inscrito".into(),
                });
            }
            Ok(participation(event_id, None))
        }

        async fn cancel_registration(
            &self,
            event_id: i64,
            _user_id: Option<i64>,
        ) -> ApiResult<bool> {
            Ok(event_id != 404)
        }

        async fn my_registrations(&self, _user_id: Option<i64>) -> ApiResult<Vec<Participation>> {
            Ok(self.existing.clone())
        }

        async fn event_registrations(&self, event_id: i64) -> ApiResult<Vec<Participation>> {
            Ok(self
                .existing
                .iter()
                .filter(|p| p.registered_event_id() == event_id)
                .cloned()
                .collect())
        }
    }

    struct NoEvents;

    #[async_trait]
    impl crate::api::EventSource for NoEvents {
        async fn fetch_all_events(&self) -> ApiResult<Vec<crate::models::Event>> {
            Ok(Vec::new())
        }

        async fn fetch_upcoming_events(&self, _count: usize) -> ApiResult<Vec<crate::models::Event>> {
            Ok(Vec::new())
        }

        async fn fetch_filter_options(&self) -> ApiResult<crate::models::FilterOptions> {
            Ok(Default::default())
        }
    }

    fn tracker(
        api: FakeParticipation,
        auth: AuthState,
    ) -> (tempfile::TempDir, Arc<ConfigStore>, RegistrationTracker) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(ConfigStore::open(dir.path().join("config.json")));
        let tracker = RegistrationTracker::new(Arc::new(api), Arc::new(auth), store.clone());
        (dir, store, tracker)
    }

    #[tokio::test]
    async fn refresh_collects_registered_event_ids() {
        let api = FakeParticipation {
            existing: vec![participation(3, None), participation(8, Some(9))],
            ..FakeParticipation::default()
        };
        let (_dir, _store, tracker) = tracker(api, AuthState::signed_in(5));

        assert_eq!(tracker.refresh().await.expect("refresh"), 2);
        assert_eq!(tracker.registered_ids(), vec![3, 9]);
        assert!(tracker.verify(9).await);
        assert!(!tracker.verify(8).await);
        assert_eq!(tracker.participants(9).await.expect("participants").len(), 1);
    }

    #[tokio::test]
    async fn signed_out_registration_is_deferred() {
        let (_dir, store, tracker) = tracker(FakeParticipation::default(), AuthState::anonymous());

        let outcome = tracker.register(12).await.expect("register");
        assert_eq!(outcome, RegisterOutcome::LoginRequired { event_id: 12 });
        assert_eq!(store.read().pending_registration, Some(12));
        assert!(tracker.resume_pending().await.expect("resume").is_none());
        assert!(matches!(
            tracker.cancel(12).await,
            Err(RegistrationError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn pending_registration_resumes_after_sign_in() {
        let (_dir, store, tracker) = tracker(FakeParticipation::default(), AuthState::signed_in(5));
        store
            .update(|config| config.pending_registration = Some(12))
            .expect("seed pending");

        let participation = tracker.resume_pending().await.expect("resume");
        assert_eq!(participation.map(|p| p.event_id), Some(12));
        assert!(tracker.is_registered(12));
        assert_eq!(store.read().pending_registration, None);
    }

    #[tokio::test]
    async fn failed_resume_keeps_pending_event() {
        let api = FakeParticipation {
            fail_register: true,
            ..FakeParticipation::default()
        };
        let (_dir, store, tracker) = tracker(api, AuthState::signed_in(5));
        store
            .update(|config| config.pending_registration = Some(12))
            .expect("seed pending");

        assert!(matches!(
            tracker.resume_pending().await,
            Err(RegistrationError::Api(ApiError::Status { status: 409, .. }))
        ));
        assert_eq!(store.read().pending_registration, Some(12));
        assert!(!tracker.is_registered(12));
    }

    #[tokio::test]
    async fn cancel_removes_only_when_confirmed() {
        let (_dir, _store, tracker) = tracker(FakeParticipation::default(), AuthState::signed_in(5));
        tracker.register(7).await.expect("register");
        tracker.register(404).await.expect("register");

        assert!(tracker.cancel(7).await.expect("cancel"));
        assert!(!tracker.cancel(404).await.expect("cancel"));
        assert_eq!(tracker.registered_ids(), vec![404]);
    }

    #[tokio::test]
    async fn registered_ids_reach_the_controller() {
        let (_dir, _store, tracker) = tracker(FakeParticipation::default(), AuthState::signed_in(5));
        tracker.register(3).await.expect("register");

        let controller = CollectionController::new(Arc::new(NoEvents), Default::default());
        tracker.publish_to(&controller);
        assert!(controller.is_registered(3));
    }
}
