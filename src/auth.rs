use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::api::{ApiError, AuthApi};
use crate::config::{ConfigError, ConfigStore};
use crate::models::{NewAccount, User};

/// Who is using the catalog, as seen by the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthState {
    pub is_authenticated: bool,
    pub user_id: Option<i64>,
}

impl AuthState {
    pub fn signed_in(user_id: i64) -> Self {
        Self {
            is_authenticated: true,
            user_id: Some(user_id),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

/// Supplies the authentication context to components that need it.
pub trait AuthProvider: Send + Sync {
    fn auth_state(&self) -> AuthState;
}

impl AuthProvider for AuthState {
    fn auth_state(&self) -> AuthState {
        *self
    }
}

/// Reads the persisted session from the config store.
pub struct SessionAuth {
    store: Arc<ConfigStore>,
}

impl SessionAuth {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self { store }
    }
}

impl AuthProvider for SessionAuth {
    fn auth_state(&self) -> AuthState {
        let config = self.store.read();
        let has_token = config
            .auth_token
            .as_deref()
            .is_some_and(|token| !token.trim().is_empty());
        AuthState {
            is_authenticated: has_token,
            user_id: config.user_id.filter(|_| has_token),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Signs in and persists the returned session.
pub async fn login(
    api: &dyn AuthApi,
    store: &ConfigStore,
    email: &str,
    password: &str,
) -> Result<User, SessionError> {
    let response = api.login(email.trim(), password).await?;
    save_session(store, response.token, &response.user)?;
    info!(user_id = response.user.id, "signed in");
    Ok(response.user)
}

/// Creates an account. When the server also returns a token the new user
/// is signed in.
pub async fn register(
    api: &dyn AuthApi,
    store: &ConfigStore,
    account: &NewAccount,
) -> Result<User, SessionError> {
    let response = api.register(account).await?;
    match response.token.filter(|token| !token.trim().is_empty()) {
        Some(token) => {
            save_session(store, token, &response.user)?;
            info!(user_id = response.user.id, "account created, signed in");
        }
        None => info!(user_id = response.user.id, "account created without a session"),
    }
    Ok(response.user)
}

/// Confirms the stored session with the server and refreshes the saved
/// user. A token the server rejects (401) is dropped; any other failure
/// leaves the session in place.
pub async fn check_session(
    api: &dyn AuthApi,
    store: &ConfigStore,
) -> Result<Option<User>, SessionError> {
    let has_token = store
        .read()
        .auth_token
        .is_some_and(|token| !token.trim().is_empty());
    if !has_token {
        return Ok(None);
    }

    match api.current_user().await {
        Ok(user) => {
            store.update(|config| {
                config.user_id = Some(user.id);
                config.user_name = Some(user.name.clone());
            })?;
            Ok(Some(user))
        }
        Err(ApiError::Status { status: 401, .. }) => {
            info!("stored session was rejected, signing out");
            store.update(|config| config.clear_session())?;
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

fn save_session(store: &ConfigStore, token: String, user: &User) -> Result<(), ConfigError> {
    store.update(|config| {
        config.auth_token = Some(token);
        config.user_id = Some(user.id);
        config.user_name = Some(user.name.clone());
    })?;
    Ok(())
}

/// Ends the session. The local session is cleared even when the server
/// call fails.
pub async fn logout(api: &dyn AuthApi, store: &ConfigStore) -> Result<(), SessionError> {
    if let Err(err) = api.logout().await {
        warn!("server logout failed: {err}");
    }
    store.update(|config| config.clear_session())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiResult;
    use crate::models::{LoginResponse, SignUpResponse};
    use async_trait::async_trait;

    #[derive(Default)]
    struct FakeAuth {
        fail_logout: bool,
        sign_up_token: Option<String>,
        me_status: Option<u16>,
    }

    fn ana(email: &str) -> User {
        User {
            id: 5,
            name: "Ana".into(),
            surname: None,
            email: email.into(),
        }
    }

    #[async_trait]
    impl AuthApi for FakeAuth {
        async fn login(&self, email: &str, _password: &str) -> ApiResult<LoginResponse> {
            if email != "ana@example.com" {
                return Err(ApiError::Status {
                    status: 401,
                    body: "credenciales inválidas".into(),
                });
            }
            Ok(LoginResponse {
                token: "tok-123".into(),
                user: ana(email),
            })
        }

        async fn register(&self, account: &NewAccount) -> ApiResult<SignUpResponse> {
            Ok(SignUpResponse {
                user: User {
                    id: 8,
                    name: account.name.clone(),
                    surname: Some(account.surname.clone()),
                    email: account.email.clone(),
                },
                token: self.sign_up_token.clone(),
            })
        }

        async fn current_user(&self) -> ApiResult<User> {
            match self.me_status {
                None => Ok(User {
                    name: "Ana María".into(),
                    ..ana("ana@example.com")
                }),
                Some(status) => Err(ApiError::Status {
                    status,
                    body: "no autorizado".into(),
                }),
            }
        }

        async fn logout(&self) -> ApiResult<()> {
            if self.fail_logout {
                Err(ApiError::Http("offline".into()))
            } else {
                Ok(())
            }
        }
    }

    fn store() -> (tempfile::TempDir, Arc<ConfigStore>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(ConfigStore::open(dir.path().join("config.json")));
        (dir, store)
    }

    #[tokio::test]
    async fn login_persists_session() {
        let (_dir, store) = store();
        let auth = SessionAuth::new(store.clone());
        assert_eq!(auth.auth_state(), AuthState::anonymous());

        let user = login(&FakeAuth::default(), &store, " ana@example.com ", "pw")
            .await
            .expect("login");
        assert_eq!(user.id, 5);
        assert_eq!(auth.auth_state(), AuthState::signed_in(5));
        assert_eq!(store.read().auth_token.as_deref(), Some("tok-123"));
    }

    #[tokio::test]
    async fn failed_login_leaves_session_untouched() {
        let (_dir, store) = store();
        let err = login(&FakeAuth::default(), &store, "bob@example.com", "pw")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Api(ApiError::Status { status: 401, .. })));
        assert!(store.read().auth_token.is_none());
    }

    #[tokio::test]
    async fn logout_clears_session_even_if_server_fails() {
        let (_dir, store) = store();
        let api = FakeAuth {
            fail_logout: true,
            ..FakeAuth::default()
        };
        login(&api, &store, "ana@example.com", "pw").await.expect("login");

        logout(&api, &store).await.expect("logout");
        assert_eq!(SessionAuth::new(store).auth_state(), AuthState::anonymous());
    }

    fn account() -> NewAccount {
        NewAccount {
            name: "Lucía".into(),
            surname: "Pérez".into(),
            email: "lucia@example.com".into(),
            password: "secreto".into(),
            gender: Some("F".into()),
        }
    }

    #[tokio::test]
    async fn sign_up_with_token_persists_session() {
        let (_dir, store) = store();
        let api = FakeAuth {
            sign_up_token: Some("tok-new".into()),
            ..FakeAuth::default()
        };

        let user = register(&api, &store, &account()).await.expect("sign up");
        assert_eq!(user.id, 8);
        assert_eq!(SessionAuth::new(store.clone()).auth_state(), AuthState::signed_in(8));
        assert_eq!(store.read().auth_token.as_deref(), Some("tok-new"));
        assert_eq!(store.read().user_name.as_deref(), Some("Lucía"));
    }

    #[tokio::test]
    async fn sign_up_without_token_stays_signed_out() {
        let (_dir, store) = store();
        register(&FakeAuth::default(), &store, &account())
            .await
            .expect("sign up");
        assert_eq!(SessionAuth::new(store).auth_state(), AuthState::anonymous());
    }

    #[tokio::test]
    async fn session_check_refreshes_saved_user() {
        let (_dir, store) = store();
        let api = FakeAuth::default();
        assert!(check_session(&api, &store).await.expect("check").is_none());

        login(&api, &store, "ana@example.com", "pw").await.expect("login");
        let user = check_session(&api, &store).await.expect("check");
        assert_eq!(user.map(|u| u.id), Some(5));
        assert_eq!(store.read().user_name.as_deref(), Some("Ana María"));
    }

    #[tokio::test]
    async fn rejected_token_clears_session() {
        let (_dir, store) = store();
        login(&FakeAuth::default(), &store, "ana@example.com", "pw")
            .await
            .expect("login");

        let expired = FakeAuth {
            me_status: Some(401),
            ..FakeAuth::default()
        };
        assert!(check_session(&expired, &store).await.expect("check").is_none());
        assert!(store.read().auth_token.is_none());
        assert_eq!(SessionAuth::new(store).auth_state(), AuthState::anonymous());
    }

    #[tokio::test]
    async fn server_error_keeps_session() {
        let (_dir, store) = store();
        login(&FakeAuth::default(), &store, "ana@example.com", "pw")
            .await
            .expect("login");

        let down = FakeAuth {
            me_status: Some(503),
            ..FakeAuth::default()
        };
        assert!(matches!(
            check_session(&down, &store).await,
            Err(SessionError::Api(ApiError::Status { status: 503, .. }))
        ));
        assert_eq!(store.read().auth_token.as_deref(), Some("tok-123"));
    }
}
