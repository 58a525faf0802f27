use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde_json::{json, Value};
use tracing::debug;

use super::{parse, ApiError, ApiResult, AuthApi, EventSource, ParticipationApi};
use crate::config::AppConfig;
use crate::models::{
    Event, FilterOptions, LoginResponse, NewAccount, Participation, SignUpResponse, User,
};

const USER_AGENT: &str = "event-catalog/0.1";

/// reqwest-backed client for the event, participation and auth endpoints.
pub struct HttpApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpApi {
    pub fn from_config(config: &AppConfig) -> ApiResult<Self> {
        let base_url = config.effective_api_url();
        Url::parse(&base_url).map_err(|err| ApiError::InvalidUrl(format!("{base_url}: {err}")))?;

        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| ApiError::Http(err.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: config
                .auth_token
                .as_ref()
                .map(|token| token.trim().to_string())
                .filter(|token| !token.is_empty()),
        })
    }

    fn endpoint(&self, path: &str, query: &[(&str, String)]) -> ApiResult<Url> {
        let raw = format!("{}/{}", self.base_url, path);
        Url::parse_with_params(&raw, query).map_err(|err| ApiError::InvalidUrl(format!("{raw}: {err}")))
    }

    async fn request(&self, method: Method, url: Url, payload: Option<Value>) -> ApiResult<Value> {
        debug!(%method, %url, "api request");
        let mut request = self.client.request(method, url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(payload) = &payload {
            request = request.json(payload);
        }

        let response = request
            .send()
            .await
            .map_err(|err| ApiError::Http(format!("request failed for {url}: {err}")))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| ApiError::Http(format!("unable to read response body for {url}: {err}")))?;

        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        parse::body(&text)
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> ApiResult<Value> {
        let url = self.endpoint(path, query)?;
        self.request(Method::GET, url, None).await
    }
}

#[async_trait]
impl EventSource for HttpApi {
    async fn fetch_all_events(&self) -> ApiResult<Vec<Event>> {
        parse::event_list(self.get("evento/", &[]).await?)
    }

    async fn fetch_upcoming_events(&self, count: usize) -> ApiResult<Vec<Event>> {
        let value = self
            .get("evento/proximos", &[("cantidad", count.to_string())])
            .await?;
        parse::event_list(value)
    }

    async fn fetch_filter_options(&self) -> ApiResult<FilterOptions> {
        parse::filter_options(self.get("evento/filtros/opciones", &[]).await?)
    }
}

#[async_trait]
impl ParticipationApi for HttpApi {
    async fn register_for_event(
        &self,
        event_id: i64,
        user_id: Option<i64>,
    ) -> ApiResult<Participation> {
        let payload = match user_id {
            Some(user_id) => json!({ "userId": user_id, "eventoId": event_id }),
            None => json!({ "eventoId": event_id }),
        };
        let url = self.endpoint("participaciones/inscribir", &[])?;
        parse::registration(self.request(Method::POST, url, Some(payload)).await?)
    }

    async fn cancel_registration(&self, event_id: i64, user_id: Option<i64>) -> ApiResult<bool> {
        let path = match user_id {
            Some(user_id) => format!("participaciones/{user_id}/{event_id}"),
            None => format!("participaciones/{event_id}"),
        };
        let url = self.endpoint(&path, &[])?;
        let value = self.request(Method::DELETE, url, None).await?;
        Ok(parse::cancel_confirmed(&value))
    }

    async fn my_registrations(&self, user_id: Option<i64>) -> ApiResult<Vec<Participation>> {
        let path = match user_id {
            Some(user_id) => format!("participaciones/usuario/{user_id}"),
            None => "participaciones/mis-participaciones".to_string(),
        };
        parse::participation_list(self.get(&path, &[]).await?)
    }

    async fn event_registrations(&self, event_id: i64) -> ApiResult<Vec<Participation>> {
        let path = format!("participaciones/evento/{event_id}");
        parse::participation_list(self.get(&path, &[]).await?)
    }
}

#[async_trait]
impl AuthApi for HttpApi {
    async fn login(&self, email: &str, password: &str) -> ApiResult<LoginResponse> {
        let url = self.endpoint("auth/login", &[])?;
        let payload = json!({ "email": email, "password": password });
        parse::login(self.request(Method::POST, url, Some(payload)).await?)
    }

    async fn register(&self, account: &NewAccount) -> ApiResult<SignUpResponse> {
        let url = self.endpoint("auth/register", &[])?;
        let payload =
            serde_json::to_value(account).map_err(|err| ApiError::Parse(err.to_string()))?;
        parse::sign_up(self.request(Method::POST, url, Some(payload)).await?)
    }

    async fn current_user(&self) -> ApiResult<User> {
        parse::record(self.get("auth/me", &[]).await?, "user")
    }

    async fn logout(&self) -> ApiResult<()> {
        let url = self.endpoint("auth/logout", &[])?;
        self.request(Method::POST, url, None).await?;
        Ok(())
    }
}
