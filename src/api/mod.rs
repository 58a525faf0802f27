//! Network boundary of the catalog.
//!
//! The controllers only see these traits; [`http::HttpApi`] is the
//! production implementation and tests substitute in-memory fakes.

pub mod http;
pub mod parse;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    Event, FilterOptions, LoginResponse, NewAccount, Participation, SignUpResponse, User,
};

pub use http::HttpApi;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http error: {0}")]
    Http(String),
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch_all_events(&self) -> ApiResult<Vec<Event>>;

    async fn fetch_upcoming_events(&self, count: usize) -> ApiResult<Vec<Event>>;

    async fn fetch_filter_options(&self) -> ApiResult<FilterOptions>;
}

#[async_trait]
pub trait ParticipationApi: Send + Sync {
    async fn register_for_event(
        &self,
        event_id: i64,
        user_id: Option<i64>,
    ) -> ApiResult<Participation>;

    /// Returns true when the server confirmed the cancellation.
    async fn cancel_registration(&self, event_id: i64, user_id: Option<i64>) -> ApiResult<bool>;

    /// Registrations of `user_id`, or of the token's owner when `None`.
    async fn my_registrations(&self, user_id: Option<i64>) -> ApiResult<Vec<Participation>>;

    async fn event_registrations(&self, event_id: i64) -> ApiResult<Vec<Participation>>;
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> ApiResult<LoginResponse>;

    async fn register(&self, account: &NewAccount) -> ApiResult<SignUpResponse>;

    /// The token's owner. A rejected token comes back as status 401.
    async fn current_user(&self) -> ApiResult<User>;

    async fn logout(&self) -> ApiResult<()>;
}
