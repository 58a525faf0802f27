pub mod api;
pub mod auth;
pub mod browser;
pub mod collection;
pub mod config;
pub mod debounce;
pub mod filter;
pub mod models;
pub mod pagination;
pub mod registration;
mod utils;

pub use api::{ApiError, AuthApi, EventSource, HttpApi, ParticipationApi};
pub use auth::{AuthProvider, AuthState, SessionAuth};
pub use browser::{EventBrowser, EventCard};
pub use collection::{CollectionController, ControllerSettings, EventView, LoadOutcome};
pub use config::{AppConfig, ConfigStore};
pub use filter::{apply_filters, derive_filter_options, FilterCriteria};
pub use models::{DifficultyLevel, Event, FilterOptions, NewAccount, Participation, SortOrder};
pub use pagination::{PaginationState, Paginator};
pub use registration::{RegisterOutcome, RegistrationError, RegistrationTracker};
