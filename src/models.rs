use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A running event as served by the catalog API.
///
/// Wire names follow the API (`nombre`, `ciudad`, ...); the core only reads
/// `id`, `name`, `city`, `level` and `date`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Event {
    pub id: i64,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "descripcion", default)]
    pub description: Option<String>,
    #[serde(rename = "ciudad")]
    pub city: String,
    #[serde(rename = "fecha")]
    pub date: DateTime<Utc>,
    #[serde(rename = "nivelDificultad")]
    pub level: DifficultyLevel,
    #[serde(rename = "imagenUrl", default)]
    pub image_url: Option<String>,
    #[serde(rename = "destacado", default)]
    pub featured: bool,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Event {
    pub fn title(&self) -> &str {
        if self.name.trim().is_empty() {
            "Untitled Event"
        } else {
            &self.name
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DifficultyLevel {
    #[serde(rename = "PRINCIPIANTE")]
    Beginner,
    #[serde(rename = "INTERMEDIO")]
    Intermediate,
    #[serde(rename = "AVANZADO")]
    Advanced,
}

impl DifficultyLevel {
    /// The identifier the API uses for this level.
    pub fn as_api_str(self) -> &'static str {
        match self {
            Self::Beginner => "PRINCIPIANTE",
            Self::Intermediate => "INTERMEDIO",
            Self::Advanced => "AVANZADO",
        }
    }
}

impl fmt::Display for DifficultyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_api_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown difficulty level: {0}")]
pub struct UnknownLevel(pub String);

impl FromStr for DifficultyLevel {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        match value.to_ascii_uppercase().as_str() {
            "PRINCIPIANTE" | "BEGINNER" => Ok(Self::Beginner),
            "INTERMEDIO" | "INTERMEDIATE" => Ok(Self::Intermediate),
            "AVANZADO" | "ADVANCED" => Ok(Self::Advanced),
            _ => Err(UnknownLevel(value.to_string())),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn toggled(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

/// Distinct cities and levels offered as filter choices.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterOptions {
    #[serde(rename = "ciudades", default)]
    pub cities: Vec<String>,
    #[serde(rename = "nivelesDificultad", default)]
    pub levels: Vec<DifficultyLevel>,
}

impl FilterOptions {
    /// Drops repeated entries, keeping the first occurrence of each.
    pub fn deduplicated(self) -> Self {
        let mut cities: Vec<String> = Vec::with_capacity(self.cities.len());
        for city in self.cities {
            if !cities.contains(&city) {
                cities.push(city);
            }
        }
        let mut levels: Vec<DifficultyLevel> = Vec::with_capacity(self.levels.len());
        for level in self.levels {
            if !levels.contains(&level) {
                levels.push(level);
            }
        }
        Self { cities, levels }
    }
}

/// Minimal view of the event nested in a participation record.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ParticipationEvent {
    pub id: i64,
    #[serde(rename = "nombre", default)]
    pub name: Option<String>,
}

/// A user's registration for an event.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Participation {
    pub id: i64,
    #[serde(rename = "userId")]
    pub user_id: i64,
    #[serde(rename = "eventoId")]
    pub event_id: i64,
    #[serde(rename = "fechaInscripcion", default)]
    pub registered_at: Option<DateTime<Utc>>,
    #[serde(rename = "evento", default)]
    pub event: Option<ParticipationEvent>,
}

impl Participation {
    /// Id of the registered event, preferring the nested record when present.
    pub fn registered_event_id(&self) -> i64 {
        self.event.as_ref().map_or(self.event_id, |event| event.id)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct User {
    pub id: i64,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "apellidos", default)]
    pub surname: Option<String>,
    pub email: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

/// Sign-up form for `auth/register`.
#[derive(Serialize, Clone, PartialEq)]
pub struct NewAccount {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "apellidos")]
    pub surname: String,
    pub email: String,
    pub password: String,
    #[serde(rename = "genero", skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
}

/// The server may create the account without opening a session.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SignUpResponse {
    pub user: User,
    #[serde(default)]
    pub token: Option<String>,
}
