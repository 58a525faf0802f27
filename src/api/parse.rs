use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{ApiError, ApiResult};
use crate::models::{Event, FilterOptions, LoginResponse, Participation, SignUpResponse};

const CANCEL_CONFIRMATION: &str = "Inscripción cancelada correctamente";

pub fn body(text: &str) -> ApiResult<Value> {
    serde_json::from_str(text).map_err(|err| ApiError::Parse(err.to_string()))
}

pub fn event_list(value: Value) -> ApiResult<Vec<Event>> {
    list(value, "event")
}

pub fn participation_list(value: Value) -> ApiResult<Vec<Participation>> {
    list(value, "participation")
}

pub fn filter_options(value: Value) -> ApiResult<FilterOptions> {
    if !value.is_object() {
        return Err(ApiError::Malformed(format!(
            "expected filter options object, got {}",
            kind(&value)
        )));
    }
    let options: FilterOptions = record(value, "filter options")?;
    Ok(options.deduplicated())
}

/// The registration endpoint wraps the record as `{ "participacion": ... }`.
pub fn registration(mut value: Value) -> ApiResult<Participation> {
    let inner = value
        .get_mut("participacion")
        .map(Value::take)
        .ok_or_else(|| ApiError::Malformed("missing participacion field".to_string()))?;
    record(inner, "participation")
}

pub fn cancel_confirmed(value: &Value) -> bool {
    value
        .get("message")
        .and_then(Value::as_str)
        .is_some_and(|message| message == CANCEL_CONFIRMATION)
}

pub fn login(value: Value) -> ApiResult<LoginResponse> {
    record(value, "login response")
}

pub fn sign_up(value: Value) -> ApiResult<SignUpResponse> {
    if value.get("user").is_none() {
        return Err(ApiError::Malformed(format!(
            "expected sign-up response with a user, got {}",
            kind(&value)
        )));
    }
    record(value, "sign-up response")
}

pub fn record<T: DeserializeOwned>(value: Value, what: &str) -> ApiResult<T> {
    serde_json::from_value(value).map_err(|err| ApiError::Malformed(format!("{what}: {err}")))
}

fn list<T: DeserializeOwned>(value: Value, what: &str) -> ApiResult<Vec<T>> {
    let Value::Array(items) = value else {
        return Err(ApiError::Malformed(format!(
            "expected an array of {what}s, got {}",
            kind(&value)
        )));
    };
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value(item)
                .map_err(|err| ApiError::Malformed(format!("{what} at index {index}: {err}")))
        })
        .collect()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DifficultyLevel;
    use serde_json::json;

    fn event_json(id: i64, name: &str) -> Value {
        json!({
            "id": id,
            "nombre": name,
            "descripcion": "",
            "ciudad": "Madrid",
            "fecha": "2025-04-06T09:00:00Z",
            "nivelDificultad": "PRINCIPIANTE",
            "imagenUrl": "",
            "destacado": false
        })
    }

    #[test]
    fn accepts_event_array() {
        let events = event_list(json!([event_json(1, "Alfa"), event_json(2, "Beta")]))
            .expect("valid list");
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].name, "Beta");
    }

    #[test]
    fn rejects_non_array_payload() {
        let err = event_list(json!({ "eventos": [] })).unwrap_err();
        assert!(matches!(err, ApiError::Malformed(ref msg) if msg.contains("an object")));
    }

    #[test]
    fn names_the_bad_element() {
        let err = event_list(json!([event_json(1, "Alfa"), { "id": "x" }])).unwrap_err();
        assert!(matches!(err, ApiError::Malformed(ref msg) if msg.contains("index 1")));
    }

    #[test]
    fn filter_options_are_deduplicated() {
        let options = filter_options(json!({
            "ciudades": ["Madrid", "Valencia", "Madrid"],
            "nivelesDificultad": ["AVANZADO", "PRINCIPIANTE", "AVANZADO"]
        }))
        .expect("valid options");
        assert_eq!(options.cities, vec!["Madrid", "Valencia"]);
        assert_eq!(
            options.levels,
            vec![DifficultyLevel::Advanced, DifficultyLevel::Beginner]
        );
        assert!(filter_options(json!(["Madrid"])).is_err());
    }

    #[test]
    fn unwraps_registration_envelope() {
        let participation = registration(json!({
            "participacion": { "id": 9, "userId": 2, "eventoId": 4 }
        }))
        .expect("valid registration");
        assert_eq!(participation.event_id, 4);
        assert!(registration(json!({ "id": 9 })).is_err());
    }

    #[test]
    fn sign_up_token_is_optional() {
        let user = json!({ "id": 4, "nombre": "Lucía", "email": "lucia@example.com" });
        let with_token = sign_up(json!({ "user": user, "token": "tok-9" })).expect("with token");
        assert_eq!(with_token.token.as_deref(), Some("tok-9"));
        assert_eq!(with_token.user.id, 4);

        let without = sign_up(json!({ "user": user })).expect("without token");
        assert!(without.token.is_none());
        assert!(matches!(
            sign_up(json!({ "message": "email ya registrado" })),
            Err(ApiError::Malformed(_))
        ));
    }

    #[test]
    fn cancel_requires_confirmation_message() {
        assert!(cancel_confirmed(
            &json!({ "message": "Inscripción cancelada correctamente" })
        ));
        assert!(!cancel_confirmed(&json!({ "message": "No encontrada" })));
        assert!(!cancel_confirmed(&json!(null)));
    }
}
