//! Mapping from queued operations to coaching API requests

use reqwest::Method;
use serde_json::Value;

use super::error::RemoteError;
use crate::queue::OperationType;

/// A concrete HTTP request for one queue entry
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl Route {
    fn new(method: Method, path: String) -> Self {
        Self {
            method,
            path,
            query: Vec::new(),
            body: None,
        }
    }

    fn with_body(mut self, payload: &Value) -> Self {
        self.body = Some(payload.get("body").cloned().unwrap_or_else(|| payload.clone()));
        self
    }
}

/// Build the request for an operation from its payload
pub fn route_for(operation: OperationType, payload: &Value) -> Result<Route, RemoteError> {
    use OperationType::*;

    let route = match operation {
        UpdateProfile => Route::new(Method::PUT, "/api/profile/".into()).with_body(payload),
        UpdatePreferences => {
            Route::new(Method::PUT, "/api/profile/preferences".into()).with_body(payload)
        }
        CreateEquipment => Route::new(Method::POST, "/api/equipment/".into()).with_body(payload),
        UpdateEquipment => {
            let id = path_param(payload, "equipment_id")?;
            Route::new(Method::PUT, format!("/api/equipment/{}", id)).with_body(payload)
        }
        DeleteEquipment => {
            let id = path_param(payload, "equipment_id")?;
            Route::new(Method::DELETE, format!("/api/equipment/{}", id))
        }
        SetEquipmentAvailability => {
            let id = path_param(payload, "equipment_id")?;
            let available = payload
                .get("is_available")
                .and_then(Value::as_bool)
                .ok_or_else(|| RemoteError::InvalidPayload("missing boolean 'is_available'".into()))?;
            let mut route = Route::new(Method::PATCH, format!("/api/equipment/{}/availability", id));
            route.query.push(("is_available".into(), available.to_string()));
            route
        }
        StartSession => {
            let id = path_param(payload, "session_id")?;
            Route::new(Method::POST, format!("/api/sessions/{}/start", id))
        }
        CompleteSession => {
            let id = path_param(payload, "session_id")?;
            Route::new(Method::POST, format!("/api/sessions/{}/complete", id)).with_body(payload)
        }
        SkipSession => {
            let id = path_param(payload, "session_id")?;
            Route::new(Method::POST, format!("/api/sessions/{}/skip", id))
        }
        UpdateExerciseProgress => {
            let session = path_param(payload, "session_id")?;
            let exercise = path_param(payload, "exercise_id")?;
            Route::new(
                Method::PUT,
                format!("/api/sessions/{}/exercise/{}", session, exercise),
            )
            .with_body(payload)
        }
        ActivateProgram => {
            let id = path_param(payload, "program_id")?;
            Route::new(Method::POST, format!("/api/programs/{}/activate", id))
        }
        DeactivateProgram => {
            let id = path_param(payload, "program_id")?;
            Route::new(Method::POST, format!("/api/programs/{}/deactivate", id))
        }
    };

    Ok(route)
}

/// Read an id that becomes one path segment
///
/// Only unreserved URL characters are accepted, and `.`/`..` are refused,
/// so an id can never change the path, query or fragment.
fn path_param<'a>(payload: &'a Value, key: &str) -> Result<&'a str, RemoteError> {
    let id = payload
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| RemoteError::InvalidPayload(format!("missing '{}'", key)))?;

    let unreserved = id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~'));
    if !unreserved || id == "." || id == ".." {
        return Err(RemoteError::InvalidPayload(format!(
            "'{}' is not a valid {}",
            id, key
        )));
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_equipment_route() {
        let payload = json!({"equipment_id": "e-42", "body": {"name": "Kettlebell"}});
        let route = route_for(OperationType::UpdateEquipment, &payload).unwrap();

        assert_eq!(route.method, Method::PUT);
        assert_eq!(route.path, "/api/equipment/e-42");
        assert_eq!(route.body, Some(json!({"name": "Kettlebell"})));
    }

    #[test]
    fn test_whole_payload_is_body_without_body_key() {
        let payload = json!({"theme": "dark"});
        let route = route_for(OperationType::UpdatePreferences, &payload).unwrap();
        assert_eq!(route.body, Some(payload));
    }

    #[test]
    fn test_availability_uses_query() {
        let payload = json!({"equipment_id": "e1", "is_available": false});
        let route = route_for(OperationType::SetEquipmentAvailability, &payload).unwrap();

        assert_eq!(route.method, Method::PATCH);
        assert_eq!(route.path, "/api/equipment/e1/availability");
        assert_eq!(route.query, vec![("is_available".to_string(), "false".to_string())]);
        assert!(route.body.is_none());
    }

    #[test]
    fn test_exercise_progress_needs_both_ids() {
        let payload = json!({"session_id": "s1", "exercise_id": "x9", "body": {"reps": 10}});
        let route = route_for(OperationType::UpdateExerciseProgress, &payload).unwrap();
        assert_eq!(route.path, "/api/sessions/s1/exercise/x9");

        let missing = json!({"session_id": "s1"});
        assert!(matches!(
            route_for(OperationType::UpdateExerciseProgress, &missing),
            Err(RemoteError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_path_params_cannot_escape_their_segment() {
        for bad in ["../admin", "..", ".", "p1?force=true", "p1#frag", "p 1", "p%2F1"] {
            let payload = json!({"program_id": bad});
            assert!(
                matches!(
                    route_for(OperationType::ActivateProgram, &payload),
                    Err(RemoteError::InvalidPayload(_))
                ),
                "{bad} accepted"
            );
        }

        let uuid = "7f1c2e9a-0b6d-4c1e-9a57-3d2f8e6b1c40";
        let route = route_for(OperationType::ActivateProgram, &json!({"program_id": uuid})).unwrap();
        assert_eq!(route.path, format!("/api/programs/{}/activate", uuid));
    }
}
