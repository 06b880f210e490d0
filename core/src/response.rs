//! Response interpretation.
//!
//! # Design
//! The bridge answers with one of three JSON envelopes: a single object, a
//! mapping from resource key to object, or a sequence of per-item
//! acknowledgements that may carry an `error` even on HTTP 200. Each shape is
//! decoded once into the types below, and all classification happens here so
//! the operations in `client` only pick a shape.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ApiError;
use crate::http::HttpResponse;
use crate::types::{Resource, ID_FIELD};

/// Description used when the bridge reports a failure without one.
pub const GENERIC_UPDATE_FAILURE: &str = "state update failed";

/// How the keys of a mapping-of-objects response are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPolicy {
    /// Keys are discarded.
    Discard,
    /// Keys must be numeric and are injected into each object under `ID`.
    InjectNumeric,
}

/// One element of a mutation response.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope {
    Item(Map<String, Value>),
    Other(Value),
}

/// Fail with the body text verbatim unless the bridge answered 200.
pub fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if response.status == 200 {
        return Ok(());
    }
    warn!(status = response.status, "bridge returned an error status");
    Err(ApiError::Bridge {
        status: response.status,
        body: response.body.clone(),
    })
}

/// Decode a single-object body.
pub fn decode_object(response: &HttpResponse) -> Result<Resource, ApiError> {
    check_status(response)?;
    serde_json::from_str(&response.body).map_err(|e| ApiError::decode(e, &response.body))
}

/// Decode a mapping-of-objects body into its objects.
///
/// Entries whose value is not an object are skipped. With
/// `KeyPolicy::InjectNumeric` any non-numeric key fails the whole call.
pub fn decode_collection(response: &HttpResponse, keys: KeyPolicy) -> Result<Vec<Resource>, ApiError> {
    check_status(response)?;
    let entries: Map<String, Value> =
        serde_json::from_str(&response.body).map_err(|e| ApiError::decode(e, &response.body))?;

    let mut resources = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        let id = match keys {
            KeyPolicy::Discard => None,
            KeyPolicy::InjectNumeric => Some(parse_key(&key)?),
        };
        let Value::Object(mut resource) = value else {
            continue;
        };
        if let Some(id) = id {
            resource.insert(ID_FIELD.to_string(), Value::from(id));
        }
        resources.push(resource);
    }
    Ok(resources)
}

/// Decode a mutation response and return the `success` payload of each entry.
///
/// Any non-object entry or any entry with a non-null `error` fails the call.
pub fn decode_acknowledgements(response: &HttpResponse) -> Result<Vec<Value>, ApiError> {
    check_status(response)?;
    let envelopes: Vec<Envelope> =
        serde_json::from_str(&response.body).map_err(|e| ApiError::decode(e, &response.body))?;
    successes(envelopes)
}

/// Decode the response to a command such as a search or a delete.
///
/// A 200 whose body is not an acknowledgement sequence counts as success;
/// a sequence is still checked for embedded errors.
pub fn decode_command(response: &HttpResponse) -> Result<(), ApiError> {
    check_status(response)?;
    match serde_json::from_str::<Vec<Envelope>>(&response.body) {
        Ok(envelopes) => successes(envelopes).map(|_| ()),
        Err(_) => Ok(()),
    }
}

fn successes(envelopes: Vec<Envelope>) -> Result<Vec<Value>, ApiError> {
    let mut successes = Vec::with_capacity(envelopes.len());
    for envelope in envelopes {
        let item = match envelope {
            Envelope::Item(item) => item,
            Envelope::Other(entry) => {
                warn!(%entry, "acknowledgement entry is not an object");
                return Err(ApiError::UnexpectedResponseShape);
            }
        };
        match item.get("error") {
            None | Some(Value::Null) => {}
            Some(error) => {
                let description = error
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or(GENERIC_UPDATE_FAILURE);
                warn!(description, "bridge rejected update");
                return Err(ApiError::StateUpdate(description.to_string()));
            }
        }
        if let Some(success) = item.get("success") {
            successes.push(success.clone());
        }
    }
    Ok(successes)
}

/// Decode a mutation response, discarding the acknowledgements.
pub fn decode_mutation(response: &HttpResponse) -> Result<(), ApiError> {
    decode_acknowledgements(response).map(|_| ())
}

/// First string value of `field` among the `success` objects of a mutation.
pub fn acknowledged_field(response: &HttpResponse, field: &str) -> Result<String, ApiError> {
    decode_acknowledgements(response)?
        .iter()
        .find_map(|success| success.get(field).and_then(Value::as_str))
        .map(str::to_string)
        .ok_or(ApiError::UnexpectedResponseShape)
}

fn parse_key(key: &str) -> Result<i64, ApiError> {
    key.parse().map_err(|_| ApiError::KeyParse(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn non_200_keeps_body_verbatim() {
        let err = decode_object(&status(403, "not authorized")).unwrap_err();
        match err {
            ApiError::Bridge { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body, "not authorized");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_200_is_not_parsed_as_json() {
        let err = decode_mutation(&status(500, r#"[{"error":{"description":"x"}}]"#)).unwrap_err();
        assert!(matches!(err, ApiError::Bridge { status: 500, .. }));
    }

    #[test]
    fn object_decodes() {
        let resource = decode_object(&HttpResponse::ok(r#"{"name":"Lamp","state":{"on":true}}"#)).unwrap();
        assert_eq!(resource["name"], "Lamp");
        assert_eq!(resource["state"]["on"], true);
    }

    #[test]
    fn object_rejects_malformed_json() {
        let err = decode_object(&HttpResponse::ok("not json")).unwrap_err();
        assert!(matches!(err, ApiError::Decode { ref body, .. } if body == "not json"));
    }

    #[test]
    fn object_rejects_wrong_shape() {
        let err = decode_object(&HttpResponse::ok(r#"[1, 2]"#)).unwrap_err();
        assert!(matches!(err, ApiError::Decode { .. }));
    }

    #[test]
    fn light_listing_with_non_numeric_key_fails() {
        let response = HttpResponse::ok(r#"{"1": {"name": "Lamp"}, "x": {"name": "Bad"}}"#);
        let err = decode_collection(&response, KeyPolicy::InjectNumeric).unwrap_err();
        assert!(matches!(err, ApiError::KeyParse(ref key) if key == "x"));
    }

    #[test]
    fn light_listing_injects_numeric_id() {
        let response = HttpResponse::ok(r#"{"1": {"name": "Lamp"}, "3": {"name": "Desk"}}"#);
        let lights = decode_collection(&response, KeyPolicy::InjectNumeric).unwrap();
        assert_eq!(lights.len(), 2);
        let desk = lights.iter().find(|l| l["name"] == "Desk").unwrap();
        assert_eq!(desk[ID_FIELD], 3);
    }

    #[test]
    fn group_listing_drops_non_objects() {
        let response = HttpResponse::ok(r#"{"1": {"name": "Group A"}, "2": "not-an-object"}"#);
        let groups = decode_collection(&response, KeyPolicy::Discard).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0]["name"], "Group A");
        assert!(!groups[0].contains_key(ID_FIELD));
    }

    #[test]
    fn listing_rejects_non_object_body() {
        let err = decode_collection(&HttpResponse::ok("[]"), KeyPolicy::Discard).unwrap_err();
        assert!(matches!(err, ApiError::Decode { .. }));
    }

    #[test]
    fn mutation_success_is_acknowledged() {
        let response = HttpResponse::ok(r#"[{"success": {"/lights/1/state/on": true}}]"#);
        let acks = decode_acknowledgements(&response).unwrap();
        assert_eq!(acks.len(), 1);
    }

    #[test]
    fn mutation_error_carries_description() {
        let response = HttpResponse::ok(r#"[{"error": {"type": 201, "description": "missing parameter"}}]"#);
        let err = decode_mutation(&response).unwrap_err();
        assert!(matches!(err, ApiError::StateUpdate(ref d) if d == "missing parameter"));
    }

    #[test]
    fn mutation_error_without_description_is_generic() {
        let response = HttpResponse::ok(r#"[{"success": {"a": 1}}, {"error": {"type": 7}}]"#);
        let err = decode_mutation(&response).unwrap_err();
        assert!(matches!(err, ApiError::StateUpdate(ref d) if d == GENERIC_UPDATE_FAILURE));
    }

    #[test]
    fn mutation_null_error_is_ignored() {
        assert!(decode_mutation(&HttpResponse::ok(r#"[{"error": null, "success": {}}]"#)).is_ok());
    }

    #[test]
    fn mutation_non_object_entry_fails() {
        let err = decode_mutation(&HttpResponse::ok(r#"[{"success": {}}, "oops"]"#)).unwrap_err();
        assert!(matches!(err, ApiError::UnexpectedResponseShape));
    }

    #[test]
    fn mutation_rejects_object_body() {
        let err = decode_mutation(&HttpResponse::ok(r#"{"success": {}}"#)).unwrap_err();
        assert!(matches!(err, ApiError::Decode { .. }));
    }

    #[test]
    fn command_accepts_body_without_acknowledgements() {
        for body in ["", "ok", r#"{"done": true}"#] {
            assert!(decode_command(&HttpResponse::ok(body)).is_ok(), "body {body:?}");
        }
    }

    #[test]
    fn command_still_reports_embedded_error() {
        let response = HttpResponse::ok(r#"[{"error": {"type": 3, "description": "resource not available"}}]"#);
        let err = decode_command(&response).unwrap_err();
        assert!(matches!(err, ApiError::StateUpdate(ref d) if d == "resource not available"));
    }

    #[test]
    fn command_checks_status_first() {
        let err = decode_command(&status(404, "")).unwrap_err();
        assert!(matches!(err, ApiError::Bridge { status: 404, .. }));
    }

    #[test]
    fn acknowledged_field_finds_created_id() {
        let response = HttpResponse::ok(r#"[{"success": {"id": "7"}}]"#);
        assert_eq!(acknowledged_field(&response, "id").unwrap(), "7");
    }

    #[test]
    fn acknowledged_field_missing_is_unexpected() {
        let response = HttpResponse::ok(r#"[{"success": {"/groups/1/name": "x"}}]"#);
        let err = acknowledged_field(&response, "id").unwrap_err();
        assert!(matches!(err, ApiError::UnexpectedResponseShape));
    }

    #[test]
    fn any_write_payload_with_clean_acknowledgement_succeeds() {
        let payloads = [
            serde_json::json!({"on": true}),
            serde_json::json!({"bri": 254, "xy": [0.3, 0.4]}),
            serde_json::json!({"name": "Hall", "lights": ["1", "2"]}),
        ];
        for payload in payloads {
            let body = serde_json::to_string(&[serde_json::json!({ "success": payload })]).unwrap();
            assert!(decode_mutation(&HttpResponse::ok(body)).is_ok());
        }
    }
}
