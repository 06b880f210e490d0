//! Stateless request builder and response parser for the bridge API.
//!
//! # Design
//! `BridgeClient` holds only `Credentials` and carries no mutable state
//! between calls. Each operation is split into a `build_*` method that
//! produces an `HttpRequest` and a `parse_*` method that consumes an
//! `HttpResponse`; `BridgeSession` runs the round-trip in between.
//! Credentials are checked while building, so a missing host or user fails
//! before any request exists.

use serde::Serialize;

use crate::credentials::Credentials;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::response::{self, KeyPolicy};
use crate::types::{NewUser, Rename, Resource, ResourceFamily, ResourceId, SearchParams, ID_FIELD};

/// Synchronous, stateless client for a bridge's local API.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    credentials: Credentials,
}

impl BridgeClient {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// `{host}/api/{user}` followed by `segments`.
    fn user_url(&self, segments: &[&str]) -> Result<String, ApiError> {
        let host = self.credentials.host()?;
        let user = self.credentials.user()?;
        let mut url = format!("{host}/api/{user}");
        for segment in segments {
            url.push('/');
            url.push_str(segment);
        }
        Ok(url)
    }

    fn request(&self, method: HttpMethod, segments: &[&str]) -> Result<HttpRequest, ApiError> {
        Ok(HttpRequest {
            method,
            url: self.user_url(segments)?,
            headers: Vec::new(),
            body: None,
        })
    }

    fn json_request<B: Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        segments: &[&str],
        body: &B,
    ) -> Result<HttpRequest, ApiError> {
        let url = self.user_url(segments)?;
        json_body(method, url, body)
    }

    // -----------------------------------------------------------------------
    // Any resource family
    // -----------------------------------------------------------------------

    pub fn build_list(&self, family: ResourceFamily) -> Result<HttpRequest, ApiError> {
        self.request(HttpMethod::Get, &[family.path()])
    }

    pub fn build_get(&self, family: ResourceFamily, id: &ResourceId) -> Result<HttpRequest, ApiError> {
        self.request(HttpMethod::Get, &[family.path(), &id.to_string()])
    }

    pub fn build_create<B: Serialize + ?Sized>(
        &self,
        family: ResourceFamily,
        body: &B,
    ) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Post, &[family.path()], body)
    }

    pub fn build_update<B: Serialize + ?Sized>(
        &self,
        family: ResourceFamily,
        id: &ResourceId,
        body: &B,
    ) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Put, &[family.path(), &id.to_string()], body)
    }

    /// PUT to a sub-resource such as `/groups/{id}/action`.
    pub fn build_update_sub<B: Serialize + ?Sized>(
        &self,
        family: ResourceFamily,
        id: &ResourceId,
        sub: &str,
        body: &B,
    ) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Put, &[family.path(), &id.to_string(), sub], body)
    }

    pub fn build_delete(&self, family: ResourceFamily, id: &ResourceId) -> Result<HttpRequest, ApiError> {
        self.request(HttpMethod::Delete, &[family.path(), &id.to_string()])
    }

    /// POST with an optional device list, used by light and sensor searches.
    pub fn build_search(&self, family: ResourceFamily, device_ids: &[String]) -> Result<HttpRequest, ApiError> {
        if device_ids.is_empty() {
            return self.request(HttpMethod::Post, &[family.path()]);
        }
        let params = SearchParams {
            devices: device_ids.to_vec(),
        };
        self.json_request(HttpMethod::Post, &[family.path()], &params)
    }

    pub fn build_new_scan(&self, family: ResourceFamily) -> Result<HttpRequest, ApiError> {
        self.request(HttpMethod::Get, &[family.path(), "new"])
    }

    // -----------------------------------------------------------------------
    // Lights
    // -----------------------------------------------------------------------

    pub fn build_all_lights(&self) -> Result<HttpRequest, ApiError> {
        self.build_list(ResourceFamily::Lights)
    }

    pub fn build_get_light(&self, id: &ResourceId) -> Result<HttpRequest, ApiError> {
        let number = ResourceId::Number(id.light_number()?);
        self.build_get(ResourceFamily::Lights, &number)
    }

    pub fn build_rename_light(&self, id: &ResourceId, name: &str) -> Result<HttpRequest, ApiError> {
        let number = ResourceId::Number(id.light_number()?);
        let body = Rename {
            name: name.to_string(),
        };
        self.build_update(ResourceFamily::Lights, &number, &body)
    }

    pub fn build_light_state<S: Serialize + ?Sized>(
        &self,
        id: &ResourceId,
        state: &S,
    ) -> Result<HttpRequest, ApiError> {
        let number = ResourceId::Number(id.light_number()?);
        self.build_update_sub(ResourceFamily::Lights, &number, "state", state)
    }

    pub fn build_delete_light(&self, id: &ResourceId) -> Result<HttpRequest, ApiError> {
        let number = ResourceId::Number(id.light_number()?);
        self.build_delete(ResourceFamily::Lights, &number)
    }

    // -----------------------------------------------------------------------
    // Bridge
    // -----------------------------------------------------------------------

    pub fn build_get_config(&self) -> Result<HttpRequest, ApiError> {
        self.request(HttpMethod::Get, &[ResourceFamily::Config.path()])
    }

    pub fn build_modify_config<B: Serialize + ?Sized>(&self, config: &B) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Put, &[ResourceFamily::Config.path()], config)
    }

    pub fn build_full_state(&self) -> Result<HttpRequest, ApiError> {
        self.request(HttpMethod::Get, &[])
    }

    pub fn build_unwhitelist(&self, key: &str) -> Result<HttpRequest, ApiError> {
        self.request(HttpMethod::Delete, &[ResourceFamily::Config.path(), "whitelist", key])
    }

    /// Pairing request. Needs only the host: the user token is what it issues.
    pub fn build_create_user(&self, devicetype: &str) -> Result<HttpRequest, ApiError> {
        let host = self.credentials.host()?;
        let body = NewUser {
            devicetype: devicetype.to_string(),
        };
        json_body(HttpMethod::Post, format!("{host}/api"), &body)
    }

    // -----------------------------------------------------------------------
    // Parsing
    // -----------------------------------------------------------------------

    /// Every light, each carrying its numeric key under `ID`.
    pub fn parse_all_lights(&self, response: &HttpResponse) -> Result<Vec<Resource>, ApiError> {
        response::decode_collection(response, KeyPolicy::InjectNumeric)
    }

    pub fn parse_get_light(&self, id: &ResourceId, response: &HttpResponse) -> Result<Resource, ApiError> {
        let number = id.light_number()?;
        let mut light = response::decode_object(response)?;
        light.insert(ID_FIELD.to_string(), number.into());
        Ok(light)
    }

    /// Objects of a bulk listing for any family other than lights.
    pub fn parse_listing(&self, response: &HttpResponse) -> Result<Vec<Resource>, ApiError> {
        response::decode_collection(response, KeyPolicy::Discard)
    }

    pub fn parse_object(&self, response: &HttpResponse) -> Result<Resource, ApiError> {
        response::decode_object(response)
    }

    pub fn parse_mutation(&self, response: &HttpResponse) -> Result<(), ApiError> {
        response::decode_mutation(response)
    }

    /// Outcome of a search or delete, where a non-sequence 200 body is success.
    pub fn parse_command(&self, response: &HttpResponse) -> Result<(), ApiError> {
        response::decode_command(response)
    }

    /// Identifier the bridge assigned to a newly created resource.
    pub fn parse_created(&self, response: &HttpResponse) -> Result<String, ApiError> {
        response::acknowledged_field(response, "id")
    }

    pub fn parse_create_user(&self, response: &HttpResponse) -> Result<String, ApiError> {
        response::acknowledged_field(response, "username")
    }
}

fn json_body<B: Serialize + ?Sized>(method: HttpMethod, url: String, body: &B) -> Result<HttpRequest, ApiError> {
    let body = serde_json::to_string(body).map_err(|e| ApiError::Serialization(e.to_string()))?;
    Ok(HttpRequest {
        method,
        url,
        headers: vec![("content-type".to_string(), "application/json".to_string())],
        body: Some(body),
    })
}
