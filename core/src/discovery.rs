//! Cloud discovery of bridges on the local network.
//!
//! Discovery is the one call that needs no credentials: it queries a public
//! endpoint that lists the bridges seen from the caller's public address.

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::response::check_status;
use crate::types::Bridge;

pub const DEFAULT_DISCOVERY_URL: &str = "https://discovery.meethue.com/";

pub fn build_all_bridges(discovery_url: &str) -> HttpRequest {
    HttpRequest {
        method: HttpMethod::Get,
        url: discovery_url.to_string(),
        headers: Vec::new(),
        body: None,
    }
}

pub fn parse_all_bridges(response: &HttpResponse) -> Result<Vec<Bridge>, ApiError> {
    check_status(response)?;
    serde_json::from_str(&response.body).map_err(|e| ApiError::decode(e, &response.body))
}
