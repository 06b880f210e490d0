//! Executes bridge operations over a `Transport`.
//!
//! Each method is one build → send → parse round-trip, except writes that
//! return the refreshed resource (a second GET after the acknowledgement) and
//! `toggle`, which reads before it writes. Nothing is cached between calls.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::client::BridgeClient;
use crate::credentials::Credentials;
use crate::discovery::{self, DEFAULT_DISCOVERY_URL};
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::{CancelToken, Transport};
use crate::types::{Bridge, OnState, Rename, Resource, ResourceFamily, ResourceId};

/// A `BridgeClient` paired with the transport that runs its requests.
///
/// `toggle` is a read-modify-write over two round-trips with no atomicity:
/// concurrent toggles of the same light race, and callers that need
/// exclusivity must serialize them.
#[derive(Debug, Clone)]
pub struct BridgeSession<T> {
    client: BridgeClient,
    transport: T,
    cancel: Option<CancelToken>,
}

impl<T: Transport> BridgeSession<T> {
    pub fn new(credentials: Credentials, transport: T) -> Self {
        Self {
            client: BridgeClient::new(credentials),
            transport,
            cancel: None,
        }
    }

    /// Abort remaining and in-flight requests once `token` is cancelled or expires.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn client(&self) -> &BridgeClient {
        &self.client
    }

    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        if let Some(cancel) = &self.cancel {
            cancel.check()?;
        }
        let user = self.client.credentials().user().unwrap_or_default();
        debug!(
            method = %request.method,
            url = %redact_user(&request.url, user),
            "sending bridge request"
        );
        self.transport.send(request, self.cancel.as_ref())
    }

    fn list(&self, family: ResourceFamily) -> Result<Vec<Resource>, ApiError> {
        let response = self.execute(&self.client.build_list(family)?)?;
        self.client.parse_listing(&response)
    }

    fn get(&self, family: ResourceFamily, id: &ResourceId) -> Result<Resource, ApiError> {
        let response = self.execute(&self.client.build_get(family, id)?)?;
        self.client.parse_object(&response)
    }

    fn create<B: Serialize + ?Sized>(&self, family: ResourceFamily, body: &B) -> Result<String, ApiError> {
        let response = self.execute(&self.client.build_create(family, body)?)?;
        self.client.parse_created(&response)
    }

    fn update<B: Serialize + ?Sized>(
        &self,
        family: ResourceFamily,
        id: &ResourceId,
        body: &B,
    ) -> Result<Resource, ApiError> {
        self.mutate(&self.client.build_update(family, id, body)?)?;
        self.get(family, id)
    }

    fn delete(&self, family: ResourceFamily, id: &ResourceId) -> Result<(), ApiError> {
        self.command(&self.client.build_delete(family, id)?)
    }

    fn mutate(&self, request: &HttpRequest) -> Result<(), ApiError> {
        let response = self.execute(request)?;
        self.client.parse_mutation(&response)
    }

    fn command(&self, request: &HttpRequest) -> Result<(), ApiError> {
        let response = self.execute(request)?;
        self.client.parse_command(&response)
    }

    // -----------------------------------------------------------------------
    // Lights
    // -----------------------------------------------------------------------

    pub fn all_lights(&self) -> Result<Vec<Resource>, ApiError> {
        let response = self.execute(&self.client.build_all_lights()?)?;
        self.client.parse_all_lights(&response)
    }

    /// Result of the most recent scan for new lights.
    pub fn new_lights(&self) -> Result<Resource, ApiError> {
        let response = self.execute(&self.client.build_new_scan(ResourceFamily::Lights)?)?;
        self.client.parse_object(&response)
    }

    /// Start a scan, optionally for specific device serials.
    pub fn search_lights(&self, device_ids: &[String]) -> Result<(), ApiError> {
        self.command(&self.client.build_search(ResourceFamily::Lights, device_ids)?)
    }

    pub fn get_light(&self, id: impl Into<ResourceId>) -> Result<Resource, ApiError> {
        let id = id.into();
        let response = self.execute(&self.client.build_get_light(&id)?)?;
        self.client.parse_get_light(&id, &response)
    }

    pub fn rename_light(&self, id: impl Into<ResourceId>, name: &str) -> Result<Resource, ApiError> {
        let id = id.into();
        self.mutate(&self.client.build_rename_light(&id, name)?)?;
        self.get_light(id)
    }

    /// Write `state` to the light and return the light as the bridge now reports it.
    pub fn set_light_state<S: Serialize + ?Sized>(
        &self,
        id: impl Into<ResourceId>,
        state: &S,
    ) -> Result<Resource, ApiError> {
        let id = id.into();
        self.mutate(&self.client.build_light_state(&id, state)?)?;
        self.get_light(id)
    }

    /// Invert the light's `state.on` and return the refreshed light.
    pub fn toggle(&self, id: impl Into<ResourceId>) -> Result<Resource, ApiError> {
        let id = id.into();
        let light = self.get_light(id.clone())?;
        let on = light
            .get("state")
            .and_then(Value::as_object)
            .ok_or_else(|| ApiError::ShapeMismatch(format!("light {id} has no state object")))?
            .get("on")
            .and_then(Value::as_bool)
            .ok_or_else(|| ApiError::ShapeMismatch(format!("light {id} state has no boolean 'on'")))?;
        self.set_light_state(id, &OnState { on: !on })
    }

    pub fn delete_light(&self, id: impl Into<ResourceId>) -> Result<(), ApiError> {
        self.command(&self.client.build_delete_light(&id.into())?)
    }

    // -----------------------------------------------------------------------
    // Groups
    // -----------------------------------------------------------------------

    pub fn all_groups(&self) -> Result<Vec<Resource>, ApiError> {
        self.list(ResourceFamily::Groups)
    }

    pub fn create_group<B: Serialize + ?Sized>(&self, group: &B) -> Result<String, ApiError> {
        self.create(ResourceFamily::Groups, group)
    }

    pub fn get_group(&self, id: impl Into<ResourceId>) -> Result<Resource, ApiError> {
        self.get(ResourceFamily::Groups, &id.into())
    }

    /// Change group attributes such as its name or member lights.
    pub fn save_group<B: Serialize + ?Sized>(&self, id: impl Into<ResourceId>, group: &B) -> Result<Resource, ApiError> {
        self.update(ResourceFamily::Groups, &id.into(), group)
    }

    /// Apply a light state to every member of the group.
    pub fn set_group_state<S: Serialize + ?Sized>(
        &self,
        id: impl Into<ResourceId>,
        state: &S,
    ) -> Result<Resource, ApiError> {
        let id = id.into();
        self.mutate(&self.client.build_update_sub(ResourceFamily::Groups, &id, "action", state)?)?;
        self.get(ResourceFamily::Groups, &id)
    }

    pub fn delete_group(&self, id: impl Into<ResourceId>) -> Result<(), ApiError> {
        self.delete(ResourceFamily::Groups, &id.into())
    }

    // -----------------------------------------------------------------------
    // Schedules
    // -----------------------------------------------------------------------

    pub fn all_schedules(&self) -> Result<Vec<Resource>, ApiError> {
        self.list(ResourceFamily::Schedules)
    }

    pub fn create_schedule<B: Serialize + ?Sized>(&self, schedule: &B) -> Result<String, ApiError> {
        self.create(ResourceFamily::Schedules, schedule)
    }

    pub fn get_schedule(&self, id: impl Into<ResourceId>) -> Result<Resource, ApiError> {
        self.get(ResourceFamily::Schedules, &id.into())
    }

    pub fn set_schedule<B: Serialize + ?Sized>(
        &self,
        id: impl Into<ResourceId>,
        schedule: &B,
    ) -> Result<Resource, ApiError> {
        self.update(ResourceFamily::Schedules, &id.into(), schedule)
    }

    pub fn delete_schedule(&self, id: impl Into<ResourceId>) -> Result<(), ApiError> {
        self.delete(ResourceFamily::Schedules, &id.into())
    }

    // -----------------------------------------------------------------------
    // Scenes
    // -----------------------------------------------------------------------

    pub fn all_scenes(&self) -> Result<Vec<Resource>, ApiError> {
        self.list(ResourceFamily::Scenes)
    }

    pub fn get_scene(&self, id: impl Into<ResourceId>) -> Result<Resource, ApiError> {
        self.get(ResourceFamily::Scenes, &id.into())
    }

    pub fn create_scene<B: Serialize + ?Sized>(&self, scene: &B) -> Result<String, ApiError> {
        self.create(ResourceFamily::Scenes, scene)
    }

    pub fn set_scene<B: Serialize + ?Sized>(&self, id: impl Into<ResourceId>, scene: &B) -> Result<Resource, ApiError> {
        self.update(ResourceFamily::Scenes, &id.into(), scene)
    }

    pub fn delete_scene(&self, id: impl Into<ResourceId>) -> Result<(), ApiError> {
        self.delete(ResourceFamily::Scenes, &id.into())
    }

    // -----------------------------------------------------------------------
    // Sensors
    // -----------------------------------------------------------------------

    pub fn all_sensors(&self) -> Result<Vec<Resource>, ApiError> {
        self.list(ResourceFamily::Sensors)
    }

    pub fn create_sensor<B: Serialize + ?Sized>(&self, sensor: &B) -> Result<String, ApiError> {
        self.create(ResourceFamily::Sensors, sensor)
    }

    pub fn search_sensors(&self) -> Result<(), ApiError> {
        self.command(&self.client.build_search(ResourceFamily::Sensors, &[])?)
    }

    pub fn new_sensors(&self) -> Result<Resource, ApiError> {
        let response = self.execute(&self.client.build_new_scan(ResourceFamily::Sensors)?)?;
        self.client.parse_object(&response)
    }

    pub fn get_sensor(&self, id: impl Into<ResourceId>) -> Result<Resource, ApiError> {
        self.get(ResourceFamily::Sensors, &id.into())
    }

    /// Write the sensor's `config` sub-object.
    pub fn set_sensor<B: Serialize + ?Sized>(&self, id: impl Into<ResourceId>, config: &B) -> Result<Resource, ApiError> {
        let id = id.into();
        self.mutate(&self.client.build_update_sub(ResourceFamily::Sensors, &id, "config", config)?)?;
        self.get(ResourceFamily::Sensors, &id)
    }

    pub fn rename_sensor(&self, id: impl Into<ResourceId>, name: &str) -> Result<Resource, ApiError> {
        let body = Rename {
            name: name.to_string(),
        };
        self.update(ResourceFamily::Sensors, &id.into(), &body)
    }

    pub fn delete_sensor(&self, id: impl Into<ResourceId>) -> Result<(), ApiError> {
        self.delete(ResourceFamily::Sensors, &id.into())
    }

    // -----------------------------------------------------------------------
    // Rules
    // -----------------------------------------------------------------------

    pub fn all_rules(&self) -> Result<Vec<Resource>, ApiError> {
        self.list(ResourceFamily::Rules)
    }

    pub fn get_rule(&self, id: impl Into<ResourceId>) -> Result<Resource, ApiError> {
        self.get(ResourceFamily::Rules, &id.into())
    }

    pub fn create_rule<B: Serialize + ?Sized>(&self, rule: &B) -> Result<String, ApiError> {
        self.create(ResourceFamily::Rules, rule)
    }

    pub fn update_rule<B: Serialize + ?Sized>(&self, id: impl Into<ResourceId>, rule: &B) -> Result<Resource, ApiError> {
        self.update(ResourceFamily::Rules, &id.into(), rule)
    }

    pub fn delete_rule(&self, id: impl Into<ResourceId>) -> Result<(), ApiError> {
        self.delete(ResourceFamily::Rules, &id.into())
    }

    // -----------------------------------------------------------------------
    // Bridge
    // -----------------------------------------------------------------------

    /// Bridges registered with the cloud discovery service.
    pub fn all_bridges(&self) -> Result<Vec<Bridge>, ApiError> {
        self.bridges_from(DEFAULT_DISCOVERY_URL)
    }

    /// Like `all_bridges`, against a different discovery endpoint.
    pub fn bridges_from(&self, discovery_url: &str) -> Result<Vec<Bridge>, ApiError> {
        let response = self.execute(&discovery::build_all_bridges(discovery_url))?;
        discovery::parse_all_bridges(&response)
    }

    /// Pair with the bridge and return the issued user token.
    ///
    /// The bridge refuses until its link button has been pressed.
    pub fn create_user(&self, devicetype: &str) -> Result<String, ApiError> {
        let response = self.execute(&self.client.build_create_user(devicetype)?)?;
        self.client.parse_create_user(&response)
    }

    pub fn get_config(&self) -> Result<Resource, ApiError> {
        let response = self.execute(&self.client.build_get_config()?)?;
        self.client.parse_object(&response)
    }

    pub fn modify_config<B: Serialize + ?Sized>(&self, config: &B) -> Result<Resource, ApiError> {
        self.mutate(&self.client.build_modify_config(config)?)?;
        self.get_config()
    }

    /// Remove `key` from the bridge's whitelist of user tokens.
    pub fn unwhitelist(&self, key: &str) -> Result<(), ApiError> {
        self.command(&self.client.build_unwhitelist(key)?)
    }

    /// Lights, groups, config, schedules, scenes, sensors and rules in one object.
    pub fn get_full_state(&self) -> Result<Resource, ApiError> {
        let response = self.execute(&self.client.build_full_state()?)?;
        self.client.parse_object(&response)
    }
}

/// `url` with its `/api/{user}` segment masked, for logging.
fn redact_user(url: &str, user: &str) -> String {
    if user.is_empty() {
        return url.to_string();
    }
    let marker = format!("/api/{user}");
    match url.find(&marker) {
        Some(start) => {
            let rest = &url[start + marker.len()..];
            if rest.is_empty() || rest.starts_with('/') {
                format!("{}/api/<user>{rest}", &url[..start])
            } else {
                url.to_string()
            }
        }
        None => url.to_string(),
    }
}
