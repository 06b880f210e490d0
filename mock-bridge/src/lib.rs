use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;
use uuid::Uuid;

/// Token whitelisted by `app()`.
pub const DEFAULT_USER: &str = "testuser";

pub const FAMILIES: [&str; 6] = ["lights", "groups", "schedules", "scenes", "sensors", "rules"];

/// In-memory state of an emulated bridge.
#[derive(Debug, Default)]
pub struct Bridge {
    /// User token to device type.
    pub whitelist: BTreeMap<String, String>,
    pub config: Map<String, Value>,
    /// Family to resource key to resource object.
    pub resources: BTreeMap<String, BTreeMap<String, Value>>,
    /// Family to the `lastscan` value reported by `/{family}/new`.
    pub scans: BTreeMap<String, String>,
    /// Pairing is refused while this is false.
    pub link_button: bool,
}

impl Bridge {
    /// A bridge with two lights, one room, one sensor and `user` whitelisted.
    pub fn seeded(user: &str) -> Self {
        let mut bridge = Bridge {
            link_button: true,
            ..Default::default()
        };
        bridge.whitelist.insert(user.to_string(), "mock-bridge#seed".to_string());
        if let Value::Object(config) = json!({
            "name": "Mock Bridge",
            "bridgeid": "001788FFFE000000",
            "apiversion": "1.16.0",
            "mac": "00:17:88:00:00:00",
            "ipaddress": "127.0.0.1",
        }) {
            bridge.config = config;
        }
        for family in FAMILIES {
            bridge.resources.insert(family.to_string(), BTreeMap::new());
        }
        bridge.insert("lights", "1", json!({
            "name": "Hue color lamp 1",
            "type": "Extended color light",
            "modelid": "LCT015",
            "state": {"on": false, "bri": 254, "reachable": true},
        }));
        bridge.insert("lights", "2", json!({
            "name": "Hue white lamp 1",
            "type": "Dimmable light",
            "modelid": "LWB010",
            "state": {"on": true, "bri": 120, "reachable": true},
        }));
        bridge.insert("groups", "1", json!({
            "name": "Living room",
            "type": "Room",
            "lights": ["1", "2"],
            "action": {"on": false, "bri": 254},
        }));
        bridge.insert("sensors", "1", json!({
            "name": "Daylight",
            "type": "Daylight",
            "state": {"daylight": false},
            "config": {"on": true},
        }));
        bridge
    }

    pub fn insert(&mut self, family: &str, id: &str, resource: Value) {
        self.resources
            .entry(family.to_string())
            .or_default()
            .insert(id.to_string(), resource);
    }

    /// Key after the highest numeric key in `family`.
    pub fn next_id(&self, family: &str) -> String {
        let highest = self
            .resources
            .get(family)
            .map(|items| items.keys().filter_map(|k| k.parse::<u32>().ok()).max().unwrap_or(0))
            .unwrap_or(0);
        (highest + 1).to_string()
    }

    fn config_json(&self) -> Value {
        let mut config = self.config.clone();
        let whitelist: Map<String, Value> = self
            .whitelist
            .iter()
            .map(|(token, devicetype)| (token.clone(), json!({ "name": devicetype })))
            .collect();
        config.insert("whitelist".to_string(), Value::Object(whitelist));
        Value::Object(config)
    }

    fn authorize(&self, user: &str) -> Result<(), Response> {
        if self.whitelist.contains_key(user) {
            Ok(())
        } else {
            Err((StatusCode::FORBIDDEN, "not authorized").into_response())
        }
    }
}

pub type Db = Arc<RwLock<Bridge>>;

pub fn app() -> Router {
    app_with(Bridge::seeded(DEFAULT_USER))
}

pub fn app_with(bridge: Bridge) -> Router {
    let db: Db = Arc::new(RwLock::new(bridge));
    Router::new()
        .route("/discovery", get(discovery))
        .route("/api", post(create_user))
        .route("/api/{user}", get(full_state))
        .route("/api/{user}/config", get(get_config).put(modify_config))
        .route("/api/{user}/config/whitelist/{key}", delete(unwhitelist))
        .route("/api/{user}/{family}", get(list).post(create_or_search))
        .route("/api/{user}/{family}/new", get(new_scan))
        .route("/api/{user}/{family}/{id}", get(get_one).put(update).delete(remove))
        .route("/api/{user}/{family}/{id}/{sub}", put(update_sub))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with(listener: TcpListener, bridge: Bridge) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(bridge)).await
}

fn success(value: Value) -> Value {
    json!({ "success": value })
}

fn error(kind: u16, address: &str, description: &str) -> Value {
    json!({ "error": { "type": kind, "address": address, "description": description } })
}

fn envelope(items: Vec<Value>) -> Response {
    Json(Value::Array(items)).into_response()
}

fn not_available(address: &str) -> Response {
    envelope(vec![error(3, address, &format!("resource, {address}, not available"))])
}

fn missing_parameters(address: &str) -> Response {
    envelope(vec![error(5, address, "invalid/missing parameters in body")])
}

/// Parse an optional JSON object body.
fn parse_body(body: &Bytes) -> Result<Option<Map<String, Value>>, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    match serde_json::from_slice(body) {
        Ok(Value::Object(map)) => Ok(Some(map)),
        _ => Err(envelope(vec![error(2, "/", "body contains invalid json")])),
    }
}

async fn discovery(State(db): State<Db>) -> Json<Value> {
    let bridge = db.read().await;
    let field = |name: &str| bridge.config.get(name).cloned().unwrap_or(Value::Null);
    let id = field("bridgeid").as_str().unwrap_or_default().to_lowercase();
    Json(json!([{
        "id": id,
        "internalipaddress": field("ipaddress"),
        "macaddress": field("mac"),
    }]))
}

async fn create_user(State(db): State<Db>, body: Bytes) -> Response {
    let body = match parse_body(&body) {
        Ok(body) => body,
        Err(response) => return response,
    };
    let Some(devicetype) = body
        .as_ref()
        .and_then(|b| b.get("devicetype"))
        .and_then(Value::as_str)
    else {
        return missing_parameters("/");
    };

    let mut bridge = db.write().await;
    if !bridge.link_button {
        return envelope(vec![error(101, "", "link button not pressed")]);
    }
    let username = Uuid::new_v4().simple().to_string();
    bridge.whitelist.insert(username.clone(), devicetype.to_string());
    debug!(devicetype, "whitelisted new user");
    envelope(vec![success(json!({ "username": username }))])
}

async fn full_state(State(db): State<Db>, Path(user): Path<String>) -> Response {
    let bridge = db.read().await;
    if let Err(response) = bridge.authorize(&user) {
        return response;
    }
    let mut state = Map::new();
    for (family, items) in &bridge.resources {
        let items: Map<String, Value> = items.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        state.insert(family.clone(), Value::Object(items));
    }
    state.insert("config".to_string(), bridge.config_json());
    Json(Value::Object(state)).into_response()
}

async fn get_config(State(db): State<Db>, Path(user): Path<String>) -> Response {
    let bridge = db.read().await;
    if let Err(response) = bridge.authorize(&user) {
        return response;
    }
    Json(bridge.config_json()).into_response()
}

async fn modify_config(State(db): State<Db>, Path(user): Path<String>, body: Bytes) -> Response {
    let mut bridge = db.write().await;
    if let Err(response) = bridge.authorize(&user) {
        return response;
    }
    let fields = match parse_body(&body) {
        Ok(Some(fields)) if !fields.is_empty() => fields,
        Ok(_) => return missing_parameters("/config"),
        Err(response) => return response,
    };

    let mut results = Vec::with_capacity(fields.len());
    for (key, value) in fields {
        let address = format!("/config/{key}");
        if key == "whitelist" {
            results.push(error(8, &address, "parameter, whitelist, is not modifiable"));
            continue;
        }
        bridge.config.insert(key, value.clone());
        results.push(success(json!({ address: value })));
    }
    envelope(results)
}

async fn unwhitelist(State(db): State<Db>, Path((user, key)): Path<(String, String)>) -> Response {
    let mut bridge = db.write().await;
    if let Err(response) = bridge.authorize(&user) {
        return response;
    }
    let address = format!("/config/whitelist/{key}");
    if bridge.whitelist.remove(&key).is_none() {
        return not_available(&address);
    }
    envelope(vec![success(json!(format!("{address} deleted")))])
}

async fn list(State(db): State<Db>, Path((user, family)): Path<(String, String)>) -> Response {
    let bridge = db.read().await;
    if let Err(response) = bridge.authorize(&user) {
        return response;
    }
    let Some(items) = bridge.resources.get(&family) else {
        return not_available(&format!("/{family}"));
    };
    let items: Map<String, Value> = items.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    Json(Value::Object(items)).into_response()
}

async fn create_or_search(
    State(db): State<Db>,
    Path((user, family)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let mut bridge = db.write().await;
    if let Err(response) = bridge.authorize(&user) {
        return response;
    }
    if !bridge.resources.contains_key(&family) {
        return not_available(&format!("/{family}"));
    }
    let body = match parse_body(&body) {
        Ok(body) => body,
        Err(response) => return response,
    };

    let is_search = match family.as_str() {
        "lights" => true,
        "sensors" => body.as_ref().is_none_or(|b| b.contains_key("deviceid")),
        _ => false,
    };
    if is_search {
        bridge.scans.insert(family.clone(), "active".to_string());
        return envelope(vec![success(json!({ format!("/{family}"): "Searching for new devices" }))]);
    }

    let Some(resource) = body.filter(|b| !b.is_empty()) else {
        return missing_parameters(&format!("/{family}"));
    };
    let id = bridge.next_id(&family);
    bridge.insert(&family, &id, Value::Object(resource));
    debug!(%family, %id, "created resource");
    envelope(vec![success(json!({ "id": id }))])
}

async fn new_scan(State(db): State<Db>, Path((user, family)): Path<(String, String)>) -> Response {
    let bridge = db.read().await;
    if let Err(response) = bridge.authorize(&user) {
        return response;
    }
    if family != "lights" && family != "sensors" {
        return not_available(&format!("/{family}/new"));
    }
    let lastscan = bridge.scans.get(&family).map(String::as_str).unwrap_or("none");
    Json(json!({ "lastscan": lastscan })).into_response()
}

async fn get_one(
    State(db): State<Db>,
    Path((user, family, id)): Path<(String, String, String)>,
) -> Response {
    let bridge = db.read().await;
    if let Err(response) = bridge.authorize(&user) {
        return response;
    }
    match bridge.resources.get(&family).and_then(|items| items.get(&id)) {
        Some(resource) => Json(resource.clone()).into_response(),
        None => not_available(&format!("/{family}/{id}")),
    }
}

async fn update(
    State(db): State<Db>,
    Path((user, family, id)): Path<(String, String, String)>,
    body: Bytes,
) -> Response {
    let mut bridge = db.write().await;
    if let Err(response) = bridge.authorize(&user) {
        return response;
    }
    let address = format!("/{family}/{id}");
    let fields = match parse_body(&body) {
        Ok(Some(fields)) if !fields.is_empty() => fields,
        Ok(_) => return missing_parameters(&address),
        Err(response) => return response,
    };
    let Some(Value::Object(resource)) = bridge.resources.get_mut(&family).and_then(|items| items.get_mut(&id))
    else {
        return not_available(&address);
    };

    let mut results = Vec::with_capacity(fields.len());
    for (key, value) in fields {
        results.push(success(json!({ format!("{address}/{key}"): value.clone() })));
        resource.insert(key, value);
    }
    envelope(results)
}

async fn update_sub(
    State(db): State<Db>,
    Path((user, family, id, sub)): Path<(String, String, String, String)>,
    body: Bytes,
) -> Response {
    let mut bridge = db.write().await;
    if let Err(response) = bridge.authorize(&user) {
        return response;
    }
    let address = format!("/{family}/{id}/{sub}");
    let writable = matches!(
        (family.as_str(), sub.as_str()),
        ("lights", "state") | ("groups", "action") | ("sensors", "state") | ("sensors", "config")
    );
    if !writable {
        return not_available(&address);
    }
    let fields = match parse_body(&body) {
        Ok(Some(fields)) if !fields.is_empty() => fields,
        Ok(_) => return missing_parameters(&address),
        Err(response) => return response,
    };
    if let Some(on) = fields.get("on").filter(|v| !v.is_boolean()) {
        return envelope(vec![error(
            7,
            &format!("{address}/on"),
            &format!("invalid value, {on}, for parameter, on"),
        )]);
    }

    let members = {
        let Some(Value::Object(resource)) = bridge.resources.get_mut(&family).and_then(|items| items.get_mut(&id))
        else {
            return not_available(&format!("/{family}/{id}"));
        };
        merge_into(resource, &sub, &fields);
        resource.get("lights").cloned()
    };

    // A group action also applies to every member light.
    if family == "groups" {
        let members = members.as_ref().and_then(Value::as_array).cloned().unwrap_or_default();
        for member in members.iter().filter_map(Value::as_str) {
            if let Some(Value::Object(light)) = bridge.resources.get_mut("lights").and_then(|l| l.get_mut(member)) {
                merge_into(light, "state", &fields);
            }
        }
    }

    let results = fields
        .iter()
        .map(|(key, value)| success(json!({ format!("{address}/{key}"): value })))
        .collect();
    envelope(results)
}

fn merge_into(resource: &mut Map<String, Value>, sub: &str, fields: &Map<String, Value>) {
    let target = resource
        .entry(sub.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target) = target {
        for (key, value) in fields {
            target.insert(key.clone(), value.clone());
        }
    }
}

async fn remove(
    State(db): State<Db>,
    Path((user, family, id)): Path<(String, String, String)>,
) -> Response {
    let mut bridge = db.write().await;
    if let Err(response) = bridge.authorize(&user) {
        return response;
    }
    let address = format!("/{family}/{id}");
    match bridge.resources.get_mut(&family).and_then(|items| items.remove(&id)) {
        Some(_) => envelope(vec![success(json!(format!("{address} deleted")))]),
        None => not_available(&address),
    }
}
