//! Full lifecycle test against the live mock bridge.
//!
//! # Design
//! Starts the mock bridge on a random port, then exercises the session's
//! operations over real HTTP through `UreqTransport`, checking that request
//! building and response interpretation work end-to-end.

use std::time::{Duration, Instant};

use hue_core::{ApiError, BridgeSession, CancelToken, Credentials, OnState, UreqTransport, ID_FIELD};
use serde_json::json;

/// Start the mock bridge on a random port and return its base URL.
fn start_bridge() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_bridge::run(listener).await
        })
        .unwrap();
    });

    format!("http://{addr}")
}

/// Accept connections and never answer; returns the base URL.
fn start_silent_bridge() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    std::thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => held.push(stream),
                Err(_) => break,
            }
        }
    });

    format!("http://{addr}")
}

fn session(host: &str, user: &str) -> BridgeSession<UreqTransport> {
    BridgeSession::new(Credentials::new(host, user), UreqTransport::new())
}

#[test]
fn light_lifecycle() {
    let host = start_bridge();
    let bridge = session(&host, mock_bridge::DEFAULT_USER);

    // Step 1: list lights, each carrying its numeric ID.
    let lights = bridge.all_lights().unwrap();
    assert_eq!(lights.len(), 2);
    let mut ids: Vec<i64> = lights.iter().map(|l| l[ID_FIELD].as_i64().unwrap()).collect();
    ids.sort();
    assert_eq!(ids, vec![1, 2]);

    // Step 2: get one light by string id.
    let light = bridge.get_light("1").unwrap();
    assert_eq!(light["name"], "Hue color lamp 1");
    assert_eq!(light["state"]["on"], false);
    assert_eq!(light[ID_FIELD], 1);

    // Step 3: toggle turns it on and returns the refreshed light.
    let light = bridge.toggle(1).unwrap();
    assert_eq!(light["state"]["on"], true);

    // Step 4: toggle again turns it off.
    let light = bridge.toggle(1).unwrap();
    assert_eq!(light["state"]["on"], false);

    // Step 5: explicit state write.
    let light = bridge.set_light_state(2, &json!({"bri": 42})).unwrap();
    assert_eq!(light["state"]["bri"], 42);

    // Step 6: a rejected write surfaces the bridge's description.
    let err = bridge.set_light_state(2, &json!({"on": "yes"})).unwrap_err();
    assert!(matches!(err, ApiError::StateUpdate(ref d) if d.contains("invalid value")));

    // Step 7: rename.
    let light = bridge.rename_light("2", "Reading lamp").unwrap();
    assert_eq!(light["name"], "Reading lamp");

    // Step 8: search and scan result.
    bridge.search_lights(&[]).unwrap();
    assert_eq!(bridge.new_lights().unwrap()["lastscan"], "active");

    // Step 9: delete, then the light is gone from the listing.
    bridge.delete_light(2).unwrap();
    assert_eq!(bridge.all_lights().unwrap().len(), 1);

    // Step 10: the bridge answers a missing light with an error envelope, not an object.
    let err = bridge.get_light(2).unwrap_err();
    assert!(matches!(err, ApiError::Decode { ref body, .. } if body.contains("not available")));
}

#[test]
fn group_and_rule_lifecycle() {
    let host = start_bridge();
    let bridge = session(&host, mock_bridge::DEFAULT_USER);

    assert_eq!(bridge.all_groups().unwrap().len(), 1);

    let id = bridge
        .create_group(&json!({"name": "Hall", "type": "LightGroup", "lights": ["1"]}))
        .unwrap();
    assert_eq!(id, "2");
    assert_eq!(bridge.get_group(&id).unwrap()["name"], "Hall");

    let group = bridge.save_group(&id, &json!({"name": "Hallway"})).unwrap();
    assert_eq!(group["name"], "Hallway");

    let group = bridge.set_group_state(&id, &OnState { on: true }).unwrap();
    assert_eq!(group["action"]["on"], true);
    assert_eq!(bridge.get_light(1).unwrap()["state"]["on"], true);

    bridge.delete_group(&id).unwrap();
    assert_eq!(bridge.all_groups().unwrap().len(), 1);

    let rule = bridge
        .create_rule(&json!({"name": "Dusk", "conditions": [], "actions": []}))
        .unwrap();
    let updated = bridge.update_rule(&rule, &json!({"name": "Dawn"})).unwrap();
    assert_eq!(updated["name"], "Dawn");
    assert!(!updated.contains_key(ID_FIELD));
    bridge.delete_rule(&rule).unwrap();
    assert!(bridge.all_rules().unwrap().is_empty());
}

#[test]
fn schedules_scenes_and_sensors() {
    let host = start_bridge();
    let bridge = session(&host, mock_bridge::DEFAULT_USER);

    let schedule = bridge
        .create_schedule(&json!({"name": "Wake", "localtime": "W124/T06:30:00"}))
        .unwrap();
    let schedule_state = bridge.set_schedule(&schedule, &json!({"status": "disabled"})).unwrap();
    assert_eq!(schedule_state["status"], "disabled");
    assert_eq!(bridge.all_schedules().unwrap().len(), 1);
    bridge.delete_schedule(&schedule).unwrap();

    let scene = bridge.create_scene(&json!({"name": "Relax", "lights": ["1"]})).unwrap();
    assert_eq!(bridge.get_scene(&scene).unwrap()["name"], "Relax");
    bridge.set_scene(&scene, &json!({"name": "Read"})).unwrap();
    assert_eq!(bridge.all_scenes().unwrap()[0]["name"], "Read");
    bridge.delete_scene(&scene).unwrap();

    bridge.search_sensors().unwrap();
    assert_eq!(bridge.new_sensors().unwrap()["lastscan"], "active");
    let sensor = bridge.rename_sensor("1", "Sun").unwrap();
    assert_eq!(sensor["name"], "Sun");
    let sensor = bridge.set_sensor("1", &json!({"on": false})).unwrap();
    assert_eq!(sensor["config"]["on"], false);
    let created = bridge
        .create_sensor(&json!({"name": "Flag", "type": "CLIPGenericFlag", "modelid": "flag"}))
        .unwrap();
    assert_eq!(bridge.get_sensor(&created).unwrap()["type"], "CLIPGenericFlag");
    bridge.delete_sensor(&created).unwrap();
    assert_eq!(bridge.all_sensors().unwrap().len(), 1);
}

#[test]
fn pairing_config_and_whitelist() {
    let host = start_bridge();
    let anonymous = session(&host, "");

    // No user token: user-scoped calls fail without touching the bridge.
    assert!(matches!(anonymous.all_lights(), Err(ApiError::MissingCredential(_))));

    // Pairing needs only the host.
    let username = anonymous.create_user("hue_core#integration").unwrap();
    let paired = session(&host, &username);

    let config = paired.get_config().unwrap();
    assert!(config["whitelist"].get(&username).is_some());

    let config = paired.modify_config(&json!({"name": "Upstairs"})).unwrap();
    assert_eq!(config["name"], "Upstairs");

    let err = paired.modify_config(&json!({"whitelist": {}})).unwrap_err();
    assert!(matches!(err, ApiError::StateUpdate(ref d) if d.contains("not modifiable")));

    let state = paired.get_full_state().unwrap();
    assert!(state["lights"].is_object());
    assert_eq!(state["config"]["name"], "Upstairs");

    let bridges = paired.bridges_from(&format!("{host}/discovery")).unwrap();
    assert_eq!(bridges[0].internal_ip_address, "127.0.0.1");

    // After removing its own token the user is no longer authorized.
    paired.unwhitelist(&username).unwrap();
    let err = paired.all_lights().unwrap_err();
    assert!(matches!(err, ApiError::Bridge { status: 403, .. }));
    assert_eq!(err.to_string(), "not authorized");
}

#[test]
fn unreachable_bridge_is_a_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let bridge = session(&format!("http://{addr}"), "user");
    let err = bridge.all_lights().unwrap_err();
    assert!(matches!(err, ApiError::Transport(_) | ApiError::Timeout));
}

#[test]
fn silent_bridge_times_out() {
    let host = start_silent_bridge();
    let bridge = BridgeSession::new(
        Credentials::new(&host, "user"),
        UreqTransport::with_timeout(Duration::from_millis(300)),
    );

    let started = Instant::now();
    let err = bridge.all_lights().unwrap_err();
    assert!(matches!(err, ApiError::Timeout), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn cancel_aborts_in_flight_request() {
    let host = start_silent_bridge();
    let token = CancelToken::new();
    let bridge = BridgeSession::new(
        Credentials::new(&host, "user"),
        UreqTransport::with_timeout(Duration::from_secs(3)),
    )
    .with_cancel(token.clone());

    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        token.cancel();
    });

    let started = Instant::now();
    let err = bridge.get_light(1).unwrap_err();
    let elapsed = started.elapsed();
    canceller.join().unwrap();

    assert!(matches!(err, ApiError::Canceled), "got {err:?}");
    assert!(elapsed < Duration::from_secs(1), "took {elapsed:?}");
}

#[test]
fn deadline_bounds_in_flight_request() {
    let host = start_silent_bridge();
    let bridge = BridgeSession::new(
        Credentials::new(&host, "user"),
        UreqTransport::with_timeout(Duration::from_secs(3)),
    )
    .with_cancel(CancelToken::with_deadline(Duration::from_millis(200)));

    let started = Instant::now();
    let err = bridge.get_config().unwrap_err();
    assert!(matches!(err, ApiError::Timeout), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn cancellable_request_still_completes() {
    let host = start_bridge();
    let bridge = session(&host, mock_bridge::DEFAULT_USER).with_cancel(CancelToken::new());
    assert_eq!(bridge.get_light(1).unwrap()[ID_FIELD], 1);
}
