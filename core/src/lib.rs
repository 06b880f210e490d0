//! Synchronous client core for a home-automation bridge's local REST API.
//!
//! # Overview
//! Translates operations on lights, groups, schedules, scenes, sensors, rules
//! and bridge configuration into HTTP requests against `{host}/api/{user}`,
//! and interprets the bridge's responses into generic JSON objects or
//! classified errors.
//!
//! # Design
//! - `BridgeClient` is stateless: `build_*` produces an `HttpRequest`,
//!   `parse_*` consumes an `HttpResponse`. No I/O happens there.
//! - `BridgeSession` pairs a client with a `Transport` and runs the
//!   round-trips, including the read-modify-write `toggle`.
//! - Responses are decoded once into one of three envelopes (object,
//!   mapping-of-objects, sequence of acknowledgements) in `response`.
//! - Credentials are an explicit value checked on every build, so missing
//!   credentials fail before anything is sent.

pub mod client;
pub mod credentials;
pub mod discovery;
pub mod error;
pub mod http;
pub mod response;
pub mod session;
pub mod transport;
pub mod types;

pub use client::BridgeClient;
pub use credentials::Credentials;
pub use error::{ApiError, CredentialField};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use session::BridgeSession;
pub use transport::{CancelToken, Transport, UreqTransport};
pub use types::{Bridge, OnState, Resource, ResourceFamily, ResourceId, ID_FIELD};
