/// Heartbeat probe, payload is a handle or [`WILDCARD`]
pub const PING: &str = "@meta/PING";

/// Heartbeat response, payload is a [`crate::types::PongPayload`]
pub const PONG: &str = "@meta/PONG";

/// Identity probe, payload is a handle or [`WILDCARD`]
pub const WHOIS: &str = "@meta/WHOIS";

/// Identity response, payload is a [`crate::types::Manifest`]
pub const IAM: &str = "@meta/IAM";

/// Handle addressing every service on the bus
pub const WILDCARD: &str = "*";

/// Route key for the meta topic
pub const META_HANDLE: &str = "meta";

/// Action types are namespaced as `@<handle>/<leaf>`
pub const HANDLE_MARKER: char = '@';
pub const SEPARATOR: char = '/';

/// API path prefix
pub const API_PREFIX: &str = "/v1";
