use shared::protocol::{HANDLE_MARKER, IAM, PONG, SEPARATOR};
use shared::types::{Action, Manifest, PongPayload};

/// What an action means to one service watcher
#[derive(Debug, Clone, PartialEq)]
pub enum Signal<'a> {
    /// Heartbeat response naming this service
    Heartbeat(PongPayload),
    /// Identity response naming this service
    Identity(Manifest),
    /// Domain action in this service's namespace, carrying its leaf segment
    Domain(&'a str),
    Irrelevant,
}

/// Classify an action from the point of view of the service `handle`.
///
/// Control actions are checked first. Control payloads that fail to decode,
/// or that name another service, are irrelevant.
pub fn classify<'a>(action: &'a Action, handle: &str) -> Signal<'a> {
    match action.action_type.as_str() {
        PONG => match decode::<PongPayload>(action) {
            Some(pong) if pong.handle == handle => Signal::Heartbeat(pong),
            _ => Signal::Irrelevant,
        },
        IAM => match decode::<Manifest>(action) {
            Some(manifest) if manifest.handle == handle => Signal::Identity(manifest),
            _ => Signal::Irrelevant,
        },
        action_type => match domain_suffix(action_type, handle) {
            Some(suffix) => Signal::Domain(suffix),
            None => Signal::Irrelevant,
        },
    }
}

/// Leaf segment of `@<handle>/.../<leaf>`, if the type is in this namespace
fn domain_suffix<'a>(action_type: &'a str, handle: &str) -> Option<&'a str> {
    let rest = action_type
        .strip_prefix(HANDLE_MARKER)?
        .strip_prefix(handle)?
        .strip_prefix(SEPARATOR)?;

    rest.rsplit(SEPARATOR).next()
}

fn decode<T: serde::de::DeserializeOwned>(action: &Action) -> Option<T> {
    match serde_json::from_value(action.payload.clone()) {
        Ok(payload) => Some(payload),
        Err(e) => {
            tracing::debug!("Dropping {} with malformed payload: {}", action.action_type, e);
            None
        }
    }
}
