use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use shared::types::{Action, Manifest, ServiceReport};
use crate::config::ServiceConfig;
use super::group::WatchGroup;
use super::signal::{classify, Signal};

/// Identity, liveness and watch groups of one configured service
#[derive(Debug)]
pub struct ServiceWatcher {
    handle: String,
    manifest: Option<Manifest>,
    last_heartbeat: Option<DateTime<Utc>>,
    groups: BTreeMap<String, WatchGroup>,
}

impl ServiceWatcher {
    pub fn new(config: &ServiceConfig) -> Self {
        let groups = config
            .watches
            .iter()
            .map(|watch| (watch.group.clone(), WatchGroup::new(watch)))
            .collect();

        Self {
            handle: config.handle.clone(),
            manifest: None,
            last_heartbeat: None,
            groups,
        }
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Apply one bus action received at `now`. Actions for other services
    /// are dropped.
    pub fn handle_action(&mut self, action: &Action, now: DateTime<Utc>) {
        match classify(action, &self.handle) {
            Signal::Heartbeat(pong) => {
                let Some(emitted_at) = pong.emitted_at() else {
                    tracing::debug!("Dropping heartbeat for {} with timestamp {}", self.handle, pong.timestamp);
                    return;
                };
                if self.last_heartbeat < Some(emitted_at) {
                    self.last_heartbeat = Some(emitted_at);
                }
            }
            Signal::Identity(manifest) => {
                if self.manifest.as_ref() != Some(&manifest) {
                    tracing::info!("Identified {} as {} v{}", self.handle, manifest.name, manifest.version);
                }
                self.manifest = Some(manifest);
            }
            Signal::Domain(suffix) => {
                for group in self.groups.values_mut() {
                    group.update(suffix, now);
                }
            }
            Signal::Irrelevant => {}
        }
    }

    pub fn report(&self) -> ServiceReport {
        ServiceReport {
            handle: self.handle.clone(),
            manifest: self.manifest.clone(),
            last_heartbeat: self.last_heartbeat,
            groups: self
                .groups
                .iter()
                .map(|(name, group)| (name.clone(), group.report()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::protocol::{IAM, PONG};
    use crate::config::WatchConfig;

    fn watch(group: &str, request: &str, success: &str, error: &str) -> WatchConfig {
        WatchConfig {
            group: group.to_string(),
            request: request.to_string(),
            success: success.to_string(),
            error: error.to_string(),
        }
    }

    fn watcher(handle: &str) -> ServiceWatcher {
        ServiceWatcher::new(&ServiceConfig {
            handle: handle.to_string(),
            topic: format!("v1/{}", handle),
            watches: vec![
                watch("fetch", "FETCH_REQUEST", "FETCH_SUCCESS", "FETCH_ERROR"),
                watch("store", "STORE_REQUEST", "STORE_SUCCESS", "FETCH_ERROR"),
            ],
        })
    }

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    fn iam(handle: &str, version: &str) -> Action {
        Action::new(IAM, json!({
            "name": "Alpha Service",
            "handle": handle,
            "version": version,
            "description": "fetches things",
            "started_at": "2024-03-01T12:00:00Z"
        }))
    }

    #[test]
    fn test_fresh_report() {
        let report = watcher("alpha").report();

        assert_eq!(report.handle, "alpha");
        assert_eq!(report.manifest, None);
        assert_eq!(report.last_heartbeat, None);
        assert_eq!(report.groups.len(), 2);
        for group in report.groups.values() {
            assert_eq!(group.last_request, None);
            assert_eq!(group.last_success, None);
            assert_eq!(group.last_error, None);
            assert_eq!(group.response_latency, None);
        }
    }

    #[test]
    fn test_heartbeat_uses_payload_timestamp() {
        let mut w = watcher("alpha");
        let pong = Action::new(PONG, json!({"timestamp": 1_000, "handle": "alpha"}));
        w.handle_action(&pong, at(5_000));

        assert_eq!(w.report().last_heartbeat, Some(at(1_000)));
    }

    #[test]
    fn test_heartbeat_for_other_service() {
        let mut w = watcher("alpha");
        let before = w.report();
        let pong = Action::new(PONG, json!({"timestamp": 1000, "handle": "beta"}));
        w.handle_action(&pong, at(1000));

        assert_eq!(w.report(), before);
    }

    #[test]
    fn test_heartbeat_does_not_move_backwards() {
        let mut w = watcher("alpha");
        w.handle_action(&Action::new(PONG, json!({"timestamp": 9_000, "handle": "alpha"})), at(9_000));
        w.handle_action(&Action::new(PONG, json!({"timestamp": 3_000, "handle": "alpha"})), at(9_500));

        assert_eq!(w.report().last_heartbeat, Some(at(9_000)));
    }

    #[test]
    fn test_identity_is_replaced_wholesale() {
        let mut w = watcher("alpha");
        w.handle_action(&iam("alpha", "1.0.0"), at(0));
        w.handle_action(&iam("alpha", "2.0.0"), at(1));

        let manifest = w.report().manifest.unwrap();
        assert_eq!(manifest.version, "2.0.0");
        assert_eq!(manifest.name, "Alpha Service");

        w.handle_action(&iam("beta", "3.0.0"), at(2));
        assert_eq!(w.report().manifest.unwrap().version, "2.0.0");
    }

    #[test]
    fn test_domain_signal_reaches_every_group() {
        let mut w = watcher("alpha");
        w.handle_action(&Action::new("@alpha/FETCH_REQUEST", json!(null)), at(0));
        w.handle_action(&Action::new("@alpha/STORE_REQUEST", json!(null)), at(10));
        w.handle_action(&Action::new("@alpha/FETCH_ERROR", json!(null)), at(40));

        let report = w.report();
        assert_eq!(report.groups["fetch"].response_latency, Some(40_000));
        assert_eq!(report.groups["store"].response_latency, Some(30_000));
        assert_eq!(report.groups["store"].last_error, Some(at(40)));
    }

    #[test]
    fn test_other_namespace_is_ignored() {
        let mut w = watcher("alpha");
        let before = w.report();
        w.handle_action(&Action::new("@beta/FETCH_REQUEST", json!(null)), at(0));
        w.handle_action(&Action::new("@meta/PING", json!("*")), at(0));

        assert_eq!(w.report(), before);
    }
}
