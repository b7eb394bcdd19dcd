use chrono::{DateTime, TimeDelta, Utc};
use shared::types::GroupReport;
use crate::config::WatchConfig;

/// Tracks the request/response cycle of one named group within a service.
///
/// Latency is only attributed when a request has been seen since the last
/// attributed response, so ambient success/error events never pair with a
/// request that was already answered.
#[derive(Debug, Clone)]
pub struct WatchGroup {
    request_pattern: String,
    success_pattern: String,
    error_pattern: String,

    last_request: Option<DateTime<Utc>>,
    last_success: Option<DateTime<Utc>>,
    last_error: Option<DateTime<Utc>>,
    last_response: Option<DateTime<Utc>>,
    response_latency: Option<TimeDelta>,
}

impl WatchGroup {
    pub fn new(config: &WatchConfig) -> Self {
        Self {
            request_pattern: config.request.clone(),
            success_pattern: config.success.clone(),
            error_pattern: config.error.clone(),
            last_request: None,
            last_success: None,
            last_error: None,
            last_response: None,
            response_latency: None,
        }
    }

    /// Apply a signal suffix observed at `now`. Unknown suffixes only re-run
    /// the pairing check.
    pub fn update(&mut self, suffix: &str, now: DateTime<Utc>) {
        if suffix == self.request_pattern {
            self.last_request = Some(now);
        } else if suffix == self.success_pattern {
            self.last_success = Some(now);
        } else if suffix == self.error_pattern {
            self.last_error = Some(now);
        }

        self.pair_response();
    }

    /// Latest of success and error. On an exact tie success wins.
    fn candidate_response(&self) -> Option<DateTime<Utc>> {
        if self.last_error > self.last_success {
            self.last_error
        } else {
            self.last_success
        }
    }

    fn pair_response(&mut self) {
        let Some(request) = self.last_request else {
            return;
        };

        // Option orders None before Some, so an unanswered first request passes
        if self.last_request <= self.last_response {
            return;
        }

        // Responses older than the pending request belong to an earlier cycle
        match self.candidate_response() {
            Some(response) if response >= request => {
                self.last_response = Some(response);
                self.response_latency = Some(response - request);
            }
            _ => {}
        }
    }

    pub fn report(&self) -> GroupReport {
        GroupReport {
            last_request: self.last_request,
            last_success: self.last_success,
            last_error: self.last_error,
            last_response: self.last_response,
            response_latency: self.response_latency.and_then(|d| d.num_microseconds()),
        }
    }
}
