//! `/health` endpoint.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Health check response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server is accepting requests.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open push channels.
    pub connections: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fresh_server() {
        let resp = health_check(Instant::now(), 0);
        assert_eq!(resp.status, "ok");
        assert!(resp.uptime_secs < 2);
        assert_eq!(resp.connections, 0);
    }

    #[test]
    fn uptime_counts_from_start() {
        let start = Instant::now().checked_sub(Duration::from_secs(60)).unwrap();
        assert!(health_check(start, 3).uptime_secs >= 59);
    }

    #[test]
    fn serialized_fields() {
        let parsed = serde_json::to_value(health_check(Instant::now(), 2)).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 2);
        assert!(parsed["uptime_secs"].is_number());
    }
}
