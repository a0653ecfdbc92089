//! Group members as reported by the location service.

use serde::{Deserialize, Serialize};

use crate::error::NavError;
use crate::geo::GeoPoint;

/// Last known location of another group member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Companion {
    pub user_id: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub accuracy_m: f64,
    #[serde(default)]
    pub help_requested: bool,
    /// User this member is currently heading to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub going_to: Option<String>,
    /// Report time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp_ms: i64,
}

impl Companion {
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }
}

/// Members that have raised an SOS, most recent first.
pub fn requesting_help(companions: &[Companion]) -> Vec<&Companion> {
    let mut help: Vec<&Companion> = companions.iter().filter(|c| c.help_requested).collect();
    help.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
    help
}

/// Parse a companion list from the JSON the location service returns.
pub fn parse_list(json: &str) -> Result<Vec<Companion>, NavError> {
    serde_json::from_str(json).map_err(|e| NavError::Json(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_with_optional_fields_missing() {
        let json = r#"[
            {"user_id": "anna", "lat": 46.5, "lon": 7.9},
            {"user_id": "ben", "lat": 46.6, "lon": 7.8, "help_requested": true,
             "going_to": "anna", "timestamp_ms": 1700000000000}
        ]"#;
        let list = parse_list(json).unwrap();
        assert_eq!(list.len(), 2);
        assert!(!list[0].help_requested);
        assert_eq!(list[1].going_to.as_deref(), Some("anna"));
        assert_eq!(list[0].position(), GeoPoint::new(46.5, 7.9));
    }

    #[test]
    fn help_requests_newest_first() {
        let mk = |id: &str, help: bool, ts: i64| Companion {
            user_id: id.into(),
            lat: 0.0,
            lon: 0.0,
            accuracy_m: 5.0,
            help_requested: help,
            going_to: None,
            timestamp_ms: ts,
        };
        let list = vec![mk("a", true, 10), mk("b", false, 30), mk("c", true, 20)];
        let help = requesting_help(&list);
        let ids: Vec<&str> = help.iter().map(|c| c.user_id.as_str()).collect();
        assert_eq!(ids, ["c", "a"]);
    }

    #[test]
    fn malformed_list_is_an_error() {
        assert!(parse_list("{").is_err());
    }
}
