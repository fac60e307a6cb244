//! Dashboard counters reported by `GET /api/statistics`.

use serde::{Deserialize, Serialize};

/// Certificate and workflow totals shown on the dashboard.
///
/// Counters the backend leaves out decode as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Statistics {
    pub certificate_total: u64,
    pub certificate_expire_soon: u64,
    pub certificate_expired: u64,
    pub workflow_total: u64,
    pub workflow_enabled: u64,
    pub workflow_disabled: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_backend_counters() {
        let stats: Statistics = serde_json::from_value(json!({
            "certificateTotal": 12,
            "certificateExpireSoon": 3,
            "certificateExpired": 1,
            "workflowTotal": 5,
            "workflowEnabled": 4,
            "workflowDisabled": 1
        }))
        .unwrap();
        assert_eq!(stats.certificate_expire_soon, 3);
        assert_eq!(stats.workflow_enabled, 4);
    }

    #[test]
    fn test_missing_counters_default_to_zero() {
        let stats: Statistics = serde_json::from_value(json!({"workflowTotal": 2})).unwrap();
        assert_eq!(
            stats,
            Statistics {
                workflow_total: 2,
                ..Statistics::default()
            }
        );
    }
}
