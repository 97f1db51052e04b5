//! Trigger snapshots: the slice of domain state whose change justifies
//! re-sending a lifecycle email.
//!
//! Snapshots are persisted as plain JSON objects (the event type lives in its
//! own column) and compared as typed values, so `null` vs. absent keys and
//! key order never produce a spurious "changed".

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical;
use crate::models::{DemoLinks, Project};
use crate::types::{EventType, ProjectStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TriggerSnapshot {
    DemoReady(DemoLinks),
    WebsiteLaunch(Project),
}

impl TriggerSnapshot {
    pub fn event_type(&self) -> EventType {
        match self {
            TriggerSnapshot::DemoReady(_) => EventType::DemoReady,
            TriggerSnapshot::WebsiteLaunch(_) => EventType::WebsiteLaunch,
        }
    }

    pub fn to_value(&self) -> Value {
        // Both variants are plain structs of strings and enums.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Decode a stored snapshot for `event_type`.
    pub fn from_value(event_type: EventType, value: &Value) -> serde_json::Result<Self> {
        match event_type {
            EventType::DemoReady => DemoLinks::deserialize(value).map(TriggerSnapshot::DemoReady),
            EventType::WebsiteLaunch => {
                Project::deserialize(value).map(TriggerSnapshot::WebsiteLaunch)
            }
        }
    }

    /// Sub-conditions of the eligibility predicate that currently fail.
    /// Empty means the email may be sent.
    pub fn ineligibility_reasons(&self) -> Vec<String> {
        let mut reasons = Vec::new();
        match self {
            TriggerSnapshot::DemoReady(links) => {
                for (field, value) in links.options() {
                    if is_blank(value) {
                        reasons.push(format!("{field} is missing"));
                    }
                }
            }
            TriggerSnapshot::WebsiteLaunch(project) => {
                if project.status != ProjectStatus::Live {
                    reasons.push(format!(
                        "project status is {}, expected live",
                        project.status
                    ));
                }
                if is_blank(project.final_url.as_deref()) {
                    reasons.push("final_url is missing".to_string());
                }
            }
        }
        reasons
    }

    /// Whether a previously stored snapshot carries the same content.
    ///
    /// Stored JSON that no longer decodes into the typed shape is compared
    /// structurally instead.
    pub fn matches_stored(&self, stored: &Value) -> bool {
        match TriggerSnapshot::from_value(self.event_type(), stored) {
            Ok(previous) => previous == *self,
            Err(e) => {
                tracing::warn!(
                    event_type = %self.event_type(),
                    error = %e,
                    "stored trigger snapshot does not decode, comparing raw JSON"
                );
                canonical::equivalent(stored, &self.to_value())
            }
        }
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn demo(a: &str, b: &str, c: &str) -> TriggerSnapshot {
        TriggerSnapshot::DemoReady(DemoLinks::new(a, b, c))
    }

    #[test]
    fn demo_snapshot_serializes_as_flat_object() {
        assert_eq!(
            demo("a", "b", "c").to_value(),
            json!({"option_1_url": "a", "option_2_url": "b", "option_3_url": "c"})
        );
    }

    #[test]
    fn launch_snapshot_serializes_status_and_url() {
        let snap = TriggerSnapshot::WebsiteLaunch(Project::live("https://acme.example"));
        assert_eq!(
            snap.to_value(),
            json!({"status": "live", "final_url": "https://acme.example"})
        );
    }

    #[test]
    fn all_demo_urls_present_is_eligible() {
        assert!(demo("a", "b", "c").ineligibility_reasons().is_empty());
    }

    #[test]
    fn empty_demo_url_is_named() {
        let reasons = demo("a", "", "c").ineligibility_reasons();
        assert_eq!(reasons, vec!["option_2_url is missing".to_string()]);
    }

    #[test]
    fn whitespace_url_counts_as_missing() {
        let snap = TriggerSnapshot::DemoReady(DemoLinks {
            option_1_url: Some("a".into()),
            option_2_url: Some("b".into()),
            option_3_url: Some("   ".into()),
        });
        assert_eq!(
            snap.ineligibility_reasons(),
            vec!["option_3_url is missing".to_string()]
        );
    }

    #[test]
    fn complete_project_is_not_launchable() {
        let snap = TriggerSnapshot::WebsiteLaunch(Project {
            status: ProjectStatus::Complete,
            final_url: Some("https://acme.example".into()),
        });
        assert_eq!(
            snap.ineligibility_reasons(),
            vec!["project status is complete, expected live".to_string()]
        );
    }

    #[test]
    fn launch_lists_every_failing_condition() {
        let snap = TriggerSnapshot::WebsiteLaunch(Project::default());
        let reasons = snap.ineligibility_reasons();
        assert_eq!(reasons.len(), 2);
        assert!(reasons[1].contains("final_url"));
    }

    #[test]
    fn reordered_stored_keys_still_match() {
        let stored: Value =
            serde_json::from_str(r#"{"option_3_url":"c","option_2_url":"b","option_1_url":"a"}"#)
                .unwrap();
        assert!(demo("a", "b", "c").matches_stored(&stored));
    }

    #[test]
    fn changed_url_does_not_match() {
        let stored = json!({"option_1_url": "a", "option_2_url": "b", "option_3_url": "c"});
        assert!(!demo("a2", "b", "c").matches_stored(&stored));
    }

    #[test]
    fn null_and_absent_keys_are_the_same_state() {
        let current = TriggerSnapshot::WebsiteLaunch(Project {
            status: ProjectStatus::Live,
            final_url: None,
        });
        assert!(current.matches_stored(&json!({"status": "live"})));
        assert!(current.matches_stored(&json!({"status": "live", "final_url": null})));
    }

    #[test]
    fn undecodable_stored_value_falls_back_to_structural_compare() {
        let stored = json!({"status": 7});
        let current = TriggerSnapshot::WebsiteLaunch(Project::live("https://acme.example"));
        assert!(!current.matches_stored(&stored));
    }
}
