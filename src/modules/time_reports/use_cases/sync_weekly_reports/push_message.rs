use crate::modules::time_reports::adapters::outbound::remote_source_http::{
    RemoteEntry, normalize,
};
use crate::modules::time_reports::core::time_entry::TimeEntry;
use serde::Deserialize;
use serde_json::Value;

pub const ENTRIES_MESSAGE: &str = "entries";

/// Message arriving on the server push channel.
#[derive(Debug, Clone, Deserialize)]
pub struct PushMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, PartialEq)]
pub enum PushPayload {
    Entries(Vec<TimeEntry>),
    Ignored(String),
}

impl PushMessage {
    pub fn into_payload(self) -> Result<PushPayload, serde_json::Error> {
        if self.kind != ENTRIES_MESSAGE {
            return Ok(PushPayload::Ignored(self.kind));
        }
        let rows: Vec<RemoteEntry> = serde_json::from_value(self.data)?;
        Ok(PushPayload::Entries(normalize(rows)))
    }
}

#[cfg(test)]
mod push_message_tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    fn it_should_read_an_entries_snapshot() {
        let message: PushMessage = serde_json::from_value(json!({
            "type": "entries",
            "data": [{
                "id": 4,
                "begin": "2024-01-02T09:00:00+01:00",
                "end": null,
                "project_id": 1,
                "activity_id": null,
                "description": null,
                "tags": ["excluded"]
            }]
        }))
        .unwrap();
        let PushPayload::Entries(entries) = message.into_payload().unwrap() else {
            panic!("expected entries");
        };
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_running());
    }

    #[rstest]
    fn it_should_read_entries_in_the_remote_shape() {
        let message: PushMessage = serde_json::from_value(json!({
            "type": "entries",
            "data": [{
                "id": 4,
                "begin": "2024-01-02T09:00:00+0100",
                "end": "2024-01-02T10:00:00+0100",
                "project": {"id": 3, "name": "Acme"},
                "activity": 5,
                "description": "",
                "tags": [{"name": "billable"}, "internal"]
            }]
        }))
        .unwrap();

        let PushPayload::Entries(entries) = message.into_payload().unwrap() else {
            panic!("expected entries");
        };

        let entry = &entries[0];
        assert_eq!(entry.project_id, Some(3));
        assert_eq!(entry.activity_id, Some(5));
        assert_eq!(entry.description, None);
        assert_eq!(entry.tags, vec!["billable".to_string(), "internal".to_string()]);
        assert_eq!(entry.begin.offset().local_minus_utc(), 3600);
        assert!(!entry.is_running());
    }

    #[rstest]
    #[case(json!({"type": "heartbeat"}))]
    #[case(json!({"type": "projects", "data": [{"id": 1}]}))]
    fn it_should_ignore_other_message_types(#[case] raw: Value) {
        let message: PushMessage = serde_json::from_value(raw).unwrap();
        assert!(matches!(message.into_payload(), Ok(PushPayload::Ignored(_))));
    }

    #[rstest]
    fn it_should_reject_a_malformed_snapshot() {
        let message: PushMessage =
            serde_json::from_value(json!({"type": "entries", "data": {"id": 1}})).unwrap();
        assert!(message.into_payload().is_err());
    }
}
