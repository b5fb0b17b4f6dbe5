use serde_json::Value;
use tracing::debug;

/// Notification topics. Per-clan channels plus a global channel that all
/// connected observers receive.
pub mod topics {
    use uuid::Uuid;

    pub const GLOBAL: &str = "global";

    pub fn clan(clan_id: Uuid) -> String {
        format!("clan_{}", clan_id)
    }
}

/// Event names carried inside published payloads.
pub mod events {
    pub const NEW_REPORT: &str = "new_report";
    pub const REPORT_VERIFIED: &str = "report_verified";
    pub const REPORT_STATUS_UPDATE: &str = "report_status_update";
    pub const MEMBER_JOINED: &str = "member_joined";
    pub const CLAN_TASK_CREATED: &str = "clan_task_created";
    pub const TASK_ACCEPTED: &str = "task_accepted";
    pub const TASK_APPROVED: &str = "task_approved";
    pub const TASK_COMPLETED: &str = "task_completed";
    pub const MISSION_COMPLETED: &str = "mission_completed";
    pub const ACTIVITY_PROPOSED: &str = "activity_proposed";
    pub const ACTIVITY_COMPLETED: &str = "activity_completed";
}

/// Fire-and-forget broadcast capability. The engine never blocks on
/// delivery and never treats delivery failure as a domain error, so the
/// trait is infallible from the caller's side.
pub trait Notifier: Send + Sync {
    fn publish(&self, topic: &str, payload: Value);
}

/// Default notifier: structured log lines instead of a transport.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn publish(&self, topic: &str, payload: Value) {
        debug!(topic = topic, payload = %payload, "notification published");
    }
}

/// Captures published notifications for inspection in tests.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingNotifier {
    published: std::sync::Mutex<Vec<(String, Value)>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(String, Value)> {
        self.published.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn events_on(&self, topic: &str) -> Vec<String> {
        self.published()
            .into_iter()
            .filter(|(t, _)| t == topic)
            .filter_map(|(_, payload)| {
                payload
                    .get("event")
                    .and_then(|e| e.as_str())
                    .map(|s| s.to_string())
            })
            .collect()
    }
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
    fn publish(&self, topic: &str, payload: Value) {
        if let Ok(mut published) = self.published.lock() {
            published.push((topic.to_string(), payload));
        }
    }
}

pub fn event_payload(event: &str, mut payload: Value) -> Value {
    if let Some(map) = payload.as_object_mut() {
        map.insert("event".to_string(), Value::String(event.to_string()));
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_recording_notifier_captures_events() {
        let notifier = RecordingNotifier::new();
        let clan_id = Uuid::new_v4();
        notifier.publish(
            &topics::clan(clan_id),
            event_payload(events::MEMBER_JOINED, json!({ "user": "ravi" })),
        );
        notifier.publish(topics::GLOBAL, event_payload(events::NEW_REPORT, json!({})));

        let clan_events = notifier.events_on(&topics::clan(clan_id));
        assert_eq!(clan_events, vec![events::MEMBER_JOINED.to_string()]);
        assert_eq!(notifier.published().len(), 2);
    }

    #[test]
    fn test_event_payload_injects_event_name() {
        let payload = event_payload(events::TASK_APPROVED, json!({ "task": 1 }));
        assert_eq!(payload["event"], "task_approved");
        assert_eq!(payload["task"], 1);
    }
}
