//! Mapping from inbound server events to notification records.

use counselflow_shared::{kinds, NewNotification, NotificationKind, Payload, Priority, RawMessage};

/// What the dispatcher should do with an inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    /// Record a notification built from these fields.
    Notify(NewNotification),
    /// A server status snapshot.
    SystemStatus(Payload),
    /// The server confirmed a room subscription.
    RoomSubscribed(String),
    RoomUnsubscribed(String),
    /// The server rejected something we sent.
    ServerError(String),
    /// A known kind that needs no action.
    Observed,
    /// A kind this client does not understand.
    Unrecognized,
}

pub fn classify(message: &RawMessage) -> Classified {
    match message.kind.as_str() {
        kinds::TASK_UPDATE => {
            let priority = if message.field_is("priority", "high") {
                Priority::High
            } else {
                Priority::Medium
            };
            Classified::Notify(
                NewNotification::new(
                    NotificationKind::Info,
                    "Task Updated",
                    format!(
                        "Task \"{}\" status changed to {}",
                        field(message, "title"),
                        field(message, "status")
                    ),
                )
                .priority(priority)
                .module("tasks")
                .action_url(link(message, "/tasks", "task_id")),
            )
        }
        kinds::DOCUMENT_UPDATE => Classified::Notify(
            NewNotification::new(
                NotificationKind::Info,
                "Document Updated",
                format!(
                    "Document \"{}\" was modified by {}",
                    field(message, "title"),
                    field(message, "last_modified_by")
                ),
            )
            .priority(Priority::Medium)
            .module("documents")
            .action_url(link(message, "/documents", "document_id")),
        ),
        kinds::RISK_ALERT => {
            let kind = if message.field_is("severity", "high") {
                NotificationKind::Error
            } else {
                NotificationKind::Warning
            };
            Classified::Notify(
                NewNotification::new(
                    kind,
                    "Risk Alert",
                    format!(
                        "{}: {}",
                        field(message, "title"),
                        field(message, "description")
                    ),
                )
                .priority(Priority::High)
                .module("risks")
                .action_url(link(message, "/risks", "risk_id"))
                .action_label("Review Risk"),
            )
        }
        kinds::COMPLIANCE_ALERT => Classified::Notify(
            NewNotification::new(
                NotificationKind::Warning,
                "Compliance Alert",
                format!(
                    "{} compliance issue in {}",
                    field(message, "regulation"),
                    field(message, "jurisdiction")
                ),
            )
            .priority(Priority::High)
            .module("compliance")
            .action_url("/compliance")
            .action_label("View Details"),
        ),
        kinds::CONTRACT_UPDATE => Classified::Notify(
            NewNotification::new(
                NotificationKind::Info,
                "Contract Updated",
                "Contract was updated and requires your attention",
            )
            .priority(Priority::Medium)
            .module("contracts")
            .action_url(link(message, "/contracts", "contract_id")),
        ),
        kinds::MATTER_UPDATE => Classified::Notify(
            NewNotification::new(
                NotificationKind::Info,
                "Matter Updated",
                "Legal matter has been updated",
            )
            .priority(Priority::Medium)
            .module("matters")
            .action_url(link(message, "/matters", "matter_id")),
        ),
        kinds::AI_PROGRESS if message.field_is("status", "completed") => Classified::Notify(
            NewNotification::new(
                NotificationKind::Success,
                "AI Task Completed",
                "Your AI analysis is ready",
            )
            .priority(Priority::Medium)
            .module("ai")
            .action_url(link(message, "/ai/results", "task_id"))
            .action_label("View Results"),
        ),
        kinds::SYSTEM_STATUS => Classified::SystemStatus(message.payload.clone()),
        kinds::ROOM_SUBSCRIBED => match message.text("room_id") {
            Some(room) => Classified::RoomSubscribed(room),
            None => Classified::Observed,
        },
        kinds::ROOM_UNSUBSCRIBED => match message.text("room_id") {
            Some(room) => Classified::RoomUnsubscribed(room),
            None => Classified::Observed,
        },
        kinds::ERROR => Classified::ServerError(field(message, "message")),
        kinds::AI_PROGRESS | kinds::USER_ACTIVITY | kinds::HEARTBEAT => Classified::Observed,
        _ => Classified::Unrecognized,
    }
}

fn field(message: &RawMessage, key: &str) -> String {
    message.text(key).unwrap_or_else(|| "unknown".to_string())
}

/// `base/<id>`, or just `base` when the id is missing.
fn link(message: &RawMessage, base: &str, id_key: &str) -> String {
    match message.text(id_key) {
        Some(id) => format!("{}/{}", base, id),
        None => base.to_string(),
    }
}
