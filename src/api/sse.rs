//! Server-Sent Events stream of a user's notifications

use crate::db::UserId;
use crate::runtime::Notification;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Convert a notification subscription to an SSE stream
pub fn sse_stream(
    user_id: UserId,
    rx: broadcast::Receiver<Notification>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let init = futures::stream::once(async move {
        Ok(Event::default()
            .event("init")
            .data(json!({ "type": "init", "user_id": user_id }).to_string()))
    });

    let notifications = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(notification) => Some(Ok(notification_event(&notification))),
        Err(e) => {
            tracing::warn!(user_id, error = %e, "Notification stream lagged");
            None
        }
    });

    Sse::new(init.chain(notifications)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn notification_event(notification: &Notification) -> Event {
    Event::default()
        .event("notification")
        .data(notification_payload(notification).to_string())
}

fn notification_payload(notification: &Notification) -> serde_json::Value {
    json!({
        "type": "notification",
        "message": notification.message,
        "sent_at": notification.sent_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ProposalStatus;
    use crate::state_machine::Outbound;

    #[test]
    fn test_notification_payload_names_the_message() {
        let notification = Notification {
            user_id: 3,
            message: Outbound::ProposalStatusChanged {
                proposal_id: 9,
                status: ProposalStatus::Declined,
            },
            sent_at: chrono::Utc::now(),
        };
        let data = notification_payload(&notification);
        assert_eq!(data["type"], "notification");
        assert_eq!(data["message"]["type"], "proposal_status_changed");
        assert_eq!(data["message"]["proposal_id"], 9);
        assert_eq!(data["message"]["status"], "declined");
    }
}
