//! Tests for `src/engine.rs` — lifecycle transitions and failure policy.

use chrono::{Duration, Utc};

use smsrelay::engine::DispatchError;
use smsrelay::store::{MessageStatus, NewMessage};

use crate::stub::{setup_dispatcher, StubBehavior, StubProvider};

#[tokio::test]
async fn send_now_marks_sent_and_records_audit() {
    let stub = StubProvider::new(StubBehavior::Succeed { id: "SM123" });
    let dispatcher = setup_dispatcher("twilio", stub.clone()).await;

    let receipt = dispatcher
        .send_now("twilio", "+15551230000", "hi")
        .await
        .expect("send should succeed");
    assert_eq!(receipt.provider_message_id, "SM123");

    let message = dispatcher
        .store()
        .message(1)
        .await
        .expect("fetch")
        .expect("row should exist");
    assert_eq!(message.status, MessageStatus::Sent);
    assert_eq!(message.provider_message_id.as_deref(), Some("SM123"));
    assert!(message.sent_at.is_some());

    let trail = dispatcher.store().audit_for(1).await.expect("audit");
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].status, MessageStatus::Sent);
    assert!(trail[0].detail.contains("SM123"));
}

#[tokio::test]
async fn send_now_unknown_provider_creates_no_rows() {
    let stub = StubProvider::new(StubBehavior::Succeed { id: "SM123" });
    let dispatcher = setup_dispatcher("twilio", stub.clone()).await;

    let result = dispatcher.send_now("nexmo", "+15551230000", "hi").await;
    match result {
        Err(DispatchError::UnknownProvider { name }) => assert_eq!(name, "nexmo"),
        other => panic!("expected UnknownProvider, got {other:?}"),
    }

    assert_eq!(stub.calls(), 0);
    let row: (i64,) = sqlx::query_as("SELECT count(*) FROM messages")
        .fetch_one(dispatcher.store().pool())
        .await
        .expect("count");
    assert_eq!(row.0, 0);
}

#[tokio::test]
async fn send_now_failure_records_then_reraises() {
    let stub = StubProvider::new(StubBehavior::Fail {
        body: "insufficient balance",
    });
    let dispatcher = setup_dispatcher("plivo", stub.clone()).await;

    let result = dispatcher.send_now("plivo", "+15551230000", "hi").await;
    match result {
        Err(DispatchError::Provider(err)) => {
            assert!(err.to_string().contains("insufficient balance"));
        }
        other => panic!("expected provider error, got {other:?}"),
    }

    // Exactly one message row, failed, and exactly one failed audit row.
    let row: (i64,) = sqlx::query_as("SELECT count(*) FROM messages")
        .fetch_one(dispatcher.store().pool())
        .await
        .expect("count");
    assert_eq!(row.0, 1);

    let message = dispatcher
        .store()
        .message(1)
        .await
        .expect("fetch")
        .expect("row should exist");
    assert_eq!(message.status, MessageStatus::Failed);
    assert!(message.provider_message_id.is_none());
    assert!(message.sent_at.is_none());

    let trail = dispatcher.store().audit_for(1).await.expect("audit");
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].status, MessageStatus::Failed);
    assert!(trail[0].detail.contains("insufficient balance"));
}

#[tokio::test]
async fn schedule_for_creates_scheduled_row_without_delivery() {
    let stub = StubProvider::new(StubBehavior::Succeed { id: "SM123" });
    let dispatcher = setup_dispatcher("twilio", stub.clone()).await;

    let when = Utc::now() + Duration::hours(2);
    let id = dispatcher
        .schedule_for("twilio", "+15551230000", "later", when)
        .await
        .expect("schedule");

    assert_eq!(stub.calls(), 0, "scheduling must not attempt delivery");
    let message = dispatcher
        .store()
        .message(id)
        .await
        .expect("fetch")
        .expect("row should exist");
    assert_eq!(message.status, MessageStatus::Scheduled);
    assert!(message.scheduled_at.is_some());
}

#[tokio::test]
async fn schedule_for_unknown_provider_is_an_error() {
    let stub = StubProvider::new(StubBehavior::Succeed { id: "SM123" });
    let dispatcher = setup_dispatcher("twilio", stub).await;

    let result = dispatcher
        .schedule_for("nexmo", "+15551230000", "later", Utc::now())
        .await;
    assert!(matches!(result, Err(DispatchError::UnknownProvider { .. })));
}

#[tokio::test]
async fn drain_delivers_past_scheduled_message() {
    let stub = StubProvider::new(StubBehavior::Succeed { id: "SM900" });
    let dispatcher = setup_dispatcher("twilio", stub.clone()).await;

    let yesterday = Utc::now() - Duration::days(1);
    let id = dispatcher
        .schedule_for("twilio", "+15551230000", "hi", yesterday)
        .await
        .expect("schedule");

    let outcome = dispatcher.drain_due().await.expect("drain");
    assert_eq!(outcome.sent, 1);
    assert_eq!(outcome.failed, 0);
    assert_eq!(outcome.skipped, 0);

    let message = dispatcher
        .store()
        .message(id)
        .await
        .expect("fetch")
        .expect("row should exist");
    assert_eq!(message.status, MessageStatus::Sent);
    assert_eq!(message.provider_message_id.as_deref(), Some("SM900"));

    let trail = dispatcher.store().audit_for(id).await.expect("audit");
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].status, MessageStatus::Sent);
}

#[tokio::test]
async fn drain_leaves_future_messages_alone() {
    let stub = StubProvider::new(StubBehavior::Succeed { id: "SM900" });
    let dispatcher = setup_dispatcher("twilio", stub.clone()).await;

    let id = dispatcher
        .schedule_for("twilio", "+15551230000", "hi", Utc::now() + Duration::hours(1))
        .await
        .expect("schedule");

    let outcome = dispatcher.drain_due().await.expect("drain");
    assert_eq!(outcome, smsrelay::engine::DrainOutcome::default());
    assert_eq!(stub.calls(), 0);

    let message = dispatcher
        .store()
        .message(id)
        .await
        .expect("fetch")
        .expect("row should exist");
    assert_eq!(message.status, MessageStatus::Scheduled);
}

#[tokio::test]
async fn drain_processes_every_message_despite_failures() {
    let stub = StubProvider::new(StubBehavior::FailRecipients(&["+15550000002"]));
    let dispatcher = setup_dispatcher("twilio", stub.clone()).await;

    let yesterday = Utc::now() - Duration::days(1);
    for recipient in ["+15550000001", "+15550000002", "+15550000003"] {
        dispatcher
            .schedule_for("twilio", recipient, "hi", yesterday)
            .await
            .expect("schedule");
    }

    let outcome = dispatcher.drain_due().await.expect("drain");
    assert_eq!(stub.calls(), 3, "a mid-batch failure must not abort the pass");
    assert_eq!(outcome.sent, 2);
    assert_eq!(outcome.failed, 1);

    // Every message reached a terminal state with an audit row.
    for id in 1..=3 {
        let message = dispatcher
            .store()
            .message(id)
            .await
            .expect("fetch")
            .expect("row should exist");
        assert!(matches!(
            message.status,
            MessageStatus::Sent | MessageStatus::Failed
        ));
        let trail = dispatcher.store().audit_for(id).await.expect("audit");
        assert_eq!(trail.len(), 1);
    }
}

#[tokio::test]
async fn drain_skips_messages_with_unregistered_provider() {
    let stub = StubProvider::new(StubBehavior::Succeed { id: "SM900" });
    let dispatcher = setup_dispatcher("twilio", stub.clone()).await;

    // Insert directly: schedule_for would reject the unknown provider name.
    let orphan = dispatcher
        .store()
        .create_message(NewMessage {
            recipient: "+15550000009",
            body: "hi",
            provider: "nexmo",
            status: MessageStatus::Pending,
            scheduled_at: None,
            contact_id: None,
        })
        .await
        .expect("insert");

    let outcome = dispatcher.drain_due().await.expect("drain");
    assert_eq!(outcome.skipped, 1);
    assert_eq!(stub.calls(), 0);

    // Status untouched, no audit row — the provider may be registered later.
    let message = dispatcher
        .store()
        .message(orphan)
        .await
        .expect("fetch")
        .expect("row should exist");
    assert_eq!(message.status, MessageStatus::Pending);
    assert!(dispatcher.store().audit_for(orphan).await.expect("audit").is_empty());

    // The row stays due, so every pass sees it again.
    let outcome = dispatcher.drain_due().await.expect("drain");
    assert_eq!(outcome.skipped, 1, "still skipped while unregistered");
}

#[tokio::test]
async fn failed_messages_are_terminal() {
    let stub = StubProvider::new(StubBehavior::Fail { body: "boom" });
    let dispatcher = setup_dispatcher("twilio", stub.clone()).await;

    let result = dispatcher.send_now("twilio", "+15551230000", "hi").await;
    assert!(result.is_err());
    assert_eq!(stub.calls(), 1);

    // The failed row never becomes due again.
    let outcome = dispatcher.drain_due().await.expect("drain");
    assert_eq!(outcome, smsrelay::engine::DrainOutcome::default());
    assert_eq!(stub.calls(), 1, "no automatic retry of failed messages");
}

#[tokio::test]
async fn balance_and_delivery_status_pass_through() {
    let stub = StubProvider::new(StubBehavior::Succeed { id: "SM1" });
    let dispatcher = setup_dispatcher("twilio", stub).await;

    let balance = dispatcher.balance("twilio").await.expect("balance");
    assert!((balance - 42.5).abs() < f64::EPSILON);

    let status = dispatcher
        .delivery_status("twilio", "SM1")
        .await
        .expect("status");
    assert_eq!(status["status"], "delivered");

    assert!(matches!(
        dispatcher.balance("nexmo").await,
        Err(DispatchError::UnknownProvider { .. })
    ));
    assert!(matches!(
        dispatcher.delivery_status("nexmo", "SM1").await,
        Err(DispatchError::UnknownProvider { .. })
    ));
}
