//! Tests for sequential campaign dispatch.
//!
//! These tests drive dispatch steps directly with a pinned clock instead of
//! waiting out real timer delays.

mod common;

use common::{T0, entry_statuses, harness, harness_with, seed_recipient, seed_sequential, seed_template};
use mailroom::campaigns::sequential::{self, FAILURE_BACKOFF};
use mailroom::entity::email_log;
use mailroom::entity::sequential_campaign::{self, SequenceStatus};
use mailroom::entity::sequential_recipient::EntryStatus;
use mailroom::error::EngineError;
use sea_orm::{ColumnTrait, EntityTrait, ModelTrait, QueryFilter};
use time::Duration;

#[tokio::test]
async fn test_set_recipients_computes_schedule_offsets() {
    let h = harness().await;
    let db = h.engine.db.as_ref();

    let template = seed_template(db, "drip", "s", "b").await;
    let campaign = seed_sequential(db, template.id, 15, T0).await;
    let mut ids = Vec::new();
    for email in ["a@example.org", "b@example.org", "c@example.org"] {
        ids.push(seed_recipient(db, email, "M").await.id);
    }

    sequential::set_recipients(&h.engine, campaign.id, &ids)
        .await
        .expect("set recipients");

    let slots = sequential::schedule(&h.engine, campaign.id)
        .await
        .expect("schedule");
    assert_eq!(slots.len(), 3);
    for (i, slot) in slots.iter().enumerate() {
        assert_eq!(slot.send_order, i as i32);
        assert_eq!(slot.scheduled_time, T0 + Duration::minutes(15 * i as i64));
        assert_eq!(slot.status, EntryStatus::Pending);
    }

    let reloaded = sequential_campaign::Entity::find_by_id(campaign.id)
        .one(db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.total_recipients, 3);
}

#[tokio::test]
async fn test_set_recipients_requires_draft() {
    let h = harness().await;
    let db = h.engine.db.as_ref();

    let template = seed_template(db, "locked", "s", "b").await;
    let campaign = seed_sequential(db, template.id, 5, T0).await;
    let r = seed_recipient(db, "a@example.org", "A").await;

    sequential::set_recipients(&h.engine, campaign.id, &[r.id])
        .await
        .expect("set recipients");
    sequential::start(&h.engine, campaign.id).await.expect("start");

    let err = sequential::set_recipients(&h.engine, campaign.id, &[r.id])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CampaignNotInExpectedState { .. }));
}

#[tokio::test]
async fn test_start_sends_first_due_entry_inline() {
    let h = harness().await;
    let db = h.engine.db.as_ref();

    let template = seed_template(db, "kickoff", "Hi $name", "b").await;
    let campaign = seed_sequential(db, template.id, 10, T0).await;
    let a = seed_recipient(db, "a@example.org", "Ada").await;
    let b = seed_recipient(db, "b@example.org", "Bob").await;
    sequential::set_recipients(&h.engine, campaign.id, &[a.id, b.id])
        .await
        .unwrap();

    sequential::start(&h.engine, campaign.id).await.expect("start");

    assert_eq!(h.transport.delivered(), 1);
    let reloaded = sequential_campaign::Entity::find_by_id(campaign.id)
        .one(db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.status, SequenceStatus::Sending);
    assert!(reloaded.started_at.is_some());
    assert_eq!(reloaded.emails_sent, 1);
    assert_eq!(reloaded.current_index, 1);
    assert_eq!(
        entry_statuses(db, campaign.id).await,
        vec![(0, EntryStatus::Sent), (1, EntryStatus::Pending)]
    );
    // The next entry is on the timer.
    assert!(h.engine.timers.is_armed(campaign.id).await);
}

#[tokio::test]
async fn test_start_requires_draft() {
    let h = harness().await;
    let db = h.engine.db.as_ref();

    let template = seed_template(db, "restart", "s", "b").await;
    let campaign = seed_sequential(db, template.id, 10, T0).await;
    let r = seed_recipient(db, "a@example.org", "A").await;
    sequential::set_recipients(&h.engine, campaign.id, &[r.id])
        .await
        .unwrap();

    sequential::start(&h.engine, campaign.id).await.unwrap();
    let err = sequential::start(&h.engine, campaign.id).await.unwrap_err();
    assert!(matches!(err, EngineError::CampaignNotInExpectedState { .. }));
    assert_eq!(h.transport.delivered(), 1);
}

#[tokio::test]
async fn test_whole_sequence_advances_entry_by_entry() {
    let h = harness().await;
    let db = h.engine.db.as_ref();

    let template = seed_template(db, "steps", "s", "b").await;
    let campaign = seed_sequential(db, template.id, 30, T0).await;
    let mut ids = Vec::new();
    for email in ["a@example.org", "b@example.org", "c@example.org"] {
        ids.push(seed_recipient(db, email, "M").await.id);
    }
    sequential::set_recipients(&h.engine, campaign.id, &ids)
        .await
        .unwrap();
    sequential::start(&h.engine, campaign.id).await.unwrap();
    assert_eq!(h.transport.delivered(), 1);

    h.clock.set(T0 + Duration::minutes(30));
    sequential::advance(h.engine.clone(), campaign.id).await.unwrap();
    assert_eq!(h.transport.delivered(), 2);

    h.clock.set(T0 + Duration::minutes(60));
    sequential::advance(h.engine.clone(), campaign.id).await.unwrap();
    assert_eq!(h.transport.delivered(), 3);

    let reloaded = sequential_campaign::Entity::find_by_id(campaign.id)
        .one(db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.status, SequenceStatus::Completed);
    assert!(reloaded.completed_at.is_some());
    assert_eq!(reloaded.emails_sent, 3);
    assert_eq!(reloaded.current_index, 3);
    assert!(!h.engine.timers.is_armed(campaign.id).await);

    // Every delivery carries the owning campaign on its log row.
    let logs = email_log::Entity::find()
        .filter(email_log::Column::SequentialCampaignId.eq(campaign.id))
        .all(db)
        .await
        .unwrap();
    assert_eq!(logs.len(), 3);
}

#[tokio::test]
async fn test_early_step_redefers_without_sending() {
    let h = harness().await;
    let db = h.engine.db.as_ref();

    let template = seed_template(db, "early", "s", "b").await;
    // First entry only due an hour from now.
    let campaign = seed_sequential(db, template.id, 60, T0 + Duration::hours(1)).await;
    let r = seed_recipient(db, "a@example.org", "A").await;
    sequential::set_recipients(&h.engine, campaign.id, &[r.id])
        .await
        .unwrap();
    sequential::start(&h.engine, campaign.id).await.unwrap();
    assert_eq!(h.transport.delivered(), 0);

    // A step that fires before the entry's instant must not send.
    sequential::advance(h.engine.clone(), campaign.id).await.unwrap();
    assert_eq!(h.transport.delivered(), 0);
    assert_eq!(
        entry_statuses(db, campaign.id).await,
        vec![(0, EntryStatus::Pending)]
    );
    assert!(h.engine.timers.is_armed(campaign.id).await);

    h.clock.set(T0 + Duration::hours(1));
    sequential::advance(h.engine.clone(), campaign.id).await.unwrap();
    assert_eq!(h.transport.delivered(), 1);
}

#[tokio::test]
async fn test_failed_entry_is_terminal_and_sequence_continues() {
    let h = harness_with(Some("bounce@")).await;
    let db = h.engine.db.as_ref();

    let template = seed_template(db, "lossy", "s", "b").await;
    let campaign = seed_sequential(db, template.id, 10, T0).await;
    let bad = seed_recipient(db, "bounce@example.org", "Bad").await;
    let good = seed_recipient(db, "good@example.org", "Good").await;
    sequential::set_recipients(&h.engine, campaign.id, &[bad.id, good.id])
        .await
        .unwrap();

    sequential::start(&h.engine, campaign.id).await.unwrap();
    assert_eq!(h.transport.delivered(), 0);
    assert_eq!(
        entry_statuses(db, campaign.id).await,
        vec![(0, EntryStatus::Failed), (1, EntryStatus::Pending)]
    );

    // The failed entry is never retried; the next step sends entry 1.
    h.clock.advance(Duration::try_from(FAILURE_BACKOFF).unwrap() + Duration::minutes(10));
    sequential::advance(h.engine.clone(), campaign.id).await.unwrap();
    assert_eq!(h.transport.delivered(), 1);

    let reloaded = sequential_campaign::Entity::find_by_id(campaign.id)
        .one(db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.status, SequenceStatus::Completed);
    assert_eq!(reloaded.emails_sent, 1);
    assert_eq!(reloaded.emails_failed, 1);
    assert_eq!(reloaded.current_index, 2);

    let entry = mailroom::entity::sequential_recipient::Entity::find()
        .filter(mailroom::entity::sequential_recipient::Column::CampaignId.eq(campaign.id))
        .filter(mailroom::entity::sequential_recipient::Column::SendOrder.eq(0))
        .one(db)
        .await
        .unwrap()
        .unwrap();
    assert!(entry.error_message.is_some());
    assert!(entry.sent_at.is_none());
}

#[tokio::test]
async fn test_pause_turns_pending_steps_into_noops() {
    let h = harness().await;
    let db = h.engine.db.as_ref();

    let template = seed_template(db, "hold", "s", "b").await;
    let campaign = seed_sequential(db, template.id, 10, T0).await;
    let a = seed_recipient(db, "a@example.org", "A").await;
    let b = seed_recipient(db, "b@example.org", "B").await;
    sequential::set_recipients(&h.engine, campaign.id, &[a.id, b.id])
        .await
        .unwrap();
    sequential::start(&h.engine, campaign.id).await.unwrap();
    assert_eq!(h.transport.delivered(), 1);

    sequential::pause(&h.engine, campaign.id).await.expect("pause");

    // A stale timer step after the pause does nothing.
    h.clock.set(T0 + Duration::minutes(10));
    sequential::advance(h.engine.clone(), campaign.id).await.unwrap();
    assert_eq!(h.transport.delivered(), 1);
    assert_eq!(
        entry_statuses(db, campaign.id).await,
        vec![(0, EntryStatus::Sent), (1, EntryStatus::Pending)]
    );

    // Resume picks the overdue entry up immediately.
    sequential::resume(&h.engine, campaign.id).await.expect("resume");
    assert_eq!(h.transport.delivered(), 2);
    let reloaded = sequential_campaign::Entity::find_by_id(campaign.id)
        .one(db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.status, SequenceStatus::Completed);
}

#[tokio::test]
async fn test_cancel_is_terminal_and_keeps_unattempted_entries_pending() {
    let h = harness().await;
    let db = h.engine.db.as_ref();

    let template = seed_template(db, "abort", "s", "b").await;
    let campaign = seed_sequential(db, template.id, 10, T0).await;
    let a = seed_recipient(db, "a@example.org", "A").await;
    let b = seed_recipient(db, "b@example.org", "B").await;
    sequential::set_recipients(&h.engine, campaign.id, &[a.id, b.id])
        .await
        .unwrap();
    sequential::start(&h.engine, campaign.id).await.unwrap();

    sequential::cancel(&h.engine, campaign.id).await.expect("cancel");
    assert!(!h.engine.timers.is_armed(campaign.id).await);

    h.clock.set(T0 + Duration::minutes(10));
    sequential::advance(h.engine.clone(), campaign.id).await.unwrap();
    assert_eq!(h.transport.delivered(), 1);
    assert_eq!(
        entry_statuses(db, campaign.id).await,
        vec![(0, EntryStatus::Sent), (1, EntryStatus::Pending)]
    );

    assert!(sequential::resume(&h.engine, campaign.id).await.is_err());
}

#[tokio::test]
async fn test_deleted_recipient_fails_entry_and_sequence_moves_on() {
    let h = harness().await;
    let db = h.engine.db.as_ref();

    let template = seed_template(db, "ghost", "s", "b").await;
    let campaign = seed_sequential(db, template.id, 10, T0).await;
    let ghost = seed_recipient(db, "ghost@example.org", "Ghost").await;
    let live = seed_recipient(db, "live@example.org", "Live").await;
    sequential::set_recipients(&h.engine, campaign.id, &[ghost.id, live.id])
        .await
        .unwrap();
    ghost.delete(db).await.unwrap();

    sequential::start(&h.engine, campaign.id).await.unwrap();
    assert_eq!(h.transport.delivered(), 0);
    assert_eq!(
        entry_statuses(db, campaign.id).await,
        vec![(0, EntryStatus::Failed), (1, EntryStatus::Pending)]
    );

    h.clock.set(T0 + Duration::minutes(10));
    sequential::advance(h.engine.clone(), campaign.id).await.unwrap();
    assert_eq!(h.transport.delivered(), 1);
}

#[tokio::test]
async fn test_resume_inflight_rearms_sending_campaigns() {
    let h = harness().await;
    let db = h.engine.db.as_ref();

    let template = seed_template(db, "recover", "s", "b").await;
    let campaign = seed_sequential(db, template.id, 10, T0).await;
    let r = seed_recipient(db, "a@example.org", "A").await;
    sequential::set_recipients(&h.engine, campaign.id, &[r.id])
        .await
        .unwrap();

    // Simulate a crash right after the status flip: sending, nothing armed.
    use sea_orm::sea_query::Expr;
    sequential_campaign::Entity::update_many()
        .col_expr(
            sequential_campaign::Column::Status,
            Expr::value(SequenceStatus::Sending),
        )
        .filter(sequential_campaign::Column::Id.eq(campaign.id))
        .exec(db)
        .await
        .unwrap();

    let resumed = sequential::resume_inflight(&h.engine).await.expect("resume");
    assert_eq!(resumed, 1);
    assert!(h.engine.timers.is_armed(campaign.id).await);

    // The re-armed step delivers the overdue entry.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(h.transport.delivered(), 1);
}
