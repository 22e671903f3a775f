//! Sequential campaign dispatch.
//!
//! One entry is attempted per step. Each step settles its entry, then either
//! arms the timer for the next step or completes the campaign, so a started
//! campaign is self-perpetuating until it runs out of pending entries.
//! Pause and cancel act through a status re-check at the top of every step:
//! a timer that fires after the status changed away from sending is a no-op.

use std::sync::Arc;
use std::time::Duration;

use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveEnum, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
};
use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::Engine;
use crate::campaigns::timers::ContinuationTask;
use crate::campaigns::{render_for, template_attachment_ids};
use crate::delivery::OutboundEmail;
use crate::entity::sequential_campaign::{self, SequenceStatus};
use crate::entity::sequential_recipient::{self, EntryStatus};
use crate::entity::{email_template, recipient};
use crate::error::EngineError;

/// Delay before the next entry after a failed one. The failed entry itself
/// is terminal; the backoff only spaces out the next attempt in the list.
pub const FAILURE_BACKOFF: Duration = Duration::from_secs(60);

/// One row of the projected send schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSlot {
    pub recipient_email: String,
    pub recipient_name: String,
    pub send_order: i32,
    pub scheduled_time: OffsetDateTime,
    pub status: EntryStatus,
}

/// Fixes the recipient list of a draft campaign.
///
/// Replaces any previous list. Entry `i` is scheduled at
/// `start_at + i * interval_minutes`; the instants are computed here and
/// never recomputed, so pauses and failures shift real send times but not
/// the recorded schedule.
pub async fn set_recipients(
    engine: &Engine,
    campaign_id: i32,
    recipient_ids: &[i32],
) -> Result<(), EngineError> {
    let campaign = load(engine, campaign_id).await?;
    expect_state(&campaign, &[SequenceStatus::Draft], "draft")?;

    let db = engine.db.as_ref();
    sequential_recipient::Entity::delete_many()
        .filter(sequential_recipient::Column::CampaignId.eq(campaign_id))
        .exec(db)
        .await?;

    let interval = time::Duration::minutes(i64::from(campaign.interval_minutes));
    let entries: Vec<sequential_recipient::ActiveModel> = recipient_ids
        .iter()
        .enumerate()
        .map(|(i, rid)| sequential_recipient::ActiveModel {
            campaign_id: Set(campaign_id),
            recipient_id: Set(*rid),
            send_order: Set(i as i32),
            status: Set(EntryStatus::Pending),
            scheduled_time: Set(campaign.start_at + interval * (i as i32)),
            sent_at: Set(None),
            error_message: Set(None),
            retry_count: Set(0),
            ..Default::default()
        })
        .collect();
    if !entries.is_empty() {
        sequential_recipient::Entity::insert_many(entries).exec(db).await?;
    }

    sequential_campaign::Entity::update_many()
        .col_expr(
            sequential_campaign::Column::TotalRecipients,
            Expr::value(recipient_ids.len() as i32),
        )
        .col_expr(
            sequential_campaign::Column::UpdatedAt,
            Expr::value(engine.clock.now()),
        )
        .filter(sequential_campaign::Column::Id.eq(campaign_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Starts a draft campaign and kicks off the first step. If the first entry
/// is already due the step runs inline, otherwise the timer is armed for it.
pub async fn start(engine: &Arc<Engine>, campaign_id: i32) -> Result<(), EngineError> {
    let campaign = load(engine, campaign_id).await?;
    expect_state(&campaign, &[SequenceStatus::Draft], "draft")?;

    let now = engine.clock.now();
    sequential_campaign::Entity::update_many()
        .col_expr(
            sequential_campaign::Column::Status,
            Expr::value(SequenceStatus::Sending),
        )
        .col_expr(sequential_campaign::Column::StartedAt, Expr::value(Some(now)))
        .col_expr(sequential_campaign::Column::UpdatedAt, Expr::value(now))
        .filter(sequential_campaign::Column::Id.eq(campaign_id))
        .exec(engine.db.as_ref())
        .await?;
    info!(campaign_id, "Sequential campaign started");

    match first_pending(engine, campaign_id).await? {
        Some(entry) if entry.scheduled_time <= now => advance(engine.clone(), campaign_id).await,
        Some(entry) => {
            arm_advance(engine, campaign_id, delay_until(now, entry.scheduled_time)).await;
            Ok(())
        }
        None => complete(engine, campaign_id).await,
    }
}

/// Runs one dispatch step, absorbing errors into the log. This is the form
/// that runs on timer expiry, where there is nobody left to return to.
pub async fn advance(engine: Arc<Engine>, campaign_id: i32) -> Result<(), EngineError> {
    if let Err(e) = try_advance(&engine, campaign_id).await {
        error!(campaign_id, error = %e, "Sequential dispatch step failed");
        return Err(e);
    }
    Ok(())
}

async fn try_advance(engine: &Arc<Engine>, campaign_id: i32) -> Result<(), EngineError> {
    let db = engine.db.as_ref();
    let now = engine.clock.now();

    // Status re-check guard. A stale timer firing after pause or cancel
    // lands here and does nothing.
    let campaign = load(engine, campaign_id).await?;
    if campaign.status != SequenceStatus::Sending {
        return Ok(());
    }

    let Some(entry) = first_pending(engine, campaign_id).await? else {
        return complete(engine, campaign_id).await;
    };

    if now < entry.scheduled_time {
        arm_advance(engine, campaign_id, delay_until(now, entry.scheduled_time)).await;
        return Ok(());
    }

    let template = email_template::Entity::find_by_id(campaign.template_id)
        .one(db)
        .await?
        .ok_or(EngineError::TemplateNotFound(campaign.template_id))?;

    let Some(member) = recipient::Entity::find_by_id(entry.recipient_id).one(db).await? else {
        warn!(
            campaign_id,
            entry_id = entry.id,
            recipient_id = entry.recipient_id,
            "Recipient no longer exists, marking entry failed"
        );
        settle_failed(engine, &entry, "recipient no longer exists").await?;
        return step_after_failure(engine, campaign_id).await;
    };

    let (subject, body) = render_for(&template, &member);
    let email = OutboundEmail {
        to_email: member.email.clone(),
        to_name: Some(member.display_name().to_owned()),
        subject,
        body,
        is_html: template.is_html,
        attachment_ids: template_attachment_ids(db, template.id).await?,
        run_id: None,
        sequential_campaign_id: Some(campaign_id),
    };

    let outcome = engine.gateway.send(&email).await?;
    if outcome.is_sent() {
        sequential_recipient::Entity::update_many()
            .col_expr(
                sequential_recipient::Column::Status,
                Expr::value(EntryStatus::Sent),
            )
            .col_expr(
                sequential_recipient::Column::SentAt,
                Expr::value(Some(engine.clock.now())),
            )
            .filter(sequential_recipient::Column::Id.eq(entry.id))
            .exec(db)
            .await?;
        bump(engine, campaign_id, sequential_campaign::Column::EmailsSent).await?;
        info!(
            campaign_id,
            send_order = entry.send_order,
            recipient = %member.email,
            "Sequential entry sent"
        );

        if first_pending(engine, campaign_id).await?.is_some() {
            let delay = Duration::from_secs(campaign.interval_minutes.max(0) as u64 * 60);
            arm_advance(engine, campaign_id, delay).await;
            Ok(())
        } else {
            complete(engine, campaign_id).await
        }
    } else {
        let reason = match &outcome {
            crate::delivery::DeliveryOutcome::Failed { reason, .. } => reason.clone(),
            _ => unreachable!(),
        };
        warn!(
            campaign_id,
            send_order = entry.send_order,
            recipient = %member.email,
            reason = %reason,
            "Sequential entry failed, moving on after backoff"
        );
        settle_failed(engine, &entry, &reason).await?;
        step_after_failure(engine, campaign_id).await
    }
}

/// After a terminal entry failure: the campaign keeps going, the next entry
/// is attempted after the fixed backoff, unless nothing is left.
async fn step_after_failure(engine: &Arc<Engine>, campaign_id: i32) -> Result<(), EngineError> {
    bump(engine, campaign_id, sequential_campaign::Column::EmailsFailed).await?;
    if first_pending(engine, campaign_id).await?.is_some() {
        arm_advance(engine, campaign_id, FAILURE_BACKOFF).await;
        Ok(())
    } else {
        complete(engine, campaign_id).await
    }
}

/// Pauses a sending campaign. The armed timer is deliberately left alone:
/// when it fires, the status guard turns the step into a no-op.
pub async fn pause(engine: &Engine, campaign_id: i32) -> Result<(), EngineError> {
    let campaign = load(engine, campaign_id).await?;
    expect_state(&campaign, &[SequenceStatus::Sending], "sending")?;
    set_status(engine, campaign_id, SequenceStatus::Paused).await
}

/// Resumes a paused campaign and immediately runs a dispatch step, which
/// either sends the overdue entry or re-arms for the next scheduled one.
pub async fn resume(engine: &Arc<Engine>, campaign_id: i32) -> Result<(), EngineError> {
    let campaign = load(engine, campaign_id).await?;
    expect_state(&campaign, &[SequenceStatus::Paused], "paused")?;
    set_status(engine, campaign_id, SequenceStatus::Sending).await?;
    advance(engine.clone(), campaign_id).await
}

/// Cancels a campaign that has not finished. Remaining pending entries stay
/// pending as a record of what was never attempted.
pub async fn cancel(engine: &Engine, campaign_id: i32) -> Result<(), EngineError> {
    let campaign = load(engine, campaign_id).await?;
    expect_state(
        &campaign,
        &[
            SequenceStatus::Draft,
            SequenceStatus::Sending,
            SequenceStatus::Paused,
        ],
        "not already completed or cancelled",
    )?;
    set_status(engine, campaign_id, SequenceStatus::Cancelled).await?;
    engine.timers.disarm(campaign_id).await;
    Ok(())
}

/// The projected schedule: every entry in send order with its recipient and
/// computed instant.
pub async fn schedule(
    engine: &Engine,
    campaign_id: i32,
) -> Result<Vec<ScheduleSlot>, EngineError> {
    let db = engine.db.as_ref();
    load(engine, campaign_id).await?;

    let entries = sequential_recipient::Entity::find()
        .filter(sequential_recipient::Column::CampaignId.eq(campaign_id))
        .order_by_asc(sequential_recipient::Column::SendOrder)
        .all(db)
        .await?;
    let ids: Vec<i32> = entries.iter().map(|e| e.recipient_id).collect();
    let members: std::collections::HashMap<i32, recipient::Model> = recipient::Entity::find()
        .filter(recipient::Column::Id.is_in(ids))
        .all(db)
        .await?
        .into_iter()
        .map(|r| (r.id, r))
        .collect();

    Ok(entries
        .into_iter()
        .map(|e| {
            let (email, name) = members
                .get(&e.recipient_id)
                .map(|r| (r.email.clone(), r.display_name().to_owned()))
                .unwrap_or_default();
            ScheduleSlot {
                recipient_email: email,
                recipient_name: name,
                send_order: e.send_order,
                scheduled_time: e.scheduled_time,
                status: e.status,
            }
        })
        .collect())
}

/// Re-arms an immediate dispatch step for every campaign left in the sending
/// state, so deliveries interrupted by a restart pick up where they stopped.
pub async fn resume_inflight(engine: &Arc<Engine>) -> Result<usize, EngineError> {
    let inflight = sequential_campaign::Entity::find()
        .filter(sequential_campaign::Column::Status.eq(SequenceStatus::Sending))
        .all(engine.db.as_ref())
        .await?;
    for campaign in &inflight {
        info!(campaign_id = campaign.id, "Resuming in-flight sequential campaign");
        arm_advance(engine, campaign.id, Duration::ZERO).await;
    }
    Ok(inflight.len())
}

async fn complete(engine: &Engine, campaign_id: i32) -> Result<(), EngineError> {
    let now = engine.clock.now();
    sequential_campaign::Entity::update_many()
        .col_expr(
            sequential_campaign::Column::Status,
            Expr::value(SequenceStatus::Completed),
        )
        .col_expr(
            sequential_campaign::Column::CompletedAt,
            Expr::value(Some(now)),
        )
        .col_expr(sequential_campaign::Column::UpdatedAt, Expr::value(now))
        .filter(sequential_campaign::Column::Id.eq(campaign_id))
        .exec(engine.db.as_ref())
        .await?;
    engine.timers.disarm(campaign_id).await;
    info!(campaign_id, "Sequential campaign completed");
    Ok(())
}

async fn settle_failed(
    engine: &Engine,
    entry: &sequential_recipient::Model,
    reason: &str,
) -> Result<(), EngineError> {
    sequential_recipient::Entity::update_many()
        .col_expr(
            sequential_recipient::Column::Status,
            Expr::value(EntryStatus::Failed),
        )
        .col_expr(
            sequential_recipient::Column::ErrorMessage,
            Expr::value(Some(reason.to_owned())),
        )
        .filter(sequential_recipient::Column::Id.eq(entry.id))
        .exec(engine.db.as_ref())
        .await?;
    Ok(())
}

/// Bumps one counter and `current_index` together.
async fn bump(
    engine: &Engine,
    campaign_id: i32,
    counter: sequential_campaign::Column,
) -> Result<(), EngineError> {
    sequential_campaign::Entity::update_many()
        .col_expr(counter, Expr::col(counter).add(1))
        .col_expr(
            sequential_campaign::Column::CurrentIndex,
            Expr::col(sequential_campaign::Column::CurrentIndex).add(1),
        )
        .col_expr(
            sequential_campaign::Column::UpdatedAt,
            Expr::value(engine.clock.now()),
        )
        .filter(sequential_campaign::Column::Id.eq(campaign_id))
        .exec(engine.db.as_ref())
        .await?;
    Ok(())
}

async fn first_pending(
    engine: &Engine,
    campaign_id: i32,
) -> Result<Option<sequential_recipient::Model>, EngineError> {
    Ok(sequential_recipient::Entity::find()
        .filter(sequential_recipient::Column::CampaignId.eq(campaign_id))
        .filter(sequential_recipient::Column::Status.eq(EntryStatus::Pending))
        .order_by_asc(sequential_recipient::Column::SendOrder)
        .one(engine.db.as_ref())
        .await?)
}

async fn load(engine: &Engine, campaign_id: i32) -> Result<sequential_campaign::Model, EngineError> {
    sequential_campaign::Entity::find_by_id(campaign_id)
        .one(engine.db.as_ref())
        .await?
        .ok_or(EngineError::CampaignNotFound(campaign_id))
}

fn expect_state(
    campaign: &sequential_campaign::Model,
    allowed: &[SequenceStatus],
    expected: &'static str,
) -> Result<(), EngineError> {
    if allowed.contains(&campaign.status) {
        Ok(())
    } else {
        Err(EngineError::CampaignNotInExpectedState {
            id: campaign.id,
            expected,
            actual: campaign.status.to_value(),
        })
    }
}

async fn set_status(
    engine: &Engine,
    campaign_id: i32,
    status: SequenceStatus,
) -> Result<(), EngineError> {
    sequential_campaign::Entity::update_many()
        .col_expr(sequential_campaign::Column::Status, Expr::value(status))
        .col_expr(
            sequential_campaign::Column::UpdatedAt,
            Expr::value(engine.clock.now()),
        )
        .filter(sequential_campaign::Column::Id.eq(campaign_id))
        .exec(engine.db.as_ref())
        .await?;
    Ok(())
}

/// Wraps a dispatch step as a boxed task, breaking the recursive future type
/// between a step and the timer it arms.
fn advance_task(engine: Arc<Engine>, campaign_id: i32) -> ContinuationTask {
    Box::pin(async move {
        let _ = advance(engine, campaign_id).await;
    })
}

async fn arm_advance(engine: &Arc<Engine>, campaign_id: i32, delay: Duration) {
    let handle = engine.clone();
    engine
        .timers
        .arm(campaign_id, delay, move || advance_task(handle, campaign_id))
        .await;
}

/// Wall-clock gap from `now` to `target`, zero when `target` has passed.
fn delay_until(now: OffsetDateTime, target: OffsetDateTime) -> Duration {
    let gap = target - now;
    if gap.is_negative() {
        Duration::ZERO
    } else {
        Duration::try_from(gap).unwrap_or(Duration::ZERO)
    }
}
