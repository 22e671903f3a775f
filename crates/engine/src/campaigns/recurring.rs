//! Recurring campaign scheduling and batch firing.
//!
//! A campaign in scheduled or active state always carries a `next_send_at`
//! instant. The driver scans for campaigns whose instant has passed and fires
//! each one: a batch send to every active member of the campaign's recipient
//! set, recorded as one campaign run.

use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter,
    QueryOrder,
};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};

use crate::Engine;
use crate::campaigns::{render_for, template_attachment_ids};
use crate::delivery::OutboundEmail;
use crate::entity::campaign_run::{self, RunStatus};
use crate::entity::recurring_campaign::{self, CampaignStatus};
use crate::entity::{campaign_recipient, email_template, recipient};
use crate::error::EngineError;

/// Outcome of one batch fire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FireReport {
    pub run_id: i32,
    pub sent: i32,
    pub failed: i32,
    pub next_status: CampaignStatus,
    pub next_send_at: Option<OffsetDateTime>,
}

/// Campaigns whose due instant has passed, oldest first.
pub async fn list_due(engine: &Engine) -> Result<Vec<recurring_campaign::Model>, EngineError> {
    let now = engine.clock.now();
    Ok(recurring_campaign::Entity::find()
        .filter(
            recurring_campaign::Column::Status
                .is_in([CampaignStatus::Scheduled, CampaignStatus::Active]),
        )
        .filter(recurring_campaign::Column::NextSendAt.lte(now))
        .order_by_asc(recurring_campaign::Column::NextSendAt)
        .all(engine.db.as_ref())
        .await?)
}

/// Fires one batch for `campaign_id`.
///
/// The campaign row is moved to its post-fire state before any email goes
/// out, with a conditional update keyed on the due instant. A concurrent
/// firer loses that update and gets [`EngineError::FireConflict`], so each
/// due instant is sent at most once.
pub async fn fire(engine: &Engine, campaign_id: i32) -> Result<FireReport, EngineError> {
    let now = engine.clock.now();
    let db = engine.db.as_ref();

    let campaign = recurring_campaign::Entity::find_by_id(campaign_id)
        .one(db)
        .await?
        .ok_or(EngineError::CampaignNotFound(campaign_id))?;

    let due = match (&campaign.status, campaign.next_send_at) {
        (CampaignStatus::Scheduled | CampaignStatus::Active, Some(due)) => due,
        _ => {
            return Err(EngineError::CampaignNotInExpectedState {
                id: campaign_id,
                expected: "scheduled or active",
                actual: campaign.status.to_value(),
            });
        }
    };

    let template = email_template::Entity::find_by_id(campaign.template_id)
        .one(db)
        .await?
        .ok_or(EngineError::TemplateNotFound(campaign.template_id))?;

    let member_ids: Vec<i32> = campaign_recipient::Entity::find()
        .filter(campaign_recipient::Column::CampaignId.eq(campaign_id))
        .all(db)
        .await?
        .into_iter()
        .map(|m| m.recipient_id)
        .collect();
    let recipients = recipient::Entity::find()
        .filter(recipient::Column::Id.is_in(member_ids))
        .filter(recipient::Column::IsActive.eq(true))
        .all(db)
        .await?;
    if recipients.is_empty() {
        return Err(EngineError::NoEligibleRecipients(campaign_id));
    }

    let (next_status, next_send_at) = next_state(&campaign, due, now);

    // Claim this due instant. Whoever loses the conditional update backs off.
    let claimed = recurring_campaign::Entity::update_many()
        .col_expr(
            recurring_campaign::Column::Status,
            Expr::value(next_status.clone()),
        )
        .col_expr(
            recurring_campaign::Column::NextSendAt,
            Expr::value(next_send_at),
        )
        .col_expr(recurring_campaign::Column::LastSentAt, Expr::value(Some(now)))
        .col_expr(recurring_campaign::Column::UpdatedAt, Expr::value(now))
        .filter(recurring_campaign::Column::Id.eq(campaign_id))
        .filter(recurring_campaign::Column::NextSendAt.eq(due))
        .exec(db)
        .await?;
    if claimed.rows_affected == 0 {
        return Err(EngineError::FireConflict(campaign_id));
    }

    let stamp = now.format(&Rfc3339).unwrap_or_else(|_| now.to_string());
    let run = campaign_run::ActiveModel {
        recurring_campaign_id: Set(campaign_id),
        name: Set(format!("{} - {}", campaign.name, stamp)),
        status: Set(RunStatus::Sending),
        sent_count: Set(0),
        failed_count: Set(0),
        started_at: Set(now),
        completed_at: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await?;

    let attachment_ids = template_attachment_ids(db, template.id).await?;

    let mut sent = 0;
    let mut failed = 0;
    for r in &recipients {
        let (subject, body) = render_for(&template, r);
        let email = OutboundEmail {
            to_email: r.email.clone(),
            to_name: Some(r.display_name().to_owned()),
            subject,
            body,
            is_html: template.is_html,
            attachment_ids: attachment_ids.clone(),
            run_id: Some(run.id),
            sequential_campaign_id: None,
        };
        match engine.gateway.send(&email).await? {
            outcome if outcome.is_sent() => sent += 1,
            outcome => {
                warn!(
                    campaign_id,
                    run_id = run.id,
                    recipient = %r.email,
                    outcome = ?outcome,
                    "Batch delivery failed for one recipient"
                );
                failed += 1;
            }
        }
    }

    campaign_run::Entity::update_many()
        .col_expr(
            campaign_run::Column::Status,
            Expr::value(RunStatus::Completed),
        )
        .col_expr(campaign_run::Column::SentCount, Expr::value(sent))
        .col_expr(campaign_run::Column::FailedCount, Expr::value(failed))
        .col_expr(
            campaign_run::Column::CompletedAt,
            Expr::value(Some(engine.clock.now())),
        )
        .filter(campaign_run::Column::Id.eq(run.id))
        .exec(db)
        .await?;

    recurring_campaign::Entity::update_many()
        .col_expr(
            recurring_campaign::Column::TotalSent,
            Expr::col(recurring_campaign::Column::TotalSent).add(sent),
        )
        .col_expr(
            recurring_campaign::Column::TotalFailed,
            Expr::col(recurring_campaign::Column::TotalFailed).add(failed),
        )
        .filter(recurring_campaign::Column::Id.eq(campaign_id))
        .exec(db)
        .await?;

    info!(
        campaign_id,
        run_id = run.id,
        sent,
        failed,
        next_send_at = ?next_send_at,
        "Campaign batch fired"
    );

    Ok(FireReport {
        run_id: run.id,
        sent,
        failed,
        next_status,
        next_send_at,
    })
}

/// Post-fire state of a campaign that was due at `due`.
///
/// One-shot campaigns complete. Repeating campaigns keep the phase of the
/// original schedule: the next instant is `due` plus whole interval steps,
/// the first one strictly in the future. A next instant past `end_at`
/// completes the campaign instead.
fn next_state(
    campaign: &recurring_campaign::Model,
    due: OffsetDateTime,
    now: OffsetDateTime,
) -> (CampaignStatus, Option<OffsetDateTime>) {
    let Some(step) = campaign.interval.step() else {
        return (CampaignStatus::Completed, None);
    };
    let mut next = due + step;
    while next <= now {
        next += step;
    }
    match campaign.end_at {
        Some(end) if next > end => (CampaignStatus::Completed, None),
        _ => (CampaignStatus::Active, Some(next)),
    }
}

/// Moves a draft campaign onto the schedule. Its first due instant is the
/// configured `scheduled_at`.
pub async fn schedule(engine: &Engine, campaign_id: i32) -> Result<(), EngineError> {
    let campaign = load(engine, campaign_id).await?;
    expect_state(&campaign, &[CampaignStatus::Draft], "draft")?;
    set_state(engine, campaign_id, CampaignStatus::Scheduled, Some(Some(campaign.scheduled_at)))
        .await
}

/// Pauses an active campaign. `next_send_at` is kept so resuming restores
/// the schedule unchanged; the due scan ignores paused campaigns.
pub async fn pause(engine: &Engine, campaign_id: i32) -> Result<(), EngineError> {
    let campaign = load(engine, campaign_id).await?;
    expect_state(
        &campaign,
        &[CampaignStatus::Scheduled, CampaignStatus::Active],
        "scheduled or active",
    )?;
    set_state(engine, campaign_id, CampaignStatus::Paused, None).await
}

pub async fn resume(engine: &Engine, campaign_id: i32) -> Result<(), EngineError> {
    let campaign = load(engine, campaign_id).await?;
    expect_state(&campaign, &[CampaignStatus::Paused], "paused")?;
    set_state(engine, campaign_id, CampaignStatus::Active, None).await
}

/// Cancels a campaign in any non-terminal state and clears its due instant.
pub async fn cancel(engine: &Engine, campaign_id: i32) -> Result<(), EngineError> {
    let campaign = load(engine, campaign_id).await?;
    expect_state(
        &campaign,
        &[
            CampaignStatus::Draft,
            CampaignStatus::Scheduled,
            CampaignStatus::Active,
            CampaignStatus::Paused,
        ],
        "not already completed or cancelled",
    )?;
    set_state(engine, campaign_id, CampaignStatus::Cancelled, Some(None)).await
}

async fn load(engine: &Engine, campaign_id: i32) -> Result<recurring_campaign::Model, EngineError> {
    recurring_campaign::Entity::find_by_id(campaign_id)
        .one(engine.db.as_ref())
        .await?
        .ok_or(EngineError::CampaignNotFound(campaign_id))
}

fn expect_state(
    campaign: &recurring_campaign::Model,
    allowed: &[CampaignStatus],
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

/// Writes the new status, and the new due instant when one is given.
/// `next_send_at: None` leaves the stored instant untouched.
async fn set_state(
    engine: &Engine,
    campaign_id: i32,
    status: CampaignStatus,
    next_send_at: Option<Option<OffsetDateTime>>,
) -> Result<(), EngineError> {
    let mut update = recurring_campaign::Entity::update_many()
        .col_expr(recurring_campaign::Column::Status, Expr::value(status))
        .col_expr(
            recurring_campaign::Column::UpdatedAt,
            Expr::value(engine.clock.now()),
        )
        .filter(recurring_campaign::Column::Id.eq(campaign_id));
    if let Some(instant) = next_send_at {
        update = update.col_expr(recurring_campaign::Column::NextSendAt, Expr::value(instant));
    }
    update.exec(engine.db.as_ref()).await?;
    Ok(())
}
