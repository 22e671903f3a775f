//! Email log lifecycle: open a pending row per attempt, then settle it.

use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter,
};
use time::OffsetDateTime;

use crate::delivery::OutboundEmail;
use crate::entity::email_log::{self, LogStatus};

/// Inserts the pending log row for a delivery attempt and returns it.
pub async fn open_pending(
    db: &DatabaseConnection,
    now: OffsetDateTime,
    email: &OutboundEmail,
) -> Result<email_log::Model, DbErr> {
    email_log::ActiveModel {
        run_id: Set(email.run_id),
        sequential_campaign_id: Set(email.sequential_campaign_id),
        recipient_email: Set(email.to_email.clone()),
        recipient_name: Set(email.to_name.clone().unwrap_or_default()),
        subject: Set(email.subject.clone()),
        body: Set(email.body.clone()),
        is_html: Set(email.is_html),
        status: Set(LogStatus::Pending),
        error_message: Set(None),
        sent_at: Set(None),
        attachments: Set(serde_json::json!([])),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
}

/// Settles a pending row as sent, recording the attachment names that went
/// out with the message.
pub async fn mark_sent(
    db: &DatabaseConnection,
    log_id: i32,
    now: OffsetDateTime,
    attached: &[String],
) -> Result<(), DbErr> {
    email_log::Entity::update_many()
        .col_expr(email_log::Column::Status, Expr::value(LogStatus::Sent))
        .col_expr(email_log::Column::SentAt, Expr::value(Some(now)))
        .col_expr(
            email_log::Column::Attachments,
            Expr::value(serde_json::json!(attached)),
        )
        .filter(email_log::Column::Id.eq(log_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Settles a pending row as failed with the failure reason.
pub async fn mark_failed(
    db: &DatabaseConnection,
    log_id: i32,
    reason: &str,
) -> Result<(), DbErr> {
    email_log::Entity::update_many()
        .col_expr(email_log::Column::Status, Expr::value(LogStatus::Failed))
        .col_expr(
            email_log::Column::ErrorMessage,
            Expr::value(Some(reason.to_owned())),
        )
        .filter(email_log::Column::Id.eq(log_id))
        .exec(db)
        .await?;
    Ok(())
}
