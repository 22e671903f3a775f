//! Delivery audit log. Exactly one row is opened per delivery attempt, in
//! the pending state, and moved to sent or failed when the attempt resolves.

use sea_orm::entity::prelude::*;
use serde::Serialize;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum LogStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "sent")]
    Sent,
    #[sea_orm(string_value = "failed")]
    Failed,
    /// Set by out-of-band bounce processing, never by the gateway itself.
    #[sea_orm(string_value = "bounced")]
    Bounced,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "email_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Campaign run this delivery belongs to, when fired by the scheduler.
    pub run_id: Option<i32>,
    /// Owning sequential campaign, when sent by the dispatcher.
    pub sequential_campaign_id: Option<i32>,
    pub recipient_email: String,
    pub recipient_name: String,
    pub subject: String,
    pub body: String,
    pub is_html: bool,
    pub status: LogStatus,
    pub error_message: Option<String>,
    pub sent_at: Option<OffsetDateTime>,
    /// Names of the attachments that actually went out with the message.
    pub attachments: Json,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
