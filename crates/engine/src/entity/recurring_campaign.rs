//! Recurring campaigns: one batch send to the whole recipient set at fixed
//! calendar intervals.
//!
//! Invariant: `next_send_at` is null iff status is draft, completed or
//! cancelled; while scheduled/active (and across pause) it always holds the
//! next batch-fire instant.

use sea_orm::entity::prelude::*;
use serde::Serialize;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum CampaignStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "scheduled")]
    Scheduled,
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "paused")]
    Paused,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum SendInterval {
    #[sea_orm(string_value = "once")]
    Once,
    #[sea_orm(string_value = "hourly")]
    Hourly,
    #[sea_orm(string_value = "daily")]
    Daily,
    #[sea_orm(string_value = "weekly")]
    Weekly,
    #[sea_orm(string_value = "monthly")]
    Monthly,
}

impl SendInterval {
    /// Time between batch fires. `None` for one-shot campaigns. Monthly is a
    /// fixed 30-day step, not calendar-month aware.
    pub fn step(&self) -> Option<time::Duration> {
        match self {
            Self::Once => None,
            Self::Hourly => Some(time::Duration::hours(1)),
            Self::Daily => Some(time::Duration::days(1)),
            Self::Weekly => Some(time::Duration::weeks(1)),
            Self::Monthly => Some(time::Duration::days(30)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "recurring_campaign")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub template_id: i32,
    pub interval: SendInterval,
    pub scheduled_at: OffsetDateTime,
    pub end_at: Option<OffsetDateTime>,
    pub status: CampaignStatus,
    pub next_send_at: Option<OffsetDateTime>,
    pub last_sent_at: Option<OffsetDateTime>,
    pub total_sent: i32,
    pub total_failed: i32,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
