//! Per-recipient ledger of a sequential campaign.
//!
//! Entries are created in bulk when the recipient list is fixed and never
//! reordered. `scheduled_time` of entry i is start + i * interval, computed
//! once at that point. A failed entry is terminal: it is never retried, the
//! dispatcher moves on to the next pending entry.

use sea_orm::entity::prelude::*;
use serde::Serialize;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum EntryStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "sent")]
    Sent,
    #[sea_orm(string_value = "failed")]
    Failed,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "sequential_recipient")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub campaign_id: i32,
    pub recipient_id: i32,
    /// 0-based position in the send order.
    pub send_order: i32,
    pub status: EntryStatus,
    pub scheduled_time: OffsetDateTime,
    pub sent_at: Option<OffsetDateTime>,
    pub error_message: Option<String>,
    /// Reserved for operator-driven tooling; the dispatcher never retries an
    /// entry and never advances this counter.
    pub retry_count: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
