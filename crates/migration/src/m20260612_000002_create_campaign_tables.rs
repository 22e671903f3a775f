use sea_orm_migration::{prelude::*, schema::*};

use crate::m20260612_000001_create_directory_tables::{EmailTemplate, Recipient};

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Campaign tables for both shapes: recurring batch campaigns with their
/// recipient set, and sequential campaigns with their ordered entry ledger.
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RecurringCampaign::Table)
                    .if_not_exists()
                    .col(pk_auto(RecurringCampaign::Id))
                    .col(string(RecurringCampaign::Name))
                    .col(integer(RecurringCampaign::TemplateId))
                    .col(string(RecurringCampaign::Interval))
                    .col(timestamp_with_time_zone(RecurringCampaign::ScheduledAt))
                    .col(timestamp_with_time_zone_null(RecurringCampaign::EndAt))
                    .col(string(RecurringCampaign::Status).default("draft"))
                    .col(timestamp_with_time_zone_null(RecurringCampaign::NextSendAt))
                    .col(timestamp_with_time_zone_null(RecurringCampaign::LastSentAt))
                    .col(integer(RecurringCampaign::TotalSent).default(0))
                    .col(integer(RecurringCampaign::TotalFailed).default(0))
                    .col(
                        timestamp_with_time_zone(RecurringCampaign::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(RecurringCampaign::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_recurring_campaign_template")
                            .from(RecurringCampaign::Table, RecurringCampaign::TemplateId)
                            .to(EmailTemplate::Table, EmailTemplate::Id),
                    )
                    .index(
                        Index::create()
                            .name("idx_recurring_campaign_next_send_at")
                            .col(RecurringCampaign::NextSendAt),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CampaignRecipient::Table)
                    .if_not_exists()
                    .col(pk_auto(CampaignRecipient::Id))
                    .col(integer(CampaignRecipient::CampaignId))
                    .col(integer(CampaignRecipient::RecipientId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_campaign_recipient_campaign")
                            .from(CampaignRecipient::Table, CampaignRecipient::CampaignId)
                            .to(RecurringCampaign::Table, RecurringCampaign::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_campaign_recipient_recipient")
                            .from(CampaignRecipient::Table, CampaignRecipient::RecipientId)
                            .to(Recipient::Table, Recipient::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .index(
                        Index::create()
                            .name("idx_campaign_recipient_unique")
                            .col(CampaignRecipient::CampaignId)
                            .col(CampaignRecipient::RecipientId)
                            .unique(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SequentialCampaign::Table)
                    .if_not_exists()
                    .col(pk_auto(SequentialCampaign::Id))
                    .col(string(SequentialCampaign::Name))
                    .col(integer(SequentialCampaign::TemplateId))
                    .col(integer(SequentialCampaign::IntervalMinutes))
                    .col(timestamp_with_time_zone(SequentialCampaign::StartAt))
                    .col(string(SequentialCampaign::Status).default("draft"))
                    .col(integer(SequentialCampaign::TotalRecipients).default(0))
                    .col(integer(SequentialCampaign::EmailsSent).default(0))
                    .col(integer(SequentialCampaign::EmailsFailed).default(0))
                    .col(integer(SequentialCampaign::CurrentIndex).default(0))
                    .col(timestamp_with_time_zone_null(SequentialCampaign::StartedAt))
                    .col(timestamp_with_time_zone_null(SequentialCampaign::CompletedAt))
                    .col(
                        timestamp_with_time_zone(SequentialCampaign::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(SequentialCampaign::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sequential_campaign_template")
                            .from(SequentialCampaign::Table, SequentialCampaign::TemplateId)
                            .to(EmailTemplate::Table, EmailTemplate::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SequentialRecipient::Table)
                    .if_not_exists()
                    .col(pk_auto(SequentialRecipient::Id))
                    .col(integer(SequentialRecipient::CampaignId))
                    .col(integer(SequentialRecipient::RecipientId))
                    .col(integer(SequentialRecipient::SendOrder))
                    .col(string(SequentialRecipient::Status).default("pending"))
                    .col(timestamp_with_time_zone(SequentialRecipient::ScheduledTime))
                    .col(timestamp_with_time_zone_null(SequentialRecipient::SentAt))
                    .col(text_null(SequentialRecipient::ErrorMessage))
                    .col(integer(SequentialRecipient::RetryCount).default(0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sequential_recipient_campaign")
                            .from(SequentialRecipient::Table, SequentialRecipient::CampaignId)
                            .to(SequentialCampaign::Table, SequentialCampaign::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sequential_recipient_recipient")
                            .from(SequentialRecipient::Table, SequentialRecipient::RecipientId)
                            .to(Recipient::Table, Recipient::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .index(
                        Index::create()
                            .name("idx_sequential_recipient_order_unique")
                            .col(SequentialRecipient::CampaignId)
                            .col(SequentialRecipient::SendOrder)
                            .unique(),
                    )
                    .index(
                        Index::create()
                            .name("idx_sequential_recipient_status")
                            .col(SequentialRecipient::CampaignId)
                            .col(SequentialRecipient::Status),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SequentialRecipient::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SequentialCampaign::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CampaignRecipient::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RecurringCampaign::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum RecurringCampaign {
    Table,
    Id,
    Name,
    TemplateId,
    Interval,
    ScheduledAt,
    EndAt,
    Status,
    NextSendAt,
    LastSentAt,
    TotalSent,
    TotalFailed,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum CampaignRecipient {
    Table,
    Id,
    CampaignId,
    RecipientId,
}

#[derive(Iden)]
pub enum SequentialCampaign {
    Table,
    Id,
    Name,
    TemplateId,
    IntervalMinutes,
    StartAt,
    Status,
    TotalRecipients,
    EmailsSent,
    EmailsFailed,
    CurrentIndex,
    StartedAt,
    CompletedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum SequentialRecipient {
    Table,
    Id,
    CampaignId,
    RecipientId,
    SendOrder,
    Status,
    ScheduledTime,
    SentAt,
    ErrorMessage,
    RetryCount,
}
