use sea_orm_migration::{prelude::*, schema::*};

use crate::m20260612_000002_create_campaign_tables::{RecurringCampaign, SequentialCampaign};

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Delivery side: the per-attempt email log, campaign run records, and
/// stored SMTP relay configurations.
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CampaignRun::Table)
                    .if_not_exists()
                    .col(pk_auto(CampaignRun::Id))
                    .col(integer(CampaignRun::RecurringCampaignId))
                    .col(string(CampaignRun::Name))
                    .col(string(CampaignRun::Status).default("sending"))
                    .col(integer(CampaignRun::SentCount).default(0))
                    .col(integer(CampaignRun::FailedCount).default(0))
                    .col(
                        timestamp_with_time_zone(CampaignRun::StartedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone_null(CampaignRun::CompletedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_campaign_run_campaign")
                            .from(CampaignRun::Table, CampaignRun::RecurringCampaignId)
                            .to(RecurringCampaign::Table, RecurringCampaign::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EmailLog::Table)
                    .if_not_exists()
                    .col(pk_auto(EmailLog::Id))
                    .col(integer_null(EmailLog::RunId))
                    .col(integer_null(EmailLog::SequentialCampaignId))
                    .col(string(EmailLog::RecipientEmail))
                    .col(string(EmailLog::RecipientName).default(""))
                    .col(string(EmailLog::Subject))
                    .col(text(EmailLog::Body))
                    .col(boolean(EmailLog::IsHtml).default(false))
                    .col(string(EmailLog::Status).default("pending"))
                    .col(text_null(EmailLog::ErrorMessage))
                    .col(timestamp_with_time_zone_null(EmailLog::SentAt))
                    .col(json(EmailLog::Attachments))
                    .col(
                        timestamp_with_time_zone(EmailLog::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_email_log_run")
                            .from(EmailLog::Table, EmailLog::RunId)
                            .to(CampaignRun::Table, CampaignRun::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_email_log_sequential_campaign")
                            .from(EmailLog::Table, EmailLog::SequentialCampaignId)
                            .to(SequentialCampaign::Table, SequentialCampaign::Id),
                    )
                    .index(
                        Index::create()
                            .name("idx_email_log_created_at")
                            .col(EmailLog::CreatedAt),
                    )
                    .index(
                        Index::create()
                            .name("idx_email_log_recipient_email")
                            .col(EmailLog::RecipientEmail),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MailConfig::Table)
                    .if_not_exists()
                    .col(pk_auto(MailConfig::Id))
                    .col(string_uniq(MailConfig::Name))
                    .col(string(MailConfig::Host))
                    .col(integer(MailConfig::Port).default(587))
                    .col(string(MailConfig::Username))
                    .col(string(MailConfig::Password))
                    .col(boolean(MailConfig::UseTls).default(true))
                    .col(boolean(MailConfig::UseSsl).default(false))
                    .col(boolean(MailConfig::IsActive).default(true))
                    .col(boolean(MailConfig::IsDefault).default(false))
                    .col(
                        timestamp_with_time_zone(MailConfig::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(MailConfig::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MailConfig::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EmailLog::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CampaignRun::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum CampaignRun {
    Table,
    Id,
    RecurringCampaignId,
    Name,
    Status,
    SentCount,
    FailedCount,
    StartedAt,
    CompletedAt,
}

#[derive(Iden)]
pub enum EmailLog {
    Table,
    Id,
    RunId,
    SequentialCampaignId,
    RecipientEmail,
    RecipientName,
    Subject,
    Body,
    IsHtml,
    Status,
    ErrorMessage,
    SentAt,
    Attachments,
    CreatedAt,
}

#[derive(Iden)]
pub enum MailConfig {
    Table,
    Id,
    Name,
    Host,
    Port,
    Username,
    Password,
    UseTls,
    UseSsl,
    IsActive,
    IsDefault,
    CreatedAt,
    UpdatedAt,
}
