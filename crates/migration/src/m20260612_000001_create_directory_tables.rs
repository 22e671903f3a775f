use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Recipients, templates and attachments: the address book side of the
/// engine that campaigns draw from.
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Recipient::Table)
                    .if_not_exists()
                    .col(pk_auto(Recipient::Id))
                    .col(string_uniq(Recipient::Email))
                    .col(string(Recipient::Name))
                    .col(string(Recipient::FirstName).default(""))
                    .col(string(Recipient::LastName).default(""))
                    .col(string(Recipient::Company).default(""))
                    .col(json(Recipient::ExtraVariables))
                    .col(boolean(Recipient::IsActive).default(true))
                    .col(
                        timestamp_with_time_zone(Recipient::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Recipient::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EmailTemplate::Table)
                    .if_not_exists()
                    .col(pk_auto(EmailTemplate::Id))
                    .col(string_uniq(EmailTemplate::Name))
                    .col(string(EmailTemplate::Subject))
                    .col(text(EmailTemplate::Body))
                    .col(boolean(EmailTemplate::IsHtml).default(false))
                    .col(
                        timestamp_with_time_zone(EmailTemplate::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(EmailTemplate::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Attachment::Table)
                    .if_not_exists()
                    .col(pk_auto(Attachment::Id))
                    .col(string(Attachment::Name))
                    .col(string(Attachment::ContentType))
                    .col(blob(Attachment::Data))
                    .col(big_integer(Attachment::FileSize).default(0))
                    .col(
                        timestamp_with_time_zone(Attachment::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TemplateAttachment::Table)
                    .if_not_exists()
                    .col(pk_auto(TemplateAttachment::Id))
                    .col(integer(TemplateAttachment::TemplateId))
                    .col(integer(TemplateAttachment::AttachmentId))
                    .col(integer(TemplateAttachment::Position).default(0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_template_attachment_template")
                            .from(TemplateAttachment::Table, TemplateAttachment::TemplateId)
                            .to(EmailTemplate::Table, EmailTemplate::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_template_attachment_attachment")
                            .from(TemplateAttachment::Table, TemplateAttachment::AttachmentId)
                            .to(Attachment::Table, Attachment::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .index(
                        Index::create()
                            .name("idx_template_attachment_unique")
                            .col(TemplateAttachment::TemplateId)
                            .col(TemplateAttachment::AttachmentId)
                            .unique(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TemplateAttachment::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Attachment::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EmailTemplate::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Recipient::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Recipient {
    Table,
    Id,
    Email,
    Name,
    FirstName,
    LastName,
    Company,
    ExtraVariables,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum EmailTemplate {
    Table,
    Id,
    Name,
    Subject,
    Body,
    IsHtml,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum Attachment {
    Table,
    Id,
    Name,
    ContentType,
    Data,
    FileSize,
    CreatedAt,
}

#[derive(Iden)]
pub enum TemplateAttachment {
    Table,
    Id,
    TemplateId,
    AttachmentId,
    Position,
}
