//! Outbound email delivery.
//!
//! The gateway owns the full lifecycle of one delivery attempt: resolve the
//! relay configuration, open a pending log row, build the MIME message,
//! hand it to the transport, and settle the log row. Transport failures are
//! absorbed into a [`DeliveryOutcome::Failed`]; only infrastructure errors
//! (database, missing configuration) surface as `Err`.

pub mod attachments;
pub mod log_sink;
pub mod smtp;

use std::sync::Arc;

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Body, Mailbox, MultiPart, SinglePart};
use lettre::{Address, Message};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait,
};
use tracing::warn;
use uuid::Uuid;

use crate::clock::Clock;
use crate::entity::mail_config;
use crate::error::{EngineError, TransportError};
use crate::delivery::attachments::{AttachmentBlob, AttachmentStore};
use crate::delivery::smtp::{MailTransport, RelayParams};

/// One email to be delivered, fully rendered.
#[derive(Debug, Clone, Default)]
pub struct OutboundEmail {
    pub to_email: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub body: String,
    pub is_html: bool,
    pub attachment_ids: Vec<i32>,
    pub run_id: Option<i32>,
    pub sequential_campaign_id: Option<i32>,
}

/// How a delivery attempt ended. Either way a settled log row exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent { log_id: i32 },
    Failed { log_id: i32, reason: String },
}

impl DeliveryOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

pub struct DeliveryGateway {
    db: Arc<DatabaseConnection>,
    transport: Arc<dyn MailTransport>,
    attachments: Arc<dyn AttachmentStore>,
    clock: Arc<dyn Clock>,
    /// Used when no stored configuration is marked default and active.
    fallback: Option<RelayParams>,
}

impl DeliveryGateway {
    pub fn new(
        db: Arc<DatabaseConnection>,
        transport: Arc<dyn MailTransport>,
        attachments: Arc<dyn AttachmentStore>,
        clock: Arc<dyn Clock>,
        fallback: Option<RelayParams>,
    ) -> Self {
        Self {
            db,
            transport,
            attachments,
            clock,
            fallback,
        }
    }

    /// Picks the relay for the next delivery: the active default stored
    /// configuration if one exists, otherwise the static fallback.
    pub async fn resolve_relay(&self) -> Result<RelayParams, EngineError> {
        let stored = mail_config::Entity::find()
            .filter(mail_config::Column::IsDefault.eq(true))
            .filter(mail_config::Column::IsActive.eq(true))
            .one(self.db.as_ref())
            .await?;

        if let Some(cfg) = stored {
            return Ok(RelayParams::from(cfg));
        }
        self.fallback.clone().ok_or(EngineError::NoConfiguration)
    }

    /// Delivers one email. Exactly one log row is written per call: it is
    /// opened pending before the attempt and settled sent or failed after.
    pub async fn send(&self, email: &OutboundEmail) -> Result<DeliveryOutcome, EngineError> {
        let relay = self.resolve_relay().await?;
        let log = log_sink::open_pending(self.db.as_ref(), self.clock.now(), email).await?;

        let mut blobs = Vec::with_capacity(email.attachment_ids.len());
        for id in &email.attachment_ids {
            match self.attachments.resolve(*id).await? {
                Some(blob) => blobs.push(blob),
                None => {
                    warn!(
                        attachment_id = id,
                        recipient = %email.to_email,
                        "Attachment missing, sending without it"
                    );
                }
            }
        }
        let attached: Vec<String> = blobs.iter().map(|b| b.name.clone()).collect();

        let message = match build_message(&relay, email, &blobs) {
            Ok(m) => m,
            Err(e) => {
                let reason = e.to_string();
                log_sink::mark_failed(self.db.as_ref(), log.id, &reason).await?;
                return Ok(DeliveryOutcome::Failed {
                    log_id: log.id,
                    reason,
                });
            }
        };

        match self.transport.deliver(&relay, message).await {
            Ok(()) => {
                log_sink::mark_sent(self.db.as_ref(), log.id, self.clock.now(), &attached)
                    .await?;
                Ok(DeliveryOutcome::Sent { log_id: log.id })
            }
            Err(e) => {
                let reason = e.to_string();
                log_sink::mark_failed(self.db.as_ref(), log.id, &reason).await?;
                Ok(DeliveryOutcome::Failed {
                    log_id: log.id,
                    reason,
                })
            }
        }
    }
}

/// Builds the MIME message for one delivery. Pure except for the generated
/// Message-ID.
pub fn build_message(
    relay: &RelayParams,
    email: &OutboundEmail,
    blobs: &[AttachmentBlob],
) -> Result<Message, TransportError> {
    let from: Mailbox = relay
        .from
        .parse()
        .map_err(|_| TransportError::InvalidAddress(relay.from.clone()))?;
    let to_addr: Address = email
        .to_email
        .parse()
        .map_err(|_| TransportError::InvalidAddress(email.to_email.clone()))?;
    let to = Mailbox::new(email.to_name.clone(), to_addr);

    let domain = relay.from.split('@').nth(1).unwrap_or("localhost");
    let message_id = format!("<{}@{}>", Uuid::new_v4(), domain);

    let builder = Message::builder()
        .from(from)
        .to(to)
        .subject(email.subject.clone())
        .message_id(Some(message_id));

    let body_part = if email.is_html {
        SinglePart::html(email.body.clone())
    } else {
        SinglePart::plain(email.body.clone())
    };

    let result = if blobs.is_empty() {
        builder.singlepart(body_part)
    } else {
        let mut multipart = MultiPart::mixed().singlepart(body_part);
        for blob in blobs {
            let content_type = ContentType::parse(&blob.content_type)
                .unwrap_or(ContentType::parse("application/octet-stream").unwrap());
            multipart = multipart.singlepart(
                Attachment::new(blob.name.clone()).body(Body::new(blob.data.clone()), content_type),
            );
        }
        builder.multipart(multipart)
    };

    result.map_err(|e| TransportError::Build(e.to_string()))
}

/// Marks one stored configuration as the default, clearing the flag on every
/// other row in the same transaction.
pub async fn set_default_configuration(
    db: &DatabaseConnection,
    id: i32,
) -> Result<(), EngineError> {
    let txn = db.begin().await?;

    let exists = mail_config::Entity::find_by_id(id).one(&txn).await?;
    if exists.is_none() {
        return Err(EngineError::ConfigurationNotFound(id));
    }

    mail_config::Entity::update_many()
        .col_expr(mail_config::Column::IsDefault, Expr::value(false))
        .filter(mail_config::Column::Id.ne(id))
        .exec(&txn)
        .await?;
    mail_config::Entity::update_many()
        .col_expr(mail_config::Column::IsDefault, Expr::value(true))
        .filter(mail_config::Column::Id.eq(id))
        .exec(&txn)
        .await?;

    txn.commit().await?;
    Ok(())
}
