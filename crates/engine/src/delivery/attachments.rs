//! Attachment blob resolution.
//!
//! The gateway resolves attachment ids right before building the message; an
//! id that no longer resolves is skipped, it never fails the delivery.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{DatabaseConnection, DbErr, EntityTrait};

use crate::entity::attachment;

/// A fully loaded attachment, ready to be placed on a message.
#[derive(Debug, Clone)]
pub struct AttachmentBlob {
    pub name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Loads the blob for `id`, or `None` if the attachment is gone.
    async fn resolve(&self, id: i32) -> Result<Option<AttachmentBlob>, DbErr>;
}

/// Attachment store backed by the `attachment` table.
pub struct DbAttachmentStore {
    db: Arc<DatabaseConnection>,
}

impl DbAttachmentStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AttachmentStore for DbAttachmentStore {
    async fn resolve(&self, id: i32) -> Result<Option<AttachmentBlob>, DbErr> {
        let row = attachment::Entity::find_by_id(id).one(self.db.as_ref()).await?;
        Ok(row.map(|a| AttachmentBlob {
            name: a.name,
            content_type: a.content_type,
            data: a.data,
        }))
    }
}
