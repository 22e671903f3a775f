//! Shared fixtures: in-memory database, mock transport and a pinned clock.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lettre::Message;
use mailroom::Engine;
use mailroom::clock::{Clock, ManualClock};
use mailroom::config::{AppConfig, DriverConfig};
use mailroom::delivery::DeliveryGateway;
use mailroom::delivery::attachments::DbAttachmentStore;
use mailroom::delivery::smtp::{MailTransport, RelayParams};
use mailroom::entity::recurring_campaign::{CampaignStatus, SendInterval};
use mailroom::entity::sequential_campaign::SequenceStatus;
use mailroom::entity::sequential_recipient::EntryStatus;
use mailroom::entity::{
    attachment, email_template, recipient, recurring_campaign, sequential_campaign,
    sequential_recipient, template_attachment,
};
use mailroom::error::TransportError;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ConnectionTrait, Database, DatabaseConnection, DbBackend,
    Statement,
};
use time::OffsetDateTime;
use time::macros::datetime;

/// Fixed "now" that all tests start from.
pub const T0: OffsetDateTime = datetime!(2026-06-12 09:00:00 UTC);

/// Transport that keeps every delivered message in memory. Deliveries to an
/// address containing `fail_marker` are rejected.
pub struct MockTransport {
    pub outbox: Mutex<Vec<Message>>,
    pub fail_marker: Option<String>,
}

impl MockTransport {
    pub fn new(fail_marker: Option<&str>) -> Self {
        Self {
            outbox: Mutex::new(Vec::new()),
            fail_marker: fail_marker.map(str::to_owned),
        }
    }

    pub fn delivered(&self) -> usize {
        self.outbox.lock().expect("outbox poisoned").len()
    }
}

#[async_trait]
impl MailTransport for MockTransport {
    async fn deliver(&self, _relay: &RelayParams, message: Message) -> Result<(), TransportError> {
        if let Some(marker) = &self.fail_marker {
            let rejected = message
                .envelope()
                .to()
                .iter()
                .any(|addr| addr.to_string().contains(marker));
            if rejected {
                return Err(TransportError::Send("mock relay rejected message".into()));
            }
        }
        self.outbox
            .lock()
            .expect("outbox poisoned")
            .push(message);
        Ok(())
    }
}

pub async fn setup_db() -> Arc<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await.expect("connect");
    let tables = [
        r#"CREATE TABLE recipient (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            company TEXT NOT NULL,
            extra_variables TEXT NOT NULL,
            is_active BOOLEAN NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );"#,
        r#"CREATE TABLE email_template (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            subject TEXT NOT NULL,
            body TEXT NOT NULL,
            is_html BOOLEAN NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );"#,
        r#"CREATE TABLE attachment (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            content_type TEXT NOT NULL,
            data BLOB NOT NULL,
            file_size INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );"#,
        r#"CREATE TABLE template_attachment (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            template_id INTEGER NOT NULL,
            attachment_id INTEGER NOT NULL,
            position INTEGER NOT NULL
        );"#,
        r#"CREATE TABLE recurring_campaign (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            template_id INTEGER NOT NULL,
            interval TEXT NOT NULL,
            scheduled_at TEXT NOT NULL,
            end_at TEXT NULL,
            status TEXT NOT NULL,
            next_send_at TEXT NULL,
            last_sent_at TEXT NULL,
            total_sent INTEGER NOT NULL,
            total_failed INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );"#,
        r#"CREATE TABLE campaign_recipient (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            campaign_id INTEGER NOT NULL,
            recipient_id INTEGER NOT NULL
        );"#,
        r#"CREATE TABLE sequential_campaign (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            template_id INTEGER NOT NULL,
            interval_minutes INTEGER NOT NULL,
            start_at TEXT NOT NULL,
            status TEXT NOT NULL,
            total_recipients INTEGER NOT NULL,
            emails_sent INTEGER NOT NULL,
            emails_failed INTEGER NOT NULL,
            current_index INTEGER NOT NULL,
            started_at TEXT NULL,
            completed_at TEXT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );"#,
        r#"CREATE TABLE sequential_recipient (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            campaign_id INTEGER NOT NULL,
            recipient_id INTEGER NOT NULL,
            send_order INTEGER NOT NULL,
            status TEXT NOT NULL,
            scheduled_time TEXT NOT NULL,
            sent_at TEXT NULL,
            error_message TEXT NULL,
            retry_count INTEGER NOT NULL
        );"#,
        r#"CREATE TABLE email_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id INTEGER NULL,
            sequential_campaign_id INTEGER NULL,
            recipient_email TEXT NOT NULL,
            recipient_name TEXT NOT NULL,
            subject TEXT NOT NULL,
            body TEXT NOT NULL,
            is_html BOOLEAN NOT NULL,
            status TEXT NOT NULL,
            error_message TEXT NULL,
            sent_at TEXT NULL,
            attachments TEXT NOT NULL,
            created_at TEXT NOT NULL
        );"#,
        r#"CREATE TABLE campaign_run (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recurring_campaign_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            status TEXT NOT NULL,
            sent_count INTEGER NOT NULL,
            failed_count INTEGER NOT NULL,
            started_at TEXT NOT NULL,
            completed_at TEXT NULL
        );"#,
        r#"CREATE TABLE mail_config (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            host TEXT NOT NULL,
            port INTEGER NOT NULL,
            username TEXT NOT NULL,
            password TEXT NOT NULL,
            use_tls BOOLEAN NOT NULL,
            use_ssl BOOLEAN NOT NULL,
            is_active BOOLEAN NOT NULL,
            is_default BOOLEAN NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );"#,
    ];
    for sql in tables {
        db.execute(Statement::from_string(DbBackend::Sqlite, sql))
            .await
            .expect("create table");
    }
    Arc::new(db)
}

pub struct Harness {
    pub engine: Arc<Engine>,
    pub clock: Arc<ManualClock>,
    pub transport: Arc<MockTransport>,
}

pub async fn harness() -> Harness {
    harness_with(None).await
}

pub async fn harness_with(fail_marker: Option<&str>) -> Harness {
    let db = setup_db().await;
    let clock = Arc::new(ManualClock::new(T0));
    let transport = Arc::new(MockTransport::new(fail_marker));

    let fallback = RelayParams {
        host: "localhost".into(),
        port: 2525,
        username: "mailer@example.org".into(),
        password: "secret".into(),
        use_tls: false,
        use_ssl: false,
        from: "mailer@example.org".into(),
    };
    let gateway = Arc::new(DeliveryGateway::new(
        db.clone(),
        transport.clone() as Arc<dyn MailTransport>,
        Arc::new(DbAttachmentStore::new(db.clone())),
        clock.clone() as Arc<dyn Clock>,
        Some(fallback),
    ));
    let config = Arc::new(AppConfig {
        database_url: "sqlite::memory:".into(),
        smtp: None,
        driver: DriverConfig::default(),
    });

    Harness {
        engine: Engine::new(db, config, clock.clone(), gateway),
        clock,
        transport,
    }
}

pub async fn seed_recipient(
    db: &DatabaseConnection,
    email: &str,
    name: &str,
) -> recipient::Model {
    seed_recipient_with(db, email, name, true, serde_json::json!({})).await
}

pub async fn seed_recipient_with(
    db: &DatabaseConnection,
    email: &str,
    name: &str,
    is_active: bool,
    extra_variables: serde_json::Value,
) -> recipient::Model {
    recipient::ActiveModel {
        email: Set(email.to_owned()),
        name: Set(name.to_owned()),
        first_name: Set(String::new()),
        last_name: Set(String::new()),
        company: Set(String::new()),
        extra_variables: Set(extra_variables),
        is_active: Set(is_active),
        created_at: Set(T0),
        updated_at: Set(T0),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("seed recipient")
}

pub async fn seed_template(
    db: &DatabaseConnection,
    name: &str,
    subject: &str,
    body: &str,
) -> email_template::Model {
    email_template::ActiveModel {
        name: Set(name.to_owned()),
        subject: Set(subject.to_owned()),
        body: Set(body.to_owned()),
        is_html: Set(false),
        created_at: Set(T0),
        updated_at: Set(T0),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("seed template")
}

pub async fn seed_attachment(
    db: &DatabaseConnection,
    name: &str,
    content_type: &str,
    data: &[u8],
) -> attachment::Model {
    attachment::ActiveModel {
        name: Set(name.to_owned()),
        content_type: Set(content_type.to_owned()),
        data: Set(data.to_vec()),
        file_size: Set(data.len() as i64),
        created_at: Set(T0),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("seed attachment")
}

pub async fn link_attachment(
    db: &DatabaseConnection,
    template_id: i32,
    attachment_id: i32,
    position: i32,
) {
    template_attachment::ActiveModel {
        template_id: Set(template_id),
        attachment_id: Set(attachment_id),
        position: Set(position),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("link attachment");
}

pub async fn seed_recurring(
    db: &DatabaseConnection,
    template_id: i32,
    interval: SendInterval,
    status: CampaignStatus,
    scheduled_at: OffsetDateTime,
    next_send_at: Option<OffsetDateTime>,
) -> recurring_campaign::Model {
    recurring_campaign::ActiveModel {
        name: Set("newsletter".to_owned()),
        template_id: Set(template_id),
        interval: Set(interval),
        scheduled_at: Set(scheduled_at),
        end_at: Set(None),
        status: Set(status),
        next_send_at: Set(next_send_at),
        last_sent_at: Set(None),
        total_sent: Set(0),
        total_failed: Set(0),
        created_at: Set(T0),
        updated_at: Set(T0),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("seed recurring campaign")
}

pub async fn add_member(db: &DatabaseConnection, campaign_id: i32, recipient_id: i32) {
    mailroom::entity::campaign_recipient::ActiveModel {
        campaign_id: Set(campaign_id),
        recipient_id: Set(recipient_id),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("add member");
}

pub async fn seed_sequential(
    db: &DatabaseConnection,
    template_id: i32,
    interval_minutes: i32,
    start_at: OffsetDateTime,
) -> sequential_campaign::Model {
    sequential_campaign::ActiveModel {
        name: Set("drip".to_owned()),
        template_id: Set(template_id),
        interval_minutes: Set(interval_minutes),
        start_at: Set(start_at),
        status: Set(SequenceStatus::Draft),
        total_recipients: Set(0),
        emails_sent: Set(0),
        emails_failed: Set(0),
        current_index: Set(0),
        started_at: Set(None),
        completed_at: Set(None),
        created_at: Set(T0),
        updated_at: Set(T0),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("seed sequential campaign")
}

pub async fn entry_statuses(
    db: &DatabaseConnection,
    campaign_id: i32,
) -> Vec<(i32, EntryStatus)> {
    use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
    sequential_recipient::Entity::find()
        .filter(sequential_recipient::Column::CampaignId.eq(campaign_id))
        .order_by_asc(sequential_recipient::Column::SendOrder)
        .all(db)
        .await
        .expect("load entries")
        .into_iter()
        .map(|e| (e.send_order, e.status))
        .collect()
}
