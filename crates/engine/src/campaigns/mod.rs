//! Campaign orchestration: recurring batch campaigns, sequential drip
//! campaigns, and one-off template sends.

pub mod recurring;
pub mod sequential;
pub mod timers;

use std::collections::HashMap;

use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder};

use crate::Engine;
use crate::delivery::{DeliveryOutcome, OutboundEmail};
use crate::entity::{email_template, recipient, template_attachment};
use crate::error::EngineError;
use crate::template::{recipient_vars, render};

/// Renders a template's subject and body for one recipient.
pub fn render_for(
    template: &email_template::Model,
    member: &recipient::Model,
) -> (String, String) {
    let vars = recipient_vars(member);
    (render(&template.subject, &vars), render(&template.body, &vars))
}

/// Attachment ids linked to a template, in list order.
pub async fn template_attachment_ids(
    db: &DatabaseConnection,
    template_id: i32,
) -> Result<Vec<i32>, DbErr> {
    Ok(template_attachment::Entity::find()
        .filter(template_attachment::Column::TemplateId.eq(template_id))
        .order_by_asc(template_attachment::Column::Position)
        .all(db)
        .await?
        .into_iter()
        .map(|link| link.attachment_id)
        .collect())
}

/// Sends one template to one address outside of any campaign. The address
/// does not need a recipient row; substitution variables come from the
/// arguments, with `extra` overriding the built-ins.
pub async fn send_single(
    engine: &Engine,
    template_id: i32,
    to_email: &str,
    to_name: Option<&str>,
    extra: &HashMap<String, String>,
) -> Result<DeliveryOutcome, EngineError> {
    let db = engine.db.as_ref();
    let template = email_template::Entity::find_by_id(template_id)
        .one(db)
        .await?
        .ok_or(EngineError::TemplateNotFound(template_id))?;

    let display = to_name.unwrap_or(to_email);
    let mut vars: HashMap<String, String> = HashMap::from([
        ("name".to_owned(), display.to_owned()),
        ("email".to_owned(), to_email.to_owned()),
        ("first_name".to_owned(), String::new()),
        ("last_name".to_owned(), String::new()),
        ("company".to_owned(), String::new()),
    ]);
    vars.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));

    let email = OutboundEmail {
        to_email: to_email.to_owned(),
        to_name: Some(display.to_owned()),
        subject: render(&template.subject, &vars),
        body: render(&template.body, &vars),
        is_html: template.is_html,
        attachment_ids: template_attachment_ids(db, template_id).await?,
        run_id: None,
        sequential_campaign_id: None,
    };
    engine.gateway.send(&email).await
}
