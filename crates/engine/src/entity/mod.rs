pub mod attachment;
pub mod campaign_recipient;
pub mod campaign_run;
pub mod email_log;
pub mod email_template;
pub mod mail_config;
pub mod recipient;
pub mod recurring_campaign;
pub mod sequential_campaign;
pub mod sequential_recipient;
pub mod template_attachment;
