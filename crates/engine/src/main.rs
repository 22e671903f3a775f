use std::sync::Arc;

use mailroom::Engine;
use mailroom::campaigns::{recurring, sequential};
use mailroom::clock::SystemClock;
use mailroom::config::load_config_or_panic;
use mailroom::delivery::DeliveryGateway;
use mailroom::delivery::attachments::DbAttachmentStore;
use mailroom::delivery::smtp::{RelayParams, SmtpDialer};
use mailroom::error::EngineError;
use sea_orm::Database;
use tokio::time::{Duration, interval};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "mailroom=info,sea_orm=warn,lettre=warn";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install().expect("Failed to install `color_eyre::install`");
    dotenvy::dotenv().ok();

    initialize_tracing();

    let config = Arc::new(load_config_or_panic());

    let db = Arc::new(
        Database::connect(&config.database_url)
            .await
            .expect("Failed to connect to database"),
    );

    let clock = Arc::new(SystemClock);
    let fallback = config.smtp.clone().map(RelayParams::from);
    let gateway = Arc::new(DeliveryGateway::new(
        db.clone(),
        Arc::new(SmtpDialer),
        Arc::new(DbAttachmentStore::new(db.clone())),
        clock.clone(),
        fallback,
    ));
    let engine = Engine::new(db, config.clone(), clock, gateway);

    // Pick up sequential campaigns interrupted by the previous shutdown.
    let resumed = sequential::resume_inflight(&engine).await?;
    if resumed > 0 {
        tracing::info!(resumed, "Resumed in-flight sequential campaigns");
    }

    // Due scan loop for recurring campaigns.
    let scan_engine = engine.clone();
    let poll = Duration::from_secs(config.driver.poll_interval_secs);
    tokio::spawn(async move {
        let mut ticker = interval(poll);
        loop {
            ticker.tick().await;
            let due = match recurring::list_due(&scan_engine).await {
                Ok(due) => due,
                Err(e) => {
                    tracing::error!(error = %e, "Due scan failed");
                    continue;
                }
            };
            for campaign in due {
                match recurring::fire(&scan_engine, campaign.id).await {
                    Ok(report) => tracing::info!(
                        campaign_id = campaign.id,
                        sent = report.sent,
                        failed = report.failed,
                        "Fired due campaign"
                    ),
                    Err(EngineError::NoEligibleRecipients(id)) => {
                        tracing::warn!(campaign_id = id, "Due campaign has nobody to send to");
                    }
                    Err(EngineError::FireConflict(id)) => {
                        tracing::debug!(campaign_id = id, "Campaign already claimed elsewhere");
                    }
                    Err(e) => {
                        tracing::error!(campaign_id = campaign.id, error = %e, "Fire failed");
                    }
                }
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    engine.timers.disarm_all().await;
    Ok(())
}
