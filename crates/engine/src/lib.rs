//! Campaign scheduling and delivery engine.
//!
//! Renders email templates with per-recipient variables, delivers them over
//! SMTP with a pending/sent/failed audit log, and drives two campaign
//! shapes: recurring batch campaigns fired by a due scan, and sequential
//! drip campaigns that send one entry at a time on self-armed timers.

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::campaigns::timers::ContinuationTimers;
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::delivery::DeliveryGateway;

pub mod campaigns;
pub mod clock;
pub mod config;
pub mod delivery;
pub mod entity;
pub mod error;
pub mod template;

/// Shared handles every engine operation works against.
pub struct Engine {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub clock: Arc<dyn Clock>,
    pub gateway: Arc<DeliveryGateway>,
    pub timers: Arc<ContinuationTimers>,
}

impl Engine {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        clock: Arc<dyn Clock>,
        gateway: Arc<DeliveryGateway>,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            config,
            clock,
            gateway,
            timers: Arc::new(ContinuationTimers::new()),
        })
    }
}
