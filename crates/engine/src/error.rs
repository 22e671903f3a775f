use sea_orm::DbErr;
use thiserror::Error;

/// Failures raised while talking to an outbound mail relay.
///
/// These are recorded on the email log entry and absorbed by the calling
/// campaign loop; they never abort a batch or sequence on their own.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid mail address '{0}'")]
    InvalidAddress(String),
    #[error("failed to build message: {0}")]
    Build(String),
    #[error("failed to connect to relay {host}: {reason}")]
    Connection { host: String, reason: String },
    #[error("send failed: {0}")]
    Send(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// No default delivery configuration in the database and no fallback in
    /// the app config. Fatal: aborts the run and surfaces to the driver.
    #[error("no delivery configuration available")]
    NoConfiguration,
    #[error("campaign {0} not found")]
    CampaignNotFound(i32),
    #[error("delivery configuration {0} not found")]
    ConfigurationNotFound(i32),
    #[error("template {0} not found")]
    TemplateNotFound(i32),
    /// An operator command was issued against a campaign in the wrong state.
    #[error("campaign {id} is '{actual}', expected {expected}")]
    CampaignNotInExpectedState {
        id: i32,
        expected: &'static str,
        actual: String,
    },
    /// A batch fire found nobody to send to. The campaign state is left
    /// untouched so the next due scan can pick it up again.
    #[error("campaign {0} has no eligible recipients")]
    NoEligibleRecipients(i32),
    /// Another firer claimed this due instant first.
    #[error("campaign {0} was already fired for this due instant")]
    FireConflict(i32),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Db(#[from] DbErr),
}
