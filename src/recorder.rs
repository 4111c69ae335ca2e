use crate::error::AppError;
use crate::leads::{LeadGateway, LeadId, LeadRecord};
use crate::session::CallSession;

use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, error, info};

/// Turns a completed session into one saved lead. No retries: a lost lead is
/// preferred over a duplicated one.
#[derive(Clone)]
pub struct LeadRecorder {
    gateway: Arc<dyn LeadGateway>,
    timeout: Duration,
}

impl LeadRecorder {
    pub fn new(gateway: Arc<dyn LeadGateway>, timeout: Duration) -> Self {
        Self { gateway, timeout }
    }

    pub async fn record(&self, session: &CallSession) -> Result<LeadId, AppError> {
        let lead = LeadRecord::from_session(session, OffsetDateTime::now_utc())?;
        debug!(
            call_id=%session.call_id,
            phone_number=lead.phone_number(),
            location=lead.location(),
            amount=%lead.amount(),
            "saving lead"
        );
        let id = tokio::time::timeout(self.timeout, self.gateway.save(&lead))
            .await
            .map_err(|_| {
                error!(call_id=%session.call_id, timeout=?self.timeout, "lead save timed out");
                AppError::PersistenceFailure("timed out".to_string())
            })??;
        info!(call_id=%session.call_id, lead_id=%id, "recorded lead");
        Ok(id)
    }
}
