// Background maintenance for the session table

use std::sync::Arc;
use std::time::Duration;
use tokio::{task::JoinHandle, time::interval};
use tracing::{debug, error, info};

use crate::auth::service::AuthService;

const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(1);

/// Run one purge of expired sessions, logging the outcome
pub async fn sweep_expired_sessions(service: &AuthService) {
    match service.purge_expired_sessions().await {
        Ok(0) => debug!("Session sweep found nothing to purge"),
        Ok(purged) => info!("Purged {} expired sessions", purged),
        Err(e) => error!("Session sweep failed: {}", e),
    }
}

/// Spawn a task that purges expired sessions every `period`
///
/// The first sweep runs immediately. A zero period is raised to `MIN_SWEEP_PERIOD`.
pub fn spawn_session_sweeper(service: Arc<AuthService>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period.max(MIN_SWEEP_PERIOD));

        loop {
            ticker.tick().await;
            sweep_expired_sessions(&service).await;
        }
    })
}
