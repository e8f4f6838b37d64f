//! Expired session and CSRF token reaper
//!
//! Verification never reads the session registry, so expired rows are only
//! clutter. This background task deletes them on a fixed interval.

use crate::auth::{CsrfService, SessionRegistry};
use crate::config::CleanupConfig;
use anyhow::Result;
use tokio::time::{interval, Duration};

/// Deletes expired rows from the session registry and the CSRF table
pub struct SessionReaper {
    sessions: SessionRegistry,
    csrf: CsrfService,
}

impl SessionReaper {
    pub fn new(sessions: SessionRegistry, csrf: CsrfService) -> Self {
        Self { sessions, csrf }
    }

    /// Run a single reap cycle
    pub async fn run_once(&self) -> Result<ReapStats> {
        let stats = ReapStats {
            sessions_removed: self.sessions.purge_expired().await?,
            csrf_tokens_removed: self.csrf.purge_expired().await?,
        };

        if stats.sessions_removed > 0 || stats.csrf_tokens_removed > 0 {
            tracing::info!(
                sessions = stats.sessions_removed,
                csrf_tokens = stats.csrf_tokens_removed,
                "Reaped expired rows"
            );
        } else {
            tracing::debug!("Nothing to reap");
        }

        Ok(stats)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReapStats {
    pub sessions_removed: u64,
    pub csrf_tokens_removed: u64,
}

/// Spawn the background reaper task
pub fn spawn_reaper_task(reaper: SessionReaper, config: &CleanupConfig) {
    if !config.enabled {
        tracing::info!("Expired session cleanup is disabled");
        return;
    }

    let interval_secs = config.interval_seconds.max(1);
    tracing::info!(interval_secs, "Starting expired session cleanup task");

    tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(interval_secs));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick.tick().await;
            if let Err(e) = reaper.run_once().await {
                tracing::error!(error = %e, "Reap cycle failed");
            }
        }
    });
}
