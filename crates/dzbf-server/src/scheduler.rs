//! Background housekeeping.
//!
//! One hourly job removes expired sessions and anonymous carts that have sat
//! idle longer than `DZBF_ANON_CART_TTL_DAYS`.

use std::sync::Arc;

use chrono::{Duration, Utc};
use dzbf_core::AppConfig;
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

const DEFAULT_HOUSEKEEPING_CRON: &str = "0 0 * * * *";

/// Rows removed by one housekeeping pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HousekeepingReport {
    pub sessions: u64,
    pub carts: u64,
}

/// Builds and starts the background job scheduler.
///
/// The returned handle must be kept alive for the lifetime of the process;
/// dropping it stops the jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// the job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(
    pool: PgPool,
    config: Arc<AppConfig>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_housekeeping_job(&scheduler, pool, config).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

/// Runs hourly by default; `DZBF_HOUSEKEEPING_CRON` overrides the schedule.
async fn register_housekeeping_job(
    scheduler: &JobScheduler,
    pool: PgPool,
    config: Arc<AppConfig>,
) -> Result<(), JobSchedulerError> {
    let cron = std::env::var("DZBF_HOUSEKEEPING_CRON")
        .unwrap_or_else(|_| DEFAULT_HOUSEKEEPING_CRON.to_string());
    let pool = Arc::new(pool);

    let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
        let pool = Arc::clone(&pool);
        let config = Arc::clone(&config);

        Box::pin(async move {
            let report = run_housekeeping(&pool, &config).await;
            tracing::info!(
                sessions = report.sessions,
                carts = report.carts,
                "scheduler: housekeeping run complete"
            );
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron = %cron, "scheduler: registered housekeeping job");
    Ok(())
}

/// One purge pass. Failures are logged; the other purge still runs.
pub(crate) async fn run_housekeeping(pool: &PgPool, config: &AppConfig) -> HousekeepingReport {
    let mut report = HousekeepingReport::default();

    match dzbf_db::purge_expired_sessions(pool).await {
        Ok(n) => report.sessions = n,
        Err(e) => tracing::error!(error = %e, "scheduler: failed to purge expired sessions"),
    }

    let idle_before = Utc::now() - Duration::days(config.anon_cart_ttl_days);
    match dzbf_db::purge_stale_session_carts(pool, idle_before).await {
        Ok(n) => report.carts = n,
        Err(e) => tracing::error!(error = %e, "scheduler: failed to purge stale carts"),
    }

    report
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::path::PathBuf;

    use dzbf_core::Environment;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::*;

    fn config() -> AppConfig {
        AppConfig {
            database_url: String::new(),
            env: Environment::Test,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            log_level: "info".to_string(),
            catalog_path: PathBuf::new(),
            db_max_connections: 2,
            db_min_connections: 1,
            db_acquire_timeout_secs: 5,
            session_ttl_hours: 24,
            anon_cart_ttl_days: 30,
            shipping_flat_rate: Decimal::new(600, 0),
            free_shipping_threshold: Decimal::new(10_000, 0),
            storage_public_url: None,
            cors_origins: Vec::new(),
        }
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn housekeeping_purges_expired_sessions_and_idle_carts(pool: PgPool) {
        let user = dzbf_db::create_user(
            &pool,
            dzbf_db::NewUser {
                email: "old@example.dz",
                password_hash: "x",
                full_name: "Old Session",
                phone: None,
            },
        )
        .await
        .expect("user");
        dzbf_db::create_session(&pool, user.id, "expired", Utc::now() - Duration::hours(1))
            .await
            .expect("expired session");
        dzbf_db::create_session(&pool, user.id, "live", Utc::now() + Duration::hours(1))
            .await
            .expect("live session");

        let stale = dzbf_db::get_or_create_cart(&pool, dzbf_db::CartOwner::Session(Uuid::new_v4()))
            .await
            .expect("stale cart");
        sqlx::query("UPDATE carts SET updated_at = NOW() - INTERVAL '45 days' WHERE id = $1")
            .bind(stale.id)
            .execute(&pool)
            .await
            .expect("age cart");
        dzbf_db::get_or_create_cart(&pool, dzbf_db::CartOwner::Session(Uuid::new_v4()))
            .await
            .expect("fresh cart");

        let report = run_housekeeping(&pool, &config()).await;
        assert_eq!(
            report,
            HousekeepingReport {
                sessions: 1,
                carts: 1
            }
        );
    }
}
