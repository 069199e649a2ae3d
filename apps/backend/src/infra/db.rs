use std::future::Future;
use std::time::{Duration, Instant};

use migration::{migrate, MigrationCommand};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tracing::{info, warn};

use crate::config::db::{redact_url, DbKind, DbSettings};
use crate::error::AppError;

const CONNECT_ATTEMPTS: u32 = 5;
const CONNECT_INTERVAL: Duration = Duration::from_millis(500);

/// Retry `connect` at a fixed interval, returning the last error.
async fn retry_connection<T, F, Fut>(mut connect: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut attempt = 1;
    loop {
        match connect().await {
            Ok(conn) => {
                if attempt > 1 {
                    info!(attempt, "database connection succeeded after retry");
                }
                return Ok(conn);
            }
            Err(err) if attempt < CONNECT_ATTEMPTS => {
                warn!(attempt, max_attempts = CONNECT_ATTEMPTS, error = %err, "database connection failed");
                tokio::time::sleep(CONNECT_INTERVAL).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Open a pool without touching the schema.
pub async fn connect_db(settings: &DbSettings) -> Result<DatabaseConnection, AppError> {
    let url = settings
        .url
        .as_deref()
        .ok_or_else(|| AppError::config(format!("DB_KIND={} has no database URL", settings.kind)))?;

    let mut opt = ConnectOptions::new(url.to_string());
    opt.sqlx_logging(false)
        .connect_timeout(Duration::from_secs(5))
        .acquire_timeout(Duration::from_secs(5));
    if settings.kind == DbKind::Sqlite {
        // Every connection to `sqlite::memory:` is its own database.
        opt.max_connections(1).min_connections(1);
    } else {
        opt.max_connections(16).min_connections(1);
    }

    let started = Instant::now();
    let conn = retry_connection(|| {
        let opt = opt.clone();
        async move {
            Database::connect(opt)
                .await
                .map_err(|e| AppError::db_unavailable(e.to_string()))
        }
    })
    .await?;
    info!(
        kind = %settings.kind,
        url = %redact_url(url),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "database connected"
    );
    Ok(conn)
}

/// Connect and bring the schema up to date.
pub async fn bootstrap_db(settings: &DbSettings) -> Result<DatabaseConnection, AppError> {
    let conn = connect_db(settings).await?;
    migrate(&conn, MigrationCommand::Up)
        .await
        .map_err(|e| AppError::internal(format!("migration failed: {e}")))?;
    Ok(conn)
}
