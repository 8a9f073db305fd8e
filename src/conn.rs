//! Database connections, TLS support, and the transactional writer.
//!
//! PostgreSQL connections go through tokio-postgres with optional rustls
//! TLS; MySQL and MariaDB go through mysql_async. The caller owns the
//! resulting [`DbConn`]; nothing in this crate closes it.

use mysql_async::prelude::Queryable;
use tokio_postgres::Client;

use crate::config::{DatabaseConfig, SslMode};
use crate::dialect::Dialect;
use crate::error::{PtahError, Result};

/// A live connection to one of the supported databases.
///
/// Introspectors and the migrator accept this as a parameter; transaction
/// state is layered on top by [`TxWriter`].
pub enum DbConn {
    /// A PostgreSQL client.
    Postgres(Client),
    /// A MySQL or MariaDB connection; the dialect records which prefix
    /// the DSN carried.
    MySql(mysql_async::Conn, Dialect),
}

impl DbConn {
    /// The dialect this connection speaks.
    pub fn dialect(&self) -> Dialect {
        match self {
            DbConn::Postgres(_) => Dialect::Postgres,
            DbConn::MySql(_, dialect) => *dialect,
        }
    }

    /// Execute a single SQL statement, discarding any result rows.
    pub async fn batch_execute(&mut self, sql: &str) -> Result<()> {
        match self {
            DbConn::Postgres(client) => {
                client.batch_execute(sql).await?;
            }
            DbConn::MySql(conn, _) => {
                conn.query_drop(sql).await?;
            }
        }
        Ok(())
    }

    /// Run a query expected to return a single nullable i64 (e.g. MAX()).
    pub async fn query_scalar_i64(&mut self, sql: &str) -> Result<Option<i64>> {
        match self {
            DbConn::Postgres(client) => {
                let row = client.query_one(sql, &[]).await?;
                Ok(row.get::<_, Option<i64>>(0))
            }
            DbConn::MySql(conn, _) => {
                let value: Option<Option<i64>> = conn.query_first(sql).await?;
                Ok(value.flatten())
            }
        }
    }
}

/// Connect to the database named by the DSN, dispatching on its prefix.
///
/// Failed attempts are retried up to `connect_retries` times, doubling
/// the wait (capped at 30s) with some jitter. Authentication failures
/// are returned immediately.
pub async fn connect(dsn: &str, config: &DatabaseConfig) -> Result<DbConn> {
    let dialect = Dialect::from_dsn(dsn)?;
    let mut attempts_left = config.connect_retries;
    let mut wait = std::time::Duration::from_secs(1);

    loop {
        match attempt_connect(dsn, dialect, config).await {
            Ok(conn) => return Ok(conn),
            Err(e) if attempts_left == 0 || is_permanent_error(&e) => return Err(e),
            Err(e) => {
                attempts_left -= 1;
                let delay = wait + std::time::Duration::from_millis(fastrand::u64(..750));
                log::info!(
                    "Database connection failed ({}); next attempt in {}ms, attempts_left={}",
                    e,
                    delay.as_millis(),
                    attempts_left
                );
                tokio::time::sleep(delay).await;
                wait = std::cmp::min(wait * 2, std::time::Duration::from_secs(30));
            }
        }
    }
}

async fn attempt_connect(dsn: &str, dialect: Dialect, config: &DatabaseConfig) -> Result<DbConn> {
    match dialect {
        Dialect::Postgres => connect_postgres(dsn, config).await,
        Dialect::MySql | Dialect::MariaDb => connect_mysql(dsn, dialect, config).await,
    }
}

/// rustls client configuration trusting the bundled webpki roots.
fn tls_client_config() -> Result<rustls::ClientConfig> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let provider = std::sync::Arc::new(rustls::crypto::ring::default_provider());

    rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map(|builder| builder.with_root_certificates(roots).with_no_client_auth())
        .map_err(|e| PtahError::ConnectionFailure {
            detail: format!("could not build TLS configuration: {}", e),
        })
}

/// Open a PostgreSQL session and detach its connection driver onto the
/// runtime; the driver future owns the socket until the client drops.
async fn start_postgres<T>(
    dsn: &str,
    tls: T,
) -> std::result::Result<Client, tokio_postgres::Error>
where
    T: tokio_postgres::tls::MakeTlsConnect<tokio_postgres::Socket>,
    T::Stream: Send + 'static,
{
    let (client, driver) = tokio_postgres::connect(dsn, tls).await?;
    tokio::spawn(async move {
        if let Err(e) = driver.await {
            log::warn!("Postgres connection driver exited: {}", e);
        }
    });
    Ok(client)
}

async fn connect_postgres(dsn: &str, config: &DatabaseConfig) -> Result<DbConn> {
    let connect_fut = async {
        match config.ssl_mode {
            SslMode::Disable => Ok(start_postgres(dsn, tokio_postgres::NoTls).await?),
            SslMode::Require => {
                let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_client_config()?);
                Ok(start_postgres(dsn, tls).await?)
            }
            SslMode::Prefer => {
                let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_client_config()?);
                match start_postgres(dsn, tls).await {
                    Ok(client) => Ok(client),
                    Err(e) => {
                        log::debug!("TLS attempt failed ({}), retrying without TLS", e);
                        Ok(start_postgres(dsn, tokio_postgres::NoTls).await?)
                    }
                }
            }
        }
    };

    let client = with_timeout(config.connect_timeout_secs, connect_fut).await?;

    if config.statement_timeout_secs > 0 {
        let timeout_sql = format!("SET statement_timeout = '{}s'", config.statement_timeout_secs);
        client.batch_execute(&timeout_sql).await?;
    }

    Ok(DbConn::Postgres(client))
}

async fn connect_mysql(dsn: &str, dialect: Dialect, config: &DatabaseConfig) -> Result<DbConn> {
    // mysql_async only understands the mysql:// scheme; MariaDB DSNs are
    // identical past the prefix.
    let url = match dsn.strip_prefix("mariadb://") {
        Some(rest) => format!("mysql://{}", rest),
        None => dsn.to_string(),
    };

    let opts = mysql_async::Opts::from_url(&url).map_err(|e| PtahError::ConnectionFailure {
        detail: format!("Invalid MySQL connection string: {}", e),
    })?;

    let conn = with_timeout(config.connect_timeout_secs, async {
        Ok(mysql_async::Conn::new(opts).await?)
    })
    .await?;

    Ok(DbConn::MySql(conn, dialect))
}

async fn with_timeout<T>(
    timeout_secs: u32,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    if timeout_secs == 0 {
        return fut.await;
    }
    match tokio::time::timeout(std::time::Duration::from_secs(timeout_secs as u64), fut).await {
        Ok(result) => result,
        Err(_) => Err(PtahError::ConnectionFailure {
            detail: format!("connection timed out after {}s", timeout_secs),
        }),
    }
}

/// Authentication failures will not succeed on retry; everything else
/// (network hiccups, server still starting) might.
fn is_permanent_error(e: &PtahError) -> bool {
    match e {
        // SQLSTATE class 28: invalid authorization / bad password
        PtahError::PostgresError(pg) => matches!(
            pg.as_db_error().map(|db| db.code().code()),
            Some("28000" | "28P01")
        ),
        // ER_ACCESS_DENIED_ERROR
        PtahError::MySqlError(mysql_async::Error::Server(server)) => server.code == 1045,
        _ => false,
    }
}

/// Stateful transactional writer over a [`DbConn`].
///
/// Holds the single active transaction for a migrator instance. Nested
/// begins are rejected, writes outside an active transaction fail, and
/// commit/rollback both clear the handle even when the statement itself
/// errors, so the failure path never leaves a transaction open.
pub struct TxWriter<'a> {
    conn: &'a mut DbConn,
    active: bool,
}

impl<'a> TxWriter<'a> {
    /// Wrap a connection in a writer with no active transaction.
    pub fn new(conn: &'a mut DbConn) -> Self {
        Self {
            conn,
            active: false,
        }
    }

    /// Whether a transaction is currently open.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Open a transaction. Fails if one is already active.
    pub async fn begin(&mut self) -> Result<()> {
        if self.active {
            return Err(PtahError::NestedTransaction);
        }
        self.conn.batch_execute("BEGIN").await?;
        self.active = true;
        Ok(())
    }

    /// Execute a statement inside the active transaction.
    pub async fn exec(&mut self, sql: &str) -> Result<()> {
        if !self.active {
            return Err(PtahError::NoActiveTransaction);
        }
        self.conn.batch_execute(sql).await
    }

    /// Commit the active transaction, clearing the handle.
    pub async fn commit(&mut self) -> Result<()> {
        if !self.active {
            return Err(PtahError::NoActiveTransaction);
        }
        self.active = false;
        self.conn.batch_execute("COMMIT").await
    }

    /// Roll back the active transaction, clearing the handle.
    pub async fn rollback(&mut self) -> Result<()> {
        if !self.active {
            return Err(PtahError::NoActiveTransaction);
        }
        self.active = false;
        self.conn.batch_execute("ROLLBACK").await
    }

    /// Roll back if a transaction is still open, logging instead of
    /// failing. Used on error paths where the original error must win.
    pub async fn rollback_if_active(&mut self) {
        if self.active {
            if let Err(e) = self.rollback().await {
                log::warn!("Failed to rollback transaction: {}", e);
            }
        }
    }
}
