//! Process-wide connection state.
//!
//! One client and one default database per process, established through a
//! [`DriverBuilder`](crate::driver::DriverBuilder) and shared by every
//! manager that does not override the database per call. Connecting twice
//! without `reconnect` is an error rather than a silent handle swap.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::{
    driver::{Database, DriverBuilder, DriverClient},
    error::{DocmapError, DocmapResult},
};

static CONNECTION: RwLock<Option<Arc<dyn DriverClient>>> = RwLock::new(None);
static DATABASE: RwLock<Option<Arc<dyn Database>>> = RwLock::new(None);

/// Options for establishing the backend connection.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Backend host, used when no URI is given.
    pub host: String,
    /// Backend port, used when no URI is given.
    pub port: u16,
    /// A full connection URI; takes precedence over host and port.
    pub uri: Option<String>,
    /// Replica-set name for drivers that support one.
    pub replica_set: Option<String>,
    /// Tear down an existing connection instead of failing on it.
    pub reconnect: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 27017,
            uri: None,
            replica_set: None,
            reconnect: false,
        }
    }
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn replica_set(mut self, name: impl Into<String>) -> Self {
        self.replica_set = Some(name.into());
        self
    }

    pub fn reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }
}

/// Establishes the process-wide client.
///
/// With `reconnect` set, an existing connection is torn down first;
/// otherwise a second call fails with a connection error. Build failures are
/// wrapped, never propagated raw.
pub async fn get_connection<B: DriverBuilder>(
    builder: B,
    options: &ConnectOptions,
) -> DocmapResult<Arc<dyn DriverClient>> {
    if options.reconnect {
        disconnect().await?;
    } else if CONNECTION.read().is_some() {
        return Err(DocmapError::Connection(
            "connection has already been created".to_string(),
        ));
    }

    let client = builder
        .build(options)
        .await
        .map_err(|err| DocmapError::Connection(format!("Cannot connect to database: {err}")))?;
    let client: Arc<dyn DriverClient> = Arc::new(client);
    *CONNECTION.write() = Some(Arc::clone(&client));
    tracing::info!(host = %options.host, port = options.port, "connection established");
    Ok(client)
}

/// Establishes the process-wide client and selects `db` as the default
/// database for every operation that does not override it.
pub async fn connect<B: DriverBuilder>(
    db: &str,
    builder: B,
    options: &ConnectOptions,
) -> DocmapResult<Arc<dyn Database>> {
    let client = get_connection(builder, options).await?;
    let database = client.database(db);
    *DATABASE.write() = Some(Arc::clone(&database));
    tracing::debug!(database = db, "default database selected");
    Ok(database)
}

/// Tears down the process-wide connection, if one exists.
pub async fn disconnect() -> DocmapResult<()> {
    // Guards must not be held across the await below.
    let client = CONNECTION.write().take();
    DATABASE.write().take();
    if let Some(client) = client {
        client.disconnect().await?;
        tracing::info!("connection closed");
    }
    Ok(())
}

/// The process-wide client. Fails fast when [`connect`] has not run.
pub fn current_connection() -> DocmapResult<Arc<dyn DriverClient>> {
    CONNECTION.read().clone().ok_or_else(|| {
        DocmapError::Connection("connection is not initialized; call connect first".to_string())
    })
}

/// The process-wide default database. Fails fast when [`connect`] has not
/// run.
pub fn current_database() -> DocmapResult<Arc<dyn Database>> {
    DATABASE.read().clone().ok_or_else(|| {
        DocmapError::Connection("database is not initialized; call connect first".to_string())
    })
}
