use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::lock::Mutex;
use rusqlite::{named_params, Connection, OptionalExtension, Row};
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::parcel::{Parcel, ParcelStatus};
use crate::store::ParcelStore;

/// Table layout the store expects. Provided for callers and tests; the store
/// itself never runs it.
pub const PARCEL_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS parcel (
    number INTEGER PRIMARY KEY AUTOINCREMENT,
    client INTEGER NOT NULL,
    status TEXT NOT NULL,
    address TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_parcel_client ON parcel(client);
"#;

const INSERT_PARCEL: &str = "INSERT INTO parcel (client, status, address, created_at) \
     VALUES (:client, :status, :address, :created_at)";
const SELECT_BY_NUMBER: &str =
    "SELECT number, client, status, address, created_at FROM parcel WHERE number = :number";
const SELECT_BY_CLIENT: &str =
    "SELECT number, client, status, address, created_at FROM parcel WHERE client = :client";
const SELECT_STATUS: &str = "SELECT status FROM parcel WHERE number = :number";
const UPDATE_STATUS: &str = "UPDATE parcel SET status = :status WHERE number = :number";
const UPDATE_ADDRESS: &str =
    "UPDATE parcel SET address = :address WHERE number = :number AND status = :status";
const DELETE_PARCEL: &str = "DELETE FROM parcel WHERE number = :number AND status = :status";

/// Creates the `parcel` table and its client index if they are missing.
pub fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(PARCEL_TABLE_DDL)
}

/// Connection settings for callers that want the crate to open the database.
#[derive(Debug, Clone, PartialEq)]
pub struct SqliteConfig {
    /// Path to the SQLite database file, or `:memory:`.
    pub db_path: String,
    /// How long a statement waits on a locked database before failing.
    pub busy_timeout: Duration,
}

impl SqliteConfig {
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            busy_timeout: Duration::from_secs(5),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(":memory:")
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Opens the database. Schema provisioning is left to the caller.
    pub fn open(&self) -> Result<Connection> {
        let open_err = |source| StoreError::Open {
            path: self.db_path.clone(),
            source,
        };
        let conn = Connection::open(&self.db_path).map_err(open_err)?;
        conn.busy_timeout(self.busy_timeout).map_err(open_err)?;
        debug!(path = %self.db_path, "opened sqlite database");
        Ok(conn)
    }
}

/// [`ParcelStore`] over a caller-owned SQLite connection.
///
/// The mutex only serializes access to the connection handle. Each operation
/// is a single statement; nothing spans operations.
#[derive(Debug, Clone)]
pub struct SqliteParcelStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteParcelStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self::new(Arc::new(Mutex::new(conn)))
    }

    /// Shared handle to the underlying connection.
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }
}

fn parcel_from_row(row: &Row<'_>) -> rusqlite::Result<Parcel> {
    Ok(Parcel {
        number: row.get(0)?,
        client: row.get(1)?,
        status: row.get(2)?,
        address: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// Works out why a guarded mutation matched no row.
fn missed_guard(conn: &Connection, number: i64) -> StoreError {
    let status = conn
        .prepare_cached(SELECT_STATUS)
        .and_then(|mut stmt| {
            stmt.query_row(named_params! { ":number": number }, |row| {
                row.get::<_, ParcelStatus>(0)
            })
            .optional()
        });
    match status {
        Ok(None) => StoreError::NotFound { number },
        Ok(Some(status)) => StoreError::PreconditionFailed { number, status },
        Err(source) => StoreError::Read {
            context: "error reading parcel status",
            source,
        },
    }
}

#[async_trait]
impl ParcelStore for SqliteParcelStore {
    async fn add(&self, parcel: &Parcel) -> Result<i64> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare_cached(INSERT_PARCEL)
            .map_err(StoreError::write("error preparing insert statement"))?;
        let number = stmt
            .insert(named_params! {
                ":client": parcel.client,
                ":status": parcel.status,
                ":address": parcel.address,
                ":created_at": parcel.created_at,
            })
            .map_err(StoreError::write("error executing insert statement"))?;
        debug!(number, client = parcel.client, "parcel added");
        Ok(number)
    }

    async fn get(&self, number: i64) -> Result<Parcel> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare_cached(SELECT_BY_NUMBER)
            .map_err(StoreError::read("error preparing select statement"))?;
        let parcel = stmt
            .query_row(named_params! { ":number": number }, parcel_from_row)
            .optional()
            .map_err(StoreError::read("error scanning parcel"))?;
        parcel.ok_or(StoreError::NotFound { number })
    }

    async fn get_by_client(&self, client: i64) -> Result<Vec<Parcel>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare_cached(SELECT_BY_CLIENT)
            .map_err(StoreError::read("error preparing query"))?;
        let rows = stmt
            .query_map(named_params! { ":client": client }, parcel_from_row)
            .map_err(StoreError::read("error executing query"))?;
        let parcels = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::read("error scanning row"))?;
        debug!(client, count = parcels.len(), "parcels fetched by client");
        Ok(parcels)
    }

    async fn set_status(&self, number: i64, status: &str) -> Result<()> {
        let status: ParcelStatus = status.parse().map_err(|err| {
            warn!(number, %err, "rejected status update");
            StoreError::Validation(err)
        })?;

        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare_cached(UPDATE_STATUS)
            .map_err(StoreError::write("error preparing update statement"))?;
        let changed = stmt
            .execute(named_params! { ":status": status, ":number": number })
            .map_err(StoreError::write("error executing update statement"))?;
        if changed == 0 {
            return Err(StoreError::NotFound { number });
        }
        debug!(number, %status, "parcel status updated");
        Ok(())
    }

    async fn set_address(&self, number: i64, address: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare_cached(UPDATE_ADDRESS)
            .map_err(StoreError::write("error preparing update statement"))?;
        let changed = stmt
            .execute(named_params! {
                ":address": address,
                ":number": number,
                ":status": ParcelStatus::Registered,
            })
            .map_err(StoreError::write("error executing update statement"))?;
        if changed == 0 {
            let err = missed_guard(&conn, number);
            warn!(number, %err, "address update not applied");
            return Err(err);
        }
        debug!(number, "parcel address updated");
        Ok(())
    }

    async fn delete(&self, number: i64) -> Result<()> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare_cached(DELETE_PARCEL)
            .map_err(StoreError::write("error preparing delete statement"))?;
        let changed = stmt
            .execute(named_params! {
                ":number": number,
                ":status": ParcelStatus::Registered,
            })
            .map_err(StoreError::write("error executing delete statement"))?;
        if changed == 0 {
            let err = missed_guard(&conn, number);
            warn!(number, %err, "parcel delete not applied");
            return Err(err);
        }
        debug!(number, "parcel deleted");
        Ok(())
    }
}
