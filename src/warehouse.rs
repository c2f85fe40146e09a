use crate::error::DependencyError;
use crate::heuristics::ParsedInvoice;
use crate::kpi::KpiState;
use crate::models::WasteItem;
use async_trait::async_trait;
use rusqlite::{Connection, Result as SqliteResult, params};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use tracing::info;

/// Append-only sink for classified items and invoice lines.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// One row per item; returns the number of rows written.
    async fn insert_waste_events(&self, items: &[WasteItem]) -> Result<usize, DependencyError>;

    /// One row per line, all under a fresh invoice id which is returned.
    async fn insert_invoice_lines(
        &self,
        invoice: &ParsedInvoice,
    ) -> Result<String, DependencyError>;

    /// Totals per route across both tables.
    async fn kpi_totals(&self) -> Result<KpiState, DependencyError>;

    async fn counts(&self) -> Result<WarehouseCounts, DependencyError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WarehouseCounts {
    pub waste_events: usize,
    pub invoices: usize,
    pub invoice_lines: usize,
}

/// Mixed into every generated id so two rows created in the same
/// nanosecond still differ.
static UID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// SQLite-backed warehouse.
#[derive(Clone)]
pub struct SqliteWarehouse {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteWarehouse {
    /// Open (or create) the database file and make sure the schema exists.
    pub fn open<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    pub fn in_memory() -> SqliteResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> SqliteResult<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS waste_events (
                event_id TEXT PRIMARY KEY,
                ts DATETIME DEFAULT CURRENT_TIMESTAMP,
                source TEXT NOT NULL,
                label TEXT NOT NULL,
                route TEXT NOT NULL,
                confidence REAL NOT NULL,
                est_weight_kg REAL NOT NULL,
                metadata TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS invoice_lines (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                invoice_id TEXT NOT NULL,
                period TEXT NOT NULL,
                vendor TEXT NOT NULL,
                line_type TEXT NOT NULL,
                weight_kg REAL NOT NULL,
                cost_usd REAL NOT NULL,
                ts DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_waste_events_route ON waste_events(route)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_invoice_lines_invoice_id ON invoice_lines(invoice_id)",
            [],
        )?;

        // Both tables folded into one row of per-route totals.
        conn.execute(
            "CREATE VIEW IF NOT EXISTS view_kpis AS
             SELECT
                 (SELECT COALESCE(SUM(est_weight_kg), 0) FROM waste_events WHERE route = 'recycle')
                   + (SELECT COALESCE(SUM(weight_kg), 0) FROM invoice_lines WHERE line_type = 'recycling')
                   AS recycle_kg,
                 (SELECT COALESCE(SUM(est_weight_kg), 0) FROM waste_events WHERE route = 'compost')
                   + (SELECT COALESCE(SUM(weight_kg), 0) FROM invoice_lines WHERE line_type = 'compost')
                   AS compost_kg,
                 (SELECT COALESCE(SUM(est_weight_kg), 0) FROM waste_events WHERE route = 'landfill')
                   + (SELECT COALESCE(SUM(weight_kg), 0) FROM invoice_lines WHERE line_type = 'landfill')
                   AS landfill_kg",
            [],
        )?;

        info!("Warehouse initialized successfully");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Generate a row id from its distinguishing parts, the current time and
    /// a process-wide counter.
    pub fn generate_uid(parts: &[&str]) -> String {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(OffsetDateTime::now_utc().unix_timestamp_nanos().to_le_bytes());
        hasher.update(UID_COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, DependencyError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> SqliteResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&mut guard)
        })
        .await
        .map_err(|e| DependencyError::Task(e.to_string()))?
        .map_err(DependencyError::from)
    }
}

fn insert_waste_events(conn: &mut Connection, items: &[WasteItem]) -> SqliteResult<usize> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO waste_events
                (event_id, source, label, route, confidence, est_weight_kg, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for (idx, item) in items.iter().enumerate() {
            let event_id = SqliteWarehouse::generate_uid(&[
                item.object_key.as_deref().unwrap_or(""),
                idx.to_string().as_str(),
                item.label.as_str(),
            ]);
            let metadata = serde_json::to_string(item).ok();
            stmt.execute(params![
                event_id,
                item.source,
                item.label.as_str(),
                item.route.as_str(),
                item.confidence,
                item.est_weight_kg,
                metadata,
            ])?;
        }
    }
    tx.commit()?;
    Ok(items.len())
}

fn insert_invoice_lines(conn: &mut Connection, invoice: &ParsedInvoice) -> SqliteResult<String> {
    let invoice_id =
        SqliteWarehouse::generate_uid(&[invoice.period.as_str(), invoice.vendor.as_str()]);
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO invoice_lines
                (invoice_id, period, vendor, line_type, weight_kg, cost_usd)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for line in &invoice.lines {
            stmt.execute(params![
                invoice_id,
                invoice.period,
                invoice.vendor,
                line.line_type.as_str(),
                line.weight_kg,
                line.cost_usd,
            ])?;
        }
    }
    tx.commit()?;
    Ok(invoice_id)
}

fn kpi_totals(conn: &mut Connection) -> SqliteResult<KpiState> {
    let (recycle_kg, compost_kg, landfill_kg): (f64, f64, f64) = conn.query_row(
        "SELECT recycle_kg, compost_kg, landfill_kg FROM view_kpis",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;
    let mut state = KpiState {
        recycle_kg,
        compost_kg,
        landfill_kg,
        diversion_rate: 0.0,
    };
    state.recompute_diversion();
    Ok(state)
}

fn counts(conn: &mut Connection) -> SqliteResult<WarehouseCounts> {
    let waste_events: usize =
        conn.query_row("SELECT COUNT(*) FROM waste_events", [], |row| row.get(0))?;

    let invoices: usize = conn.query_row(
        "SELECT COUNT(DISTINCT invoice_id) FROM invoice_lines",
        [],
        |row| row.get(0),
    )?;

    let invoice_lines: usize =
        conn.query_row("SELECT COUNT(*) FROM invoice_lines", [], |row| row.get(0))?;

    Ok(WarehouseCounts {
        waste_events,
        invoices,
        invoice_lines,
    })
}

#[async_trait]
impl Warehouse for SqliteWarehouse {
    async fn insert_waste_events(&self, items: &[WasteItem]) -> Result<usize, DependencyError> {
        let items = items.to_vec();
        let written = self
            .with_conn(move |conn| insert_waste_events(conn, &items))
            .await?;
        info!(rows = written, "Waste events stored");
        Ok(written)
    }

    async fn insert_invoice_lines(
        &self,
        invoice: &ParsedInvoice,
    ) -> Result<String, DependencyError> {
        let invoice = invoice.clone();
        let lines = invoice.lines.len();
        let invoice_id = self
            .with_conn(move |conn| insert_invoice_lines(conn, &invoice))
            .await?;
        info!(invoice_id = %invoice_id, lines, "Invoice lines stored");
        Ok(invoice_id)
    }

    async fn kpi_totals(&self) -> Result<KpiState, DependencyError> {
        self.with_conn(kpi_totals).await
    }

    async fn counts(&self) -> Result<WarehouseCounts, DependencyError> {
        self.with_conn(counts).await
    }
}
