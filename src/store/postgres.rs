//! PostgreSQL store backend

use super::{
    LatestScanInfo, P2shAddressRecord, RegisteredAddress, StoreError, StoreResult, SwapRecord,
    SwapResultRecord, SwapStatistics, SwapStatus, SwapStore, SwapTxType,
};
use crate::config::DatabaseConfig;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::info;

pub struct PgSwapStore {
    pool: PgPool,
}

impl PgSwapStore {
    /// Connect and run migrations.
    pub async fn new(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> StoreResult<()> {
        // Swap identity is the primary key, so the first writer wins and
        // every later insert surfaces as a unique violation.
        for table in ["swapins", "swapouts"] {
            sqlx::query(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    pair_id TEXT NOT NULL,
                    tx_id TEXT NOT NULL,
                    bind TEXT NOT NULL,
                    tx_to TEXT NOT NULL,
                    tx_type SMALLINT NOT NULL,
                    status SMALLINT NOT NULL,
                    timestamp BIGINT NOT NULL,
                    memo TEXT NOT NULL DEFAULT '',
                    PRIMARY KEY (pair_id, tx_id, bind)
                )
                "#
            ))
            .execute(&self.pool)
            .await?;
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS router_swaps (
                from_chain_id TEXT NOT NULL,
                tx_id TEXT NOT NULL,
                log_index BIGINT NOT NULL,
                pair_id TEXT NOT NULL,
                bind TEXT NOT NULL,
                tx_to TEXT NOT NULL,
                tx_type SMALLINT NOT NULL,
                status SMALLINT NOT NULL,
                timestamp BIGINT NOT NULL,
                memo TEXT NOT NULL DEFAULT '',
                for_native BOOLEAN NOT NULL DEFAULT FALSE,
                for_underlying BOOLEAN NOT NULL DEFAULT FALSE,
                token TEXT NOT NULL DEFAULT '',
                path TEXT NOT NULL DEFAULT '[]',
                amount_out_min TEXT NOT NULL DEFAULT '0',
                to_chain_id TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (from_chain_id, tx_id, log_index)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for table in ["swapin_results", "swapout_results"] {
            sqlx::query(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    pair_id TEXT NOT NULL,
                    tx_id TEXT NOT NULL,
                    bind TEXT NOT NULL,
                    tx_to TEXT NOT NULL,
                    tx_type SMALLINT NOT NULL,
                    status SMALLINT NOT NULL,
                    timestamp BIGINT NOT NULL,
                    memo TEXT NOT NULL DEFAULT '',
                    swap_tx TEXT NOT NULL DEFAULT '',
                    value TEXT NOT NULL DEFAULT '0',
                    swap_height BIGINT NOT NULL DEFAULT 0,
                    swap_time BIGINT NOT NULL DEFAULT 0,
                    swap_nonce BIGINT NOT NULL DEFAULT 0,
                    PRIMARY KEY (pair_id, tx_id, bind)
                )
                "#
            ))
            .execute(&self.pool)
            .await?;

            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_bind ON {table} (bind, timestamp)"
            ))
            .execute(&self.pool)
            .await?;
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS router_swap_results (
                from_chain_id TEXT NOT NULL,
                tx_id TEXT NOT NULL,
                log_index BIGINT NOT NULL,
                pair_id TEXT NOT NULL,
                bind TEXT NOT NULL,
                tx_to TEXT NOT NULL,
                tx_type SMALLINT NOT NULL,
                status SMALLINT NOT NULL,
                timestamp BIGINT NOT NULL,
                memo TEXT NOT NULL DEFAULT '',
                swap_tx TEXT NOT NULL DEFAULT '',
                value TEXT NOT NULL DEFAULT '0',
                swap_height BIGINT NOT NULL DEFAULT 0,
                swap_time BIGINT NOT NULL DEFAULT 0,
                swap_nonce BIGINT NOT NULL DEFAULT 0,
                to_chain_id TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (from_chain_id, tx_id, log_index)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS p2sh_addresses (
                bind_address TEXT PRIMARY KEY,
                p2sh_address TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_p2sh_reverse ON p2sh_addresses (p2sh_address)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS registered_addresses (
                address TEXT PRIMARY KEY,
                timestamp BIGINT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS latest_scan_info (
                is_src BOOLEAN PRIMARY KEY,
                block_height BIGINT NOT NULL,
                timestamp BIGINT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Database migrations complete");
        Ok(())
    }
}

fn map_insert_err(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StoreError::Duplicate;
        }
    }
    StoreError::Database(e)
}

fn swap_from_classic_row(row: &PgRow) -> SwapRecord {
    SwapRecord {
        pair_id: row.get("pair_id"),
        tx_id: row.get("tx_id"),
        tx_to: row.get("tx_to"),
        tx_type: SwapTxType::from_i16(row.get("tx_type")).unwrap_or(SwapTxType::Swapin),
        bind: row.get("bind"),
        status: SwapStatus::from_i16(row.get("status")).unwrap_or(SwapStatus::TxVerifyFailed),
        timestamp: row.get("timestamp"),
        memo: row.get("memo"),
        for_native: false,
        for_underlying: false,
        token: String::new(),
        path: Vec::new(),
        amount_out_min: String::new(),
        from_chain_id: String::new(),
        to_chain_id: String::new(),
        log_index: 0,
    }
}

fn swap_from_router_row(row: &PgRow) -> SwapRecord {
    let path: String = row.get("path");
    SwapRecord {
        pair_id: row.get("pair_id"),
        tx_id: row.get("tx_id"),
        tx_to: row.get("tx_to"),
        tx_type: SwapTxType::from_i16(row.get("tx_type")).unwrap_or(SwapTxType::RouterSwap),
        bind: row.get("bind"),
        status: SwapStatus::from_i16(row.get("status")).unwrap_or(SwapStatus::TxVerifyFailed),
        timestamp: row.get("timestamp"),
        memo: row.get("memo"),
        for_native: row.get("for_native"),
        for_underlying: row.get("for_underlying"),
        token: row.get("token"),
        path: serde_json::from_str(&path).unwrap_or_default(),
        amount_out_min: row.get("amount_out_min"),
        from_chain_id: row.get("from_chain_id"),
        to_chain_id: row.get("to_chain_id"),
        log_index: row.get::<i64, _>("log_index") as u32,
    }
}

fn result_from_classic_row(row: &PgRow) -> SwapResultRecord {
    SwapResultRecord {
        pair_id: row.get("pair_id"),
        tx_id: row.get("tx_id"),
        tx_to: row.get("tx_to"),
        tx_type: SwapTxType::from_i16(row.get("tx_type")).unwrap_or(SwapTxType::Swapin),
        bind: row.get("bind"),
        status: SwapStatus::from_i16(row.get("status")).unwrap_or(SwapStatus::TxVerifyFailed),
        timestamp: row.get("timestamp"),
        memo: row.get("memo"),
        swap_tx: row.get("swap_tx"),
        value: row.get("value"),
        swap_height: row.get::<i64, _>("swap_height") as u64,
        swap_time: row.get("swap_time"),
        swap_nonce: row.get::<i64, _>("swap_nonce") as u64,
        from_chain_id: String::new(),
        to_chain_id: String::new(),
        log_index: 0,
    }
}

fn result_from_router_row(row: &PgRow) -> SwapResultRecord {
    let mut result = result_from_classic_row(row);
    result.from_chain_id = row.get("from_chain_id");
    result.to_chain_id = row.get("to_chain_id");
    result.log_index = row.get::<i64, _>("log_index") as u32;
    result
}

/// ORDER/OFFSET/LIMIT clause for history queries; negative limit walks
/// newest-first.
fn history_clause(offset: i64, limit: i64) -> String {
    let dir = if limit < 0 { "DESC" } else { "ASC" };
    format!(
        "ORDER BY timestamp {} OFFSET {} LIMIT {}",
        dir,
        offset.max(0),
        limit.unsigned_abs()
    )
}

impl PgSwapStore {
    async fn add_classic(&self, table: &str, swap: &SwapRecord) -> StoreResult<()> {
        sqlx::query(&format!(
            r#"
            INSERT INTO {table} (pair_id, tx_id, bind, tx_to, tx_type, status, timestamp, memo)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#
        ))
        .bind(&swap.pair_id)
        .bind(&swap.tx_id)
        .bind(&swap.bind)
        .bind(&swap.tx_to)
        .bind(swap.tx_type.as_i16())
        .bind(swap.status.as_i16())
        .bind(swap.timestamp)
        .bind(&swap.memo)
        .execute(&self.pool)
        .await
        .map_err(map_insert_err)?;
        Ok(())
    }

    async fn find_classic(
        &self,
        table: &str,
        tx_id: &str,
        pair_id: &str,
        bind: &str,
    ) -> StoreResult<PgRow> {
        sqlx::query(&format!(
            "SELECT * FROM {table} WHERE pair_id = $1 AND tx_id = $2 AND bind = $3"
        ))
        .bind(pair_id)
        .bind(tx_id)
        .bind(bind)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn update_classic_status(
        &self,
        table: &str,
        tx_id: &str,
        pair_id: &str,
        bind: &str,
        status: SwapStatus,
        timestamp: i64,
        memo: Option<&str>,
    ) -> StoreResult<()> {
        let updated = match memo {
            Some(memo) => {
                sqlx::query(&format!(
                    r#"
                    UPDATE {table} SET status = $1, timestamp = $2, memo = $3
                    WHERE pair_id = $4 AND tx_id = $5 AND bind = $6
                    "#
                ))
                .bind(status.as_i16())
                .bind(timestamp)
                .bind(memo)
                .bind(pair_id)
                .bind(tx_id)
                .bind(bind)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    r#"
                    UPDATE {table} SET status = $1, timestamp = $2
                    WHERE pair_id = $3 AND tx_id = $4 AND bind = $5
                    "#
                ))
                .bind(status.as_i16())
                .bind(timestamp)
                .bind(pair_id)
                .bind(tx_id)
                .bind(bind)
                .execute(&self.pool)
                .await?
            }
        };
        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn add_classic_result(&self, table: &str, result: &SwapResultRecord) -> StoreResult<()> {
        sqlx::query(&format!(
            r#"
            INSERT INTO {table}
                (pair_id, tx_id, bind, tx_to, tx_type, status, timestamp, memo,
                 swap_tx, value, swap_height, swap_time, swap_nonce)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#
        ))
        .bind(&result.pair_id)
        .bind(&result.tx_id)
        .bind(&result.bind)
        .bind(&result.tx_to)
        .bind(result.tx_type.as_i16())
        .bind(result.status.as_i16())
        .bind(result.timestamp)
        .bind(&result.memo)
        .bind(&result.swap_tx)
        .bind(&result.value)
        .bind(result.swap_height as i64)
        .bind(result.swap_time)
        .bind(result.swap_nonce as i64)
        .execute(&self.pool)
        .await
        .map_err(map_insert_err)?;
        Ok(())
    }

    async fn find_classic_results(
        &self,
        table: &str,
        address: &str,
        pair_id: &str,
        offset: i64,
        limit: i64,
    ) -> StoreResult<Vec<SwapResultRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT * FROM {table}
            WHERE pair_id = $1 AND ($2 = 'all' OR bind = $2)
            {}
            "#,
            history_clause(offset, limit)
        ))
        .bind(pair_id)
        .bind(address)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(result_from_classic_row).collect())
    }
}

#[async_trait]
impl SwapStore for PgSwapStore {
    async fn add_swapin(&self, swap: &SwapRecord) -> StoreResult<()> {
        self.add_classic("swapins", swap).await
    }

    async fn add_swapout(&self, swap: &SwapRecord) -> StoreResult<()> {
        self.add_classic("swapouts", swap).await
    }

    async fn add_router_swap(&self, swap: &SwapRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO router_swaps
                (from_chain_id, tx_id, log_index, pair_id, bind, tx_to, tx_type, status,
                 timestamp, memo, for_native, for_underlying, token, path, amount_out_min,
                 to_chain_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(&swap.from_chain_id)
        .bind(&swap.tx_id)
        .bind(swap.log_index as i64)
        .bind(&swap.pair_id)
        .bind(&swap.bind)
        .bind(&swap.tx_to)
        .bind(swap.tx_type.as_i16())
        .bind(swap.status.as_i16())
        .bind(swap.timestamp)
        .bind(&swap.memo)
        .bind(swap.for_native)
        .bind(swap.for_underlying)
        .bind(&swap.token)
        .bind(serde_json::to_string(&swap.path).unwrap_or_else(|_| "[]".into()))
        .bind(&swap.amount_out_min)
        .bind(&swap.to_chain_id)
        .execute(&self.pool)
        .await
        .map_err(map_insert_err)?;
        Ok(())
    }

    async fn find_swapin(&self, tx_id: &str, pair_id: &str, bind: &str) -> StoreResult<SwapRecord> {
        let row = self.find_classic("swapins", tx_id, pair_id, bind).await?;
        Ok(swap_from_classic_row(&row))
    }

    async fn find_swapout(
        &self,
        tx_id: &str,
        pair_id: &str,
        bind: &str,
    ) -> StoreResult<SwapRecord> {
        let row = self.find_classic("swapouts", tx_id, pair_id, bind).await?;
        Ok(swap_from_classic_row(&row))
    }

    async fn find_router_swap(
        &self,
        from_chain_id: &str,
        tx_id: &str,
        log_index: u32,
    ) -> StoreResult<SwapRecord> {
        let row = sqlx::query(
            r#"
            SELECT * FROM router_swaps
            WHERE from_chain_id = $1 AND tx_id = $2 AND log_index = $3
            "#,
        )
        .bind(from_chain_id)
        .bind(tx_id)
        .bind(log_index as i64)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;
        Ok(swap_from_router_row(&row))
    }

    async fn update_swapin_status(
        &self,
        tx_id: &str,
        pair_id: &str,
        bind: &str,
        status: SwapStatus,
        timestamp: i64,
        memo: Option<&str>,
    ) -> StoreResult<()> {
        self.update_classic_status("swapins", tx_id, pair_id, bind, status, timestamp, memo)
            .await
    }

    async fn update_swapout_status(
        &self,
        tx_id: &str,
        pair_id: &str,
        bind: &str,
        status: SwapStatus,
        timestamp: i64,
        memo: Option<&str>,
    ) -> StoreResult<()> {
        self.update_classic_status("swapouts", tx_id, pair_id, bind, status, timestamp, memo)
            .await
    }

    async fn add_swapin_result(&self, result: &SwapResultRecord) -> StoreResult<()> {
        self.add_classic_result("swapin_results", result).await
    }

    async fn add_swapout_result(&self, result: &SwapResultRecord) -> StoreResult<()> {
        self.add_classic_result("swapout_results", result).await
    }

    async fn add_router_swap_result(&self, result: &SwapResultRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO router_swap_results
                (from_chain_id, tx_id, log_index, pair_id, bind, tx_to, tx_type, status,
                 timestamp, memo, swap_tx, value, swap_height, swap_time, swap_nonce,
                 to_chain_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(&result.from_chain_id)
        .bind(&result.tx_id)
        .bind(result.log_index as i64)
        .bind(&result.pair_id)
        .bind(&result.bind)
        .bind(&result.tx_to)
        .bind(result.tx_type.as_i16())
        .bind(result.status.as_i16())
        .bind(result.timestamp)
        .bind(&result.memo)
        .bind(&result.swap_tx)
        .bind(&result.value)
        .bind(result.swap_height as i64)
        .bind(result.swap_time)
        .bind(result.swap_nonce as i64)
        .bind(&result.to_chain_id)
        .execute(&self.pool)
        .await
        .map_err(map_insert_err)?;
        Ok(())
    }

    async fn find_swapin_result(
        &self,
        tx_id: &str,
        pair_id: &str,
        bind: &str,
    ) -> StoreResult<SwapResultRecord> {
        let row = self
            .find_classic("swapin_results", tx_id, pair_id, bind)
            .await?;
        Ok(result_from_classic_row(&row))
    }

    async fn find_swapout_result(
        &self,
        tx_id: &str,
        pair_id: &str,
        bind: &str,
    ) -> StoreResult<SwapResultRecord> {
        let row = self
            .find_classic("swapout_results", tx_id, pair_id, bind)
            .await?;
        Ok(result_from_classic_row(&row))
    }

    async fn find_router_swap_result(
        &self,
        from_chain_id: &str,
        tx_id: &str,
        log_index: u32,
    ) -> StoreResult<SwapResultRecord> {
        let row = sqlx::query(
            r#"
            SELECT * FROM router_swap_results
            WHERE from_chain_id = $1 AND tx_id = $2 AND log_index = $3
            "#,
        )
        .bind(from_chain_id)
        .bind(tx_id)
        .bind(log_index as i64)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;
        Ok(result_from_router_row(&row))
    }

    async fn find_swapin_results(
        &self,
        address: &str,
        pair_id: &str,
        offset: i64,
        limit: i64,
    ) -> StoreResult<Vec<SwapResultRecord>> {
        self.find_classic_results("swapin_results", address, pair_id, offset, limit)
            .await
    }

    async fn find_swapout_results(
        &self,
        address: &str,
        pair_id: &str,
        offset: i64,
        limit: i64,
    ) -> StoreResult<Vec<SwapResultRecord>> {
        self.find_classic_results("swapout_results", address, pair_id, offset, limit)
            .await
    }

    async fn find_router_swap_results(
        &self,
        from_chain_id: &str,
        address: &str,
        offset: i64,
        limit: i64,
    ) -> StoreResult<Vec<SwapResultRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT * FROM router_swap_results
            WHERE from_chain_id = $1 AND ($2 = 'all' OR bind = $2)
            {}
            "#,
            history_clause(offset, limit)
        ))
        .bind(from_chain_id)
        .bind(address)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(result_from_router_row).collect())
    }

    async fn add_p2sh_address(&self, record: &P2shAddressRecord) -> StoreResult<()> {
        sqlx::query("INSERT INTO p2sh_addresses (bind_address, p2sh_address) VALUES ($1, $2)")
            .bind(&record.bind_address)
            .bind(&record.p2sh_address)
            .execute(&self.pool)
            .await
            .map_err(map_insert_err)?;
        Ok(())
    }

    async fn find_p2sh_address(&self, bind_address: &str) -> StoreResult<P2shAddressRecord> {
        let row = sqlx::query("SELECT * FROM p2sh_addresses WHERE bind_address = $1")
            .bind(bind_address)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(P2shAddressRecord {
            bind_address: row.get("bind_address"),
            p2sh_address: row.get("p2sh_address"),
        })
    }

    async fn find_p2sh_bind_address(&self, p2sh_address: &str) -> StoreResult<String> {
        let row = sqlx::query("SELECT bind_address FROM p2sh_addresses WHERE p2sh_address = $1")
            .bind(p2sh_address)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(row.get("bind_address"))
    }

    async fn add_registered_address(&self, address: &str, timestamp: i64) -> StoreResult<()> {
        sqlx::query("INSERT INTO registered_addresses (address, timestamp) VALUES ($1, $2)")
            .bind(address)
            .bind(timestamp)
            .execute(&self.pool)
            .await
            .map_err(map_insert_err)?;
        Ok(())
    }

    async fn find_registered_address(&self, address: &str) -> StoreResult<RegisteredAddress> {
        let row = sqlx::query("SELECT * FROM registered_addresses WHERE address = $1")
            .bind(address)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(RegisteredAddress {
            address: row.get("address"),
            timestamp: row.get("timestamp"),
        })
    }

    async fn get_latest_scan_info(&self, is_src: bool) -> StoreResult<LatestScanInfo> {
        let row = sqlx::query("SELECT * FROM latest_scan_info WHERE is_src = $1")
            .bind(is_src)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(LatestScanInfo {
            is_src: row.get("is_src"),
            block_height: row.get::<i64, _>("block_height") as u64,
            timestamp: row.get("timestamp"),
        })
    }

    async fn update_latest_scan_info(&self, is_src: bool, block_height: u64) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO latest_scan_info (is_src, block_height, timestamp)
            VALUES ($1, $2, $3)
            ON CONFLICT (is_src)
            DO UPDATE SET block_height = $2, timestamp = $3
            "#,
        )
        .bind(is_src)
        .bind(block_height as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_swap_statistics(&self, pair_id: &str) -> StoreResult<SwapStatistics> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM swapin_results WHERE pair_id = $1) AS swapin_count,
                (SELECT COUNT(*) FROM swapout_results WHERE pair_id = $1) AS swapout_count
            "#,
        )
        .bind(pair_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(SwapStatistics {
            pair_id: pair_id.to_string(),
            swapin_count: row.get::<i64, _>("swapin_count") as u64,
            swapout_count: row.get::<i64, _>("swapout_count") as u64,
        })
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
