//! redb-based storage layer for the edition ledger
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `orders` | `order_id` | `StoredOrder` | Latest accepted order payload |
//! | `line_items` | `line_item_id` | `LineItemRecord` | Current line-item state |
//! | `product_line_items` | `(product_id, line_item_id)` | `()` | Product index |
//! | `order_line_items` | `(order_id, line_item_id)` | `()` | Order index |
//! | `email_orders` | `(email, order_id)` | `()` | Collector lookup by email |
//! | `customer_orders` | `(customer_id, order_id)` | `()` | Collector lookup by customer |
//! | `warehouse_cache` | `id:<order id>` / `name:<order name>` | `WarehouseRecord` | PII fallback cache |
//! | `edition_events` | `sequence` | `EditionEvent` | Audit trail (append-only) |
//! | `events_by_line_item` | `(line_item_id, sequence)` | `()` | Audit index |
//! | `events_by_product` | `(product_id, sequence)` | `()` | Audit index |
//! | `ledger_meta` | `"event_seq"` | `u64` | Global event sequence |
//! | `audit_chain` | `"last_hash"` | `&str` | Hash of the newest event |
//!
//! # Durability
//!
//! redb commits are atomic (copy-on-write with atomic pointer swap). An edition
//! reassignment and the events it produces are written in one transaction, so a
//! failed commit leaves the previous numbering untouched.

use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use serde::{Deserialize, Serialize};
use shared::models::{
    EditionEvent, LineItemRecord, NewEditionEvent, OrderPayload, WarehouseRecord,
};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::audit::chain::{GENESIS_HASH, compute_event_hash};

const ORDERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("orders");

const LINE_ITEMS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("line_items");

const PRODUCT_ITEMS_TABLE: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("product_line_items");

const ORDER_ITEMS_TABLE: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("order_line_items");

const EMAIL_ORDERS_TABLE: TableDefinition<(&str, &str), ()> = TableDefinition::new("email_orders");

const CUSTOMER_ORDERS_TABLE: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("customer_orders");

const WAREHOUSE_CACHE_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("warehouse_cache");

const EVENTS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("edition_events");

const EVENTS_BY_LINE_ITEM_TABLE: TableDefinition<(&str, u64), ()> =
    TableDefinition::new("events_by_line_item");

const EVENTS_BY_PRODUCT_TABLE: TableDefinition<(&str, u64), ()> =
    TableDefinition::new("events_by_product");

const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("ledger_meta");

const CHAIN_TABLE: TableDefinition<&str, &str> = TableDefinition::new("audit_chain");

const EVENT_SEQ_KEY: &str = "event_seq";
const LAST_HASH_KEY: &str = "last_hash";

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Line item not found: {0}")]
    LineItemNotFound(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for shared::error::AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::LineItemNotFound(id) => shared::error::AppError::line_item_not_found(id),
            StorageError::Serialization(e) => {
                shared::error::AppError::storage_corrupted(format!("Undecodable record: {e}"))
            }
            other => shared::error::AppError::database(other.to_string()),
        }
    }
}

/// Latest accepted payload for an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOrder {
    pub order_id: String,
    pub order_name: Option<String>,
    pub payload: OrderPayload,
    /// Raw payload as received, retained for replay/debug
    pub raw: serde_json::Value,
    /// Email recovered by identity resolution when the payload carries none
    #[serde(default)]
    pub resolved_email: Option<String>,
    /// Unix millis
    pub stored_at: i64,
}

impl StoredOrder {
    /// Upstream `updated_at` in millis, if the feed provides one
    pub fn updated_at_millis(&self) -> Option<i64> {
        self.payload.updated_at.map(|t| t.timestamp_millis())
    }

    /// Normalized buyer email used for the collector index
    pub fn index_email(&self) -> Option<String> {
        self.payload
            .email
            .as_deref()
            .or_else(|| self.payload.customer.as_ref().and_then(|c| c.email.as_deref()))
            .or(self.resolved_email.as_deref())
            .and_then(shared::util::normalize_email)
    }

    pub fn customer_id(&self) -> Option<&str> {
        self.payload.customer.as_ref().and_then(|c| c.id.as_deref())
    }
}

/// Ledger storage backed by redb
#[derive(Clone)]
pub struct LedgerStorage {
    db: Arc<Database>,
}

impl std::fmt::Debug for LedgerStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerStorage").finish_non_exhaustive()
    }
}

impl LedgerStorage {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory database (tests and tooling)
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StorageResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ORDERS_TABLE)?;
            let _ = write_txn.open_table(LINE_ITEMS_TABLE)?;
            let _ = write_txn.open_table(PRODUCT_ITEMS_TABLE)?;
            let _ = write_txn.open_table(ORDER_ITEMS_TABLE)?;
            let _ = write_txn.open_table(EMAIL_ORDERS_TABLE)?;
            let _ = write_txn.open_table(CUSTOMER_ORDERS_TABLE)?;
            let _ = write_txn.open_table(WAREHOUSE_CACHE_TABLE)?;
            let _ = write_txn.open_table(EVENTS_TABLE)?;
            let _ = write_txn.open_table(EVENTS_BY_LINE_ITEM_TABLE)?;
            let _ = write_txn.open_table(EVENTS_BY_PRODUCT_TABLE)?;
            let _ = write_txn.open_table(CHAIN_TABLE)?;

            let mut meta = write_txn.open_table(META_TABLE)?;
            if meta.get(EVENT_SEQ_KEY)?.is_none() {
                meta.insert(EVENT_SEQ_KEY, 0u64)?;
            }
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Begin a write transaction
    pub fn begin_write(&self) -> StorageResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    // ========== Orders ==========

    pub fn get_order(&self, order_id: &str) -> StorageResult<Option<StoredOrder>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDERS_TABLE)?;
        match table.get(order_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Get an order (within transaction)
    pub fn get_order_txn(
        &self,
        txn: &WriteTransaction,
        order_id: &str,
    ) -> StorageResult<Option<StoredOrder>> {
        let table = txn.open_table(ORDERS_TABLE)?;
        match table.get(order_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Store an order and keep the collector indexes in step with it
    pub fn put_order(
        &self,
        txn: &WriteTransaction,
        order: &StoredOrder,
        previous: Option<&StoredOrder>,
    ) -> StorageResult<()> {
        {
            let mut table = txn.open_table(ORDERS_TABLE)?;
            let value = serde_json::to_vec(order)?;
            table.insert(order.order_id.as_str(), value.as_slice())?;
        }

        let order_id = order.order_id.as_str();
        let new_email = order.index_email();
        let old_email = previous.and_then(|p| p.index_email());
        {
            let mut table = txn.open_table(EMAIL_ORDERS_TABLE)?;
            if let Some(old) = old_email.as_deref()
                && new_email.as_deref() != Some(old)
            {
                table.remove((old, order_id))?;
            }
            if let Some(email) = new_email.as_deref() {
                table.insert((email, order_id), ())?;
            }
        }

        let new_customer = order.customer_id();
        let old_customer = previous.and_then(|p| p.customer_id());
        {
            let mut table = txn.open_table(CUSTOMER_ORDERS_TABLE)?;
            if let Some(old) = old_customer
                && new_customer != Some(old)
            {
                table.remove((old, order_id))?;
            }
            if let Some(customer) = new_customer {
                table.insert((customer, order_id), ())?;
            }
        }
        Ok(())
    }

    pub fn orders_for_email(&self, email: &str) -> StorageResult<Vec<StoredOrder>> {
        let Some(email) = shared::util::normalize_email(email) else {
            return Ok(Vec::new());
        };
        self.orders_by_index(EMAIL_ORDERS_TABLE, &email)
    }

    pub fn orders_for_customer(&self, customer_id: &str) -> StorageResult<Vec<StoredOrder>> {
        self.orders_by_index(CUSTOMER_ORDERS_TABLE, customer_id.trim())
    }

    fn orders_by_index(
        &self,
        index: TableDefinition<'static, (&'static str, &'static str), ()>,
        prefix: &str,
    ) -> StorageResult<Vec<StoredOrder>> {
        let read_txn = self.db.begin_read()?;
        let index_table = read_txn.open_table(index)?;
        let orders_table = read_txn.open_table(ORDERS_TABLE)?;

        let mut orders = Vec::new();
        for result in index_table.range((prefix, "")..)? {
            let (key, _) = result?;
            let (owner, order_id) = key.value();
            if owner != prefix {
                break;
            }
            if let Some(value) = orders_table.get(order_id)? {
                orders.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(orders)
    }

    // ========== Line Items ==========

    pub fn get_line_item(&self, line_item_id: &str) -> StorageResult<Option<LineItemRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(LINE_ITEMS_TABLE)?;
        match table.get(line_item_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Get a line item (within transaction)
    pub fn get_line_item_txn(
        &self,
        txn: &WriteTransaction,
        line_item_id: &str,
    ) -> StorageResult<Option<LineItemRecord>> {
        let table = txn.open_table(LINE_ITEMS_TABLE)?;
        match table.get(line_item_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Store a line item, moving its index entries if product or order changed
    pub fn put_line_item(
        &self,
        txn: &WriteTransaction,
        record: &LineItemRecord,
        previous: Option<&LineItemRecord>,
    ) -> StorageResult<()> {
        let id = record.line_item_id.as_str();
        {
            let mut table = txn.open_table(LINE_ITEMS_TABLE)?;
            let value = serde_json::to_vec(record)?;
            table.insert(id, value.as_slice())?;
        }
        {
            let mut table = txn.open_table(PRODUCT_ITEMS_TABLE)?;
            if let Some(prev) = previous
                && prev.product_id != record.product_id
            {
                table.remove((prev.product_id.as_str(), id))?;
            }
            table.insert((record.product_id.as_str(), id), ())?;
        }
        {
            let mut table = txn.open_table(ORDER_ITEMS_TABLE)?;
            if let Some(prev) = previous
                && prev.order_id != record.order_id
            {
                table.remove((prev.order_id.as_str(), id))?;
            }
            table.insert((record.order_id.as_str(), id), ())?;
        }
        Ok(())
    }

    pub fn line_items_for_product(&self, product_id: &str) -> StorageResult<Vec<LineItemRecord>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(PRODUCT_ITEMS_TABLE)?;
        let items = read_txn.open_table(LINE_ITEMS_TABLE)?;
        collect_indexed(&index, &items, product_id)
    }

    /// All line items of a product (within transaction)
    pub fn line_items_for_product_txn(
        &self,
        txn: &WriteTransaction,
        product_id: &str,
    ) -> StorageResult<Vec<LineItemRecord>> {
        let index = txn.open_table(PRODUCT_ITEMS_TABLE)?;
        let items = txn.open_table(LINE_ITEMS_TABLE)?;
        collect_indexed(&index, &items, product_id)
    }

    pub fn line_items_for_order(&self, order_id: &str) -> StorageResult<Vec<LineItemRecord>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(ORDER_ITEMS_TABLE)?;
        let items = read_txn.open_table(LINE_ITEMS_TABLE)?;
        collect_indexed(&index, &items, order_id)
    }

    /// Distinct product ids that have at least one line item
    pub fn product_ids(&self) -> StorageResult<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(PRODUCT_ITEMS_TABLE)?;
        let mut ids = BTreeSet::new();
        for result in index.iter()? {
            let (key, _) = result?;
            ids.insert(key.value().0.to_string());
        }
        Ok(ids.into_iter().collect())
    }

    // ========== Warehouse Cache ==========

    pub fn get_warehouse_record(&self, key: &str) -> StorageResult<Option<WarehouseRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WAREHOUSE_CACHE_TABLE)?;
        match table.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Cache a warehouse record under every key it was matched against
    pub fn put_warehouse_record(&self, record: &WarehouseRecord) -> StorageResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(WAREHOUSE_CACHE_TABLE)?;
            let value = serde_json::to_vec(record)?;
            for key in &record.matched_keys {
                table.insert(key.as_str(), value.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    // ========== Edition Events ==========

    /// Append an event to the audit trail (within transaction)
    ///
    /// Assigns the next global sequence and chains the hash onto the previous
    /// event. No update or delete counterpart exists.
    pub fn append_event(
        &self,
        txn: &WriteTransaction,
        event: NewEditionEvent,
        timestamp: i64,
    ) -> StorageResult<EditionEvent> {
        let sequence = {
            let mut meta = txn.open_table(META_TABLE)?;
            let current = meta.get(EVENT_SEQ_KEY)?.map(|g| g.value()).unwrap_or(0);
            let next = current + 1;
            meta.insert(EVENT_SEQ_KEY, next)?;
            next
        };

        let prev_hash = {
            let chain = txn.open_table(CHAIN_TABLE)?;
            chain
                .get(LAST_HASH_KEY)?
                .map(|g| g.value().to_string())
                .unwrap_or_else(|| GENESIS_HASH.to_string())
        };

        let mut stored = EditionEvent {
            sequence,
            line_item_id: event.line_item_id,
            product_id: event.product_id,
            edition_number: event.edition_number,
            event_type: event.event_type,
            event_data: event.event_data,
            actor: event.actor,
            timestamp,
            prev_hash,
            curr_hash: String::new(),
        };
        stored.curr_hash = compute_event_hash(&stored);

        {
            let mut table = txn.open_table(EVENTS_TABLE)?;
            let value = serde_json::to_vec(&stored)?;
            table.insert(sequence, value.as_slice())?;
        }
        {
            let mut table = txn.open_table(EVENTS_BY_LINE_ITEM_TABLE)?;
            table.insert((stored.line_item_id.as_str(), sequence), ())?;
        }
        {
            let mut table = txn.open_table(EVENTS_BY_PRODUCT_TABLE)?;
            table.insert((stored.product_id.as_str(), sequence), ())?;
        }
        {
            let mut chain = txn.open_table(CHAIN_TABLE)?;
            chain.insert(LAST_HASH_KEY, stored.curr_hash.as_str())?;
        }

        Ok(stored)
    }

    pub fn events_for_line_item(&self, line_item_id: &str) -> StorageResult<Vec<EditionEvent>> {
        self.events_by_index(EVENTS_BY_LINE_ITEM_TABLE, line_item_id)
    }

    pub fn events_for_product(&self, product_id: &str) -> StorageResult<Vec<EditionEvent>> {
        self.events_by_index(EVENTS_BY_PRODUCT_TABLE, product_id)
    }

    fn events_by_index(
        &self,
        index: TableDefinition<'static, (&'static str, u64), ()>,
        key: &str,
    ) -> StorageResult<Vec<EditionEvent>> {
        let read_txn = self.db.begin_read()?;
        let index_table = read_txn.open_table(index)?;
        let events = read_txn.open_table(EVENTS_TABLE)?;

        let mut out = Vec::new();
        for result in index_table.range((key, 0u64)..=(key, u64::MAX))? {
            let (k, _) = result?;
            let (_, sequence) = k.value();
            if let Some(value) = events.get(sequence)? {
                out.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(out)
    }

    /// Events in sequence order, starting after `since` (exclusive)
    pub fn events_since(&self, since: u64, limit: usize) -> StorageResult<Vec<EditionEvent>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(EVENTS_TABLE)?;
        let Some(start) = since.checked_add(1) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for result in table.range(start..)? {
            let (_, value) = result?;
            out.push(serde_json::from_slice(value.value())?);
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    pub fn event_count(&self) -> StorageResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(EVENTS_TABLE)?;
        Ok(table.len()?)
    }
}

fn collect_indexed(
    index: &impl ReadableTable<(&'static str, &'static str), ()>,
    items: &impl ReadableTable<&'static str, &'static [u8]>,
    prefix: &str,
) -> StorageResult<Vec<LineItemRecord>> {
    let mut out = Vec::new();
    for result in index.range((prefix, "")..)? {
        let (key, _) = result?;
        let (owner, line_item_id) = key.value();
        if owner != prefix {
            break;
        }
        if let Some(value) = items.get(line_item_id)? {
            out.push(serde_json::from_slice(value.value())?);
        }
    }
    Ok(out)
}
