//! The record store - main coordinator for all operations
//!
//! One mutex guards the data file handle and every index together. Each
//! public operation holds it from start to finish, so an
//! unindex/write/reindex sequence is never observable half-applied.

use std::collections::HashSet;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::audit::AuditLog;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::events::{ChangeEvent, EventBus, Subscription};
use crate::export;
use crate::index::IndexSet;
use crate::query::{parse_int, Assignment, Comparison, Field};
use crate::storage::{Record, SlotFile, SlotFlags};

/// Aggregates over every live record
#[derive(Debug, Default, Clone, PartialEq)]
pub struct InventoryStats {
    pub total_records: usize,
    pub total_quantity: i64,
    /// Sum of quantity x price
    pub total_value: f64,
    /// Records with quantity strictly below the threshold
    pub low_stock: usize,
}

impl InventoryStats {
    fn from_records(records: &[Record], threshold: i32) -> Self {
        InventoryStats {
            total_records: records.len(),
            total_quantity: records.iter().map(|r| r.quantity as i64).sum(),
            total_value: records.iter().map(Record::stock_value).sum(),
            low_stock: records.iter().filter(|r| r.quantity < threshold).count(),
        }
    }
}

/// Check if two paths name the same existing file
fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// State guarded by the store mutex
struct StoreInner {
    /// Configured data file, remembered across close/drop
    path: Option<PathBuf>,
    file: Option<SlotFile>,
    indexes: IndexSet,
    audit: AuditLog,
}

impl StoreInner {
    fn file(&mut self) -> StoreResult<&mut SlotFile> {
        self.file.as_mut().ok_or(StoreError::NotOpen)
    }

    fn path(&self) -> StoreResult<PathBuf> {
        self.path.clone().ok_or(StoreError::NoPath)
    }

    fn close(&mut self) {
        if let Some(file) = self.file.take() {
            debug!("Closing {:?}", file.path);
        }
        self.indexes.clear();
    }

    fn open_or_create(&mut self, path: &Path) -> StoreResult<usize> {
        self.close();
        self.path = Some(path.to_path_buf());

        let (mut file, created) = SlotFile::open_or_create(path)?;
        let count = self.indexes.rebuild(&mut file)?;
        self.file = Some(file);

        if created {
            info!("Created database file {:?}", path);
            self.audit.record("CREATE", &format!("path={}", path.display()));
        } else {
            info!("Opened database file {:?} ({} records)", path, count);
            self.audit
                .record("OPEN", &format!("path={} records={}", path.display(), count));
        }
        Ok(count)
    }

    /// Decode the live record with `id`.
    ///
    /// An id entry pointing at a tombstone means the indexes have diverged
    /// from the file; every entry for that offset is dropped and the record
    /// treated as absent.
    fn lookup(&mut self, id: i32) -> StoreResult<Option<(u64, Record)>> {
        let Some(offset) = self.indexes.offset_of(id) else {
            return Ok(None);
        };
        let slot = self.file()?.read_slot(offset)?;
        match slot {
            Some(record) => Ok(Some((offset, record))),
            None => {
                warn!("Index points id {} at tombstoned offset {}, dropping entries", id, offset);
                self.indexes.forget_offset(offset);
                Ok(None)
            }
        }
    }

    /// Decode the slot at `offset` if it is still live.
    ///
    /// A tombstoned slot has its stale index entries dropped.
    fn read_live(&mut self, offset: u64) -> StoreResult<Option<Record>> {
        let record = self.file()?.read_slot(offset)?;
        if record.is_none() {
            warn!("Index points at tombstoned offset {}, dropping entries", offset);
            self.indexes.forget_offset(offset);
        }
        Ok(record)
    }

    /// Replace `old` at `offset` with `new`, keeping indexes in step.
    ///
    /// If the write fails the old index entries are put back, so indexes
    /// still describe what the slot held before.
    fn rewrite(&mut self, offset: u64, old: &Record, new: Record) -> StoreResult<()> {
        self.indexes.unindex(old, offset);
        let written = match self.file.as_mut() {
            Some(file) => file.write_slot(offset, &new, SlotFlags::empty()),
            None => Err(StoreError::NotOpen),
        };
        match written {
            Ok(()) => {
                self.indexes.index(&new, offset);
                Ok(())
            }
            Err(e) => {
                self.indexes.index(old, offset);
                Err(e)
            }
        }
    }

    /// Mark the slot at `offset` deleted and drop it from the indexes
    fn tombstone(&mut self, offset: u64, record: &Record) -> StoreResult<()> {
        self.file()?.write_slot(offset, record, SlotFlags::DELETED)?;
        self.indexes.unindex(record, offset);
        Ok(())
    }

    fn insert(&mut self, record: Record) -> StoreResult<bool> {
        self.file()?;
        if !record.is_valid() {
            debug!("Rejecting record {} with blank name", record.id);
            return Ok(false);
        }
        if self.indexes.contains_id(record.id) {
            debug!("Rejecting duplicate id {}", record.id);
            return Ok(false);
        }

        let record = record.normalized();
        let offset = self.file()?.append(&record)?;
        self.indexes.index(&record, offset);
        Ok(true)
    }

    fn decode_all(&mut self, offsets: &[u64]) -> StoreResult<Vec<Record>> {
        let mut records = Vec::with_capacity(offsets.len());
        for &offset in offsets {
            if let Some(record) = self.read_live(offset)? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

/// A single-table inventory store backed by one data file
pub struct RecordStore {
    inner: Mutex<StoreInner>,
    events: EventBus,
    low_stock_threshold: i32,
}

impl RecordStore {
    /// Create a store that has not opened any file yet
    pub fn new(config: &StoreConfig) -> Self {
        RecordStore {
            inner: Mutex::new(StoreInner {
                path: Some(config.data_file.clone()),
                file: None,
                indexes: IndexSet::new(),
                audit: AuditLog::new(config.audit_log.clone()),
            }),
            events: EventBus::new(config.event_capacity),
            low_stock_threshold: config.low_stock_threshold,
        }
    }

    /// Create a store and open (or create) its configured data file
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let store = Self::new(config);
        store.open_or_create(&config.data_file)?;
        Ok(store)
    }

    // ---------- Lifecycle ----------

    /// Open `path`, creating an empty file if missing, and rebuild indexes.
    ///
    /// Returns the number of live records found.
    pub fn open_or_create(&self, path: impl AsRef<Path>) -> StoreResult<usize> {
        let count = self.inner.lock().open_or_create(path.as_ref())?;
        self.events.publish(ChangeEvent::Opened);
        Ok(count)
    }

    /// Switch to `path`, truncating it to an empty database
    pub fn create_new(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let path = path.as_ref();
        let mut inner = self.inner.lock();
        inner.close();
        inner.path = Some(path.to_path_buf());
        inner.file = Some(SlotFile::create(path)?);
        info!("Created empty database {:?}", path);
        inner.audit.record("CREATE", &format!("path={} truncated=true", path.display()));
        self.events.publish(ChangeEvent::Created);
        Ok(())
    }

    /// Close and remove the data file from disk.
    ///
    /// The path is remembered, so [`load`](Self::load) recreates it.
    pub fn delete_database(&self) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.close();
        if let Some(path) = inner.path.clone() {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            info!("Deleted database file {:?}", path);
            inner.audit.record("DROP", &format!("path={}", path.display()));
        }
        self.events.publish(ChangeEvent::Dropped);
        Ok(())
    }

    /// Truncate the data file to zero length and drop all indexes
    pub fn clear(&self) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.file()?.truncate()?;
        inner.indexes.clear();
        let path = inner.path()?;
        inner.audit.record("CLEAR", &format!("path={}", path.display()));
        self.events.publish(ChangeEvent::Cleared);
        Ok(())
    }

    /// Same as [`clear`](Self::clear)
    pub fn delete_all(&self) -> StoreResult<()> {
        self.clear()
    }

    /// Reopen the configured file if closed, otherwise rebuild indexes
    pub fn load(&self) -> StoreResult<usize> {
        let mut inner = self.inner.lock();
        let path = inner.path()?;
        if inner.file.is_none() {
            let count = inner.open_or_create(&path)?;
            drop(inner);
            self.events.publish(ChangeEvent::Opened);
            return Ok(count);
        }
        let StoreInner { file, indexes, .. } = &mut *inner;
        match file.as_mut() {
            Some(file) => indexes.rebuild(file),
            None => Err(StoreError::NotOpen),
        }
    }

    /// Force file contents to stable storage
    pub fn flush(&self) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.file()?.flush()?;
        let path = inner.path()?;
        inner.audit.record("SAVE", &format!("path={}", path.display()));
        Ok(())
    }

    /// Close the data file. Indexes are dropped with it.
    pub fn close(&self) {
        self.inner.lock().close();
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().file.is_some()
    }

    /// Configured data file path
    pub fn path(&self) -> Option<PathBuf> {
        self.inner.lock().path.clone()
    }

    /// The audit trail this store writes to
    pub fn audit_log(&self) -> AuditLog {
        self.inner.lock().audit.clone()
    }

    // ---------- CRUD ----------

    /// Append a record.
    ///
    /// Returns `false` without error for a blank name or an id that is
    /// already live. Over-long text is truncated to slot capacity.
    pub fn insert(&self, record: Record) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        let id = record.id;
        let name = record.name.clone();
        if !inner.insert(record)? {
            return Ok(false);
        }
        inner.audit.record("INSERT", &format!("id={} name={}", id, name));
        self.events.publish(ChangeEvent::Inserted { id });
        Ok(true)
    }

    /// Tombstone the record with `id`. Returns `false` if not found.
    pub fn delete_by_id(&self, id: i32) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        inner.file()?;
        let Some((offset, record)) = inner.lookup(id)? else {
            return Ok(false);
        };
        inner.tombstone(offset, &record)?;
        inner.audit.record("DELETE", &format!("id={}", id));
        self.events.publish(ChangeEvent::Deleted { id });
        Ok(true)
    }

    /// Tombstone every record where `field = value`, returning the count.
    ///
    /// An unknown field or no matches is a no-op returning 0.
    pub fn delete_where(&self, field: &str, value: &str) -> StoreResult<usize> {
        let mut inner = self.inner.lock();
        inner.file()?;
        let Some(field) = Field::parse(field) else {
            return Ok(0);
        };

        let offsets = inner.indexes.equality(field, value);
        let mut deleted = 0;
        for offset in offsets {
            let Some(record) = inner.read_live(offset)? else {
                continue;
            };
            inner.tombstone(offset, &record)?;
            deleted += 1;
        }

        if deleted > 0 {
            inner.audit.record(
                "DELETE_WHERE",
                &format!("{}={} count={}", field, value, deleted),
            );
            self.events.publish(ChangeEvent::DeletedWhere { count: deleted });
        }
        Ok(deleted)
    }

    /// `UPDATE field = new_value WHERE where_field = where_value`.
    ///
    /// Only a `where_field` of `id` may change a record's id, and only to an
    /// id that is not already live. Rows are left untouched when the new
    /// value is malformed for the field. Returns the number of rows written.
    pub fn update(
        &self,
        field: &str,
        new_value: &str,
        where_field: &str,
        where_value: &str,
    ) -> StoreResult<usize> {
        let mut inner = self.inner.lock();
        inner.file()?;
        let (Some(field), Some(where_field)) = (Field::parse(field), Field::parse(where_field))
        else {
            return Ok(0);
        };
        let Some(change) = Assignment::parse(field, new_value) else {
            debug!("Ignoring malformed value {:?} for {}", new_value, field);
            return Ok(0);
        };

        if where_field == Field::Id {
            let Some(id) = parse_int(where_value) else {
                return Ok(0);
            };
            let Some((offset, old)) = inner.lookup(id)? else {
                return Ok(0);
            };
            if let Assignment::Id(new_id) = &change {
                let new_id = *new_id;
                if new_id != old.id && inner.indexes.contains_id(new_id) {
                    debug!("Refusing to renumber {} to existing id {}", old.id, new_id);
                    return Ok(0);
                }
            }

            let new = change.apply(&old);
            inner.rewrite(offset, &old, new)?;
            inner
                .audit
                .record("UPDATE", &format!("id={} field={} value={}", id, field, new_value));
            self.events.publish(ChangeEvent::Updated { count: 1 });
            return Ok(1);
        }

        // Renumbering several rows at once could collide with itself
        if field == Field::Id {
            return Ok(0);
        }

        let offsets = inner.indexes.equality(where_field, where_value);
        let mut updated = 0;
        for offset in offsets {
            let Some(old) = inner.read_live(offset)? else {
                continue;
            };
            let new = change.apply(&old);
            inner.rewrite(offset, &old, new)?;
            updated += 1;
        }

        if updated > 0 {
            inner.audit.record(
                "UPDATE",
                &format!(
                    "{}={} field={} value={} count={}",
                    where_field, where_value, field, new_value, updated
                ),
            );
            self.events.publish(ChangeEvent::Updated { count: updated });
        }
        Ok(updated)
    }

    /// Add `amount` to the stock of `id`.
    ///
    /// Returns `false` for an unknown id, a negative amount, or overflow.
    pub fn supply(&self, id: i32, amount: i32) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        inner.file()?;
        if amount < 0 {
            return Ok(false);
        }
        let Some((offset, old)) = inner.lookup(id)? else {
            return Ok(false);
        };
        let Some(quantity) = old.quantity.checked_add(amount) else {
            return Ok(false);
        };

        let new = Record { quantity, ..old.clone() };
        inner.rewrite(offset, &old, new)?;
        inner.audit.record("SUPPLY", &format!("id={} amount={}", id, amount));
        self.events.publish(ChangeEvent::Supplied { id, amount });
        Ok(true)
    }

    /// Remove `amount` from the stock of `id`.
    ///
    /// Returns `false` for an unknown id, a negative amount, or an amount
    /// larger than the current stock; quantity never goes negative here.
    pub fn sell(&self, id: i32, amount: i32) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        inner.file()?;
        if amount < 0 {
            return Ok(false);
        }
        let Some((offset, old)) = inner.lookup(id)? else {
            return Ok(false);
        };
        if amount > old.quantity {
            debug!("Cannot sell {} of id {}, only {} in stock", amount, id, old.quantity);
            return Ok(false);
        }

        let new = Record {
            quantity: old.quantity - amount,
            ..old.clone()
        };
        inner.rewrite(offset, &old, new)?;
        inner.audit.record("SELL", &format!("id={} amount={}", id, amount));
        self.events.publish(ChangeEvent::Sold { id, amount });
        Ok(true)
    }

    // ---------- Queries ----------

    /// Records where `field <op> value`, freshly decoded from the file.
    ///
    /// Unknown fields or operators, range operators on text fields, and
    /// malformed numbers all yield an empty result.
    pub fn search(&self, field: &str, value: &str, op: &str) -> StoreResult<Vec<Record>> {
        let (Some(field), Some(op)) = (Field::parse(field), Comparison::parse(op)) else {
            self.inner.lock().file()?;
            return Ok(Vec::new());
        };
        self.find(field, op, value)
    }

    /// [`search`](Self::search) with the `=` operator
    pub fn search_eq(&self, field: &str, value: &str) -> StoreResult<Vec<Record>> {
        self.search(field, value, "=")
    }

    /// Typed form of [`search`](Self::search)
    pub fn find(&self, field: Field, op: Comparison, value: &str) -> StoreResult<Vec<Record>> {
        let mut inner = self.inner.lock();
        inner.file()?;
        let offsets = inner.indexes.select(field, op, value);
        inner.decode_all(&offsets)
    }

    /// Every live record, by a full sequential scan.
    ///
    /// This is O(n) in file size, meant for bulk display and export only.
    pub fn get_all(&self) -> StoreResult<Vec<Record>> {
        let mut inner = self.inner.lock();
        let records = inner.file()?.scan()?;
        Ok(records.into_iter().map(|(_, record)| record).collect())
    }

    /// Number of live records, from the id index
    pub fn len(&self) -> usize {
        self.inner.lock().indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check that the indexes agree with the file.
    ///
    /// Every id entry must decode to a live record with that id, and the set
    /// of indexed ids must equal the set of ids a full scan finds.
    pub fn verify_indexes(&self) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        inner.file()?;

        let indexed: Vec<i32> = inner.indexes.ids().collect();
        for &id in &indexed {
            let Some(offset) = inner.indexes.offset_of(id) else {
                return Ok(false);
            };
            match inner.file()?.read_slot(offset)? {
                Some(record) if record.id == id => {}
                _ => return Ok(false),
            }
        }

        let scanned: HashSet<i32> = inner.file()?.scan()?.into_iter().map(|(_, r)| r.id).collect();
        Ok(scanned == indexed.into_iter().collect::<HashSet<_>>())
    }

    // ---------- Aggregates ----------

    /// All aggregates from a single scan
    pub fn stats(&self, low_stock_threshold: i32) -> StoreResult<InventoryStats> {
        let records = self.get_all()?;
        Ok(InventoryStats::from_records(&records, low_stock_threshold))
    }

    pub fn total_records(&self) -> StoreResult<usize> {
        Ok(self.get_all()?.len())
    }

    pub fn total_quantity(&self) -> StoreResult<i64> {
        Ok(self.get_all()?.iter().map(|r| r.quantity as i64).sum())
    }

    /// Sum of quantity x price over all records
    pub fn total_value(&self) -> StoreResult<f64> {
        Ok(self.get_all()?.iter().map(Record::stock_value).sum())
    }

    /// Records with quantity strictly below `threshold`
    pub fn low_stock_count(&self, threshold: i32) -> StoreResult<usize> {
        Ok(self.get_all()?.iter().filter(|r| r.quantity < threshold).count())
    }

    /// Threshold from the store configuration
    pub fn low_stock_threshold(&self) -> i32 {
        self.low_stock_threshold
    }

    // ---------- Backup / Restore / Export ----------

    /// Copy the data file byte for byte to `dest`.
    ///
    /// `dest` must not be the data file itself: copying a file onto itself
    /// truncates it.
    pub fn backup(&self, dest: impl AsRef<Path>) -> StoreResult<()> {
        let dest = dest.as_ref();
        let mut inner = self.inner.lock();
        inner.file()?.flush()?;
        let path = inner.path()?;
        if same_file(dest, &path) {
            return Err(StoreError::BackupIsActive(dest.to_path_buf()));
        }
        fs::copy(&path, dest)?;
        info!("Backed up {:?} to {:?}", path, dest);
        inner.audit.record("BACKUP", &format!("path={}", dest.display()));
        Ok(())
    }

    /// Replace the data file with a copy of `src` and rebuild indexes.
    ///
    /// Returns the number of live records restored. If the copy fails the
    /// previous file is reopened before the error is returned.
    pub fn restore(&self, src: impl AsRef<Path>) -> StoreResult<usize> {
        let src = src.as_ref();
        let mut inner = self.inner.lock();
        let path = inner.path()?;
        if !src.is_file() {
            return Err(StoreError::BackupNotFound(src.to_path_buf()));
        }

        let from_active = same_file(src, &path);

        inner.close();
        if !from_active {
            if let Err(e) = fs::copy(src, &path) {
                warn!("Restore from {:?} failed: {}, reopening {:?}", src, e, path);
                let (mut file, _) = SlotFile::open_or_create(&path)?;
                inner.indexes.rebuild(&mut file)?;
                inner.file = Some(file);
                return Err(e.into());
            }
        }

        let (mut file, _) = SlotFile::open_or_create(&path)?;
        let count = inner.indexes.rebuild(&mut file)?;
        inner.file = Some(file);
        info!("Restored {:?} from {:?} ({} records)", path, src, count);
        inner
            .audit
            .record("RESTORE", &format!("path={} records={}", src.display(), count));
        self.events.publish(ChangeEvent::Restored);
        Ok(count)
    }

    /// Write every live record to `dest` as semicolon-delimited CSV
    pub fn export_csv(&self, dest: impl AsRef<Path>) -> StoreResult<usize> {
        let dest = dest.as_ref();
        let mut inner = self.inner.lock();
        let records: Vec<Record> = inner.file()?.scan()?.into_iter().map(|(_, r)| r).collect();
        let count = export::write_csv(dest, &records)?;
        inner
            .audit
            .record("EXPORT", &format!("path={} count={}", dest.display(), count));
        Ok(count)
    }

    /// Insert every row of a CSV file through the normal insert path.
    ///
    /// Returns `(inserted, rejected)`. A malformed line stops the import with
    /// an error; rows before it stay inserted.
    pub fn import_csv(&self, src: impl AsRef<Path>) -> StoreResult<(usize, usize)> {
        let src = src.as_ref();
        let reader = BufReader::new(fs::File::open(src)?);
        let mut inner = self.inner.lock();
        inner.file()?;

        let mut inserted = 0;
        let mut rejected = 0;
        let mut outcome = Ok(());
        for (i, line) in reader.lines().enumerate() {
            let parsed = line
                .map_err(StoreError::from)
                .and_then(|line| export::parse_row(&line, i + 1));
            let record = match parsed {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            };
            let id = record.id;
            match inner.insert(record) {
                Ok(true) => {
                    inserted += 1;
                    self.events.publish(ChangeEvent::Inserted { id });
                }
                Ok(false) => rejected += 1,
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        inner.audit.record(
            "IMPORT",
            &format!("path={} inserted={} rejected={}", src.display(), inserted, rejected),
        );
        outcome.map(|()| (inserted, rejected))
    }

    // ---------- Change notification ----------

    /// Receive a [`ChangeEvent`] after every successful mutation
    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }
}
