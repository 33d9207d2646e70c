//! redb-based document store for the check-in engine
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `members` | `member_id` | `Member` | Member documents |
//! | `attendance` | `record_id` | `AttendanceRecord` | Attendance records |
//! | `member_day` | `(member_id, date)` | `Vec<record_id>` | Valid sessions per member per day |
//! | `branch_day` | `(branch_id, date)` | `Vec<record_id>` | All records per branch per day |
//! | `schedules` | `(branch_id, date)` | `Vec<ClassSlot>` | Mirrored class schedules |
//! | `pending_checkins` | `pending_id` | `PendingCheckIn` | Offline queue (durable tier) |
//! | `dead_letter` | `pending_id` | `DeadLetterEntry` | Replays that gave up |
//! | `checkin_requests` | `request_id` | `record_id` | Sessions already committed per request |
//!
//! # Transactions
//!
//! Member writes are conditional on `Member::version`. Callers read in a
//! read transaction, decide, then commit with the version they saw; a
//! concurrent writer makes the commit fail with `VersionConflict` and the
//! caller retries. A commit writes the member, the record and both
//! indexes in one redb write transaction, so either all land or none do.
//!
//! # Durability
//!
//! redb commits with `Durability::Immediate` by default: once `commit()`
//! returns the data survives power loss.

use chrono::NaiveDate;
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition, WriteTransaction};
use shared::models::{AttendanceRecord, ClassSlot, DeadLetterEntry, Member, PendingCheckIn};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

const MEMBERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("members");

const ATTENDANCE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("attendance");

/// key = (member_id, "YYYY-MM-DD"), value = JSON Vec<record_id> (valid only)
const MEMBER_DAY_TABLE: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("member_day");

/// key = (branch_id, "YYYY-MM-DD"), value = JSON Vec<record_id> (valid + denied)
const BRANCH_DAY_TABLE: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("branch_day");

const SCHEDULES_TABLE: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("schedules");

const PENDING_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("pending_checkins");

const DEAD_LETTER_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("dead_letter");

/// key = check-in request id, value = record_id of the session it committed
const REQUESTS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("checkin_requests");

/// Composite (owner, day) → id-list index
type DayIndex = TableDefinition<'static, (&'static str, &'static str), &'static [u8]>;

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

    #[error("Member not found: {0}")]
    MemberNotFound(String),

    #[error("Attendance record not found: {0}")]
    RecordNotFound(String),

    #[error("Check-in request {request_id} already committed as {record_id}")]
    RequestCommitted { request_id: String, record_id: String },

    #[error("Member {member_id} changed concurrently (expected v{expected}, found v{found})")]
    VersionConflict {
        member_id: String,
        expected: u64,
        found: u64,
    },
}

impl StorageError {
    /// I/O-level failures that may succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::Database(_)
                | StorageError::Transaction(_)
                | StorageError::Storage(_)
                | StorageError::Commit(_)
                | StorageError::VersionConflict { .. }
        )
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Calendar-day key used in composite keys
pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Attendance store backed by redb
#[derive(Clone)]
pub struct AttendanceStorage {
    db: Arc<Database>,
}

impl std::fmt::Debug for AttendanceStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttendanceStorage").finish_non_exhaustive()
    }
}

impl AttendanceStorage {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        Self::init_tables(&db)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Open an in-memory database (tests and ephemeral kiosks)
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init_tables(&db)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn init_tables(db: &Database) -> StorageResult<()> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(MEMBERS_TABLE)?;
            let _ = write_txn.open_table(ATTENDANCE_TABLE)?;
            let _ = write_txn.open_table(MEMBER_DAY_TABLE)?;
            let _ = write_txn.open_table(BRANCH_DAY_TABLE)?;
            let _ = write_txn.open_table(SCHEDULES_TABLE)?;
            let _ = write_txn.open_table(PENDING_TABLE)?;
            let _ = write_txn.open_table(DEAD_LETTER_TABLE)?;
            let _ = write_txn.open_table(REQUESTS_TABLE)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    // ========== Members ==========

    /// Upsert a member document as delivered by the member directory
    ///
    /// Bumps `version` past whatever is stored so in-flight check-ins that
    /// read the old document fail their conditional write.
    pub fn put_member(&self, member: &Member) -> StorageResult<Member> {
        let txn = self.db.begin_write()?;
        let stored = {
            let mut table = txn.open_table(MEMBERS_TABLE)?;
            let current_version = match table.get(member.id.as_str())? {
                Some(value) => serde_json::from_slice::<Member>(value.value())?.version,
                None => 0,
            };
            let mut stored = member.clone();
            stored.version = current_version.max(member.version) + 1;
            stored.updated_at = shared::util::now_millis();
            let value = serde_json::to_vec(&stored)?;
            table.insert(stored.id.as_str(), value.as_slice())?;
            stored
        };
        txn.commit()?;
        Ok(stored)
    }

    pub fn get_member(&self, member_id: &str) -> StorageResult<Option<Member>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MEMBERS_TABLE)?;
        match table.get(member_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub fn list_members(&self) -> StorageResult<Vec<Member>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MEMBERS_TABLE)?;
        let mut members = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            members.push(serde_json::from_slice(value.value())?);
        }
        Ok(members)
    }

    // ========== Attendance ==========

    /// Valid sessions of a member on a venue-local day, oldest first
    pub fn valid_sessions(&self, member_id: &str, date: NaiveDate) -> StorageResult<Vec<AttendanceRecord>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(MEMBER_DAY_TABLE)?;
        let records = read_txn.open_table(ATTENDANCE_TABLE)?;

        let day = day_key(date);
        let ids: Vec<String> = match index.get((member_id, day.as_str()))? {
            Some(value) => serde_json::from_slice(value.value())?,
            None => return Ok(Vec::new()),
        };

        let mut sessions = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(value) = records.get(id.as_str())? {
                let record: AttendanceRecord = serde_json::from_slice(value.value())?;
                if record.is_valid() {
                    sessions.push(record);
                }
            }
        }
        sessions.sort_by_key(|r| r.timestamp);
        Ok(sessions)
    }

    pub fn get_record(&self, record_id: &str) -> StorageResult<Option<AttendanceRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ATTENDANCE_TABLE)?;
        match table.get(record_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// All records (valid and denied) for a branch on a day
    pub fn records_for_branch_day(&self, branch_id: &str, date: NaiveDate) -> StorageResult<Vec<AttendanceRecord>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(BRANCH_DAY_TABLE)?;
        let records = read_txn.open_table(ATTENDANCE_TABLE)?;

        let day = day_key(date);
        let ids: Vec<String> = match index.get((branch_id, day.as_str()))? {
            Some(value) => serde_json::from_slice(value.value())?,
            None => return Ok(Vec::new()),
        };

        let mut out = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(value) = records.get(id.as_str())? {
                out.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(out)
    }

    /// Record committed for a check-in request, if any
    ///
    /// A request whose record was deleted since counts as not committed.
    pub fn committed_request(&self, request_id: &str) -> StorageResult<Option<AttendanceRecord>> {
        let txn = self.db.begin_read()?;
        let requests = txn.open_table(REQUESTS_TABLE)?;
        let record_id = match requests.get(request_id)? {
            Some(value) => value.value().to_string(),
            None => return Ok(None),
        };
        let records = txn.open_table(ATTENDANCE_TABLE)?;
        match records.get(record_id.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Commit a credit-consuming session
    ///
    /// Succeeds only if the stored member still has `expected_version` and
    /// `request_id` has not committed a session yet. Writes the member
    /// (version + 1), the record, both day indexes and the request marker
    /// atomically and returns the stored member.
    pub fn commit_session(
        &self,
        expected_version: u64,
        request_id: &str,
        member: &Member,
        record: &AttendanceRecord,
    ) -> StorageResult<Member> {
        let txn = self.db.begin_write()?;
        {
            let requests = txn.open_table(REQUESTS_TABLE)?;
            if let Some(value) = requests.get(request_id)? {
                let record_id = value.value().to_string();
                let records = txn.open_table(ATTENDANCE_TABLE)?;
                if records.get(record_id.as_str())?.is_some() {
                    return Err(StorageError::RequestCommitted {
                        request_id: request_id.to_string(),
                        record_id,
                    });
                }
            }
        }
        let stored = {
            let mut members = txn.open_table(MEMBERS_TABLE)?;
            let found = match members.get(member.id.as_str())? {
                Some(value) => serde_json::from_slice::<Member>(value.value())?.version,
                None => return Err(StorageError::MemberNotFound(member.id.clone())),
            };
            if found != expected_version {
                // txn dropped without commit → aborted
                return Err(StorageError::VersionConflict {
                    member_id: member.id.clone(),
                    expected: expected_version,
                    found,
                });
            }

            let mut stored = member.clone();
            stored.version = expected_version + 1;
            stored.updated_at = shared::util::now_millis();
            let value = serde_json::to_vec(&stored)?;
            members.insert(stored.id.as_str(), value.as_slice())?;
            stored
        };

        self.insert_record_txn(&txn, record)?;
        {
            let mut requests = txn.open_table(REQUESTS_TABLE)?;
            requests.insert(request_id, record.id.as_str())?;
        }
        txn.commit()?;
        Ok(stored)
    }

    /// Append a record that does not touch the member (denied attempts)
    pub fn append_record(&self, record: &AttendanceRecord) -> StorageResult<()> {
        let txn = self.db.begin_write()?;
        self.insert_record_txn(&txn, record)?;
        txn.commit()?;
        Ok(())
    }

    fn insert_record_txn(&self, txn: &WriteTransaction, record: &AttendanceRecord) -> StorageResult<()> {
        let mut records = txn.open_table(ATTENDANCE_TABLE)?;
        let value = serde_json::to_vec(record)?;
        records.insert(record.id.as_str(), value.as_slice())?;

        let day = day_key(record.date);
        push_index(txn, BRANCH_DAY_TABLE, (record.branch_id.as_str(), day.as_str()), &record.id)?;
        if record.is_valid() {
            push_index(txn, MEMBER_DAY_TABLE, (record.member_id.as_str(), day.as_str()), &record.id)?;
        }
        Ok(())
    }

    /// Delete a record; a valid record refunds its credit in the same txn
    ///
    /// Returns the refunded member for valid records, `None` for denied ones.
    pub fn delete_record(&self, record_id: &str) -> StorageResult<Option<Member>> {
        let txn = self.db.begin_write()?;
        let refunded = {
            let mut records = txn.open_table(ATTENDANCE_TABLE)?;
            let record: AttendanceRecord = match records.get(record_id)? {
                Some(value) => serde_json::from_slice(value.value())?,
                None => return Err(StorageError::RecordNotFound(record_id.to_string())),
            };
            records.remove(record_id)?;
            drop(records);

            let day = day_key(record.date);
            remove_index(&txn, BRANCH_DAY_TABLE, (record.branch_id.as_str(), day.as_str()), record_id)?;

            if record.is_valid() {
                remove_index(&txn, MEMBER_DAY_TABLE, (record.member_id.as_str(), day.as_str()), record_id)?;

                let mut members = txn.open_table(MEMBERS_TABLE)?;
                let member: Option<Member> = match members.get(record.member_id.as_str())? {
                    Some(value) => Some(serde_json::from_slice(value.value())?),
                    None => None,
                };
                match member {
                    Some(mut member) => {
                        member.credits = member.credits.refunded();
                        member.attendance_count = member.attendance_count.saturating_sub(1);
                        member.version += 1;
                        member.updated_at = shared::util::now_millis();
                        let value = serde_json::to_vec(&member)?;
                        members.insert(member.id.as_str(), value.as_slice())?;
                        Some(member)
                    }
                    None => {
                        tracing::warn!(record_id = %record_id, member_id = %record.member_id, "Deleted record of a missing member, nothing to refund");
                        None
                    }
                }
            } else {
                None
            }
        };
        txn.commit()?;
        Ok(refunded)
    }

    /// Overwrite existing records in one batch (schedule correction)
    pub fn update_records(&self, updated: &[AttendanceRecord]) -> StorageResult<()> {
        if updated.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write()?;
        {
            let mut records = txn.open_table(ATTENDANCE_TABLE)?;
            for record in updated {
                if records.get(record.id.as_str())?.is_none() {
                    return Err(StorageError::RecordNotFound(record.id.clone()));
                }
                let value = serde_json::to_vec(record)?;
                records.insert(record.id.as_str(), value.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    // ========== Schedules ==========

    /// Replace the mirrored schedule of a branch for a day
    pub fn put_schedule(&self, branch_id: &str, date: NaiveDate, slots: &[ClassSlot]) -> StorageResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SCHEDULES_TABLE)?;
            let day = day_key(date);
            let value = serde_json::to_vec(slots)?;
            table.insert((branch_id, day.as_str()), value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Mirrored schedule; empty when none was published
    pub fn get_schedule(&self, branch_id: &str, date: NaiveDate) -> StorageResult<Vec<ClassSlot>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SCHEDULES_TABLE)?;
        let day = day_key(date);
        match table.get((branch_id, day.as_str()))? {
            Some(value) => Ok(serde_json::from_slice(value.value())?),
            None => Ok(Vec::new()),
        }
    }

    // ========== Pending check-ins ==========

    pub fn insert_pending(&self, pending: &PendingCheckIn) -> StorageResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(PENDING_TABLE)?;
            let value = serde_json::to_vec(pending)?;
            table.insert(pending.id.as_str(), value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Pending check-ins ordered by original event time
    pub fn list_pending(&self) -> StorageResult<Vec<PendingCheckIn>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PENDING_TABLE)?;
        let mut pending: Vec<PendingCheckIn> = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            pending.push(serde_json::from_slice(value.value())?);
        }
        pending.sort_by_key(|p| p.occurred_at);
        Ok(pending)
    }

    pub fn pending_count(&self) -> StorageResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PENDING_TABLE)?;
        Ok(table.len()?)
    }

    /// Remove a pending check-in; returns whether it existed
    pub fn remove_pending(&self, pending_id: &str) -> StorageResult<bool> {
        let txn = self.db.begin_write()?;
        let existed = {
            let mut table = txn.open_table(PENDING_TABLE)?;
            table.remove(pending_id)?.is_some()
        };
        txn.commit()?;
        Ok(existed)
    }

    /// Bump retry count and remember the error
    pub fn mark_pending_failed(&self, pending_id: &str, error: &str) -> StorageResult<Option<PendingCheckIn>> {
        let txn = self.db.begin_write()?;
        let updated = {
            let mut table = txn.open_table(PENDING_TABLE)?;
            let current: Option<PendingCheckIn> = match table.get(pending_id)? {
                Some(value) => Some(serde_json::from_slice(value.value())?),
                None => None,
            };
            match current {
                Some(mut pending) => {
                    pending.retry_count += 1;
                    pending.last_error = Some(error.to_string());
                    let value = serde_json::to_vec(&pending)?;
                    table.insert(pending_id, value.as_slice())?;
                    Some(pending)
                }
                None => None,
            }
        };
        txn.commit()?;
        Ok(updated)
    }

    // ========== Dead letter ==========

    /// Move a pending check-in (from either tier) to the dead letter table
    pub fn dead_letter(&self, pending: &PendingCheckIn, error: &str) -> StorageResult<()> {
        let entry = DeadLetterEntry {
            pending: pending.clone(),
            failed_at: shared::util::now_millis(),
            last_error: error.to_string(),
        };

        let txn = self.db.begin_write()?;
        {
            let mut pending_table = txn.open_table(PENDING_TABLE)?;
            pending_table.remove(pending.id.as_str())?;

            let mut dead_table = txn.open_table(DEAD_LETTER_TABLE)?;
            let value = serde_json::to_vec(&entry)?;
            dead_table.insert(pending.id.as_str(), value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn list_dead_letters(&self) -> StorageResult<Vec<DeadLetterEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DEAD_LETTER_TABLE)?;
        let mut entries = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            entries.push(serde_json::from_slice(value.value())?);
        }
        Ok(entries)
    }

    pub fn dead_letter_count(&self) -> StorageResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DEAD_LETTER_TABLE)?;
        Ok(table.len()?)
    }

    /// Put every dead letter back into the durable pending queue with a
    /// fresh retry budget
    pub fn requeue_dead_letters(&self) -> StorageResult<usize> {
        let txn = self.db.begin_write()?;
        let count = {
            let mut dead_table = txn.open_table(DEAD_LETTER_TABLE)?;
            let mut pending_table = txn.open_table(PENDING_TABLE)?;

            let mut entries: Vec<DeadLetterEntry> = Vec::new();
            for result in dead_table.iter()? {
                let (_key, value) = result?;
                entries.push(serde_json::from_slice(value.value())?);
            }

            for entry in &entries {
                let mut pending = entry.pending.clone();
                pending.retry_count = 0;
                pending.tier = shared::models::QueueTier::Durable;
                let value = serde_json::to_vec(&pending)?;
                pending_table.insert(pending.id.as_str(), value.as_slice())?;
                dead_table.remove(pending.id.as_str())?;
            }
            entries.len()
        };
        txn.commit()?;
        Ok(count)
    }
}

/// Append an id to a JSON id-list index entry
fn push_index(
    txn: &WriteTransaction,
    def: DayIndex,
    key: (&str, &str),
    id: &str,
) -> StorageResult<()> {
    let mut table = txn.open_table(def)?;
    let mut ids: Vec<String> = match table.get(key)? {
        Some(value) => serde_json::from_slice(value.value())?,
        None => Vec::new(),
    };
    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
    }
    let value = serde_json::to_vec(&ids)?;
    table.insert(key, value.as_slice())?;
    Ok(())
}

/// Remove an id from a JSON id-list index entry
fn remove_index(
    txn: &WriteTransaction,
    def: DayIndex,
    key: (&str, &str),
    id: &str,
) -> StorageResult<()> {
    let mut table = txn.open_table(def)?;
    let ids: Vec<String> = match table.get(key)? {
        Some(value) => serde_json::from_slice(value.value())?,
        None => return Ok(()),
    };
    let remaining: Vec<String> = ids.into_iter().filter(|existing| existing != id).collect();
    if remaining.is_empty() {
        table.remove(key)?;
    } else {
        let value = serde_json::to_vec(&remaining)?;
        table.insert(key, value.as_slice())?;
    }
    Ok(())
}
