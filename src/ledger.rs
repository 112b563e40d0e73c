//! Host transaction contract and the sled-backed reference host
//!
//! The engine only ever talks to a [`TransactionContext`]: a view of the shared
//! keyed store for the duration of one transaction, plus the host-supplied
//! transaction time. [`Ledger`] implements that contract on top of sled with
//! buffered writes and optimistic conflict detection at commit.
use super::error::PolicyError;
use super::policy::TimeStamp;
use super::utils;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::collections::{BTreeMap, btree_map};
use std::iter::Peekable;
use std::sync::Arc;

pub type StateIter<'a> = Box<dyn Iterator<Item = Result<(String, Vec<u8>), PolicyError>> + 'a>;

pub trait TransactionContext {
    fn get_state(&mut self, key: &str) -> Result<Option<Vec<u8>>, PolicyError>;
    fn put_state(&mut self, key: &str, value: Vec<u8>) -> Result<(), PolicyError>;
    fn del_state(&mut self, key: &str) -> Result<(), PolicyError>;
    /// Lazily yields entries with `start <= key < end` in key order.
    fn state_by_range<'a>(&'a self, start: &str, end: &str) -> Result<StateIter<'a>, PolicyError>;
    fn tx_timestamp(&self) -> TimeStamp;
    fn tx_id(&self) -> &str;
}

pub struct Ledger {
    instance: Arc<sled::Db>,
}

impl Ledger {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self { instance }
    }

    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, PolicyError> {
        Ok(Self::new(Arc::new(sled::open(path)?)))
    }

    pub fn begin(&self, timestamp: TimeStamp) -> LedgerTransaction {
        // bech32 encoding of a fixed-length uuid cannot fail for a valid hrp
        let tx_id = utils::new_uuid_to_bech32("tx").unwrap_or_default();
        LedgerTransaction {
            instance: Arc::clone(&self.instance),
            tx_id,
            timestamp,
            reads: BTreeMap::new(),
            writes: BTreeMap::new(),
        }
    }

    /// Run `op` in a fresh transaction and commit its writes only if it succeeds.
    pub fn submit<T, F>(&self, timestamp: TimeStamp, op: F) -> Result<T, PolicyError>
    where
        F: FnOnce(&mut LedgerTransaction) -> Result<T, PolicyError>,
    {
        let mut tx = self.begin(timestamp);
        let span = tracing::info_span!("submit", tx = %tx.tx_id, at = %timestamp);
        let _guard = span.enter();

        match op(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                tracing::warn!(error = %err, "transaction aborted");
                Err(err)
            }
        }
    }

    /// Run a read-only `op`; nothing is ever committed.
    pub fn evaluate<T, F>(&self, timestamp: TimeStamp, op: F) -> Result<T, PolicyError>
    where
        F: FnOnce(&mut LedgerTransaction) -> Result<T, PolicyError>,
    {
        let mut tx = self.begin(timestamp);
        let span = tracing::debug_span!("evaluate", tx = %tx.tx_id);
        let _guard = span.enter();

        op(&mut tx)
    }
}

pub struct LedgerTransaction {
    instance: Arc<sled::Db>,
    tx_id: String,
    timestamp: TimeStamp,
    // value observed on first read of each key, validated again at commit
    reads: BTreeMap<String, Option<Vec<u8>>>,
    // None marks a pending delete
    writes: BTreeMap<String, Option<Vec<u8>>>,
}

impl LedgerTransaction {
    pub fn commit(self) -> Result<(), PolicyError> {
        if self.writes.is_empty() {
            return Ok(());
        }

        let result = self.instance.transaction(|db| {
            for (key, seen) in &self.reads {
                let current = db.get(key.as_bytes())?.map(|v| v.to_vec());
                if current != *seen {
                    return Err(ConflictableTransactionError::Abort(PolicyError::Conflict(
                        self.tx_id.clone(),
                    )));
                }
            }
            for (key, value) in &self.writes {
                match value {
                    Some(value) => {
                        db.insert(key.as_bytes(), value.as_slice())?;
                    }
                    None => {
                        db.remove(key.as_bytes())?;
                    }
                }
            }
            Ok(())
        });

        match result {
            Ok(()) => {
                tracing::debug!(tx = %self.tx_id, writes = self.writes.len(), "committed");
                Ok(())
            }
            Err(TransactionError::Abort(err)) => Err(err),
            Err(TransactionError::Storage(err)) => Err(err.into()),
        }
    }
}

impl TransactionContext for LedgerTransaction {
    fn get_state(&mut self, key: &str) -> Result<Option<Vec<u8>>, PolicyError> {
        if let Some(pending) = self.writes.get(key) {
            return Ok(pending.clone());
        }
        if let Some(seen) = self.reads.get(key) {
            return Ok(seen.clone());
        }

        let value = self.instance.get(key.as_bytes())?.map(|v| v.to_vec());
        self.reads.insert(key.to_string(), value.clone());
        Ok(value)
    }

    fn put_state(&mut self, key: &str, value: Vec<u8>) -> Result<(), PolicyError> {
        self.writes.insert(key.to_string(), Some(value));
        Ok(())
    }

    fn del_state(&mut self, key: &str) -> Result<(), PolicyError> {
        self.writes.insert(key.to_string(), None);
        Ok(())
    }

    fn state_by_range<'a>(&'a self, start: &str, end: &str) -> Result<StateIter<'a>, PolicyError> {
        if start >= end {
            return Ok(Box::new(std::iter::empty()));
        }

        let stored = self.instance.range(start.as_bytes()..end.as_bytes()).peekable();
        let pending = self
            .writes
            .range::<str, _>((
                std::ops::Bound::Included(start),
                std::ops::Bound::Excluded(end),
            ))
            .peekable();

        Ok(Box::new(MergedRange { stored, pending }))
    }

    fn tx_timestamp(&self) -> TimeStamp {
        self.timestamp
    }

    fn tx_id(&self) -> &str {
        &self.tx_id
    }
}

/// Committed entries overlaid with this transaction's pending writes.
struct MergedRange<'a> {
    stored: Peekable<sled::Iter>,
    pending: Peekable<btree_map::Range<'a, String, Option<Vec<u8>>>>,
}

impl MergedRange<'_> {
    fn next_stored(&mut self) -> Option<Result<(String, Vec<u8>), PolicyError>> {
        let (key, value) = match self.stored.next()? {
            Ok(entry) => entry,
            Err(err) => return Some(Err(err.into())),
        };
        let key = match String::from_utf8(key.to_vec()) {
            Ok(key) => key,
            Err(err) => return Some(Err(PolicyError::corrupt(format!("{key:?}"), err))),
        };

        Some(Ok((key, value.to_vec())))
    }
}

impl Iterator for MergedRange<'_> {
    type Item = Result<(String, Vec<u8>), PolicyError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let stored_key = match self.stored.peek() {
                Some(Ok((key, _))) => Some(key.to_vec()),
                Some(Err(_)) => return self.next_stored(),
                None => None,
            };
            let pending_key = self.pending.peek().map(|(key, _)| key.as_bytes().to_vec());

            let take_pending = match (&stored_key, &pending_key) {
                (None, None) => return None,
                (Some(_), None) => false,
                (None, Some(_)) => true,
                (Some(s), Some(p)) => p <= s,
            };

            if !take_pending {
                return self.next_stored();
            }

            // pending write shadows the committed entry with the same key
            if stored_key.is_some() && stored_key == pending_key {
                self.stored.next();
            }
            let (key, value) = self.pending.next()?;
            if let Some(value) = value {
                return Some(Ok((key.clone(), value.clone())));
            }
        }
    }
}
