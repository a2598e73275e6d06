//! Durable, transactional storage of fragment rows.
//!
//! The repository keeps the committed fragment table in memory and journals
//! every committed transaction to an append-only log. All mutations run
//! through [`FragmentRepository::with_tx`]: transactions are serialized, work
//! on a private copy of the table, and either commit atomically (journal
//! append, then table swap) or leave no trace. Reads outside a transaction
//! observe the last committed state.

use crate::core::error::{CastorError, CastorResult};
use crate::store::journal::{Journal, JournalOp};
use crate::tuples::{ActivationStatus, Fragment, TupleType};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

/// The fragment table: rows keyed by their repository-assigned id.
///
/// `BTreeMap` iteration order is id order, which is what gives
/// `find_any_available_of_type` its FIFO discipline.
#[derive(Debug, Clone)]
struct FragmentTable {
    rows: BTreeMap<u64, Fragment>,
    next_id: u64,
}

impl FragmentTable {
    fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }

    fn insert(&mut self, mut fragment: Fragment) -> Fragment {
        fragment.id = self.next_id;
        self.next_id += 1;
        self.rows.insert(fragment.id, fragment.clone());
        fragment
    }

    fn replace(&mut self, fragment: Fragment) -> bool {
        match self.rows.get_mut(&fragment.id) {
            Some(row) => {
                *row = fragment;
                true
            }
            None => false,
        }
    }

    fn remove(&mut self, id: u64) -> Option<Fragment> {
        self.rows.remove(&id)
    }

    fn apply(&mut self, op: &JournalOp) {
        match op {
            JournalOp::Insert(fragment) => {
                self.rows.insert(fragment.id, fragment.clone());
                self.next_id = self.next_id.max(fragment.id + 1);
            }
            JournalOp::Update(fragment) => {
                self.rows.insert(fragment.id, fragment.clone());
            }
            JournalOp::Remove(id) => {
                self.rows.remove(id);
            }
        }
    }

    fn find_available_containing_index(&self, chunk_id: Uuid, index: u64) -> Option<&Fragment> {
        // Id-ascending iteration keeps the smallest id on (impossible) ties.
        let mut best: Option<&Fragment> = None;
        for fragment in self.rows.values() {
            if fragment.chunk_id != chunk_id
                || !fragment.is_available()
                || !fragment.contains(index)
            {
                continue;
            }
            match best {
                Some(b) if b.start_index >= fragment.start_index => {}
                _ => best = Some(fragment),
            }
        }
        best
    }

    fn find_any_available_of_type(&self, tuple_type: TupleType) -> Option<&Fragment> {
        self.rows
            .values()
            .find(|f| f.tuple_type == tuple_type && f.is_available())
    }

    fn available_of_type(&self, tuple_type: TupleType) -> Vec<Fragment> {
        self.rows
            .values()
            .filter(|f| f.tuple_type == tuple_type && f.is_available())
            .cloned()
            .collect()
    }

    fn available_tuple_count(&self, tuple_type: TupleType) -> u64 {
        self.rows
            .values()
            .filter(|f| f.tuple_type == tuple_type && f.is_available())
            .map(Fragment::len)
            .sum()
    }

    fn find_overlapping(&self, chunk_id: Uuid, start_index: u64, end_index: u64) -> Option<&Fragment> {
        self.rows
            .values()
            .find(|f| f.chunk_id == chunk_id && f.overlaps(start_index, end_index))
    }

    fn is_chunk_referenced(&self, chunk_id: Uuid) -> bool {
        self.rows.values().any(|f| f.chunk_id == chunk_id)
    }
}

/// A serialized transaction over the fragment table.
///
/// Mutations are visible to subsequent reads within the same transaction and
/// become durable only when the closure passed to `with_tx` returns `Ok`.
pub struct FragmentTx {
    table: FragmentTable,
    ops: Vec<JournalOp>,
}

impl FragmentTx {
    /// Insert a new row, assigning its id. Returns the stored fragment.
    pub fn insert(&mut self, fragment: Fragment) -> Fragment {
        let stored = self.table.insert(fragment);
        self.ops.push(JournalOp::Insert(stored.clone()));
        stored
    }

    /// Replace the row with `fragment.id` by the given state.
    pub fn update(&mut self, fragment: Fragment) -> CastorResult<()> {
        if !self.table.replace(fragment.clone()) {
            return Err(CastorError::storage(format!(
                "fragment {} does not exist",
                fragment.id
            )));
        }
        self.ops.push(JournalOp::Update(fragment));
        Ok(())
    }

    /// Delete every row carrying the given reservation id. Returns the count.
    pub fn remove_by_reservation_id(&mut self, reservation_id: &str) -> u64 {
        let ids: Vec<u64> = self
            .table
            .rows
            .values()
            .filter(|f| f.reservation_id.as_deref() == Some(reservation_id))
            .map(|f| f.id)
            .collect();
        for id in &ids {
            self.table.remove(*id);
            self.ops.push(JournalOp::Remove(*id));
        }
        ids.len() as u64
    }

    /// Transition every row of the chunk to `Unlocked`. Returns the count.
    pub fn unlock_all_for_chunk(&mut self, chunk_id: Uuid) -> u64 {
        let ids: Vec<u64> = self
            .table
            .rows
            .values()
            .filter(|f| f.chunk_id == chunk_id)
            .map(|f| f.id)
            .collect();
        for id in &ids {
            let row = self.table.rows.get_mut(id).expect("row id just listed");
            row.activation_status = ActivationStatus::Unlocked;
            self.ops.push(JournalOp::Update(row.clone()));
        }
        ids.len() as u64
    }

    /// Available fragment of the chunk whose range contains `index`.
    pub fn find_available_containing_index(
        &self,
        chunk_id: Uuid,
        index: u64,
    ) -> Option<Fragment> {
        self.table
            .find_available_containing_index(chunk_id, index)
            .cloned()
    }

    /// Any fragment of the chunk intersecting `[start_index, end_index)`.
    pub fn find_overlapping(
        &self,
        chunk_id: Uuid,
        start_index: u64,
        end_index: u64,
    ) -> Option<Fragment> {
        self.table
            .find_overlapping(chunk_id, start_index, end_index)
            .cloned()
    }

    /// Available fragment of the given type with the smallest id.
    pub fn find_any_available_of_type(&self, tuple_type: TupleType) -> Option<Fragment> {
        self.table.find_any_available_of_type(tuple_type).cloned()
    }

    /// All available fragments of the given type in ascending id order.
    pub fn available_of_type(&self, tuple_type: TupleType) -> Vec<Fragment> {
        self.table.available_of_type(tuple_type)
    }

    /// Sum of available range lengths for the given type.
    pub fn available_tuple_count(&self, tuple_type: TupleType) -> u64 {
        self.table.available_tuple_count(tuple_type)
    }

    /// Whether any row references the chunk.
    pub fn is_chunk_referenced(&self, chunk_id: Uuid) -> bool {
        self.table.is_chunk_referenced(chunk_id)
    }
}

/// Fragment row storage with serialized transactions and journaling.
pub struct FragmentRepository {
    committed: RwLock<FragmentTable>,
    tx_lock: Mutex<()>,
    journal: Option<Mutex<Journal>>,
}

impl FragmentRepository {
    /// Repository without a journal; state lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            committed: RwLock::new(FragmentTable::new()),
            tx_lock: Mutex::new(()),
            journal: None,
        }
    }

    /// Open a journaled repository, replaying the journal at `path`.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let (journal, transactions) = Journal::open(path)?;
        let mut table = FragmentTable::new();
        for ops in &transactions {
            for op in ops {
                table.apply(op);
            }
        }
        tracing::info!(
            journal = %path.display(),
            transactions = transactions.len(),
            fragments = table.rows.len(),
            "fragment repository recovered"
        );
        Ok(Self {
            committed: RwLock::new(table),
            tx_lock: Mutex::new(()),
            journal: Some(Mutex::new(journal)),
        })
    }

    /// Run `f` inside one serialized transaction.
    ///
    /// On `Ok` the transaction's row operations are journaled and the table
    /// is swapped in one step; on `Err` every change is discarded. Nested
    /// transactions are not supported.
    pub fn with_tx<T>(&self, f: impl FnOnce(&mut FragmentTx) -> CastorResult<T>) -> CastorResult<T> {
        let _guard = self.tx_lock.lock();
        let mut tx = FragmentTx {
            table: self.committed.read().clone(),
            ops: Vec::new(),
        };
        let out = f(&mut tx)?;
        if !tx.ops.is_empty() {
            if let Some(journal) = &self.journal {
                journal
                    .lock()
                    .append(&tx.ops)
                    .map_err(|e| CastorError::storage(format!("journal append failed: {e:#}")))?;
            }
            *self.committed.write() = tx.table;
        }
        Ok(out)
    }

    /// Available fragment of the chunk whose range contains `index`.
    pub fn find_available_containing_index(
        &self,
        chunk_id: Uuid,
        index: u64,
    ) -> Option<Fragment> {
        self.committed
            .read()
            .find_available_containing_index(chunk_id, index)
            .cloned()
    }

    /// Available fragment of the given type with the smallest id.
    pub fn find_any_available_of_type(&self, tuple_type: TupleType) -> Option<Fragment> {
        self.committed
            .read()
            .find_any_available_of_type(tuple_type)
            .cloned()
    }

    /// All available fragments of the given type in ascending id order.
    pub fn available_of_type(&self, tuple_type: TupleType) -> Vec<Fragment> {
        self.committed.read().available_of_type(tuple_type)
    }

    /// Sum of available range lengths for the given type.
    pub fn available_tuple_count(&self, tuple_type: TupleType) -> u64 {
        self.committed.read().available_tuple_count(tuple_type)
    }

    /// Any fragment of the chunk intersecting `[start_index, end_index)`.
    pub fn find_overlapping(
        &self,
        chunk_id: Uuid,
        start_index: u64,
        end_index: u64,
    ) -> Option<Fragment> {
        self.committed
            .read()
            .find_overlapping(chunk_id, start_index, end_index)
            .cloned()
    }

    /// Whether any row references the chunk.
    pub fn is_chunk_referenced(&self, chunk_id: Uuid) -> bool {
        self.committed.read().is_chunk_referenced(chunk_id)
    }

    /// Every stored fragment in ascending id order. Intended for inspection
    /// and tests; production paths use the targeted queries.
    pub fn snapshot(&self) -> Vec<Fragment> {
        self.committed.read().rows.values().cloned().collect()
    }
}
