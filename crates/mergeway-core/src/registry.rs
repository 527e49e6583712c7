//! Indexed, optionally persisted storage of pull request records.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::merge::Mergeability;
use crate::pull_request::{PullFilter, PullRequest};
use crate::state::RepoSnapshot;
use crate::traits::RecordStore;

/// Per pull request state guarded for the whole of a read-modify-write.
#[derive(Debug, Default)]
pub struct PullSlot {
    /// Last mergeability result and the tips it was computed at.
    pub cache: Option<Mergeability>,
}

#[derive(Debug)]
struct Records {
    next_id: u64,
    pulls: BTreeMap<u64, PullRequest>,
}

/// All records of one repository.
#[derive(Debug)]
pub struct RepoTable {
    name: String,
    records: RwLock<Records>,
    slots: Mutex<HashMap<u64, Arc<Mutex<PullSlot>>>>,
    /// Serializes snapshot writes so the newest state is written last.
    save_lock: Mutex<()>,
}

impl RepoTable {
    fn from_snapshot(snapshot: RepoSnapshot) -> Self {
        let pulls: BTreeMap<u64, PullRequest> = snapshot
            .pull_requests
            .into_iter()
            .map(|pr| (pr.id, pr))
            .collect();
        // Never reuse a number, even if the stored counter lags behind
        let highest = pulls.keys().next_back().copied().unwrap_or(0);
        Self {
            name: snapshot.name,
            records: RwLock::new(Records {
                next_id: snapshot.next_id.max(highest + 1),
                pulls,
            }),
            slots: Mutex::new(HashMap::new()),
            save_lock: Mutex::new(()),
        }
    }

    pub fn get(&self, id: u64) -> Result<PullRequest> {
        self.records
            .read()
            .pulls
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::PullNotFound {
                repo: self.name.clone(),
                id,
            })
    }

    pub fn list(&self, filter: &PullFilter) -> Vec<PullRequest> {
        self.records
            .read()
            .pulls
            .values()
            .filter(|pr| filter.matches(pr))
            .cloned()
            .collect()
    }

    /// Exclusive handle for `id`.
    pub fn slot(&self, id: u64) -> Result<Arc<Mutex<PullSlot>>> {
        if !self.records.read().pulls.contains_key(&id) {
            return Err(Error::PullNotFound {
                repo: self.name.clone(),
                id,
            });
        }
        Ok(Arc::clone(self.slots.lock().entry(id).or_default()))
    }

    fn snapshot(&self) -> RepoSnapshot {
        let records = self.records.read();
        RepoSnapshot {
            name: self.name.clone(),
            next_id: records.next_id,
            pull_requests: records.pulls.values().cloned().collect(),
        }
    }
}

/// Pull request records of every repository, loaded lazily.
pub struct Registry<R> {
    store: R,
    tables: RwLock<HashMap<String, Arc<RepoTable>>>,
}

impl<R: RecordStore> Registry<R> {
    pub fn new(store: R) -> Self {
        Self {
            store,
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Table for `repo`, loading it from the record store on first use.
    pub fn table(&self, repo: &str) -> Result<Arc<RepoTable>> {
        if let Some(table) = self.tables.read().get(repo) {
            return Ok(Arc::clone(table));
        }

        let mut tables = self.tables.write();
        if let Some(table) = tables.get(repo) {
            return Ok(Arc::clone(table));
        }
        let snapshot = self
            .store
            .load(repo)?
            .unwrap_or_else(|| RepoSnapshot::empty(repo));
        debug!(
            repo,
            count = snapshot.pull_requests.len(),
            "loaded pull request records"
        );
        let table = Arc::new(RepoTable::from_snapshot(snapshot));
        tables.insert(repo.to_string(), Arc::clone(&table));
        Ok(table)
    }

    /// Assign the next number, store the record built for it and persist.
    ///
    /// A failed save removes the record again; the number stays consumed.
    pub fn insert(
        &self,
        table: &RepoTable,
        build: impl FnOnce(u64) -> PullRequest,
    ) -> Result<PullRequest> {
        let pr = {
            let mut records = table.records.write();
            let id = records.next_id;
            records.next_id += 1;
            let pr = build(id);
            records.pulls.insert(id, pr.clone());
            pr
        };

        if let Err(e) = self.persist(table) {
            warn!(repo = %table.name, id = pr.id, error = %e, "failed to persist new pull request");
            table.records.write().pulls.remove(&pr.id);
            return Err(e);
        }
        Ok(pr)
    }

    /// Replace an existing record and persist, restoring the previous
    /// version if the save fails.
    ///
    /// Callers hold the record's slot.
    pub fn replace(&self, table: &RepoTable, pr: PullRequest) -> Result<PullRequest> {
        let previous = table.records.write().pulls.insert(pr.id, pr.clone());

        if let Err(e) = self.persist(table) {
            warn!(repo = %table.name, id = pr.id, error = %e, "failed to persist pull request");
            let mut records = table.records.write();
            match previous {
                Some(previous) => records.pulls.insert(pr.id, previous),
                None => records.pulls.remove(&pr.id),
            };
            return Err(e);
        }
        Ok(pr)
    }

    fn persist(&self, table: &RepoTable) -> Result<()> {
        let _guard = table.save_lock.lock();
        self.store.save(&table.snapshot())
    }
}
