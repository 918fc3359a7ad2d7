//! Repository state registry
//!
//! Process-wide map from repository name to coordination state. Every
//! repository gets its own exclusion sections, so unrelated repositories
//! never contend with each other.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{DirectoryError, GatewayError};
use crate::models::{CloneState, PublishState, RepoRecord};

/// Mutable state behind one repository name
#[derive(Debug)]
struct RepoSlot {
    record: RepoRecord,
    /// Bumped every time a clone attempt finishes
    clone_generation: u64,
    last_clone_error: Option<DirectoryError>,
}

/// One repository's state plus its clone section
///
/// The slot lock is never held across an await, so it doubles as the
/// publish section: the publish check-and-set happens entirely under it.
#[derive(Debug)]
pub struct RepoEntry {
    slot: RwLock<RepoSlot>,
    clone_section: Arc<Mutex<()>>,
}

impl RepoEntry {
    fn new(name: &str) -> Self {
        Self {
            slot: RwLock::new(RepoSlot {
                record: RepoRecord::new(name),
                clone_generation: 0,
                last_clone_error: None,
            }),
            clone_section: Arc::new(Mutex::new(())),
        }
    }

    fn read<R>(&self, f: impl FnOnce(&RepoSlot) -> R) -> R {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        f(&slot)
    }

    fn write<R>(&self, f: impl FnOnce(&mut RepoSlot) -> R) -> R {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut slot)
    }

    /// Current snapshot of the record
    pub fn record(&self) -> RepoRecord {
        self.read(|slot| slot.record.clone())
    }
}

/// Shared store of per-repository coordination state
///
/// Records are created on first reference and live as long as the process.
#[derive(Debug, Default)]
pub struct RepoStateRegistry {
    entries: DashMap<String, Arc<RepoEntry>>,
}

impl RepoStateRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the entry for `name`, creating it in its initial state if needed
    pub fn touch(&self, name: &str) -> Arc<RepoEntry> {
        if let Some(entry) = self.entries.get(name) {
            return Arc::clone(entry.value());
        }
        let entry = self
            .entries
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RepoEntry::new(name)));
        Arc::clone(entry.value())
    }

    /// Snapshot of one repository, if it has ever been referenced
    pub fn get(&self, name: &str) -> Option<RepoRecord> {
        let entry = self.entries.get(name).map(|e| Arc::clone(e.value()))?;
        Some(entry.record())
    }

    /// Snapshots of every known repository, sorted by name
    pub fn records(&self) -> Vec<RepoRecord> {
        let entries: Vec<Arc<RepoEntry>> =
            self.entries.iter().map(|e| Arc::clone(e.value())).collect();
        let mut records: Vec<RepoRecord> = entries.iter().map(|e| e.record()).collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    /// Number of known repositories
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no repository has been referenced yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remember the protection status the directory last reported
    pub fn record_pull_only(&self, name: &str, pull_only: bool) {
        self.touch(name)
            .write(|slot| slot.record.pull_only = Some(pull_only));
    }

    /// Wait for exclusive access to `name`'s clone section
    ///
    /// Gives up with `DeadlineExceeded` once `deadline` elapses; the holder
    /// of the section is not disturbed.
    pub async fn enter_clone_section(
        &self,
        name: &str,
        deadline: Duration,
    ) -> Result<CloneSection, GatewayError> {
        let entry = self.touch(name);
        let observed_generation = entry.read(|slot| slot.clone_generation);

        let guard = tokio::time::timeout(deadline, Arc::clone(&entry.clone_section).lock_owned())
            .await
            .map_err(|_| GatewayError::DeadlineExceeded)?;

        Ok(CloneSection {
            entry,
            observed_generation,
            cloning: false,
            _guard: guard,
        })
    }

    /// Claim the right to publish `name`
    ///
    /// Returns `None` when a publish for the same repository is already in
    /// flight.
    pub fn begin_publish(&self, name: &str) -> Option<PublishTicket> {
        let entry = self.touch(name);
        let claimed = entry.write(|slot| {
            if slot.record.publish_state == PublishState::Publishing {
                false
            } else {
                slot.record.publish_state = PublishState::Publishing;
                true
            }
        });

        claimed.then(|| PublishTicket {
            entry,
            finished: false,
        })
    }
}

/// Exclusive hold on one repository's clone section
///
/// Only the holder may move the clone state. Dropping a section that marked
/// itself `Cloning` without finishing records the attempt as failed.
#[derive(Debug)]
pub struct CloneSection {
    entry: Arc<RepoEntry>,
    observed_generation: u64,
    cloning: bool,
    _guard: OwnedMutexGuard<()>,
}

impl CloneSection {
    /// Current clone state
    pub fn state(&self) -> CloneState {
        self.entry.read(|slot| slot.record.clone_state)
    }

    /// Outcome of a clone attempt that finished while this caller was waiting
    pub fn completed_while_waiting(&self) -> Option<Result<(), DirectoryError>> {
        self.entry.read(|slot| {
            if slot.clone_generation == self.observed_generation {
                return None;
            }
            match slot.record.clone_state {
                CloneState::Cloned => Some(Ok(())),
                _ => Some(Err(slot.last_clone_error.clone().unwrap_or_else(|| {
                    DirectoryError::Network("clone attempt abandoned".to_string())
                }))),
            }
        })
    }

    /// Mark a clone as in flight
    pub fn mark_cloning(&mut self) {
        self.cloning = true;
        self.entry
            .write(|slot| slot.record.clone_state = CloneState::Cloning);
    }

    /// Commit the outcome of a clone and release the section
    pub fn finish(mut self, result: &Result<(), DirectoryError>) {
        self.cloning = false;
        self.entry.write(|slot| commit_clone(slot, result));
    }
}

impl Drop for CloneSection {
    fn drop(&mut self) {
        if self.cloning {
            let abandoned = Err(DirectoryError::Network(
                "clone attempt abandoned".to_string(),
            ));
            self.entry.write(|slot| commit_clone(slot, &abandoned));
        }
    }
}

fn commit_clone(slot: &mut RepoSlot, result: &Result<(), DirectoryError>) {
    slot.clone_generation += 1;
    match result {
        Ok(()) => {
            slot.record.clone_state = CloneState::Cloned;
            slot.record.last_cloned_at = Some(Utc::now());
            slot.last_clone_error = None;
        }
        Err(e) => {
            slot.record.clone_state = CloneState::CloneFailed;
            slot.last_clone_error = Some(e.clone());
        }
    }
}

/// Claim on an in-flight publish
///
/// Dropping an unfinished ticket records the publish as failed so a later
/// write can retry.
#[derive(Debug)]
pub struct PublishTicket {
    entry: Arc<RepoEntry>,
    finished: bool,
}

impl PublishTicket {
    /// Commit the outcome of the publish
    pub fn finish(mut self, result: &Result<(), DirectoryError>) {
        self.finished = true;
        let ok = result.is_ok();
        self.entry.write(|slot| {
            if ok {
                slot.record.publish_state = PublishState::Published;
                slot.record.last_published_at = Some(Utc::now());
            } else {
                slot.record.publish_state = PublishState::PublishFailed;
            }
        });
    }
}

impl Drop for PublishTicket {
    fn drop(&mut self) {
        if !self.finished {
            self.entry
                .write(|slot| slot.record.publish_state = PublishState::PublishFailed);
        }
    }
}
