// Copyright 2026 The OpenEBS Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Per-volume transition ledger.
//!
//! Every operation that mutates kernel or cluster state for a volume first
//! takes the volume's entry. Taking an entry never blocks: if another task
//! holds it, [`Ledger::acquire`] fails with the holder's current status so the
//! caller can answer "busy, retry later". The entry is released when the
//! returned [`TransitionGuard`] is finished or dropped, on every exit path.

use serde::Serialize;
use snafu::Snafu;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use strum::Display;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, Serialize)]
pub enum TransitionStatus {
    Uninitialized,
    WaitingForConfigBound,
    WaitingForVolumeReady,
    MountUnderProgress,
    Mounted,
    UnmountUnderProgress,
    Unmounted,
    ResizeInProgress,
    MountFailed,
}

#[derive(Debug, Snafu)]
#[snafu(display("volume {} is busy: {}", volume_id, status))]
pub struct Busy {
    pub volume_id: String,
    pub status: TransitionStatus,
}

#[derive(Default)]
struct Table {
    /// Volumes currently owned by exactly one task.
    in_transition: HashMap<String, TransitionStatus>,
    /// Last status each volume settled in when its owner finished.
    settled: HashMap<String, TransitionStatus>,
}

/// Consistent copy of the ledger taken under one read lock.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LedgerSnapshot {
    pub in_transition: HashMap<String, TransitionStatus>,
    pub settled: HashMap<String, TransitionStatus>,
}

#[derive(Default)]
pub struct Ledger {
    table: RwLock<Table>,
}

impl Ledger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn read(&self) -> RwLockReadGuard<'_, Table> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Table> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the entry for `volume_id`, or reports who holds it.
    pub fn acquire(
        self: &Arc<Self>,
        volume_id: &str,
        initial: TransitionStatus,
    ) -> Result<TransitionGuard, Busy> {
        let mut table = self.write();
        if let Some(status) = table.in_transition.get(volume_id) {
            return BusySnafu {
                volume_id,
                status: *status,
            }
            .fail();
        }
        table.in_transition.insert(volume_id.to_owned(), initial);
        debug!(volume_id, status = %initial, "ledger entry acquired");

        Ok(TransitionGuard {
            ledger: Arc::clone(self),
            volume_id: volume_id.to_owned(),
            released: false,
        })
    }

    pub fn status(&self, volume_id: &str) -> Option<TransitionStatus> {
        self.read().in_transition.get(volume_id).copied()
    }

    pub fn settled(&self, volume_id: &str) -> Option<TransitionStatus> {
        self.read().settled.get(volume_id).copied()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let table = self.read();
        LedgerSnapshot {
            in_transition: table.in_transition.clone(),
            settled: table.settled.clone(),
        }
    }

    /// Forgets where volumes rejected by `keep` settled. Entries in transition
    /// are left alone.
    pub fn retain_settled(&self, keep: impl Fn(&str) -> bool) {
        let mut table = self.write();
        let before = table.settled.len();
        table.settled.retain(|volume_id, _| keep(volume_id));
        let pruned = before - table.settled.len();
        if pruned > 0 {
            debug!(pruned, "settled ledger entries dropped");
        }
    }

    fn set(&self, volume_id: &str, status: TransitionStatus) {
        if let Some(entry) = self.write().in_transition.get_mut(volume_id) {
            *entry = status;
        }
    }

    fn release(&self, volume_id: &str, settled: Option<TransitionStatus>) {
        let mut table = self.write();
        table.in_transition.remove(volume_id);
        if let Some(status) = settled {
            table.settled.insert(volume_id.to_owned(), status);
        }
        debug!(volume_id, ?settled, "ledger entry released");
    }
}

/// Ownership of one volume's ledger entry.
///
/// Status changes are only possible through the guard.
#[must_use = "dropping the guard releases the volume immediately"]
pub struct TransitionGuard {
    ledger: Arc<Ledger>,
    volume_id: String,
    released: bool,
}

impl TransitionGuard {
    pub fn volume_id(&self) -> &str {
        &self.volume_id
    }

    pub fn set(&self, status: TransitionStatus) {
        self.ledger.set(&self.volume_id, status);
    }

    pub fn status(&self) -> Option<TransitionStatus> {
        self.ledger.status(&self.volume_id)
    }

    /// Releases the entry and records where the volume settled.
    pub fn finish(mut self, status: TransitionStatus) {
        self.released = true;
        self.ledger.release(&self.volume_id, Some(status));
    }
}

impl Drop for TransitionGuard {
    fn drop(&mut self) {
        if !self.released {
            self.ledger.release(&self.volume_id, None);
        }
    }
}

impl std::fmt::Debug for TransitionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionGuard")
            .field("volume_id", &self.volume_id)
            .field("released", &self.released)
            .finish()
    }
}
