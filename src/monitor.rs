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

//! Periodic re-alignment of kernel mounts with this node's attachments.
//!
//! Each tick compares the mount table with every published filesystem
//! attachment. A staging path that is missing or read-only, or a target path
//! that is missing, counts as drift; drifted volumes that nobody holds in the
//! ledger get a repair worker. Attachments being deleted that still carry the
//! node finalizer are driven through unstage. Volumes with no attachment left
//! on this node are dropped from the ledger's settled record.

use crate::error::Result;
use crate::kernel::MountTable;
use crate::ledger::{Ledger, TransitionStatus};
use crate::reconcile::{AttachmentReconciler, settle};
use crate::types::v1::volume_attachment::{CStorVolumeAttachment, node_selector};
use kube::runtime::events::EventType;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use strum::Display;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum Drift {
    StagingMissing,
    StagingReadOnly,
    TargetMissing,
}

/// How the attachment's mounts differ from the kernel, if they do.
pub fn drifted(attachment: &CStorVolumeAttachment, table: &MountTable) -> Option<Drift> {
    let volume = &attachment.spec.volume;
    match table.find(&volume.staging_path) {
        None => Some(Drift::StagingMissing),
        Some(entry) if entry.is_read_only() => Some(Drift::StagingReadOnly),
        Some(_) if !table.is_mounted(&volume.target_path) => Some(Drift::TargetMissing),
        Some(_) => None,
    }
}

pub struct MountMonitor {
    reconciler: Arc<AttachmentReconciler>,
    ledger: Arc<Ledger>,
    interval: Duration,
}

impl MountMonitor {
    pub fn new(reconciler: Arc<AttachmentReconciler>, ledger: Arc<Ledger>, interval: Duration) -> Self {
        Self {
            reconciler,
            ledger,
            interval,
        }
    }

    /// Ticks until `cancel` fires. A failed tick is logged and retried on the
    /// next one.
    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = IntervalStream::new(interval);
        info!(interval = ?self.interval, node_id = self.reconciler.node_id(), "mount monitor started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                tick = ticks.next() => {
                    if tick.is_none() {
                        break;
                    }
                }
            }
            if let Err(e) = self.tick(&cancel).await {
                warn!(error = %e, "mount monitor tick failed");
            }
        }
        info!("mount monitor stopped");
    }

    /// One pass over this node's attachments. Returns the spawned workers.
    pub async fn tick(&self, cancel: &CancellationToken) -> Result<Vec<JoinHandle<()>>> {
        let node_id = self.reconciler.node_id();
        let table = self.reconciler.host.mounter.mount_table().await?;
        let attachments = self
            .reconciler
            .store()
            .list_attachments(&node_selector(node_id))
            .await?;

        {
            let live: HashSet<&str> = attachments
                .iter()
                .filter(|a| a.node_id() == node_id)
                .map(|a| a.volume_id())
                .collect();
            self.ledger.retain_settled(|volume_id| live.contains(volume_id));
        }

        let mut workers = Vec::new();
        for attachment in attachments {
            if attachment.node_id() != node_id {
                continue;
            }
            let volume_id = attachment.volume_id().to_owned();

            if attachment.is_deleting() {
                if !attachment.holds_node_finalizer() {
                    continue;
                }
                let Ok(guard) = self
                    .ledger
                    .acquire(&volume_id, TransitionStatus::UnmountUnderProgress)
                else {
                    debug!(volume_id, "deleting attachment busy, skipping");
                    continue;
                };
                info!(volume_id, "cleaning up deleted attachment");
                let reconciler = Arc::clone(&self.reconciler);
                workers.push(tokio::spawn(async move {
                    let result = reconciler.unstage(&guard, &volume_id).await;
                    if let Err(e) = &result {
                        warn!(volume_id, error = %e, "cleanup of deleted attachment failed");
                    }
                    settle(guard, &result, TransitionStatus::Unmounted);
                }));
                continue;
            }

            if !attachment.is_monitored() {
                continue;
            }
            let Some(drift) = drifted(&attachment, &table) else {
                continue;
            };
            // never preempt an operation in flight
            let Ok(guard) = self
                .ledger
                .acquire(&volume_id, TransitionStatus::MountUnderProgress)
            else {
                debug!(volume_id, %drift, "drifted volume busy, skipping");
                continue;
            };

            warn!(volume_id, %drift, "mount drift detected");
            let reconciler = Arc::clone(&self.reconciler);
            let cancel = cancel.clone();
            workers.push(tokio::spawn(async move {
                let result = reconciler.repair(&guard, &cancel, &attachment).await;
                match &result {
                    Ok(()) => {
                        let message = format!("remounted after {drift}");
                        reconciler
                            .event(&attachment, EventType::Normal, "MountRepaired", &message)
                            .await;
                    }
                    Err(e) => {
                        warn!(volume_id, error = %e, "mount repair failed");
                        reconciler
                            .event(&attachment, EventType::Warning, "MountRepairFailed", &e.to_string())
                            .await;
                    }
                }
                settle(guard, &result, TransitionStatus::Mounted);
            }));
        }
        Ok(workers)
    }
}
