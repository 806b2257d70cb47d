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

//! Node-side attachment state machine.
//!
//! Each step takes the caller's [`TransitionGuard`] so that kernel state is
//! only touched while the volume's ledger entry is held. The reconciler never
//! settles the ledger itself; it marks `MountFailed` on the guard when a mount
//! or unmount fails and leaves the decision to [`settle`].

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::kernel::{Host, IscsiTarget};
use crate::ledger::{TransitionGuard, TransitionStatus};
use crate::store::ClusterStore;
use crate::types::v1::common::AttachmentPhase;
use crate::types::v1::target::TargetVolume;
use crate::types::v1::volume_attachment::{CStorVolumeAttachment, IscsiInfo, attachment_name};
use crate::wait::{self, Timing, WaitOutcome};
use kube::runtime::events::EventType;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

mod expand;
mod publish;
mod repair;
mod stage;
mod unstage;

pub use publish::PublishRequest;
pub use stage::StageRequest;

/// Filesystem used when neither the request nor the attachment names one.
pub const DEFAULT_FS_TYPE: &str = "ext4";

/// Mode of a staging directory.
pub const STAGING_MODE: u32 = 0o750;
/// Mode of a mount-access target directory before the bind hides it.
pub const TARGET_MODE: u32 = 0o000;

pub struct AttachmentReconciler {
    pub(crate) store: Arc<dyn ClusterStore>,
    pub(crate) host: Host,
    pub(crate) timing: Timing,
    node_id: String,
}

impl AttachmentReconciler {
    pub fn new(
        store: Arc<dyn ClusterStore>,
        host: Host,
        timing: Timing,
        node_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            host,
            timing,
            node_id: node_id.into(),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn store(&self) -> &Arc<dyn ClusterStore> {
        &self.store
    }

    /// This node's attachment of `volume_id`.
    pub(crate) async fn attachment(&self, volume_id: &str) -> Result<Option<CStorVolumeAttachment>> {
        let name = attachment_name(volume_id, &self.node_id);
        Ok(self.store.get_attachment(&name).await?)
    }

    pub(crate) async fn require_attachment(&self, volume_id: &str) -> Result<CStorVolumeAttachment> {
        self.attachment(volume_id)
            .await?
            .ok_or_else(|| Error::not_found("CStorVolumeAttachment", &attachment_name(volume_id, &self.node_id)))
    }

    /// Waits until the target serving the attachment's volume is reachable
    /// and ready, then returns its coordinates.
    ///
    /// Reachability is always probed afresh since the portal address can move.
    pub(crate) async fn wait_for_target(
        &self,
        guard: &TransitionGuard,
        cancel: &CancellationToken,
        attachment: &CStorVolumeAttachment,
    ) -> Result<TargetVolume> {
        let volume_id = attachment.volume_id();
        let engine = Engine::from(attachment.spec.volume.cas_type);
        let store = self.store.as_ref();

        let Some(target) = engine.target_volume(store, volume_id).await? else {
            return Err(Error::unavailable(format!(
                "target volume {volume_id} is not published yet"
            )));
        };

        let prober = &self.host.prober;
        let portal = target.portal.as_str();
        let reachable = wait::poll(self.timing.reachable, cancel, |attempt| async move {
            guard.set(TransitionStatus::WaitingForVolumeReady);
            let ok = prober.reachable(portal).await;
            if !ok {
                debug!(volume_id, portal, attempt, "target portal not reachable");
            }
            Ok::<_, Error>(ok.then_some(()))
        })
        .await?;
        match reachable {
            WaitOutcome::Ready(()) => {}
            WaitOutcome::ExhaustedRetries => {
                return Err(Error::unavailable(format!(
                    "target portal {portal} of volume {volume_id} is not reachable"
                )));
            }
            WaitOutcome::Cancelled => return Err(cancelled(volume_id)),
        }

        let ready = wait::poll(self.timing.ready, cancel, |attempt| async move {
            guard.set(TransitionStatus::WaitingForVolumeReady);
            match engine.target_volume(store, volume_id).await {
                Ok(Some(target)) if target.is_ready() => Ok(Some(target)),
                Ok(other) => {
                    debug!(
                        volume_id,
                        attempt,
                        health = ?other.map(|t| t.health),
                        "target volume not ready"
                    );
                    Ok(None)
                }
                Err(e) => Err(Error::from(e)),
            }
        })
        .await?;
        match ready {
            WaitOutcome::Ready(target) => Ok(target),
            WaitOutcome::ExhaustedRetries => Err(Error::unavailable(format!(
                "volume {volume_id} is not ready yet"
            ))),
            WaitOutcome::Cancelled => Err(cancelled(volume_id)),
        }
    }

    /// Best-effort phase change that does not mask the error being reported.
    pub(crate) async fn mark_phase(&self, attachment: &CStorVolumeAttachment, phase: AttachmentPhase) {
        let name = attachment_name(attachment.volume_id(), attachment.node_id());
        if let Err(e) = self
            .store
            .update_attachment_status(&name, &move |a: &mut CStorVolumeAttachment| a.set_phase(phase))
            .await
        {
            warn!(attachment = %name, error = %e, "failed to record phase {}", phase);
        }
    }

    pub(crate) async fn event(
        &self,
        attachment: &CStorVolumeAttachment,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) {
        if let Err(e) = self.store.record(attachment, event_type, reason, message).await {
            warn!(volume_id = attachment.volume_id(), error = %e, "failed to record event {}", reason);
        }
    }
}

pub(crate) fn iscsi_target(iscsi: &IscsiInfo) -> IscsiTarget {
    IscsiTarget {
        iqn: iscsi.iqn.clone(),
        portal: iscsi.target_portal.clone(),
        iface: iscsi.iface.clone(),
        lun: iscsi.lun,
    }
}

/// First non-empty filesystem type, falling back to [`DEFAULT_FS_TYPE`].
pub(crate) fn pick_fs_type<'a>(requested: &'a str, recorded: &'a str) -> &'a str {
    [requested, recorded]
        .into_iter()
        .find(|fs| !fs.is_empty())
        .unwrap_or(DEFAULT_FS_TYPE)
}

fn cancelled(volume_id: &str) -> Error {
    Error::unavailable(format!("cancelled while waiting for volume {volume_id}"))
}

/// Releases the guard after an operation: `on_success` when it succeeded,
/// `MountFailed` when the operation marked a mount failure, and without
/// settling otherwise.
pub fn settle<T>(guard: TransitionGuard, result: &Result<T>, on_success: TransitionStatus) {
    match result {
        Ok(_) => guard.finish(on_success),
        Err(_) if guard.status() == Some(TransitionStatus::MountFailed) => {
            guard.finish(TransitionStatus::MountFailed)
        }
        Err(_) => drop(guard),
    }
}
