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

use super::{AttachmentReconciler, iscsi_target};
use crate::error::Result;
use crate::ledger::{TransitionGuard, TransitionStatus};
use crate::types::v1::common::AttachmentPhase;
use crate::types::v1::volume_attachment::CStorVolumeAttachment;
use kube::ResourceExt;
use kube::runtime::events::EventType;
use tracing::{debug, info, instrument};

impl AttachmentReconciler {
    /// Unmounts the volume, logs out of its target and clears the node's
    /// claim on the attachment.
    ///
    /// If an unmount fails the session is kept, the guard is marked
    /// `MountFailed` and the node finalizer stays in place.
    #[instrument(skip(self, guard))]
    pub async fn unstage(&self, guard: &TransitionGuard, volume_id: &str) -> Result<()> {
        let Some(attachment) = self.attachment(volume_id).await? else {
            debug!("no attachment on this node");
            return Ok(());
        };
        let name = attachment.name_any();
        let volume = &attachment.spec.volume;

        if volume.staging_path.is_empty() {
            if volume.device_path.is_empty() && attachment.holds_node_finalizer() {
                self.store
                    .update_attachment(&name, &|a: &mut CStorVolumeAttachment| {
                        a.remove_node_finalizer()
                    })
                    .await?;
            }
            debug!("not staged");
            return Ok(());
        }

        guard.set(TransitionStatus::UnmountUnderProgress);
        let mounter = &self.host.mounter;
        let table = mounter.mount_table().await?;

        for path in [&volume.target_path, &volume.staging_path] {
            if path.is_empty() || !table.is_mounted(path) {
                continue;
            }
            if let Err(e) = mounter.unmount(path).await {
                guard.set(TransitionStatus::MountFailed);
                self.mark_phase(&attachment, AttachmentPhase::MountFailed).await;
                self.event(&attachment, EventType::Warning, "UnmountFailed", &e.to_string())
                    .await;
                return Err(e.into());
            }
            info!(path = %path, "unmounted");
        }

        if !attachment.spec.iscsi.iqn.is_empty() {
            self.host
                .initiator
                .logout(&iscsi_target(&attachment.spec.iscsi))
                .await?;
        }

        // the finalizer goes last: dropping it may purge a deleting object
        self.store
            .update_attachment_status(&name, &|a: &mut CStorVolumeAttachment| {
                a.set_phase(AttachmentPhase::Unstaged)
            })
            .await?;
        self.store
            .update_attachment(&name, &|a: &mut CStorVolumeAttachment| {
                a.spec.volume.device_path.clear();
                a.spec.volume.staging_path.clear();
                a.spec.volume.target_path.clear();
                a.remove_node_finalizer();
            })
            .await?;
        info!("volume unstaged");
        Ok(())
    }
}
