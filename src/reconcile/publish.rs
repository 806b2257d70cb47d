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

use super::{AttachmentReconciler, TARGET_MODE};
use crate::error::{Error, Result};
use crate::ledger::{TransitionGuard, TransitionStatus};
use crate::types::v1::common::{AccessType, AttachmentPhase};
use crate::types::v1::volume_attachment::CStorVolumeAttachment;
use kube::ResourceExt;
use tracing::{debug, info, instrument};

#[derive(Clone, Debug, Default)]
pub struct PublishRequest {
    pub volume_id: String,
    pub staging_path: String,
    pub target_path: String,
    pub access_type: AccessType,
    pub read_only: bool,
}

impl AttachmentReconciler {
    /// Bind-mounts a staged volume at the workload's target path.
    #[instrument(skip_all, fields(volume_id = %req.volume_id))]
    pub async fn publish(&self, guard: &TransitionGuard, req: &PublishRequest) -> Result<()> {
        let attachment = self.require_attachment(&req.volume_id).await?;
        let volume = &attachment.spec.volume;
        if volume.device_path.is_empty() {
            return Err(Error::unavailable(format!(
                "volume {} is not staged on this node",
                req.volume_id
            )));
        }

        guard.set(TransitionStatus::MountUnderProgress);
        let mounter = &self.host.mounter;
        let table = mounter.mount_table().await?;

        if table.is_mounted(&req.target_path) {
            debug!(target_path = %req.target_path, "target already mounted");
        } else if req.access_type == AccessType::Block {
            mounter.ensure_file(&req.target_path).await?;
            mounter
                .bind_mount(&volume.device_path, &req.target_path, req.read_only)
                .await?;
        } else {
            let staging = if req.staging_path.is_empty() {
                volume.staging_path.as_str()
            } else {
                req.staging_path.as_str()
            };
            if !table.is_mounted(staging) {
                return Err(Error::unavailable(format!(
                    "staging path {staging} of volume {} is not mounted",
                    req.volume_id
                )));
            }
            mounter.ensure_dir(&req.target_path, TARGET_MODE).await?;
            mounter
                .bind_mount(staging, &req.target_path, req.read_only)
                .await?;
        }

        let name = attachment.name_any();
        self.store
            .update_attachment(&name, &|a: &mut CStorVolumeAttachment| {
                a.spec.volume.target_path = req.target_path.clone();
                a.spec.volume.read_only = req.read_only;
            })
            .await?;
        self.store
            .update_attachment_status(&name, &|a: &mut CStorVolumeAttachment| {
                a.set_phase(AttachmentPhase::Published)
            })
            .await?;
        info!(target_path = %req.target_path, read_only = req.read_only, "volume published");
        Ok(())
    }

    /// Unmounts and removes the target path. A target that is not mounted is
    /// not an error.
    #[instrument(skip(self, guard))]
    pub async fn unpublish(
        &self,
        guard: &TransitionGuard,
        volume_id: &str,
        target_path: &str,
    ) -> Result<()> {
        guard.set(TransitionStatus::UnmountUnderProgress);
        let mounter = &self.host.mounter;

        if mounter.mount_table().await?.is_mounted(target_path) {
            mounter.unmount(target_path).await?;
            info!("target unmounted");
        } else {
            debug!("target not mounted");
        }
        mounter.remove_path(target_path).await?;

        if let Some(attachment) = self.attachment(volume_id).await?
            && attachment.spec.volume.target_path == target_path
        {
            let name = attachment.name_any();
            self.store
                .update_attachment(&name, &|a: &mut CStorVolumeAttachment| {
                    a.spec.volume.target_path.clear()
                })
                .await?;
            self.store
                .update_attachment_status(&name, &|a: &mut CStorVolumeAttachment| {
                    a.set_phase(AttachmentPhase::Staged)
                })
                .await?;
        }
        Ok(())
    }
}
