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

use super::{AttachmentReconciler, STAGING_MODE, iscsi_target, pick_fs_type};
use crate::error::{Error, Result};
use crate::ledger::{TransitionGuard, TransitionStatus};
use crate::types::v1::common::{AccessType, AttachmentPhase};
use crate::types::v1::volume_attachment::{CStorVolumeAttachment, IscsiInfo};
use kube::ResourceExt;
use kube::runtime::events::EventType;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// What a stage call asks for, already validated.
#[derive(Clone, Debug, Default)]
pub struct StageRequest {
    pub volume_id: String,
    pub staging_path: String,
    pub access_type: AccessType,
    pub fs_type: String,
    pub mount_options: Vec<String>,
}

impl AttachmentReconciler {
    /// Logs in to the volume's target and mounts it at the staging path.
    ///
    /// A volume that is already staged at the same path with its device still
    /// present is left untouched; one still mounted at another staging path
    /// is refused. A device path recorded by an interrupted
    /// stage is reused without a second login.
    #[instrument(skip_all, fields(volume_id = %req.volume_id))]
    pub async fn stage(
        &self,
        guard: &TransitionGuard,
        cancel: &CancellationToken,
        req: &StageRequest,
    ) -> Result<()> {
        let attachment = self.require_attachment(&req.volume_id).await?;
        if attachment.is_deleting() {
            return Err(Error::unavailable(format!(
                "attachment of volume {} is being deleted",
                req.volume_id
            )));
        }

        let target = self.wait_for_target(guard, cancel, &attachment).await?;

        let mounter = &self.host.mounter;
        let volume = &attachment.spec.volume;
        let block = req.access_type == AccessType::Block;
        let device_present =
            !volume.device_path.is_empty() && mounter.path_exists(&volume.device_path).await;

        if device_present
            && volume.staging_path == req.staging_path
            && (block || mounter.mount_table().await?.is_mounted(&req.staging_path))
        {
            debug!(staging_path = %req.staging_path, "already staged");
            return Ok(());
        }

        // one staging path per volume and node while it is still mounted
        if !volume.staging_path.is_empty()
            && volume.staging_path != req.staging_path
            && mounter.mount_table().await?.is_mounted(&volume.staging_path)
        {
            return Err(Error::AlreadyExists {
                message: format!(
                    "volume {} is already staged at {}",
                    req.volume_id, volume.staging_path
                ),
            });
        }

        guard.set(TransitionStatus::MountUnderProgress);
        let iscsi = IscsiInfo {
            iqn: target.iqn.clone(),
            target_portal: target.portal.clone(),
            iface: attachment.spec.iscsi.iface.clone(),
            lun: target.lun,
        };

        let device = if device_present && attachment.spec.iscsi == iscsi {
            debug!(device = %volume.device_path, "reusing existing session");
            volume.device_path.clone()
        } else {
            self.host.initiator.connect(&iscsi_target(&iscsi)).await?
        };
        info!(%device, portal = %iscsi.target_portal, "device attached");

        let fs_type = pick_fs_type(&req.fs_type, &volume.fs_type).to_owned();
        let options = if req.mount_options.is_empty() {
            volume.mount_options.clone()
        } else {
            req.mount_options.clone()
        };

        // The device path must be on record before anything is mounted.
        let name = attachment.name_any();
        let staged = self
            .store
            .update_attachment(&name, &|a: &mut CStorVolumeAttachment| {
                a.spec.iscsi = iscsi.clone();
                a.spec.volume.device_path = device.clone();
                a.spec.volume.staging_path = req.staging_path.clone();
                a.spec.volume.access_type = req.access_type;
                if !block {
                    a.spec.volume.fs_type = fs_type.clone();
                }
                a.spec.volume.mount_options = options.clone();
                a.add_node_finalizer();
            })
            .await?;

        let table = mounter.mount_table().await?;
        if table.is_mounted(&req.staging_path) {
            debug!(staging_path = %req.staging_path, "staging path already mounted");
        } else {
            mounter.ensure_dir(&req.staging_path, STAGING_MODE).await?;
            if !block
                && let Err(e) = mounter
                    .format_and_mount(&device, &req.staging_path, &fs_type, &options)
                    .await
            {
                guard.set(TransitionStatus::MountFailed);
                self.mark_phase(&staged, AttachmentPhase::MountFailed).await;
                self.event(&staged, EventType::Warning, "MountFailed", &e.to_string())
                    .await;
                return Err(e.into());
            }
        }

        self.store
            .update_attachment_status(&name, &|a: &mut CStorVolumeAttachment| {
                a.set_phase(AttachmentPhase::Staged)
            })
            .await?;
        info!(staging_path = %req.staging_path, "volume staged");
        Ok(())
    }
}
