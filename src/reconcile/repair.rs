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

use super::{AttachmentReconciler, iscsi_target, pick_fs_type};
use crate::error::Result;
use crate::ledger::{TransitionGuard, TransitionStatus};
use crate::types::v1::common::AttachmentPhase;
use crate::types::v1::volume_attachment::{CStorVolumeAttachment, IscsiInfo};
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

impl AttachmentReconciler {
    /// Restores the staging and target mounts of a drifted attachment.
    ///
    /// Stale mounts are dropped first, then the device is mounted read-write
    /// at staging and bound to the target again.
    #[instrument(skip_all, fields(volume_id = %attachment.volume_id()))]
    pub async fn repair(
        &self,
        guard: &TransitionGuard,
        cancel: &CancellationToken,
        attachment: &CStorVolumeAttachment,
    ) -> Result<()> {
        let target = self.wait_for_target(guard, cancel, attachment).await?;
        guard.set(TransitionStatus::MountUnderProgress);

        let volume = &attachment.spec.volume;
        let mounter = &self.host.mounter;
        let table = mounter.mount_table().await?;
        for path in [&volume.target_path, &volume.staging_path] {
            if table.is_mounted(path) {
                mounter.unmount(path).await?;
            }
        }

        let device = if !volume.device_path.is_empty()
            && mounter.path_exists(&volume.device_path).await
        {
            volume.device_path.clone()
        } else {
            let iscsi = IscsiInfo {
                iqn: target.iqn.clone(),
                target_portal: target.portal.clone(),
                iface: attachment.spec.iscsi.iface.clone(),
                lun: target.lun,
            };
            let device = self.host.initiator.connect(&iscsi_target(&iscsi)).await?;
            self.store
                .update_attachment(&attachment.name_any(), &|a: &mut CStorVolumeAttachment| {
                    a.spec.iscsi = iscsi.clone();
                    a.spec.volume.device_path = device.clone();
                })
                .await?;
            info!(%device, "session re-established");
            device
        };

        let options: Vec<String> = volume
            .mount_options
            .iter()
            .filter(|o| o.as_str() != "ro")
            .cloned()
            .collect();
        mounter
            .format_and_mount(
                &device,
                &volume.staging_path,
                pick_fs_type(&volume.fs_type, ""),
                &options,
            )
            .await?;
        mounter
            .bind_mount(&volume.staging_path, &volume.target_path, volume.read_only)
            .await?;

        self.mark_phase(attachment, AttachmentPhase::Published).await;
        info!("mounts repaired");
        Ok(())
    }
}
