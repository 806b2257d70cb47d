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
use crate::error::{Error, Result};
use crate::ledger::{TransitionGuard, TransitionStatus};
use crate::types::v1::common::AccessType;
use tracing::{info, instrument};

impl AttachmentReconciler {
    /// Rescans the session and grows the filesystem to the new device size.
    ///
    /// Returns the filesystem size, or `None` for block volumes where only the
    /// device is rescanned.
    #[instrument(skip(self, guard))]
    pub async fn expand(
        &self,
        guard: &TransitionGuard,
        volume_id: &str,
        volume_path: &str,
    ) -> Result<Option<u64>> {
        let attachment = self.require_attachment(volume_id).await?;
        let volume = &attachment.spec.volume;
        if volume.device_path.is_empty() {
            return Err(Error::unavailable(format!(
                "volume {volume_id} is not staged on this node"
            )));
        }

        guard.set(TransitionStatus::ResizeInProgress);
        self.host
            .initiator
            .rescan(&iscsi_target(&attachment.spec.iscsi))
            .await?;

        if volume.access_type == AccessType::Block {
            info!("block device rescanned");
            return Ok(None);
        }

        let mount_path = if volume_path.is_empty() {
            volume.staging_path.as_str()
        } else {
            volume_path
        };
        let mounter = &self.host.mounter;
        let fs_type = pick_fs_type(&volume.fs_type, "");
        mounter
            .resize_fs(fs_type, &volume.device_path, mount_path)
            .await?;

        let stats = mounter.fs_stats(mount_path).await?;
        info!(mount_path, total_bytes = stats.total_bytes, "filesystem expanded");
        Ok(Some(stats.total_bytes))
    }
}
