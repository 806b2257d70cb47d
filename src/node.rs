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

//! Node service: validates requests, takes the ledger and hands each call to
//! the attachment reconciler.

use crate::csi::{
    self, AccessMode, Empty, NodeCapability, NodeExpandVolumeRequest, NodeExpandVolumeResponse,
    NodeGetCapabilitiesResponse, NodeGetInfoResponse, NodeGetVolumeStatsRequest,
    NodeGetVolumeStatsResponse, NodePublishVolumeRequest, NodeStageVolumeRequest,
    NodeUnpublishVolumeRequest, NodeUnstageVolumeRequest, UsageUnit, VolumeCapability,
    VolumeUsage,
};
use crate::error::{Error, Result};
use crate::ledger::{Ledger, TransitionStatus};
use crate::reconcile::{AttachmentReconciler, PublishRequest, StageRequest, settle};
use crate::types::v1::common::AccessType;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

pub const SUPPORTED_FS_TYPES: [&str; 4] = ["ext4", "ext3", "ext2", "xfs"];

pub struct NodeService {
    reconciler: Arc<AttachmentReconciler>,
    ledger: Arc<Ledger>,
    shutdown: CancellationToken,
}

impl NodeService {
    pub fn new(
        reconciler: Arc<AttachmentReconciler>,
        ledger: Arc<Ledger>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            reconciler,
            ledger,
            shutdown,
        }
    }

    /// Runs `op` on its own task. If the caller goes away the token handed to
    /// `op` is cancelled, which stops waits but lets a login or mount in
    /// flight run to completion.
    async fn detached<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce(Arc<AttachmentReconciler>, CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let cancel = self.shutdown.child_token();
        let _abandon = cancel.clone().drop_guard();
        tokio::spawn(op(Arc::clone(&self.reconciler), cancel))
            .await
            .map_err(|e| Error::Internal {
                message: format!("node operation aborted: {e}"),
            })?
    }
}

fn require(value: &str, field: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::invalid(format!("{field} is required")));
    }
    Ok(())
}

fn access_of(capability: &VolumeCapability) -> Result<AccessType> {
    if capability.access_mode == AccessMode::Unknown {
        return Err(Error::invalid("volume capability access mode is required"));
    }
    if capability.is_block() {
        return Ok(AccessType::Block);
    }
    let fs_type = capability.fs_type();
    if !fs_type.is_empty() && !SUPPORTED_FS_TYPES.contains(&fs_type) {
        return Err(Error::invalid(format!("unsupported filesystem type '{fs_type}'")));
    }
    Ok(AccessType::Mount)
}

#[async_trait]
impl csi::Node for NodeService {
    #[instrument(skip_all, fields(volume_id = %req.volume_id))]
    async fn stage_volume(&self, req: NodeStageVolumeRequest) -> Result<Empty> {
        require(&req.volume_id, "volume id")?;
        require(&req.staging_target_path, "staging target path")?;
        let stage = StageRequest {
            access_type: access_of(&req.volume_capability)?,
            fs_type: req.volume_capability.fs_type().to_owned(),
            mount_options: req.volume_capability.mount_flags().to_vec(),
            volume_id: req.volume_id,
            staging_path: req.staging_target_path,
        };

        let guard = self
            .ledger
            .acquire(&stage.volume_id, TransitionStatus::Uninitialized)?;
        self.detached(move |reconciler, cancel| async move {
            let result = reconciler.stage(&guard, &cancel, &stage).await;
            settle(guard, &result, TransitionStatus::Mounted);
            result
        })
        .await?;
        Ok(Empty {})
    }

    #[instrument(skip_all, fields(volume_id = %req.volume_id))]
    async fn unstage_volume(&self, req: NodeUnstageVolumeRequest) -> Result<Empty> {
        require(&req.volume_id, "volume id")?;
        let guard = self
            .ledger
            .acquire(&req.volume_id, TransitionStatus::UnmountUnderProgress)?;
        self.detached(move |reconciler, _| async move {
            let result = reconciler.unstage(&guard, &req.volume_id).await;
            settle(guard, &result, TransitionStatus::Unmounted);
            result
        })
        .await?;
        Ok(Empty {})
    }

    #[instrument(skip_all, fields(volume_id = %req.volume_id))]
    async fn publish_volume(&self, req: NodePublishVolumeRequest) -> Result<Empty> {
        require(&req.volume_id, "volume id")?;
        require(&req.target_path, "target path")?;
        let access_type = access_of(&req.volume_capability)?;
        if access_type == AccessType::Mount {
            require(&req.staging_target_path, "staging target path")?;
        }
        let publish = PublishRequest {
            volume_id: req.volume_id,
            staging_path: req.staging_target_path,
            target_path: req.target_path,
            access_type,
            read_only: req.readonly,
        };

        let guard = self
            .ledger
            .acquire(&publish.volume_id, TransitionStatus::MountUnderProgress)?;
        self.detached(move |reconciler, _| async move {
            let result = reconciler.publish(&guard, &publish).await;
            settle(guard, &result, TransitionStatus::Mounted);
            result
        })
        .await?;
        Ok(Empty {})
    }

    #[instrument(skip_all, fields(volume_id = %req.volume_id))]
    async fn unpublish_volume(&self, req: NodeUnpublishVolumeRequest) -> Result<Empty> {
        require(&req.volume_id, "volume id")?;
        require(&req.target_path, "target path")?;
        let guard = self
            .ledger
            .acquire(&req.volume_id, TransitionStatus::UnmountUnderProgress)?;
        self.detached(move |reconciler, _| async move {
            let result = reconciler
                .unpublish(&guard, &req.volume_id, &req.target_path)
                .await;
            // the staging mount is still in place
            settle(guard, &result, TransitionStatus::Mounted);
            result
        })
        .await?;
        Ok(Empty {})
    }

    #[instrument(skip_all, fields(volume_id = %req.volume_id))]
    async fn expand_volume(&self, req: NodeExpandVolumeRequest) -> Result<NodeExpandVolumeResponse> {
        require(&req.volume_id, "volume id")?;
        let required = req.capacity_range.map(|r| r.required_bytes).unwrap_or_default();
        let volume_path = if req.volume_path.is_empty() {
            req.staging_target_path.clone()
        } else {
            req.volume_path.clone()
        };

        let guard = self
            .ledger
            .acquire(&req.volume_id, TransitionStatus::ResizeInProgress)?;
        let grown = self
            .detached(move |reconciler, _| async move {
                let result = reconciler.expand(&guard, &req.volume_id, &volume_path).await;
                settle(guard, &result, TransitionStatus::Mounted);
                result
            })
            .await?;

        Ok(NodeExpandVolumeResponse {
            capacity_bytes: grown.unwrap_or(required),
        })
    }

    async fn get_volume_stats(
        &self,
        req: NodeGetVolumeStatsRequest,
    ) -> Result<NodeGetVolumeStatsResponse> {
        require(&req.volume_id, "volume id")?;
        require(&req.volume_path, "volume path")?;

        let mounter = &self.reconciler.host.mounter;
        if !mounter.path_exists(&req.volume_path).await {
            return Err(Error::not_found("volume path", &req.volume_path));
        }
        let stats = mounter.fs_stats(&req.volume_path).await?;
        Ok(NodeGetVolumeStatsResponse {
            usage: vec![
                VolumeUsage {
                    available: stats.available_bytes,
                    total: stats.total_bytes,
                    used: stats.used_bytes,
                    unit: UsageUnit::Bytes,
                },
                VolumeUsage {
                    available: stats.free_inodes,
                    total: stats.total_inodes,
                    used: stats.used_inodes,
                    unit: UsageUnit::Inodes,
                },
            ],
        })
    }

    async fn get_info(&self) -> Result<NodeGetInfoResponse> {
        Ok(NodeGetInfoResponse {
            node_id: self.reconciler.node_id().to_owned(),
            max_volumes_per_node: 0,
        })
    }

    async fn get_capabilities(&self) -> Result<NodeGetCapabilitiesResponse> {
        Ok(NodeGetCapabilitiesResponse {
            capabilities: vec![
                NodeCapability::StageUnstageVolume,
                NodeCapability::ExpandVolume,
                NodeCapability::GetVolumeStats,
            ],
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::csi::{CapacityRange, MountVolume, BlockVolume, Node};
    use crate::error::Code;
    use crate::tests::{
        NODE, NodeHarness, device_path, jiva_volume, pending_attachment, staging_path,
        target_path, volume_config,
    };
    use crate::types::v1::common::{AttachmentPhase, CasType, ConfigPhase, TargetHealth};
    use crate::utils::quantity::GIB;
    use std::time::Duration;

    const VOLUME: &str = "pvc-a";
    const ATTACHMENT: &str = "pvc-a-k8s-1";

    fn service(h: &NodeHarness) -> NodeService {
        NodeService::new(h.reconciler.clone(), h.ledger.clone(), CancellationToken::new())
    }

    fn mount_capability(fs_type: &str) -> VolumeCapability {
        VolumeCapability {
            mount: Some(MountVolume {
                fs_type: fs_type.to_owned(),
                mount_flags: vec![],
            }),
            block: None,
            access_mode: AccessMode::SingleNodeWriter,
        }
    }

    fn block_capability() -> VolumeCapability {
        VolumeCapability {
            mount: None,
            block: Some(BlockVolume {}),
            access_mode: AccessMode::SingleNodeWriter,
        }
    }

    fn stage_req(capability: VolumeCapability) -> NodeStageVolumeRequest {
        NodeStageVolumeRequest {
            volume_id: VOLUME.to_owned(),
            staging_target_path: staging_path(VOLUME),
            volume_capability: capability,
            ..Default::default()
        }
    }

    fn publish_req(capability: VolumeCapability) -> NodePublishVolumeRequest {
        NodePublishVolumeRequest {
            volume_id: VOLUME.to_owned(),
            staging_target_path: staging_path(VOLUME),
            target_path: target_path(VOLUME),
            volume_capability: capability,
            ..Default::default()
        }
    }

    fn unpublish_req() -> NodeUnpublishVolumeRequest {
        NodeUnpublishVolumeRequest {
            volume_id: VOLUME.to_owned(),
            target_path: target_path(VOLUME),
        }
    }

    fn unstage_req() -> NodeUnstageVolumeRequest {
        NodeUnstageVolumeRequest {
            volume_id: VOLUME.to_owned(),
            staging_target_path: staging_path(VOLUME),
        }
    }

    #[tokio::test]
    async fn test_full_lifecycle_is_idempotent() {
        let h = NodeHarness::new();
        h.provisioned(VOLUME, AccessType::Mount);
        let node = service(&h);

        node.stage_volume(stage_req(mount_capability("ext4"))).await.unwrap();
        node.stage_volume(stage_req(mount_capability("ext4"))).await.unwrap();
        assert_eq!(h.initiator.logins(), 1);
        assert_eq!(h.mounter.formats(), 1);
        assert!(h.mounter.is_mounted(&staging_path(VOLUME)));

        let staged = h.store.attachment(ATTACHMENT).unwrap();
        assert_eq!(staged.phase(), AttachmentPhase::Staged);
        assert_eq!(staged.spec.volume.device_path, device_path(VOLUME));
        assert!(staged.holds_node_finalizer());
        assert_eq!(h.ledger.settled(VOLUME), Some(TransitionStatus::Mounted));

        node.publish_volume(publish_req(mount_capability("ext4"))).await.unwrap();
        node.publish_volume(publish_req(mount_capability("ext4"))).await.unwrap();
        assert!(h.mounter.is_mounted(&target_path(VOLUME)));
        let published = h.store.attachment(ATTACHMENT).unwrap();
        assert_eq!(published.phase(), AttachmentPhase::Published);
        assert_eq!(published.spec.volume.target_path, target_path(VOLUME));

        node.unpublish_volume(unpublish_req()).await.unwrap();
        node.unpublish_volume(unpublish_req()).await.unwrap();
        assert!(!h.mounter.is_mounted(&target_path(VOLUME)));
        assert_eq!(
            h.store.attachment(ATTACHMENT).unwrap().phase(),
            AttachmentPhase::Staged
        );

        node.unstage_volume(unstage_req()).await.unwrap();
        node.unstage_volume(unstage_req()).await.unwrap();
        assert!(!h.mounter.is_mounted(&staging_path(VOLUME)));
        assert_eq!(h.initiator.logouts(), 1);

        let unstaged = h.store.attachment(ATTACHMENT).unwrap();
        assert_eq!(unstaged.phase(), AttachmentPhase::Unstaged);
        assert!(unstaged.spec.volume.device_path.is_empty());
        assert!(!unstaged.holds_node_finalizer());
        assert_eq!(h.ledger.settled(VOLUME), Some(TransitionStatus::Unmounted));
        assert!(h.ledger.status(VOLUME).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_stage_of_one_volume_is_busy() {
        let h = NodeHarness::new();
        h.provisioned(VOLUME, AccessType::Mount);
        h.initiator.delay_logins(Duration::from_secs(5));
        let node = service(&h);

        let (first, second) = tokio::join!(
            node.stage_volume(stage_req(mount_capability("ext4"))),
            node.stage_volume(stage_req(mount_capability("ext4"))),
        );

        assert!(first.is_ok());
        let err = second.unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
        assert_eq!(h.initiator.logins(), 1);
        assert!(h.ledger.status(VOLUME).is_none());
    }

    #[tokio::test]
    async fn test_stage_of_unready_target_is_unavailable() {
        let h = NodeHarness::new();
        h.provisioned(VOLUME, AccessType::Mount);
        h.store.set_target_health(VOLUME, TargetHealth::Offline);
        let node = service(&h);

        let err = node
            .stage_volume(stage_req(mount_capability("ext4")))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
        assert_eq!(h.initiator.logins(), 0);
        assert!(h.ledger.status(VOLUME).is_none());
        assert!(h.ledger.settled(VOLUME).is_none());
    }

    #[tokio::test]
    async fn test_jiva_volume_is_staged_from_its_controller_portal() {
        let h = NodeHarness::new();
        h.store.put_config(volume_config(VOLUME, 5, ConfigPhase::Bound));
        h.store.put_jiva_volume(jiva_volume(VOLUME, "10.0.0.9", "RO"));
        let mut attachment = pending_attachment(VOLUME, NODE, AccessType::Mount);
        attachment.spec.volume.cas_type = CasType::Jiva;
        h.store.put_attachment(attachment);
        let node = service(&h);

        let err = node
            .stage_volume(stage_req(mount_capability("ext4")))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
        assert_eq!(h.initiator.logins(), 0);

        h.store.put_jiva_volume(jiva_volume(VOLUME, "10.0.0.9", "RW"));
        node.stage_volume(stage_req(mount_capability("ext4"))).await.unwrap();

        let staged = h.store.attachment(ATTACHMENT).unwrap();
        assert_eq!(staged.phase(), AttachmentPhase::Staged);
        assert_eq!(staged.spec.iscsi.target_portal, "10.0.0.9:3260");
        assert_eq!(
            staged.spec.volume.device_path,
            "/dev/disk/by-path/ip-10.0.0.9:3260-iscsi-iqn.2016-09.com.openebs.jiva:pvc-a-lun-0"
        );
        assert!(h.mounter.is_mounted(&staging_path(VOLUME)));
    }

    #[tokio::test]
    async fn test_stage_of_unreachable_portal_is_unavailable() {
        let h = NodeHarness::new();
        h.provisioned(VOLUME, AccessType::Mount);
        h.prober.set_down("10.0.0.7:3260", true);
        let node = service(&h);

        let err = node
            .stage_volume(stage_req(mount_capability("ext4")))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
        assert_eq!(h.initiator.logins(), 0);
    }

    #[tokio::test]
    async fn test_failed_mount_is_settled_and_retried_without_relogin() {
        let h = NodeHarness::new();
        h.provisioned(VOLUME, AccessType::Mount);
        h.mounter.fail_mounts(true);
        let node = service(&h);

        let err = node
            .stage_volume(stage_req(mount_capability("ext4")))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Internal);
        assert_eq!(h.ledger.settled(VOLUME), Some(TransitionStatus::MountFailed));
        let failed = h.store.attachment(ATTACHMENT).unwrap();
        assert_eq!(failed.phase(), AttachmentPhase::MountFailed);
        assert_eq!(failed.spec.volume.device_path, device_path(VOLUME));
        assert!(h.store.event_reasons().contains(&"MountFailed".to_owned()));

        h.mounter.fail_mounts(false);
        node.stage_volume(stage_req(mount_capability("ext4"))).await.unwrap();
        assert_eq!(h.initiator.logins(), 1);
        assert!(h.mounter.is_mounted(&staging_path(VOLUME)));
        assert_eq!(h.ledger.settled(VOLUME), Some(TransitionStatus::Mounted));
    }

    #[tokio::test]
    async fn test_failed_unmount_keeps_session_and_finalizer() {
        let h = NodeHarness::new();
        h.provisioned(VOLUME, AccessType::Mount);
        let node = service(&h);
        node.stage_volume(stage_req(mount_capability("ext4"))).await.unwrap();

        h.mounter.fail_unmounts(true);
        node.unstage_volume(unstage_req()).await.unwrap_err();

        assert_eq!(h.initiator.logouts(), 0);
        assert!(h.store.attachment(ATTACHMENT).unwrap().holds_node_finalizer());
        assert_eq!(h.ledger.settled(VOLUME), Some(TransitionStatus::MountFailed));
        assert!(h.store.event_reasons().contains(&"UnmountFailed".to_owned()));
    }

    #[tokio::test]
    async fn test_stage_at_second_path_while_mounted_is_refused() {
        let h = NodeHarness::new();
        h.provisioned(VOLUME, AccessType::Mount);
        let node = service(&h);
        node.stage_volume(stage_req(mount_capability("ext4"))).await.unwrap();

        let other = "/var/lib/kubelet/plugins/kubernetes.io/csi/pv/pvc-a/other";
        let mut moved = stage_req(mount_capability("ext4"));
        moved.staging_target_path = other.to_owned();
        let err = node.stage_volume(moved.clone()).await.unwrap_err();
        assert_eq!(err.code(), Code::AlreadyExists);
        assert!(!h.mounter.is_mounted(other));
        assert_eq!(h.mounter.formats(), 1);
        assert_eq!(
            h.store.attachment(ATTACHMENT).unwrap().spec.volume.staging_path,
            staging_path(VOLUME)
        );

        // the old staging mount is gone: restaging elsewhere reuses the session
        h.mounter.lose_mount(&staging_path(VOLUME));
        node.stage_volume(moved).await.unwrap();
        assert!(h.mounter.is_mounted(other));
        assert_eq!(h.initiator.logins(), 1);
        assert_eq!(h.store.attachment(ATTACHMENT).unwrap().spec.volume.staging_path, other);
    }

    #[tokio::test]
    async fn test_block_volume_binds_device_at_target() {
        let h = NodeHarness::new();
        h.provisioned(VOLUME, AccessType::Block);
        let node = service(&h);

        node.stage_volume(stage_req(block_capability())).await.unwrap();
        assert!(!h.mounter.is_mounted(&staging_path(VOLUME)));
        assert_eq!(h.mounter.formats(), 0);

        let mut req = publish_req(block_capability());
        req.staging_target_path.clear();
        node.publish_volume(req).await.unwrap();
        assert!(h.mounter.is_mounted(&target_path(VOLUME)));
    }

    #[tokio::test]
    async fn test_publish_before_stage_is_unavailable() {
        let h = NodeHarness::new();
        h.provisioned(VOLUME, AccessType::Mount);
        let node = service(&h);

        let err = node
            .publish_volume(publish_req(mount_capability("ext4")))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
    }

    #[tokio::test]
    async fn test_read_only_publish() {
        let h = NodeHarness::new();
        h.provisioned(VOLUME, AccessType::Mount);
        let node = service(&h);
        node.stage_volume(stage_req(mount_capability("ext4"))).await.unwrap();

        let mut req = publish_req(mount_capability("ext4"));
        req.readonly = true;
        node.publish_volume(req).await.unwrap();

        assert_eq!(h.mounter.mount_options(&target_path(VOLUME)), vec!["ro"]);
        assert!(h.store.attachment(ATTACHMENT).unwrap().spec.volume.read_only);
    }

    #[tokio::test]
    async fn test_expand_grows_filesystem() {
        let h = NodeHarness::new();
        h.provisioned(VOLUME, AccessType::Mount);
        let node = service(&h);
        node.stage_volume(stage_req(mount_capability("ext4"))).await.unwrap();
        node.publish_volume(publish_req(mount_capability("ext4"))).await.unwrap();

        h.mounter.set_capacity(10 * GIB);
        let resp = node
            .expand_volume(NodeExpandVolumeRequest {
                volume_id: VOLUME.to_owned(),
                volume_path: target_path(VOLUME),
                capacity_range: Some(CapacityRange {
                    required_bytes: 10 * GIB,
                    limit_bytes: 0,
                }),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(resp.capacity_bytes, 10 * GIB);
        assert_eq!(h.initiator.rescans(), 1);
        assert_eq!(h.mounter.resizes(), 1);
    }

    #[tokio::test]
    async fn test_expand_of_unstaged_volume_is_unavailable() {
        let h = NodeHarness::new();
        h.provisioned(VOLUME, AccessType::Mount);
        let node = service(&h);

        let err = node
            .expand_volume(NodeExpandVolumeRequest {
                volume_id: VOLUME.to_owned(),
                volume_path: target_path(VOLUME),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
    }

    #[tokio::test]
    async fn test_volume_stats() {
        let h = NodeHarness::new();
        h.provisioned(VOLUME, AccessType::Mount);
        let node = service(&h);

        let missing = node
            .get_volume_stats(NodeGetVolumeStatsRequest {
                volume_id: VOLUME.to_owned(),
                volume_path: target_path(VOLUME),
            })
            .await
            .unwrap_err();
        assert_eq!(missing.code(), Code::NotFound);

        node.stage_volume(stage_req(mount_capability("ext4"))).await.unwrap();
        node.publish_volume(publish_req(mount_capability("ext4"))).await.unwrap();
        let stats = node
            .get_volume_stats(NodeGetVolumeStatsRequest {
                volume_id: VOLUME.to_owned(),
                volume_path: target_path(VOLUME),
            })
            .await
            .unwrap();
        assert_eq!(stats.usage.len(), 2);
        assert_eq!(stats.usage[0].unit, UsageUnit::Bytes);
        assert_eq!(stats.usage[0].total, 5 * GIB);
        assert_eq!(stats.usage[1].unit, UsageUnit::Inodes);
    }

    #[tokio::test]
    async fn test_invalid_requests_are_rejected_before_the_ledger() {
        let h = NodeHarness::new();
        h.provisioned(VOLUME, AccessType::Mount);
        let node = service(&h);

        let mut no_id = stage_req(mount_capability("ext4"));
        no_id.volume_id.clear();
        let mut no_mode = stage_req(mount_capability("ext4"));
        no_mode.volume_capability.access_mode = AccessMode::Unknown;

        for req in [no_id, no_mode, stage_req(mount_capability("zfs"))] {
            let err = node.stage_volume(req).await.unwrap_err();
            assert_eq!(err.code(), Code::InvalidArgument);
        }
        assert!(h.ledger.snapshot().in_transition.is_empty());
        assert!(h.ledger.snapshot().settled.is_empty());
    }

    #[tokio::test]
    async fn test_info_reports_node_id() {
        let h = NodeHarness::new();
        let info = service(&h).get_info().await.unwrap();
        assert_eq!(info.node_id, NODE);
    }
}
