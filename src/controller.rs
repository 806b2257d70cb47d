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

//! Controller service: turns volume RPCs into desired-state objects.
//!
//! The controller never touches a device. It creates, patches and deletes
//! `CStorVolumeConfig` and `CStorVolumeAttachment` objects and waits, within
//! fixed budgets, for the provisioner and the target to catch up.

use crate::csi::{
    self, AccessMode, ConfirmedCapabilities, ControllerCapability,
    ControllerExpandVolumeRequest, ControllerExpandVolumeResponse,
    ControllerGetCapabilitiesResponse, ControllerGetVolumeRequest, ControllerGetVolumeResponse,
    ControllerPublishVolumeRequest, ControllerPublishVolumeResponse,
    ControllerUnpublishVolumeRequest, CreateSnapshotRequest, CreateSnapshotResponse,
    CreateVolumeRequest, CreateVolumeResponse, DeleteSnapshotRequest, DeleteVolumeRequest, Empty,
    Snapshot, ValidateVolumeCapabilitiesRequest, ValidateVolumeCapabilitiesResponse, Volume,
    VolumeCapability, VolumeStatus,
};
use crate::engine::{self, Engine, SnapshotClient};
use crate::error::{Error, Result};
use crate::ledger::{Ledger, TransitionStatus};
use crate::reconcile::DEFAULT_FS_TYPE;
use crate::store::ClusterStore;
use crate::types::v1::common::{AccessType, CAS_TYPE_LABEL, CasType, ConfigPhase};
use crate::types::v1::volume_attachment::{
    AttachmentParams, CStorVolumeAttachment, attachment_name, node_owner_ref, volume_selector,
};
use crate::types::v1::volume_config::{CStorVolumeConfig, ProvisionParams};
use crate::utils::quantity::{self, GIB};
use crate::wait::{self, Timing, WaitOutcome};
use async_trait::async_trait;
use kube::ResourceExt;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub const POOL_CLUSTER_PARAM: &str = "cstorPoolCluster";
pub const REPLICA_COUNT_PARAM: &str = "replicaCount";
pub const CAS_TYPE_PARAM: &str = "cas-type";
pub const POLICY_PARAM: &str = "cstorVolumePolicy";

const CONFIG_KIND: &str = "CStorVolumeConfig";

pub struct ControllerService {
    store: Arc<dyn ClusterStore>,
    ledger: Arc<Ledger>,
    snapshots: Arc<dyn SnapshotClient>,
    /// Snapshots this process has created, by snapshot id.
    created_snapshots: Mutex<HashMap<String, Snapshot>>,
    timing: Timing,
    shutdown: CancellationToken,
}

/// Validated CreateVolume inputs.
struct CreateParams {
    capacity_bytes: u64,
    replica_count: u32,
    pool_cluster: String,
    cas_type: CasType,
    policy: Option<String>,
    source_snapshot: Option<String>,
}

fn parse_create(req: &CreateVolumeRequest) -> Result<CreateParams> {
    let mut problems = Vec::new();
    if req.name.is_empty() {
        problems.push("volume name is required".to_owned());
    }

    let capacity_bytes = req.capacity_range.map(|r| r.required_bytes).unwrap_or_default();
    if capacity_bytes == 0 {
        problems.push("capacity is required".to_owned());
    }

    let param = |key: &str| req.parameters.get(key).filter(|v| !v.is_empty());
    let pool_cluster = param(POOL_CLUSTER_PARAM).cloned().unwrap_or_default();
    if pool_cluster.is_empty() {
        problems.push(format!("parameter {POOL_CLUSTER_PARAM} is required"));
    }

    let replica_count = match param(REPLICA_COUNT_PARAM).map(|v| v.parse::<u32>()) {
        Some(Ok(count)) if count > 0 => count,
        Some(_) => {
            problems.push(format!("parameter {REPLICA_COUNT_PARAM} must be a positive integer"));
            0
        }
        None => {
            problems.push(format!("parameter {REPLICA_COUNT_PARAM} is required"));
            0
        }
    };

    let cas_type = match param(CAS_TYPE_PARAM).map(|v| CasType::from_str(v)) {
        Some(Ok(cas)) => cas,
        Some(Err(_)) => {
            problems.push(format!("parameter {CAS_TYPE_PARAM} must be cstor or jiva"));
            CasType::default()
        }
        None => {
            problems.push(format!("parameter {CAS_TYPE_PARAM} is required"));
            CasType::default()
        }
    };

    match req.volume_capabilities.as_slice() {
        [capability] if capability.access_mode == AccessMode::SingleNodeWriter => {}
        [_] => problems.push("only SINGLE_NODE_WRITER access mode is supported".to_owned()),
        _ => problems.push("exactly one volume capability is required".to_owned()),
    }

    let source_snapshot = match req
        .volume_content_source
        .as_ref()
        .and_then(|s| s.snapshot.as_ref())
    {
        Some(source) => match engine::parse_snapshot_id(&source.snapshot_id) {
            Ok(_) => Some(source.snapshot_id.clone()),
            Err(e) => {
                problems.push(e.to_string());
                None
            }
        },
        None => None,
    };

    if !problems.is_empty() {
        return Err(Error::invalid(problems.join("; ")));
    }
    Ok(CreateParams {
        capacity_bytes: quantity::round_up_gib(capacity_bytes) * GIB,
        replica_count,
        pool_cluster,
        cas_type,
        policy: param(POLICY_PARAM).cloned(),
        source_snapshot,
    })
}

fn require(value: &str, field: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::invalid(format!("{field} is required")));
    }
    Ok(())
}

fn volume_of(config: &CStorVolumeConfig, capacity_bytes: u64) -> Volume {
    Volume {
        volume_id: config.name_any(),
        capacity_bytes,
        volume_context: BTreeMap::from([(
            CAS_TYPE_LABEL.to_owned(),
            config.spec.cas_type.to_string(),
        )]),
        content_source: config.spec.source_snapshot.as_ref().map(|id| {
            csi::VolumeContentSource {
                snapshot: Some(csi::SnapshotSource {
                    snapshot_id: id.clone(),
                }),
            }
        }),
    }
}

impl ControllerService {
    pub fn new(
        store: Arc<dyn ClusterStore>,
        ledger: Arc<Ledger>,
        snapshots: Arc<dyn SnapshotClient>,
        timing: Timing,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            ledger,
            snapshots,
            created_snapshots: Mutex::default(),
            timing,
            shutdown,
        }
    }

    fn created_snapshots(&self) -> std::sync::MutexGuard<'_, HashMap<String, Snapshot>> {
        self.created_snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn require_config(&self, volume_id: &str) -> Result<CStorVolumeConfig> {
        self.store
            .get_volume_config(volume_id)
            .await?
            .ok_or_else(|| Error::not_found(CONFIG_KIND, volume_id))
    }

    /// Polls the config until `phase` says provisioning has finished one way
    /// or the other.
    async fn wait_for_binding(&self, volume_id: &str) -> Result<WaitOutcome<CStorVolumeConfig>> {
        let store = self.store.as_ref();
        wait::poll(self.timing.config_bound, &self.shutdown, |attempt| async move {
            match store.get_volume_config(volume_id).await {
                Ok(Some(config)) if config.phase() != ConfigPhase::Pending => Ok(Some(config)),
                Ok(Some(_)) => {
                    debug!(volume_id, attempt, "volume config still pending");
                    Ok(None)
                }
                Ok(None) => Err(Error::not_found(CONFIG_KIND, volume_id)),
                Err(e) => Err(Error::from(e)),
            }
        })
        .await
    }

    /// Publishes `volume_id` on `node_id` unless that attachment is already
    /// live; any other live attachment of the volume is deleted first.
    async fn attach(
        &self,
        config: &CStorVolumeConfig,
        node_id: &str,
        capability: &VolumeCapability,
        read_only: bool,
    ) -> Result<()> {
        let volume_id = config.name_any();
        let name = attachment_name(&volume_id, node_id);
        let existing = self
            .store
            .list_attachments(&volume_selector(&volume_id))
            .await?;

        if let Some(own) = existing.iter().find(|a| a.name_any() == name) {
            if own.is_deleting() {
                return Err(Error::unavailable(format!(
                    "attachment {name} is still being cleaned up"
                )));
            }
            debug!(attachment = %name, "already published");
            return Ok(());
        }

        for stale in existing.iter().filter(|a| !a.is_deleting()) {
            info!(attachment = %stale.name_any(), "deleting attachment to another node");
            match self.store.delete_attachment(&stale.name_any()).await {
                Err(e) if !e.is_not_found() => return Err(e.into()),
                _ => {}
            }
        }

        let owner = match self.store.get_node(node_id).await {
            Ok(Some(node)) => Some(node_owner_ref(&node)),
            Ok(None) => None,
            Err(e) => {
                warn!(node_id, error = %e, "cannot resolve node owner reference");
                None
            }
        };

        let access_type = if capability.is_block() {
            AccessType::Block
        } else {
            AccessType::Mount
        };
        let fs_type = match (access_type, capability.fs_type()) {
            (AccessType::Block, _) => String::new(),
            (AccessType::Mount, "") => DEFAULT_FS_TYPE.to_owned(),
            (AccessType::Mount, fs) => fs.to_owned(),
        };

        let attachment = CStorVolumeAttachment::new_for(AttachmentParams {
            volume_id: volume_id.clone(),
            node_id: node_id.to_owned(),
            namespace: self.store.namespace().to_owned(),
            access_type,
            cas_type: config.spec.cas_type,
            fs_type,
            read_only,
            mount_options: capability.mount_flags().to_vec(),
            owner,
        })?;
        match self.store.create_attachment(&attachment).await {
            Ok(_) => info!(attachment = %name, "attachment created"),
            // a concurrent publish of the same pair got there first
            Err(e) if e.is_already_exists() => debug!(attachment = %name, "attachment already created"),
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}

#[async_trait]
impl csi::Controller for ControllerService {
    #[instrument(skip_all, fields(volume_id = %req.name))]
    async fn create_volume(&self, req: CreateVolumeRequest) -> Result<CreateVolumeResponse> {
        let params = parse_create(&req)?;
        let _guard = self
            .ledger
            .acquire(&req.name, TransitionStatus::Uninitialized)?;

        if let Some(existing) = self.store.get_volume_config(&req.name).await? {
            if existing.is_deleting() {
                return Err(Error::unavailable(format!(
                    "volume {} is being deleted",
                    req.name
                )));
            }
            let existing_bytes = existing.capacity_bytes()?;
            if existing_bytes != params.capacity_bytes {
                return Err(Error::AlreadyExists {
                    message: format!(
                        "volume {} already exists with capacity {existing_bytes}",
                        req.name
                    ),
                });
            }
            debug!("volume config already exists");
            return Ok(CreateVolumeResponse {
                volume: volume_of(&existing, existing_bytes),
            });
        }

        let config = CStorVolumeConfig::provision(ProvisionParams {
            volume_id: req.name.clone(),
            namespace: self.store.namespace().to_owned(),
            capacity_bytes: params.capacity_bytes,
            replica_count: params.replica_count,
            pool_cluster: params.pool_cluster,
            cas_type: params.cas_type,
            policy: params.policy,
            source_snapshot: params.source_snapshot,
        })?;
        let created = self.store.create_volume_config(&config).await?;
        info!(capacity = params.capacity_bytes, "volume config created");

        match self.wait_for_binding(&req.name).await? {
            WaitOutcome::Ready(config) if config.phase() == ConfigPhase::Failed => {
                Err(Error::Internal {
                    message: format!("provisioning of volume {} failed", req.name),
                })
            }
            WaitOutcome::Ready(_) => Ok(CreateVolumeResponse {
                volume: volume_of(&created, params.capacity_bytes),
            }),
            WaitOutcome::ExhaustedRetries => {
                info!("volume config not bound yet; publish will wait for it");
                Ok(CreateVolumeResponse {
                    volume: volume_of(&created, params.capacity_bytes),
                })
            }
            WaitOutcome::Cancelled => Err(Error::unavailable(format!(
                "cancelled while waiting for volume {} to bind",
                req.name
            ))),
        }
    }

    #[instrument(skip_all, fields(volume_id = %req.volume_id))]
    async fn delete_volume(&self, req: DeleteVolumeRequest) -> Result<Empty> {
        require(&req.volume_id, "volume id")?;
        let _guard = self
            .ledger
            .acquire(&req.volume_id, TransitionStatus::Uninitialized)?;

        match self.store.get_volume_config(&req.volume_id).await? {
            None => debug!("volume config already gone"),
            Some(config) if config.is_deleting() => debug!("volume config already deleting"),
            Some(_) => match self.store.delete_volume_config(&req.volume_id).await {
                Err(e) if !e.is_not_found() => return Err(e.into()),
                _ => info!("volume config deleted"),
            },
        }
        Ok(Empty {})
    }

    #[instrument(skip_all, fields(volume_id = %req.volume_id, node_id = %req.node_id))]
    async fn publish_volume(
        &self,
        req: ControllerPublishVolumeRequest,
    ) -> Result<ControllerPublishVolumeResponse> {
        require(&req.volume_id, "volume id")?;
        require(&req.node_id, "node id")?;
        if req.volume_capability.access_mode == AccessMode::Unknown {
            return Err(Error::invalid("volume capability access mode is required"));
        }

        let guard = self
            .ledger
            .acquire(&req.volume_id, TransitionStatus::Uninitialized)?;
        let mut config = self.require_config(&req.volume_id).await?;
        if config.is_deleting() {
            return Err(Error::unavailable(format!(
                "volume {} is being deleted",
                req.volume_id
            )));
        }

        if config.phase() != ConfigPhase::Bound {
            guard.set(TransitionStatus::WaitingForConfigBound);
            config = match self.wait_for_binding(&req.volume_id).await? {
                WaitOutcome::Ready(bound) if bound.phase() == ConfigPhase::Bound => bound,
                _ => {
                    return Err(Error::unavailable(format!(
                        "waiting for volume {} to be bound",
                        req.volume_id
                    )));
                }
            };
        }

        let node_id = req.node_id.clone();
        config = self
            .store
            .update_volume_config(&req.volume_id, &|c: &mut CStorVolumeConfig| {
                c.spec.publish_node_id = Some(node_id.clone())
            })
            .await?;

        self.attach(&config, &req.node_id, &req.volume_capability, req.readonly)
            .await?;
        Ok(ControllerPublishVolumeResponse::default())
    }

    #[instrument(skip_all, fields(volume_id = %req.volume_id, node_id = %req.node_id))]
    async fn unpublish_volume(&self, req: ControllerUnpublishVolumeRequest) -> Result<Empty> {
        require(&req.volume_id, "volume id")?;
        let _guard = self
            .ledger
            .acquire(&req.volume_id, TransitionStatus::Uninitialized)?;

        let names = if req.node_id.is_empty() {
            self.store
                .list_attachments(&volume_selector(&req.volume_id))
                .await?
                .iter()
                .map(|a| a.name_any())
                .collect()
        } else {
            vec![attachment_name(&req.volume_id, &req.node_id)]
        };

        for name in names {
            match self.store.delete_attachment(&name).await {
                Ok(()) => info!(attachment = %name, "attachment deleted"),
                Err(e) if e.is_not_found() => debug!(attachment = %name, "attachment already gone"),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Empty {})
    }

    #[instrument(skip_all, fields(volume_id = %req.volume_id))]
    async fn expand_volume(
        &self,
        req: ControllerExpandVolumeRequest,
    ) -> Result<ControllerExpandVolumeResponse> {
        require(&req.volume_id, "volume id")?;
        let required = req.capacity_range.map(|r| r.required_bytes).unwrap_or_default();
        if required == 0 {
            return Err(Error::invalid("capacity is required"));
        }

        let _guard = self
            .ledger
            .acquire(&req.volume_id, TransitionStatus::ResizeInProgress)?;
        let config = self.require_config(&req.volume_id).await?;
        let new_gib = quantity::round_up_gib(required);
        let new_bytes = new_gib * GIB;
        let current = config.capacity_bytes()?;
        if new_bytes < current {
            return Err(Error::invalid(format!(
                "volume {} cannot shrink from {current} to {new_bytes} bytes",
                req.volume_id
            )));
        }

        let response = ControllerExpandVolumeResponse {
            capacity_bytes: new_bytes,
            node_expansion_required: true,
        };
        if new_bytes > current {
            self.store
                .update_volume_config(&req.volume_id, &|c: &mut CStorVolumeConfig| {
                    // never lower a capacity another writer already raised
                    if c.capacity_bytes().is_ok_and(|bytes| bytes < new_bytes) {
                        c.spec.capacity = quantity::gib_quantity(new_gib);
                    }
                })
                .await?;
            info!(capacity = new_bytes, "volume capacity raised");
        }

        if config.phase() == ConfigPhase::Pending {
            return Ok(response);
        }

        let store = self.store.as_ref();
        let volume_id = req.volume_id.as_str();
        let outcome = wait::poll(self.timing.resize, &self.shutdown, |_| async move {
            match store.get_volume_config(volume_id).await {
                Ok(Some(config)) => Ok(config
                    .status_capacity_bytes()
                    .filter(|bytes| *bytes >= new_bytes)
                    .map(|_| ())),
                Ok(None) => Err(Error::not_found(CONFIG_KIND, volume_id)),
                Err(e) => Err(Error::from(e)),
            }
        })
        .await?;

        match outcome {
            WaitOutcome::Ready(()) => Ok(response),
            _ => Err(Error::unavailable(format!(
                "volume {}: {}",
                req.volume_id,
                TransitionStatus::ResizeInProgress
            ))),
        }
    }

    #[instrument(skip_all, fields(volume_id = %req.source_volume_id, snapshot = %req.name))]
    async fn create_snapshot(&self, req: CreateSnapshotRequest) -> Result<CreateSnapshotResponse> {
        require(&req.source_volume_id, "source volume id")?;
        require(&req.name, "snapshot name")?;

        let snapshot_id = engine::snapshot_id(&req.source_volume_id, &req.name);
        let existing = self.created_snapshots().get(&snapshot_id).cloned();
        if let Some(existing) = existing {
            debug!("snapshot already created");
            return Ok(CreateSnapshotResponse { snapshot: existing });
        }

        let config = self.require_config(&req.source_volume_id).await?;
        let engine = Engine::from(config.spec.cas_type);
        let target = engine
            .target_volume(self.store.as_ref(), &req.source_volume_id)
            .await?
            .filter(|t| !t.target_ip.is_empty())
            .ok_or_else(|| {
                Error::unavailable(format!(
                    "target of volume {} is not published yet",
                    req.source_volume_id
                ))
            })?;

        self.snapshots
            .create_snapshot(engine, &target.target_ip, &req.source_volume_id, &req.name)
            .await?;

        let snapshot = Snapshot {
            snapshot_id: snapshot_id.clone(),
            source_volume_id: req.source_volume_id.clone(),
            size_bytes: config.capacity_bytes()?,
            creation_time: chrono::Utc::now().timestamp(),
            ready_to_use: true,
        };
        self.created_snapshots().insert(snapshot_id, snapshot.clone());
        Ok(CreateSnapshotResponse { snapshot })
    }

    #[instrument(skip_all, fields(snapshot_id = %req.snapshot_id))]
    async fn delete_snapshot(&self, req: DeleteSnapshotRequest) -> Result<Empty> {
        require(&req.snapshot_id, "snapshot id")?;
        let (volume_id, snapshot) = engine::parse_snapshot_id(&req.snapshot_id)?;

        let Some(config) = self.store.get_volume_config(volume_id).await? else {
            debug!("source volume is gone, nothing to destroy");
            return Ok(Empty {});
        };
        let engine = Engine::from(config.spec.cas_type);
        let Some(target) = engine.target_volume(self.store.as_ref(), volume_id).await? else {
            return Err(Error::unavailable(format!(
                "target of volume {volume_id} is not published yet"
            )));
        };

        self.snapshots
            .destroy_snapshot(engine, &target.target_ip, volume_id, snapshot)
            .await?;
        self.created_snapshots().remove(&req.snapshot_id);
        Ok(Empty {})
    }

    async fn get_capabilities(&self) -> Result<ControllerGetCapabilitiesResponse> {
        Ok(ControllerGetCapabilitiesResponse {
            capabilities: vec![
                ControllerCapability::CreateDeleteVolume,
                ControllerCapability::PublishUnpublishVolume,
                ControllerCapability::ExpandVolume,
                ControllerCapability::CreateDeleteSnapshot,
                ControllerCapability::GetVolume,
            ],
        })
    }

    async fn validate_volume_capabilities(
        &self,
        req: ValidateVolumeCapabilitiesRequest,
    ) -> Result<ValidateVolumeCapabilitiesResponse> {
        require(&req.volume_id, "volume id")?;
        if req.volume_capabilities.is_empty() {
            return Err(Error::invalid("volume capabilities are required"));
        }
        self.require_config(&req.volume_id).await?;

        let supported = req
            .volume_capabilities
            .iter()
            .all(|c| c.access_mode == AccessMode::SingleNodeWriter);
        if !supported {
            return Ok(ValidateVolumeCapabilitiesResponse {
                confirmed: None,
                message: "only SINGLE_NODE_WRITER access mode is supported".to_owned(),
            });
        }
        Ok(ValidateVolumeCapabilitiesResponse {
            confirmed: Some(ConfirmedCapabilities {
                volume_capabilities: req.volume_capabilities,
            }),
            message: String::new(),
        })
    }

    async fn get_volume(&self, req: ControllerGetVolumeRequest) -> Result<ControllerGetVolumeResponse> {
        require(&req.volume_id, "volume id")?;
        let config = self.require_config(&req.volume_id).await?;
        let capacity = config.capacity_bytes()?;
        Ok(ControllerGetVolumeResponse {
            volume: volume_of(&config, capacity),
            status: VolumeStatus {
                published_node_ids: config.spec.publish_node_id.clone().into_iter().collect(),
            },
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::csi::{CapacityRange, Controller, MountVolume};
    use crate::error::Code;
    use crate::tests::{FakeSnapshots, MemoryStore, NODE, TARGET_IP, cstor_volume, pending_attachment, volume_config};
    use crate::types::v1::common::TargetHealth;

    const VOLUME: &str = "pvc-a";

    struct Fixture {
        store: Arc<MemoryStore>,
        snapshots: Arc<FakeSnapshots>,
        controller: ControllerService,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let snapshots = Arc::new(FakeSnapshots::default());
        let controller = ControllerService::new(
            store.clone(),
            Ledger::new(),
            snapshots.clone(),
            Timing::immediate(),
            CancellationToken::new(),
        );
        Fixture {
            store,
            snapshots,
            controller,
        }
    }

    fn capability() -> VolumeCapability {
        VolumeCapability {
            mount: Some(MountVolume::default()),
            block: None,
            access_mode: AccessMode::SingleNodeWriter,
        }
    }

    fn create_req(bytes: u64) -> CreateVolumeRequest {
        CreateVolumeRequest {
            name: VOLUME.to_owned(),
            capacity_range: Some(CapacityRange {
                required_bytes: bytes,
                limit_bytes: 0,
            }),
            volume_capabilities: vec![capability()],
            parameters: BTreeMap::from([
                (POOL_CLUSTER_PARAM.to_owned(), "cspc-stripe".to_owned()),
                (REPLICA_COUNT_PARAM.to_owned(), "3".to_owned()),
                (CAS_TYPE_PARAM.to_owned(), "cstor".to_owned()),
            ]),
            volume_content_source: None,
        }
    }

    fn publish_req(node_id: &str) -> ControllerPublishVolumeRequest {
        ControllerPublishVolumeRequest {
            volume_id: VOLUME.to_owned(),
            node_id: node_id.to_owned(),
            volume_capability: capability(),
            ..Default::default()
        }
    }

    fn expand_req(bytes: u64) -> ControllerExpandVolumeRequest {
        ControllerExpandVolumeRequest {
            volume_id: VOLUME.to_owned(),
            capacity_range: Some(CapacityRange {
                required_bytes: bytes,
                limit_bytes: 0,
            }),
        }
    }

    #[tokio::test]
    async fn test_create_volume_rounds_up_and_is_idempotent() {
        let f = fixture();
        f.store.bind_on_create();

        let created = f.controller.create_volume(create_req(GIB + GIB / 2)).await.unwrap();
        assert_eq!(created.volume.volume_id, VOLUME);
        assert_eq!(created.volume.capacity_bytes, 2 * GIB);
        assert_eq!(created.volume.volume_context.get(CAS_TYPE_LABEL).unwrap(), "cstor");

        let config = f.store.config(VOLUME).unwrap();
        assert_eq!(config.spec.replica_count, 3);
        assert_eq!(config.capacity_bytes().unwrap(), 2 * GIB);

        let again = f.controller.create_volume(create_req(2 * GIB)).await.unwrap();
        assert_eq!(again, created);

        let err = f.controller.create_volume(create_req(5 * GIB)).await.unwrap_err();
        assert_eq!(err.code(), Code::AlreadyExists);
    }

    #[tokio::test]
    async fn test_create_volume_reports_every_invalid_parameter() {
        let f = fixture();
        let mut req = create_req(GIB);
        req.parameters.clear();

        let err = f.controller.create_volume(req).await.unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        let message = err.to_string();
        assert!(message.contains(POOL_CLUSTER_PARAM));
        assert!(message.contains(REPLICA_COUNT_PARAM));
        assert!(message.contains(CAS_TYPE_PARAM));
        assert!(f.store.config(VOLUME).is_none());
    }

    #[tokio::test]
    async fn test_create_volume_succeeds_while_binding_is_pending() {
        let f = fixture();
        let created = f.controller.create_volume(create_req(GIB)).await.unwrap();
        assert_eq!(created.volume.capacity_bytes, GIB);
        assert_eq!(f.store.config(VOLUME).unwrap().phase(), ConfigPhase::Pending);
    }

    #[tokio::test]
    async fn test_create_volume_rejects_malformed_snapshot_source() {
        let f = fixture();
        let mut req = create_req(GIB);
        req.volume_content_source = Some(csi::VolumeContentSource {
            snapshot: Some(csi::SnapshotSource {
                snapshot_id: "no-separator".to_owned(),
            }),
        });
        let err = f.controller.create_volume(req).await.unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_delete_volume_is_idempotent() {
        let f = fixture();
        f.store.put_config(volume_config(VOLUME, 5, ConfigPhase::Bound));
        let req = || DeleteVolumeRequest {
            volume_id: VOLUME.to_owned(),
        };

        f.controller.delete_volume(req()).await.unwrap();
        assert!(f.store.config(VOLUME).unwrap().is_deleting());
        f.controller.delete_volume(req()).await.unwrap();

        let err = f.controller.create_volume(create_req(5 * GIB)).await.unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);

        f.controller
            .delete_volume(DeleteVolumeRequest {
                volume_id: "pvc-missing".to_owned(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_publish_waits_for_bound_config() {
        let f = fixture();
        f.store.put_config(volume_config(VOLUME, 5, ConfigPhase::Pending));

        let err = f.controller.publish_volume(publish_req(NODE)).await.unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
        assert!(f.store.attachment_names().is_empty());

        f.store.set_config_phase(VOLUME, ConfigPhase::Bound);
        f.store.put_node(NODE, "node-uid-1");
        f.controller.publish_volume(publish_req(NODE)).await.unwrap();
        f.controller.publish_volume(publish_req(NODE)).await.unwrap();

        let attachment = f.store.attachment("pvc-a-k8s-1").unwrap();
        assert_eq!(attachment.spec.volume.fs_type, DEFAULT_FS_TYPE);
        assert_eq!(attachment.owner_references()[0].uid, "node-uid-1");
        assert_eq!(
            f.store.config(VOLUME).unwrap().spec.publish_node_id.as_deref(),
            Some(NODE)
        );
    }

    #[tokio::test]
    async fn test_publish_of_unknown_volume_is_not_found() {
        let f = fixture();
        let err = f.controller.publish_volume(publish_req(NODE)).await.unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
    }

    #[tokio::test]
    async fn test_publish_moves_the_single_writer() {
        let f = fixture();
        f.store.put_config(volume_config(VOLUME, 5, ConfigPhase::Bound));
        let mut old = pending_attachment(VOLUME, NODE, AccessType::Mount);
        old.add_node_finalizer();
        f.store.put_attachment(old);

        f.controller.publish_volume(publish_req("k8s-2")).await.unwrap();
        assert!(f.store.attachment("pvc-a-k8s-1").unwrap().is_deleting());
        assert!(!f.store.attachment("pvc-a-k8s-2").unwrap().is_deleting());

        // the old node has not finished its teardown yet
        let err = f.controller.publish_volume(publish_req(NODE)).await.unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
    }

    #[tokio::test]
    async fn test_unpublish_is_idempotent() {
        let f = fixture();
        f.store.put_config(volume_config(VOLUME, 5, ConfigPhase::Bound));
        f.store.put_attachment(pending_attachment(VOLUME, NODE, AccessType::Mount));
        f.store.put_attachment(pending_attachment(VOLUME, "k8s-2", AccessType::Mount));
        let req = |node_id: &str| ControllerUnpublishVolumeRequest {
            volume_id: VOLUME.to_owned(),
            node_id: node_id.to_owned(),
        };

        f.controller.unpublish_volume(req(NODE)).await.unwrap();
        f.controller.unpublish_volume(req(NODE)).await.unwrap();
        assert_eq!(f.store.attachment_names(), vec!["pvc-a-k8s-2".to_owned()]);

        f.controller.unpublish_volume(req("")).await.unwrap();
        assert!(f.store.attachment_names().is_empty());
    }

    #[tokio::test]
    async fn test_expand_never_shrinks() {
        let f = fixture();
        f.store.put_config(volume_config(VOLUME, 5, ConfigPhase::Bound));

        let err = f.controller.expand_volume(expand_req(2 * GIB)).await.unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        assert_eq!(f.store.config(VOLUME).unwrap().capacity_bytes().unwrap(), 5 * GIB);

        let same = f.controller.expand_volume(expand_req(5 * GIB)).await.unwrap();
        assert_eq!(same.capacity_bytes, 5 * GIB);
        assert!(same.node_expansion_required);
    }

    #[tokio::test]
    async fn test_expand_waits_for_status_capacity() {
        let f = fixture();
        f.store.put_config(volume_config(VOLUME, 5, ConfigPhase::Bound));

        let err = f.controller.expand_volume(expand_req(10 * GIB)).await.unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
        assert!(err.to_string().contains("ResizeInProgress"));
        assert_eq!(f.store.config(VOLUME).unwrap().capacity_bytes().unwrap(), 10 * GIB);

        f.store.resize_on_update();
        let grown = f.controller.expand_volume(expand_req(10 * GIB + 1)).await.unwrap();
        assert_eq!(grown.capacity_bytes, 11 * GIB);
        assert_eq!(
            f.store.config(VOLUME).unwrap().status_capacity_bytes(),
            Some(11 * GIB)
        );
    }

    #[tokio::test]
    async fn test_expand_of_pending_volume_only_patches_spec() {
        let f = fixture();
        f.store.put_config(volume_config(VOLUME, 5, ConfigPhase::Pending));

        let resp = f.controller.expand_volume(expand_req(8 * GIB)).await.unwrap();
        assert_eq!(resp.capacity_bytes, 8 * GIB);
        assert_eq!(f.store.config(VOLUME).unwrap().capacity_bytes().unwrap(), 8 * GIB);
    }

    #[tokio::test]
    async fn test_snapshot_create_and_delete() {
        let f = fixture();
        f.store.put_config(volume_config(VOLUME, 5, ConfigPhase::Bound));
        f.store.put_cstor_volume(cstor_volume(VOLUME, TargetHealth::Healthy));

        let created = f
            .controller
            .create_snapshot(CreateSnapshotRequest {
                source_volume_id: VOLUME.to_owned(),
                name: "snap-1".to_owned(),
                parameters: BTreeMap::new(),
            })
            .await
            .unwrap()
            .snapshot;
        assert_eq!(created.snapshot_id, "pvc-a@snap-1");
        assert_eq!(created.size_bytes, 5 * GIB);
        assert!(created.ready_to_use);

        f.controller
            .delete_snapshot(DeleteSnapshotRequest {
                snapshot_id: created.snapshot_id.clone(),
            })
            .await
            .unwrap();

        let calls = f.snapshots.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].action, "create");
        assert_eq!(calls[0].target_ip, TARGET_IP);
        assert_eq!(calls[1].action, "destroy");
        assert_eq!(calls[0].snapshot, "snap-1");
        assert_eq!(calls[1].snapshot, calls[0].snapshot);
        assert_eq!(calls[1].engine, Engine::Cstor);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_snapshot_retry_returns_the_same_snapshot() {
        let f = fixture();
        f.store.put_config(volume_config(VOLUME, 5, ConfigPhase::Bound));
        f.store.put_cstor_volume(cstor_volume(VOLUME, TargetHealth::Healthy));
        let req = CreateSnapshotRequest {
            source_volume_id: VOLUME.to_owned(),
            name: "snap-1".to_owned(),
            parameters: BTreeMap::new(),
        };

        let first = f.controller.create_snapshot(req.clone()).await.unwrap().snapshot;
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        let second = f.controller.create_snapshot(req.clone()).await.unwrap().snapshot;

        assert_eq!(first.snapshot_id, second.snapshot_id);
        assert_eq!(first.creation_time, second.creation_time);
        assert_eq!(f.snapshots.calls().len(), 1);

        // once destroyed, the same name is created afresh
        f.controller
            .delete_snapshot(DeleteSnapshotRequest {
                snapshot_id: first.snapshot_id.clone(),
            })
            .await
            .unwrap();
        f.controller.create_snapshot(req).await.unwrap();
        let actions: Vec<_> = f.snapshots.calls().into_iter().map(|c| c.action).collect();
        assert_eq!(actions, ["create", "destroy", "create"]);
    }

    #[tokio::test]
    async fn test_snapshot_of_unpublished_target_is_unavailable() {
        let f = fixture();
        f.store.put_config(volume_config(VOLUME, 5, ConfigPhase::Bound));

        let err = f
            .controller
            .create_snapshot(CreateSnapshotRequest {
                source_volume_id: VOLUME.to_owned(),
                name: "snap-1".to_owned(),
                parameters: BTreeMap::new(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
        assert!(f.snapshots.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_snapshot_edge_cases() {
        let f = fixture();
        let malformed = f
            .controller
            .delete_snapshot(DeleteSnapshotRequest {
                snapshot_id: "pvc-a".to_owned(),
            })
            .await
            .unwrap_err();
        assert_eq!(malformed.code(), Code::InvalidArgument);

        f.controller
            .delete_snapshot(DeleteSnapshotRequest {
                snapshot_id: "pvc-gone@snap-1".to_owned(),
            })
            .await
            .unwrap();
        assert!(f.snapshots.calls().is_empty());
    }

    #[tokio::test]
    async fn test_validate_capabilities_and_get_volume() {
        let f = fixture();
        f.store.put_config(volume_config(VOLUME, 5, ConfigPhase::Bound));

        let confirmed = f
            .controller
            .validate_volume_capabilities(ValidateVolumeCapabilitiesRequest {
                volume_id: VOLUME.to_owned(),
                volume_capabilities: vec![capability()],
            })
            .await
            .unwrap();
        assert!(confirmed.confirmed.is_some());

        let mut shared = capability();
        shared.access_mode = AccessMode::MultiNodeMultiWriter;
        let rejected = f
            .controller
            .validate_volume_capabilities(ValidateVolumeCapabilitiesRequest {
                volume_id: VOLUME.to_owned(),
                volume_capabilities: vec![shared],
            })
            .await
            .unwrap();
        assert!(rejected.confirmed.is_none());
        assert!(!rejected.message.is_empty());

        f.controller.publish_volume(publish_req(NODE)).await.unwrap();
        let volume = f
            .controller
            .get_volume(ControllerGetVolumeRequest {
                volume_id: VOLUME.to_owned(),
            })
            .await
            .unwrap();
        assert_eq!(volume.volume.capacity_bytes, 5 * GIB);
        assert_eq!(volume.status.published_node_ids, vec![NODE.to_owned()]);
    }
}
