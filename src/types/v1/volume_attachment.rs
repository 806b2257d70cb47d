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

use crate::types::error::{Error, Violations};
use crate::types::v1::common::{
    AccessType, AttachmentPhase, CAS_TYPE_LABEL, CasType, NODE_FINALIZER, NODE_ID_LABEL,
    VOLUME_NAME_LABEL,
};
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::{CustomResource, KubeSchema, Resource, ResourceExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the attachment of `volume_id` to `node_id`.
pub fn attachment_name(volume_id: &str, node_id: &str) -> String {
    format!("{volume_id}-{node_id}")
}

/// Label selector matching every attachment owned by a node.
pub fn node_selector(node_id: &str) -> String {
    format!("{NODE_ID_LABEL}={node_id}")
}

/// Label selector matching every attachment of a volume.
pub fn volume_selector(volume_id: &str) -> String {
    format!("{VOLUME_NAME_LABEL}={volume_id}")
}

/// Owner reference pinning an attachment's lifetime to the cluster node.
pub fn node_owner_ref(node: &corev1::Node) -> metav1::OwnerReference {
    metav1::OwnerReference {
        api_version: corev1::Node::api_version(&()).to_string(),
        kind: corev1::Node::kind(&()).to_string(),
        name: node.name_any(),
        uid: node.meta().uid.clone().unwrap_or_default(),
        controller: Some(false),
        block_owner_deletion: Some(true),
    }
}

/// Per-(volume, node) intent to mount.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, KubeSchema, Default)]
#[kube(
    group = "cstor.openebs.io",
    version = "v1",
    kind = "CStorVolumeAttachment",
    namespaced,
    status = "AttachmentStatus",
    shortname = "cva",
    plural = "cstorvolumeattachments",
    singular = "cstorvolumeattachment",
    printcolumn = r#"{"name":"Volume", "type":"string", "jsonPath":".spec.volume.name"}"#,
    printcolumn = r#"{"name":"Node", "type":"string", "jsonPath":".spec.volume.ownerNodeId"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct VolumeAttachmentSpec {
    pub volume: VolumeInfo,

    #[serde(default)]
    pub iscsi: IscsiInfo,
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeInfo {
    pub name: String,

    pub owner_node_id: String,

    #[serde(default)]
    pub access_type: AccessType,

    #[serde(default)]
    pub cas_type: CasType,

    #[serde(default)]
    pub fs_type: String,

    #[serde(default)]
    pub staging_path: String,

    #[serde(default)]
    pub target_path: String,

    /// Set only after a successful iSCSI login.
    #[serde(default)]
    pub device_path: String,

    #[serde(default)]
    pub read_only: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mount_options: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IscsiInfo {
    #[serde(default)]
    pub iqn: String,

    #[serde(default)]
    pub target_portal: String,

    #[serde(default = "default_iface")]
    pub iface: String,

    #[serde(default)]
    pub lun: i32,
}

fn default_iface() -> String {
    "default".to_owned()
}

impl Default for IscsiInfo {
    fn default() -> Self {
        Self {
            iqn: String::new(),
            target_portal: String::new(),
            iface: default_iface(),
            lun: 0,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentStatus {
    #[serde(default)]
    pub phase: AttachmentPhase,
}

/// Inputs for a new attachment, as the controller sees them at publish time.
#[derive(Clone, Debug, Default)]
pub struct AttachmentParams {
    pub volume_id: String,
    pub node_id: String,
    pub namespace: String,
    pub access_type: AccessType,
    pub cas_type: CasType,
    pub fs_type: String,
    pub read_only: bool,
    pub mount_options: Vec<String>,
    pub owner: Option<metav1::OwnerReference>,
}

impl CStorVolumeAttachment {
    pub fn new_for(params: AttachmentParams) -> Result<Self, Error> {
        let mut violations = Violations::new("CStorVolumeAttachment");
        violations.require(!params.volume_id.is_empty(), "volume id is required");
        violations.require(!params.node_id.is_empty(), "node id is required");
        violations.require(!params.namespace.is_empty(), "namespace is required");
        if params.access_type == AccessType::Mount && params.fs_type.is_empty() {
            violations.push("filesystem type is required for mount access");
        }

        let labels: BTreeMap<String, String> = [
            (VOLUME_NAME_LABEL.to_owned(), params.volume_id.clone()),
            (NODE_ID_LABEL.to_owned(), params.node_id.clone()),
            (CAS_TYPE_LABEL.to_owned(), params.cas_type.to_string()),
        ]
        .into_iter()
        .collect();

        let attachment = CStorVolumeAttachment {
            metadata: metav1::ObjectMeta {
                name: Some(attachment_name(&params.volume_id, &params.node_id)),
                namespace: Some(params.namespace),
                labels: Some(labels),
                owner_references: params.owner.map(|o| vec![o]),
                ..Default::default()
            },
            spec: VolumeAttachmentSpec {
                volume: VolumeInfo {
                    name: params.volume_id,
                    owner_node_id: params.node_id,
                    access_type: params.access_type,
                    cas_type: params.cas_type,
                    fs_type: params.fs_type,
                    read_only: params.read_only,
                    mount_options: params.mount_options,
                    ..Default::default()
                },
                iscsi: IscsiInfo::default(),
            },
            status: Some(AttachmentStatus {
                phase: AttachmentPhase::Pending,
            }),
        };

        violations.finish(attachment)
    }

    pub fn volume_id(&self) -> &str {
        &self.spec.volume.name
    }

    pub fn node_id(&self) -> &str {
        &self.spec.volume.owner_node_id
    }

    pub fn phase(&self) -> AttachmentPhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    pub fn set_phase(&mut self, phase: AttachmentPhase) {
        self.status.get_or_insert_with(Default::default).phase = phase;
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn holds_node_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == NODE_FINALIZER)
    }

    pub fn add_node_finalizer(&mut self) {
        if !self.holds_node_finalizer() {
            self.finalizers_mut().push(NODE_FINALIZER.to_owned());
        }
    }

    pub fn remove_node_finalizer(&mut self) {
        self.finalizers_mut().retain(|f| f != NODE_FINALIZER);
    }

    /// The monitor only tracks filesystem attachments that are fully published.
    pub fn is_monitored(&self) -> bool {
        !self.is_deleting()
            && self.spec.volume.access_type == AccessType::Mount
            && !self.spec.volume.staging_path.is_empty()
            && !self.spec.volume.target_path.is_empty()
    }

    /// The name suffix must agree with the owner node id.
    pub fn owner_matches_name(&self) -> bool {
        self.name_any()
            .strip_prefix(self.volume_id())
            .and_then(|rest| rest.strip_prefix('-'))
            == Some(self.node_id())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn params() -> AttachmentParams {
        AttachmentParams {
            volume_id: "pvc-a".to_owned(),
            node_id: "k8s-1".to_owned(),
            namespace: "openebs".to_owned(),
            access_type: AccessType::Mount,
            fs_type: "ext4".to_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_attachment_name_and_labels() {
        let cva = CStorVolumeAttachment::new_for(params()).unwrap();

        assert_eq!(cva.name_any(), "pvc-a-k8s-1");
        assert_eq!(cva.labels().get(VOLUME_NAME_LABEL).unwrap(), "pvc-a");
        assert_eq!(cva.labels().get(NODE_ID_LABEL).unwrap(), "k8s-1");
        assert_eq!(cva.phase(), AttachmentPhase::Pending);
        assert_eq!(cva.spec.iscsi.iface, "default");
        assert!(cva.spec.volume.device_path.is_empty());
        assert!(cva.owner_matches_name());
    }

    #[test]
    fn test_mount_access_requires_fs_type() {
        let err = CStorVolumeAttachment::new_for(AttachmentParams {
            fs_type: String::new(),
            ..params()
        })
        .unwrap_err();
        assert!(err.to_string().contains("filesystem type"));

        let block = CStorVolumeAttachment::new_for(AttachmentParams {
            access_type: AccessType::Block,
            fs_type: String::new(),
            ..params()
        });
        assert!(block.is_ok());
    }

    #[test]
    fn test_node_finalizer_is_added_once() {
        let mut cva = CStorVolumeAttachment::new_for(params()).unwrap();
        cva.add_node_finalizer();
        cva.add_node_finalizer();
        assert_eq!(cva.finalizers().len(), 1);
        assert!(cva.holds_node_finalizer());

        cva.remove_node_finalizer();
        assert!(!cva.holds_node_finalizer());
    }

    #[test]
    fn test_monitored_requires_both_paths() {
        let mut cva = CStorVolumeAttachment::new_for(params()).unwrap();
        assert!(!cva.is_monitored());

        cva.spec.volume.staging_path = "/staging".to_owned();
        cva.spec.volume.target_path = "/target".to_owned();
        assert!(cva.is_monitored());

        cva.spec.volume.access_type = AccessType::Block;
        assert!(!cva.is_monitored());
    }

    #[test]
    fn test_selectors() {
        assert_eq!(node_selector("k8s-1"), "openebs.io/node-id=k8s-1");
        assert_eq!(volume_selector("pvc-a"), "openebs.io/volume-name=pvc-a");
    }
}
