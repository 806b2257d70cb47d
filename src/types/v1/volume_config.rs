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
    CAS_TYPE_LABEL, CONFIG_FINALIZER, CasType, ConfigPhase, ORIGINAL_NAME_ANNOTATION,
    PERSISTENT_VOLUME_LABEL, POLICY_ANNOTATION,
};
use crate::utils::quantity;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::{CustomResource, KubeSchema, ResourceExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Desired specification of one volume. The name is the volume id.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, KubeSchema, Default)]
#[kube(
    group = "cstor.openebs.io",
    version = "v1",
    kind = "CStorVolumeConfig",
    namespaced,
    status = "VolumeConfigStatus",
    shortname = "cvc",
    plural = "cstorvolumeconfigs",
    singular = "cstorvolumeconfig",
    printcolumn = r#"{"name":"Capacity", "type":"string", "jsonPath":".spec.capacity"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#,
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct VolumeConfigSpec {
    pub capacity: Quantity,

    pub replica_count: u32,

    pub pool_cluster: String,

    #[serde(default)]
    pub cas_type: CasType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,

    /// `<source-volume>@<snapshot>` when the volume is a clone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_snapshot: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_node_id: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeConfigStatus {
    #[serde(default)]
    pub phase: ConfigPhase,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<Quantity>,
}

/// Inputs for a new volume config, already extracted from the request.
#[derive(Clone, Debug, Default)]
pub struct ProvisionParams {
    pub volume_id: String,
    pub namespace: String,
    pub capacity_bytes: u64,
    pub replica_count: u32,
    pub pool_cluster: String,
    pub cas_type: CasType,
    pub policy: Option<String>,
    pub source_snapshot: Option<String>,
}

impl CStorVolumeConfig {
    /// Builds a config in phase `Pending` with the capacity rounded up to
    /// whole gibibytes. Every invalid field is reported in one error.
    pub fn provision(params: ProvisionParams) -> Result<Self, Error> {
        let mut violations = Violations::new("CStorVolumeConfig");
        violations.require(!params.volume_id.is_empty(), "volume name is required");
        violations.require(!params.namespace.is_empty(), "namespace is required");
        violations.require(params.capacity_bytes > 0, "capacity must be positive");
        violations.require(params.replica_count > 0, "replica count must be positive");
        violations.require(
            !params.pool_cluster.is_empty(),
            "pool cluster is required",
        );
        if let Some(source) = &params.source_snapshot
            && !source.contains('@')
        {
            violations.push(format!("source snapshot '{source}' is not <volume>@<snapshot>"));
        }

        let labels: BTreeMap<String, String> = [
            (CAS_TYPE_LABEL.to_owned(), params.cas_type.to_string()),
            (PERSISTENT_VOLUME_LABEL.to_owned(), params.volume_id.clone()),
        ]
        .into_iter()
        .collect();

        let mut annotations = BTreeMap::new();
        annotations.insert(ORIGINAL_NAME_ANNOTATION.to_owned(), params.volume_id.clone());
        if let Some(policy) = &params.policy {
            annotations.insert(POLICY_ANNOTATION.to_owned(), policy.clone());
        }

        let config = CStorVolumeConfig {
            metadata: metav1::ObjectMeta {
                name: Some(params.volume_id.clone()),
                namespace: Some(params.namespace),
                labels: Some(labels),
                annotations: Some(annotations),
                finalizers: Some(vec![CONFIG_FINALIZER.to_owned()]),
                ..Default::default()
            },
            spec: VolumeConfigSpec {
                capacity: quantity::gib_quantity(quantity::round_up_gib(params.capacity_bytes)),
                replica_count: params.replica_count,
                pool_cluster: params.pool_cluster,
                cas_type: params.cas_type,
                policy: params.policy,
                source_snapshot: params.source_snapshot,
                publish_node_id: None,
            },
            status: Some(VolumeConfigStatus {
                phase: ConfigPhase::Pending,
                capacity: None,
            }),
        };

        violations.finish(config)
    }

    pub fn phase(&self) -> ConfigPhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn capacity_bytes(&self) -> Result<u64, Error> {
        quantity::to_bytes(&self.spec.capacity)
    }

    /// Capacity the target reports, when it has reported one.
    pub fn status_capacity_bytes(&self) -> Option<u64> {
        self.status
            .as_ref()
            .and_then(|s| s.capacity.as_ref())
            .and_then(|q| quantity::to_bytes(q).ok())
    }

    pub fn policy_name(&self) -> Option<&str> {
        self.annotations().get(POLICY_ANNOTATION).map(String::as_str)
    }
}
