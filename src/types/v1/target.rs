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

//! Target-side volume objects published by the engines. The agent only reads
//! them; both kinds are projected into one [`TargetVolume`] view.

use crate::types::v1::common::TargetHealth;
use crate::utils::quantity;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::{CustomResource, KubeSchema};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ISCSI_PORT: u16 = 3260;

fn default_port() -> u16 {
    DEFAULT_ISCSI_PORT
}

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, KubeSchema, Default)]
#[kube(
    group = "cstor.openebs.io",
    version = "v1",
    kind = "CStorVolume",
    namespaced,
    status = "CStorVolumeStatus",
    shortname = "cv",
    plural = "cstorvolumes",
    singular = "cstorvolume",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Target", "type":"string", "jsonPath":".spec.targetIP"}"#,
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct CStorVolumeSpec {
    pub iqn: String,

    #[serde(rename = "targetIP")]
    pub target_ip: String,

    #[serde(default = "default_port")]
    pub target_port: u16,

    #[serde(default)]
    pub lun: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<Quantity>,
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CStorVolumeStatus {
    #[serde(default)]
    pub phase: TargetHealth,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<Quantity>,
}

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, KubeSchema, Default)]
#[kube(
    group = "openebs.io",
    version = "v1alpha1",
    kind = "JivaVolume",
    namespaced,
    status = "JivaVolumeStatus",
    shortname = "jv",
    plural = "jivavolumes",
    singular = "jivavolume",
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct JivaVolumeSpec {
    pub iscsi_spec: JivaIscsiSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<Quantity>,
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JivaIscsiSpec {
    #[serde(default)]
    pub iqn: String,

    #[serde(rename = "targetIP", default)]
    pub target_ip: String,

    #[serde(default = "default_port")]
    pub target_port: u16,

    #[serde(default)]
    pub lun: i32,
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JivaVolumeStatus {
    /// Controller-reported mode: `RW`, `RO`, `Degraded`, ...
    #[serde(default)]
    pub status: String,
}

/// Engine-neutral view of the target serving a volume.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetVolume {
    pub iqn: String,
    pub target_ip: String,
    pub portal: String,
    pub lun: i32,
    pub health: TargetHealth,
    pub capacity_bytes: Option<u64>,
}

impl TargetVolume {
    pub fn is_ready(&self) -> bool {
        self.health.is_ready()
    }
}

impl From<&CStorVolume> for TargetVolume {
    fn from(cv: &CStorVolume) -> Self {
        let status = cv.status.clone().unwrap_or_default();
        TargetVolume {
            iqn: cv.spec.iqn.clone(),
            target_ip: cv.spec.target_ip.clone(),
            portal: format!("{}:{}", cv.spec.target_ip, cv.spec.target_port),
            lun: cv.spec.lun,
            health: status.phase,
            capacity_bytes: status
                .capacity
                .or_else(|| cv.spec.capacity.clone())
                .and_then(|q| quantity::to_bytes(&q).ok()),
        }
    }
}

impl From<&JivaVolume> for TargetVolume {
    fn from(jv: &JivaVolume) -> Self {
        let health = match jv.status.as_ref().map(|s| s.status.as_str()) {
            Some("RW") => TargetHealth::Healthy,
            Some("Degraded") => TargetHealth::Degraded,
            Some("RO") | Some("Offline") => TargetHealth::Offline,
            _ => TargetHealth::Init,
        };
        let iscsi = &jv.spec.iscsi_spec;
        TargetVolume {
            iqn: iscsi.iqn.clone(),
            target_ip: iscsi.target_ip.clone(),
            portal: format!("{}:{}", iscsi.target_ip, iscsi.target_port),
            lun: iscsi.lun,
            health,
            capacity_bytes: jv
                .spec
                .capacity
                .as_ref()
                .and_then(|q| quantity::to_bytes(q).ok()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;

    #[test]
    fn test_cstor_volume_projection() {
        let cv = CStorVolume {
            metadata: metav1::ObjectMeta {
                name: Some("pvc-a".to_owned()),
                ..Default::default()
            },
            spec: CStorVolumeSpec {
                iqn: "iqn.2016-09.com.openebs.cstor:pvc-a".to_owned(),
                target_ip: "10.0.0.7".to_owned(),
                target_port: DEFAULT_ISCSI_PORT,
                lun: 0,
                capacity: Some(Quantity("1Gi".to_owned())),
            },
            status: Some(CStorVolumeStatus {
                phase: TargetHealth::Degraded,
                capacity: None,
            }),
        };

        let target = TargetVolume::from(&cv);
        assert_eq!(target.portal, "10.0.0.7:3260");
        assert!(target.is_ready());
        assert_eq!(target.capacity_bytes, Some(quantity::GIB));
    }

    #[test]
    fn test_jiva_status_maps_to_health() {
        let mut jv = JivaVolume {
            metadata: Default::default(),
            spec: JivaVolumeSpec {
                iscsi_spec: JivaIscsiSpec {
                    iqn: "iqn.2016-09.com.openebs.jiva:pvc-b".to_owned(),
                    target_ip: "10.0.0.8".to_owned(),
                    target_port: 3260,
                    lun: 0,
                },
                capacity: None,
            },
            status: Some(JivaVolumeStatus {
                status: "RW".to_owned(),
            }),
        };
        assert_eq!(TargetVolume::from(&jv).health, TargetHealth::Healthy);

        jv.status = Some(JivaVolumeStatus {
            status: "RO".to_owned(),
        });
        assert!(!TargetVolume::from(&jv).is_ready());

        jv.status = None;
        assert_eq!(TargetVolume::from(&jv).health, TargetHealth::Init);
    }

    #[test]
    fn test_cstor_spec_uses_target_ip_key() {
        let json = serde_json::json!({
            "iqn": "iqn.x:pvc-a",
            "targetIP": "10.0.0.9"
        });
        let spec: CStorVolumeSpec = serde_json::from_value(json).unwrap_or_default();
        assert_eq!(spec.target_ip, "10.0.0.9");
        assert_eq!(spec.target_port, DEFAULT_ISCSI_PORT);
    }
}
