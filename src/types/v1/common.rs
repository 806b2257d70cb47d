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

//! Enums and well-known keys shared by the desired-state objects.

use k8s_openapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub const GROUP: &str = "cstor.openebs.io";

pub const CAS_TYPE_LABEL: &str = "openebs.io/cas-type";
pub const PERSISTENT_VOLUME_LABEL: &str = "openebs.io/persistent-volume";
pub const VOLUME_NAME_LABEL: &str = "openebs.io/volume-name";
pub const NODE_ID_LABEL: &str = "openebs.io/node-id";

pub const POLICY_ANNOTATION: &str = "openebs.io/volume-policy";
pub const ORIGINAL_NAME_ANNOTATION: &str = "openebs.io/volume-name";

pub const CONFIG_FINALIZER: &str = const_str::concat!(GROUP, "/finalizer");
pub const NODE_FINALIZER: &str = const_str::concat!(GROUP, "/node-attachment");

/// Storage engine serving a volume.
#[derive(
    Default, Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, Display, EnumString, PartialEq, Eq,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CasType {
    #[default]
    Cstor,
    Jiva,
}

/// How the workload consumes the volume.
#[derive(
    Default, Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, Display, EnumString, PartialEq, Eq,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AccessType {
    #[default]
    Mount,
    Block,
}

/// Provisioning phase of a `CStorVolumeConfig`.
#[derive(Default, Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, Display, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
#[schemars(rename_all = "PascalCase")]
pub enum ConfigPhase {
    #[default]
    Pending,
    Bound,
    Failed,
}

/// Node-side progress of a `CStorVolumeAttachment`.
#[derive(Default, Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, Display, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
#[schemars(rename_all = "PascalCase")]
pub enum AttachmentPhase {
    #[default]
    Pending,
    Staged,
    Published,
    Unstaged,
    MountFailed,
}

/// Health of the iSCSI target as reported by the engine.
#[derive(Default, Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, Display, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
#[schemars(rename_all = "PascalCase")]
pub enum TargetHealth {
    #[default]
    Init,
    Healthy,
    Degraded,
    Offline,
    Error,
}

impl TargetHealth {
    /// Healthy and degraded targets both serve I/O.
    pub fn is_ready(self) -> bool {
        matches!(self, TargetHealth::Healthy | TargetHealth::Degraded)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_cas_type_parses_lowercase() {
        assert_eq!(CasType::from_str("cstor").unwrap(), CasType::Cstor);
        assert_eq!(CasType::from_str("jiva").unwrap(), CasType::Jiva);
        assert!(CasType::from_str("lvm").is_err());
        assert_eq!(CasType::Jiva.to_string(), "jiva");
    }

    #[test]
    fn test_target_health_readiness() {
        assert!(TargetHealth::Healthy.is_ready());
        assert!(TargetHealth::Degraded.is_ready());
        assert!(!TargetHealth::Init.is_ready());
        assert!(!TargetHealth::Offline.is_ready());
    }

    #[test]
    fn test_finalizer_names() {
        assert_eq!(CONFIG_FINALIZER, "cstor.openebs.io/finalizer");
        assert_eq!(NODE_FINALIZER, "cstor.openebs.io/node-attachment");
    }
}
