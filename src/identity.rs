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

use crate::build;
use crate::csi::{self, GetPluginCapabilitiesResponse, GetPluginInfoResponse, PluginCapability, ProbeResponse};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Plugin identity, answered by every role.
pub struct IdentityService {
    name: String,
    controller: bool,
}

impl IdentityService {
    pub fn new(name: impl Into<String>, controller: bool) -> Self {
        Self {
            name: name.into(),
            controller,
        }
    }
}

pub fn vendor_version() -> String {
    format!("{}-{}", build::PKG_VERSION, build::SHORT_COMMIT)
}

#[async_trait]
impl csi::Identity for IdentityService {
    async fn get_plugin_info(&self) -> Result<GetPluginInfoResponse> {
        Ok(GetPluginInfoResponse {
            name: self.name.clone(),
            vendor_version: vendor_version(),
            manifest: BTreeMap::from([
                ("branch".to_owned(), build::BRANCH.to_owned()),
                ("buildTime".to_owned(), build::BUILD_TIME.to_owned()),
            ]),
        })
    }

    async fn probe(&self) -> Result<ProbeResponse> {
        Ok(ProbeResponse { ready: true })
    }

    async fn get_plugin_capabilities(&self) -> Result<GetPluginCapabilitiesResponse> {
        let mut capabilities = Vec::new();
        if self.controller {
            capabilities.push(PluginCapability::ControllerService);
        }
        capabilities.push(PluginCapability::OnlineVolumeExpansion);
        Ok(GetPluginCapabilitiesResponse { capabilities })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::csi::Identity;

    #[tokio::test]
    async fn test_node_only_plugin_has_no_controller_capability() {
        let identity = IdentityService::new("cstor.csi.openebs.io", false);
        let caps = identity.get_plugin_capabilities().await.unwrap().capabilities;
        assert_eq!(caps, vec![PluginCapability::OnlineVolumeExpansion]);

        let info = identity.get_plugin_info().await.unwrap();
        assert_eq!(info.name, "cstor.csi.openebs.io");
        assert!(info.vendor_version.starts_with(env!("CARGO_PKG_VERSION")));
    }
}
