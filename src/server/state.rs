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

use crate::csi::{Controller, Identity, Node};
use crate::error::{Error, Result};
use std::sync::Arc;

/// Services of the running role. A role without a service answers its calls
/// with `Unimplemented`.
#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<dyn Identity>,
    pub controller: Option<Arc<dyn Controller>>,
    pub node: Option<Arc<dyn Node>>,
}

impl AppState {
    pub fn controller(&self, method: &str) -> Result<&Arc<dyn Controller>> {
        self.controller.as_ref().ok_or_else(|| Error::Unimplemented {
            method: method.to_owned(),
        })
    }

    pub fn node(&self, method: &str) -> Result<&Arc<dyn Node>> {
        self.node.as_ref().ok_or_else(|| Error::Unimplemented {
            method: method.to_owned(),
        })
    }
}
