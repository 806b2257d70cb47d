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

use crate::kernel::Prober;
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Checks that an iSCSI portal accepts TCP connections.
#[derive(Clone, Debug)]
pub struct TcpProber {
    pub timeout: Duration,
}

impl Default for TcpProber {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
        }
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn reachable(&self, portal: &str) -> bool {
        match tokio::time::timeout(self.timeout, TcpStream::connect(portal)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(portal, error = %e, "portal refused connection");
                false
            }
            Err(_) => {
                debug!(portal, "portal connect timed out");
                false
            }
        }
    }
}
