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

use crate::kernel::command;
use crate::kernel::{DeviceNotFoundSnafu, Error, Initiator, IscsiTarget};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// iscsiadm exit code for "no matching session"
const NO_OBJS_FOUND: i32 = 21;
/// iscsiadm exit code for "session already exists"
const SESS_EXISTS: i32 = 15;

/// Initiator backed by `iscsiadm` from open-iscsi.
#[derive(Clone, Debug)]
pub struct IscsiAdm {
    /// How long to wait for the by-path link once the session is up.
    pub device_timeout: Duration,
    pub device_poll: Duration,
}

impl Default for IscsiAdm {
    fn default() -> Self {
        Self {
            device_timeout: Duration::from_secs(10),
            device_poll: Duration::from_millis(500),
        }
    }
}

impl IscsiAdm {
    async fn logged_in(&self, target: &IscsiTarget) -> Result<bool, Error> {
        // no active sessions at all exits with 21
        let sessions = command::run("iscsiadm", &["-m", "session"], &[NO_OBJS_FOUND]).await?;
        Ok(session_listed(&sessions.stdout, target))
    }

    async fn wait_for_device(&self, path: &str) -> Result<(), Error> {
        let deadline = tokio::time::Instant::now() + self.device_timeout;
        loop {
            if tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return DeviceNotFoundSnafu { path }.fail();
            }
            tokio::time::sleep(self.device_poll).await;
        }
    }
}

/// Whether `iscsiadm -m session` output lists `target` on its portal.
fn session_listed(output: &str, target: &IscsiTarget) -> bool {
    // tcp: [3] 10.0.0.7:3260,1 iqn.2016-09.com.openebs.cstor:pvc-a (non-flash)
    output.lines().any(|line| {
        let mut fields = line.split_whitespace().skip(2);
        let portal = fields
            .next()
            .and_then(|p| p.split(',').next())
            .unwrap_or_default();
        let iqn = fields.next().unwrap_or_default();
        portal == target.portal && iqn == target.iqn
    })
}

#[async_trait]
impl Initiator for IscsiAdm {
    #[instrument(skip(self), fields(iqn = %target.iqn, portal = %target.portal))]
    async fn connect(&self, target: &IscsiTarget) -> Result<String, Error> {
        let device = target.device_path();
        if self.logged_in(target).await? {
            info!("session already present");
        } else {
            command::run(
                "iscsiadm",
                &["-m", "discovery", "-t", "sendtargets", "-p", &target.portal, "-I", &target.iface],
                &[],
            )
            .await?;
            command::run(
                "iscsiadm",
                &["-m", "node", "-T", &target.iqn, "-p", &target.portal, "-I", &target.iface, "--login"],
                &[SESS_EXISTS],
            )
            .await?;
            info!("logged in");
        }

        self.wait_for_device(&device).await?;
        Ok(device)
    }

    #[instrument(skip(self), fields(iqn = %target.iqn, portal = %target.portal))]
    async fn logout(&self, target: &IscsiTarget) -> Result<(), Error> {
        command::run(
            "iscsiadm",
            &["-m", "node", "-T", &target.iqn, "-p", &target.portal, "--logout"],
            &[NO_OBJS_FOUND],
        )
        .await?;

        // the node record may already be gone
        if let Err(e) = command::run(
            "iscsiadm",
            &["-m", "node", "-o", "delete", "-T", &target.iqn, "-p", &target.portal],
            &[NO_OBJS_FOUND],
        )
        .await
        {
            warn!(error = %e, "failed to delete node record");
        }
        info!("logged out");
        Ok(())
    }

    async fn rescan(&self, target: &IscsiTarget) -> Result<(), Error> {
        command::run(
            "iscsiadm",
            &["-m", "node", "-T", &target.iqn, "-p", &target.portal, "-R"],
            &[],
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn target() -> IscsiTarget {
        IscsiTarget {
            iqn: "iqn.2016-09.com.openebs.cstor:pvc-a".to_owned(),
            portal: "10.0.0.7:3260".to_owned(),
            iface: "default".to_owned(),
            lun: 0,
        }
    }

    #[test]
    fn test_session_listed() {
        let output = "\
tcp: [1] 10.0.0.9:3260,1 iqn.2016-09.com.openebs.cstor:pvc-b (non-flash)
tcp: [3] 10.0.0.7:3260,1 iqn.2016-09.com.openebs.cstor:pvc-a (non-flash)
";
        assert!(session_listed(output, &target()));
        assert!(!session_listed("", &target()));

        let other_portal = "tcp: [3] 10.0.0.8:3260,1 iqn.2016-09.com.openebs.cstor:pvc-a (non-flash)";
        assert!(!session_listed(other_portal, &target()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_device_times_out() {
        let adm = IscsiAdm::default();
        let err = adm
            .wait_for_device("/dev/disk/by-path/does-not-exist")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound { .. }));
    }
}
