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

use crate::error::Result;
use crate::ledger::{Ledger, TransitionStatus};
use crate::reconcile::{AttachmentReconciler, settle};
use crate::types::v1::volume_attachment::node_selector;
use std::sync::Arc;
use tracing::{info, warn};

/// Unstages every attachment of this node that was deleted while the process
/// was down. Runs before the plugin starts serving; failures are left to the
/// mount monitor. Returns how many attachments were cleaned up.
pub async fn recover(reconciler: &AttachmentReconciler, ledger: &Arc<Ledger>) -> Result<usize> {
    let node_id = reconciler.node_id();
    let attachments = reconciler
        .store()
        .list_attachments(&node_selector(node_id))
        .await?;

    let mut recovered = 0;
    for attachment in attachments
        .iter()
        .filter(|a| a.is_deleting() && a.node_id() == node_id)
    {
        let volume_id = attachment.volume_id();
        let guard = match ledger.acquire(volume_id, TransitionStatus::UnmountUnderProgress) {
            Ok(guard) => guard,
            Err(busy) => {
                warn!(error = %busy, "skipping recovery");
                continue;
            }
        };

        let result = reconciler.unstage(&guard, volume_id).await;
        match &result {
            Ok(()) => {
                recovered += 1;
                info!(volume_id, "recovered deleted attachment");
            }
            Err(e) => warn!(volume_id, error = %e, "recovery failed; the monitor will retry"),
        }
        settle(guard, &result, TransitionStatus::Unmounted);
    }
    Ok(recovered)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::tests::{NodeHarness, staging_path};

    #[tokio::test]
    async fn test_deleted_attachments_are_unstaged_on_start() {
        let h = NodeHarness::new();
        h.published("pvc-a").await;
        h.published("pvc-b").await;
        h.store.mark_attachment_deleted("pvc-a-k8s-1");

        let recovered = recover(&h.reconciler, &h.ledger).await.unwrap();

        assert_eq!(recovered, 1);
        assert!(h.store.attachment("pvc-a-k8s-1").is_none());
        assert!(!h.mounter.is_mounted(&staging_path("pvc-a")));
        assert!(h.mounter.is_mounted(&staging_path("pvc-b")));
        assert_eq!(h.initiator.logouts(), 1);
    }

    #[tokio::test]
    async fn test_failed_recovery_keeps_the_finalizer() {
        let h = NodeHarness::new();
        h.published("pvc-a").await;
        h.store.mark_attachment_deleted("pvc-a-k8s-1");
        h.mounter.fail_unmounts(true);

        let recovered = recover(&h.reconciler, &h.ledger).await.unwrap();

        assert_eq!(recovered, 0);
        let attachment = h.store.attachment("pvc-a-k8s-1").unwrap();
        assert!(attachment.is_deleting());
        assert!(attachment.holds_node_finalizer());
        assert_eq!(h.initiator.logouts(), 0);
        assert!(h.ledger.status("pvc-a").is_none());
    }

    #[tokio::test]
    async fn test_nothing_to_recover() {
        let h = NodeHarness::new();
        h.published("pvc-a").await;
        assert_eq!(recover(&h.reconciler, &h.ledger).await.unwrap(), 0);
        assert!(h.mounter.is_mounted(&staging_path("pvc-a")));
    }
}
