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

//! Narrow view of the cluster store used by both plugin roles.
//!
//! Everything is scoped to the namespace the process was configured with.
//! `get_*` returns `Ok(None)` for objects that do not exist; `update_*`
//! re-reads the object, applies the mutation and writes it back. Writes to
//! the main resource drop `.status`; phase changes go through
//! `update_attachment_status`.

use crate::context::Error;
use crate::types::v1::target::{CStorVolume, JivaVolume};
use crate::types::v1::volume_attachment::CStorVolumeAttachment;
use crate::types::v1::volume_config::CStorVolumeConfig;
use async_trait::async_trait;
use k8s_openapi::api::core::v1 as corev1;
use kube::runtime::events::EventType;

pub type ConfigMutation<'a> = &'a (dyn Fn(&mut CStorVolumeConfig) + Send + Sync);
pub type AttachmentMutation<'a> = &'a (dyn Fn(&mut CStorVolumeAttachment) + Send + Sync);

#[async_trait]
pub trait ClusterStore: Send + Sync {
    fn namespace(&self) -> &str;

    async fn get_volume_config(&self, name: &str) -> Result<Option<CStorVolumeConfig>, Error>;

    async fn create_volume_config(
        &self,
        config: &CStorVolumeConfig,
    ) -> Result<CStorVolumeConfig, Error>;

    async fn update_volume_config(
        &self,
        name: &str,
        mutate: ConfigMutation<'_>,
    ) -> Result<CStorVolumeConfig, Error>;

    async fn delete_volume_config(&self, name: &str) -> Result<(), Error>;

    async fn get_attachment(&self, name: &str) -> Result<Option<CStorVolumeAttachment>, Error>;

    async fn list_attachments(&self, selector: &str) -> Result<Vec<CStorVolumeAttachment>, Error>;

    async fn create_attachment(
        &self,
        attachment: &CStorVolumeAttachment,
    ) -> Result<CStorVolumeAttachment, Error>;

    async fn update_attachment(
        &self,
        name: &str,
        mutate: AttachmentMutation<'_>,
    ) -> Result<CStorVolumeAttachment, Error>;

    /// Writes the attachment's status subresource. Only `.status` changes
    /// made by `mutate` are kept.
    async fn update_attachment_status(
        &self,
        name: &str,
        mutate: AttachmentMutation<'_>,
    ) -> Result<CStorVolumeAttachment, Error>;

    async fn delete_attachment(&self, name: &str) -> Result<(), Error>;

    async fn get_cstor_volume(&self, name: &str) -> Result<Option<CStorVolume>, Error>;

    async fn get_jiva_volume(&self, name: &str) -> Result<Option<JivaVolume>, Error>;

    async fn get_node(&self, name: &str) -> Result<Option<corev1::Node>, Error>;

    /// Publishes an event against an attachment. Failures are the caller's to log.
    async fn record(
        &self,
        attachment: &CStorVolumeAttachment,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<(), Error>;
}
