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

use crate::store::{AttachmentMutation, ClusterStore, ConfigMutation};
use crate::types;
use crate::types::v1::target::{CStorVolume, JivaVolume};
use crate::types::v1::volume_attachment::CStorVolumeAttachment;
use crate::types::v1::volume_config::CStorVolumeConfig;
use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::core::v1 as corev1;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Resource, ResourceExt, api::Api};
use serde::Serialize;
use serde::de::DeserializeOwned;
use snafu::Snafu;
use snafu::futures::TryFutureExt;
use std::fmt::Debug;
use tracing::info;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Kubernetes API error: {}", source))]
    Kube { source: kube::Error },

    #[snafu(display("record event error: {}", source))]
    Record { source: kube::Error },

    #[snafu(display("{} '{}' not found", kind, name))]
    NotFound { kind: String, name: String },

    #[snafu(display("{} '{}' already exists", kind, name))]
    AlreadyExists { kind: String, name: String },

    #[snafu(transparent)]
    Types { source: types::error::Error },

    #[snafu(transparent)]
    Serde { source: serde_json::Error },
}

impl Error {
    fn api_code(&self) -> Option<u16> {
        match self {
            Error::Kube {
                source: kube::Error::Api(ae),
            } => Some(ae.code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. }) || self.api_code() == Some(404)
    }

    pub fn is_conflict(&self) -> bool {
        self.api_code() == Some(409)
    }

    pub fn is_already_exists(&self) -> bool {
        match self {
            Error::AlreadyExists { .. } => true,
            Error::Kube {
                source: kube::Error::Api(ae),
            } => ae.reason == "AlreadyExists",
            _ => false,
        }
    }
}

/// Kubernetes-backed cluster store, scoped to one namespace.
pub struct Context {
    pub(crate) client: kube::Client,
    pub(crate) recorder: Recorder,
    namespace: String,
}

impl Context {
    pub fn new(client: kube::Client, namespace: impl Into<String>) -> Self {
        let reporter = Reporter {
            controller: "cstor-csi".into(),
            instance: std::env::var("HOSTNAME").ok(),
        };

        let recorder = Recorder::new(client.clone(), reporter);
        Self {
            client,
            recorder,
            namespace: namespace.into(),
        }
    }

    fn api<T>(&self) -> Api<T>
    where
        T: Resource<Scope = NamespaceResourceScope>,
        <T as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    pub async fn get<T>(&self, name: &str) -> Result<Option<T>, Error>
    where
        T: Clone + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
        <T as kube::Resource>::DynamicType: Default,
    {
        self.api::<T>().get_opt(name).context(KubeSnafu).await
    }

    pub async fn create<T>(&self, resource: &T) -> Result<T, Error>
    where
        T: Clone + Serialize + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
        <T as kube::Resource>::DynamicType: Default,
    {
        self.api::<T>()
            .create(&PostParams::default(), resource)
            .context(KubeSnafu)
            .await
    }

    pub async fn list<T>(&self, selector: &str) -> Result<Vec<T>, Error>
    where
        T: Clone + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
        <T as kube::Resource>::DynamicType: Default,
    {
        let params = ListParams::default().labels(selector);
        Ok(self
            .api::<T>()
            .list(&params)
            .context(KubeSnafu)
            .await?
            .items)
    }

    pub async fn delete<T>(&self, name: &str) -> Result<(), Error>
    where
        T: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <T as kube::Resource>::DynamicType: Default,
    {
        self.api::<T>()
            .delete(name, &DeleteParams::default())
            .context(KubeSnafu)
            .await?;
        Ok(())
    }

    /// Read-modify-replace. A write conflict re-reads the latest object and
    /// retries once.
    pub async fn update<T, F>(&self, name: &str, mutate: F) -> Result<T, Error>
    where
        T: Clone + Serialize + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
        <T as kube::Resource>::DynamicType: Default,
        F: Fn(&mut T),
    {
        self.replace_with(name, mutate, Subresource::Main).await
    }

    /// Same as [`Context::update`] but writes through the status subresource,
    /// which is the only place the API server accepts `.status` changes.
    pub async fn update_status<T, F>(&self, name: &str, mutate: F) -> Result<T, Error>
    where
        T: Clone + Serialize + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
        <T as kube::Resource>::DynamicType: Default,
        F: Fn(&mut T),
    {
        self.replace_with(name, mutate, Subresource::Status).await
    }

    async fn replace_with<T, F>(&self, name: &str, mutate: F, target: Subresource) -> Result<T, Error>
    where
        T: Clone + Serialize + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
        <T as kube::Resource>::DynamicType: Default,
        F: Fn(&mut T),
    {
        let api = self.api::<T>();

        let update_func = async |current: Option<T>| {
            let Some(mut object) = current else {
                return NotFoundSnafu {
                    kind: T::kind(&Default::default()).to_string(),
                    name,
                }
                .fail();
            };
            mutate(&mut object);
            match target {
                Subresource::Main => {
                    api.replace(name, &PostParams::default(), &object)
                        .context(KubeSnafu)
                        .await
                }
                Subresource::Status => {
                    let _body = serde_json::to_vec(&object)?;
                    api.replace_status(name, &PostParams::default(), &object)
                        .context(KubeSnafu)
                        .await
                }
            }
        };

        let current = api.get_opt(name).context(KubeSnafu).await?;
        match update_func(current).await {
            Err(e) if e.is_conflict() => {}
            other => return other,
        }

        info!("update of {name} ({target:?}) failed due to conflict, retrieve the latest resource and retry.");

        let latest = api.get_opt(name).context(KubeSnafu).await?;
        update_func(latest).await
    }
}

#[derive(Clone, Copy, Debug)]
enum Subresource {
    Main,
    Status,
}

#[async_trait]
impl ClusterStore for Context {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn get_volume_config(&self, name: &str) -> Result<Option<CStorVolumeConfig>, Error> {
        self.get(name).await
    }

    async fn create_volume_config(
        &self,
        config: &CStorVolumeConfig,
    ) -> Result<CStorVolumeConfig, Error> {
        self.create(config).await
    }

    async fn update_volume_config(
        &self,
        name: &str,
        mutate: ConfigMutation<'_>,
    ) -> Result<CStorVolumeConfig, Error> {
        self.update(name, mutate).await
    }

    async fn delete_volume_config(&self, name: &str) -> Result<(), Error> {
        self.delete::<CStorVolumeConfig>(name).await
    }

    async fn get_attachment(&self, name: &str) -> Result<Option<CStorVolumeAttachment>, Error> {
        self.get(name).await
    }

    async fn list_attachments(&self, selector: &str) -> Result<Vec<CStorVolumeAttachment>, Error> {
        self.list(selector).await
    }

    async fn create_attachment(
        &self,
        attachment: &CStorVolumeAttachment,
    ) -> Result<CStorVolumeAttachment, Error> {
        self.create(attachment).await
    }

    async fn update_attachment(
        &self,
        name: &str,
        mutate: AttachmentMutation<'_>,
    ) -> Result<CStorVolumeAttachment, Error> {
        self.update(name, mutate).await
    }

    async fn update_attachment_status(
        &self,
        name: &str,
        mutate: AttachmentMutation<'_>,
    ) -> Result<CStorVolumeAttachment, Error> {
        self.update_status(name, mutate).await
    }

    async fn delete_attachment(&self, name: &str) -> Result<(), Error> {
        self.delete::<CStorVolumeAttachment>(name).await
    }

    async fn get_cstor_volume(&self, name: &str) -> Result<Option<CStorVolume>, Error> {
        self.get(name).await
    }

    async fn get_jiva_volume(&self, name: &str) -> Result<Option<JivaVolume>, Error> {
        self.get(name).await
    }

    async fn get_node(&self, name: &str) -> Result<Option<corev1::Node>, Error> {
        let api: Api<corev1::Node> = Api::all(self.client.clone());
        api.get_opt(name).context(KubeSnafu).await
    }

    async fn record(
        &self,
        attachment: &CStorVolumeAttachment,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<(), Error> {
        self.recorder
            .publish(
                &Event {
                    type_: event_type,
                    reason: reason.to_owned(),
                    note: Some(message.into()),
                    action: "Reconcile".into(),
                    secondary: None,
                },
                &attachment.object_ref(&()),
            )
            .context(RecordSnafu)
            .await
    }
}
