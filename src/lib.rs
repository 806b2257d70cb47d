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

use crate::config::Config;
use crate::context::Context;
use crate::controller::ControllerService;
use crate::engine::TargetClient;
use crate::identity::IdentityService;
use crate::kernel::Host;
use crate::ledger::Ledger;
use crate::monitor::MountMonitor;
use crate::node::NodeService;
use crate::reconcile::AttachmentReconciler;
use crate::server::state::AppState;
use crate::store::ClusterStore;
use crate::types::v1::target::{CStorVolume, JivaVolume};
use crate::types::v1::volume_attachment::CStorVolumeAttachment;
use crate::types::v1::volume_config::CStorVolumeConfig;
use crate::wait::Timing;
use kube::{Client, CustomResourceExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub mod config;
mod context;
pub mod controller;
pub mod csi;
pub mod engine;
pub mod error;
pub mod identity;
pub mod kernel;
pub mod ledger;
pub mod monitor;
pub mod node;
pub mod reconcile;
pub mod recovery;
pub mod server;
pub mod store;
pub mod types;
pub mod utils;
pub mod wait;


shadow_rs::shadow!(build);

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let settings = config.validate()?;
    info!(
        version = %identity::vendor_version(),
        plugin = %settings.plugin,
        node_id = %settings.node_id,
        endpoint = %settings.endpoint,
        "starting plugin"
    );

    let client = Client::try_default().await?;
    let store: Arc<dyn ClusterStore> = Arc::new(Context::new(client, settings.namespace.clone()));
    let timing = Timing::default();

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    let node: Option<Arc<dyn csi::Node>> = if settings.plugin.runs_node() {
        let reconciler = Arc::new(AttachmentReconciler::new(
            store.clone(),
            Host::system(),
            timing,
            settings.node_id.clone(),
        ));
        let ledger = Ledger::new();

        // finish teardowns interrupted by the previous process before taking calls
        match recovery::recover(&reconciler, &ledger).await {
            Ok(count) => info!(count, "restart recovery finished"),
            Err(e) => warn!(error = %e, "restart recovery failed"),
        }

        let monitor = MountMonitor::new(reconciler.clone(), ledger.clone(), settings.monitor_interval);
        tokio::spawn(monitor.run(shutdown.clone()));

        Some(Arc::new(NodeService::new(reconciler, ledger, shutdown.clone())))
    } else {
        None
    };

    let controller: Option<Arc<dyn csi::Controller>> = if settings.plugin.runs_controller() {
        Some(Arc::new(ControllerService::new(
            store.clone(),
            Ledger::new(),
            Arc::new(TargetClient::default()),
            timing,
            shutdown.clone(),
        )))
    } else {
        None
    };

    let state = AppState {
        identity: Arc::new(IdentityService::new(
            settings.name.clone(),
            controller.is_some(),
        )),
        controller,
        node,
    };

    server::serve(&settings.endpoint, state, shutdown).await?;
    info!("plugin stopped");

    Ok(())
}

async fn shutdown_on_signal(shutdown: CancellationToken) {
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate => {}
    }

    info!("shutdown requested");
    shutdown.cancel();
}

/// Writes the custom resource definitions the plugin reads and writes.
pub async fn crd(file: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer: Pin<Box<dyn AsyncWrite + Send>> = if let Some(file) = file {
        Box::pin(
            tokio::fs::OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(file)
                .await?,
        )
    } else {
        Box::pin(tokio::io::stdout())
    };

    let documents = [
        serde_yaml_ng::to_string(&CStorVolumeConfig::crd())?,
        serde_yaml_ng::to_string(&CStorVolumeAttachment::crd())?,
        serde_yaml_ng::to_string(&CStorVolume::crd())?,
        serde_yaml_ng::to_string(&JivaVolume::crd())?,
    ];
    writer
        .write_all(documents.join("---\n").as_bytes())
        .await?;
    writer.flush().await?;

    Ok(())
}
