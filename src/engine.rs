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

//! Storage engines behind the plugin surface.
//!
//! Both engines export volumes over iSCSI; they differ in where the target
//! coordinates are published and in how snapshots are taken.

use crate::context;
use crate::store::ClusterStore;
use crate::types::error::{Error as TypesError, InvalidSnapshotIdSnafu};
use crate::types::v1::common::CasType;
use crate::types::v1::target::TargetVolume;
use async_trait::async_trait;
use serde::Serialize;
use snafu::{ResultExt, Snafu};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{info, instrument};

/// Management port of the cstor target.
pub const CSTOR_MGMT_PORT: u16 = 6060;
/// REST port of the jiva controller.
pub const JIVA_API_PORT: u16 = 9501;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("connect to {} failed: {}", address, source))]
    Connect {
        address: String,
        source: std::io::Error,
    },

    #[snafu(display("{} timed out", address))]
    Timeout { address: String },

    #[snafu(display("{} rejected {}: {}", address, command, reply))]
    Rejected {
        address: String,
        command: String,
        reply: String,
    },

    #[snafu(display("request to {} failed: {}", url, source))]
    Http { url: String, source: reqwest::Error },

    #[snafu(display("{} answered {}: {}", url, status, body))]
    Status {
        url: String,
        status: u16,
        body: String,
    },
}

/// Engine serving a volume, chosen once from the volume's cas type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Engine {
    Cstor,
    Jiva,
}

impl From<CasType> for Engine {
    fn from(cas: CasType) -> Self {
        match cas {
            CasType::Cstor => Engine::Cstor,
            CasType::Jiva => Engine::Jiva,
        }
    }
}

impl Engine {
    /// Current target coordinates and health of `volume_id`.
    pub async fn target_volume(
        self,
        store: &dyn ClusterStore,
        volume_id: &str,
    ) -> Result<Option<TargetVolume>, context::Error> {
        Ok(match self {
            Engine::Cstor => store
                .get_cstor_volume(volume_id)
                .await?
                .map(|cv| TargetVolume::from(&cv)),
            Engine::Jiva => store
                .get_jiva_volume(volume_id)
                .await?
                .map(|jv| TargetVolume::from(&jv)),
        })
    }
}

/// Builds the externally visible snapshot id.
pub fn snapshot_id(volume_id: &str, snapshot: &str) -> String {
    format!("{volume_id}@{snapshot}")
}

/// Splits a snapshot id on its first `@` into volume id and snapshot name.
pub fn parse_snapshot_id(id: &str) -> Result<(&str, &str), TypesError> {
    match id.split_once('@') {
        Some((volume, snapshot)) if !volume.is_empty() && !snapshot.is_empty() => {
            Ok((volume, snapshot))
        }
        _ => InvalidSnapshotIdSnafu { id }.fail(),
    }
}

/// Snapshot calls against a running target.
#[async_trait]
pub trait SnapshotClient: Send + Sync {
    async fn create_snapshot(
        &self,
        engine: Engine,
        target_ip: &str,
        volume_id: &str,
        snapshot: &str,
    ) -> Result<(), Error>;

    async fn destroy_snapshot(
        &self,
        engine: Engine,
        target_ip: &str,
        volume_id: &str,
        snapshot: &str,
    ) -> Result<(), Error>;
}

/// Talks to the targets over the network: a line protocol for cstor, REST
/// for jiva.
#[derive(Clone, Debug)]
pub struct TargetClient {
    http: reqwest::Client,
    timeout: Duration,
    cstor_port: u16,
    jiva_port: u16,
}

impl Default for TargetClient {
    fn default() -> Self {
        Self {
            http: reqwest::Client::new(),
            timeout: Duration::from_secs(30),
            cstor_port: CSTOR_MGMT_PORT,
            jiva_port: JIVA_API_PORT,
        }
    }
}

#[derive(Serialize)]
struct SnapshotInput<'a> {
    name: &'a str,
}

impl TargetClient {
    /// Bounds each exchange with a target, connect included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_ports(mut self, cstor_port: u16, jiva_port: u16) -> Self {
        self.cstor_port = cstor_port;
        self.jiva_port = jiva_port;
        self
    }

    /// Sends one management command after the target's banner and expects a
    /// `200` reply.
    async fn cstor_command(&self, target_ip: &str, command: String) -> Result<(), Error> {
        let address = format!("{target_ip}:{}", self.cstor_port);
        let exchange = async {
            let stream = TcpStream::connect(&address)
                .await
                .context(ConnectSnafu { address: &address })?;
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();

            // banner
            lines
                .next_line()
                .await
                .context(ConnectSnafu { address: &address })?;

            write
                .write_all(format!("{command}\r\n").as_bytes())
                .await
                .context(ConnectSnafu { address: &address })?;

            let reply = lines
                .next_line()
                .await
                .context(ConnectSnafu { address: &address })?
                .unwrap_or_default();
            if !reply.starts_with("200") {
                return RejectedSnafu {
                    address: &address,
                    command: &command,
                    reply,
                }
                .fail();
            }
            Ok::<(), Error>(())
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| Error::Timeout {
                address: address.clone(),
            })?
    }

    async fn jiva_action(
        &self,
        target_ip: &str,
        volume_id: &str,
        action: &str,
        snapshot: &str,
    ) -> Result<(), Error> {
        let url = format!(
            "http://{target_ip}:{}/v1/volumes/{volume_id}?action={action}",
            self.jiva_port
        );
        let response = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .json(&SnapshotInput { name: snapshot })
            .send()
            .await
            .context(HttpSnafu { url: &url })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return StatusSnafu {
                url,
                status: status.as_u16(),
                body,
            }
            .fail();
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotClient for TargetClient {
    #[instrument(skip(self))]
    async fn create_snapshot(
        &self,
        engine: Engine,
        target_ip: &str,
        volume_id: &str,
        snapshot: &str,
    ) -> Result<(), Error> {
        match engine {
            Engine::Cstor => {
                self.cstor_command(target_ip, format!("SNAPCREATE {volume_id}@{snapshot}"))
                    .await?
            }
            Engine::Jiva => {
                self.jiva_action(target_ip, volume_id, "snapshot", snapshot)
                    .await?
            }
        }
        info!("snapshot created");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn destroy_snapshot(
        &self,
        engine: Engine,
        target_ip: &str,
        volume_id: &str,
        snapshot: &str,
    ) -> Result<(), Error> {
        match engine {
            Engine::Cstor => {
                self.cstor_command(target_ip, format!("SNAPDESTROY {volume_id}@{snapshot}"))
                    .await?
            }
            Engine::Jiva => {
                self.jiva_action(target_ip, volume_id, "deleteSnapshot", snapshot)
                    .await?
            }
        }
        info!("snapshot destroyed");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::extract::{Json, Path, Query};
    use axum::http::StatusCode;
    use axum::{Router, routing::post};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    const LOCALHOST: &str = "127.0.0.1";

    /// One-shot cstor management endpoint. With a reply it sends a banner,
    /// reads one command and answers; without one it accepts and stays
    /// silent. The handle yields the command it read.
    async fn cstor_target(reply: Option<&'static str>) -> (u16, JoinHandle<Option<String>>) {
        let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let Some(reply) = reply else {
                tokio::time::sleep(Duration::from_secs(30)).await;
                drop((read, write));
                return None;
            };
            write
                .write_all(b"iSCSI Target Controller version istgt:0.5\r\n")
                .await
                .unwrap();
            let command = BufReader::new(read).lines().next_line().await.unwrap();
            write.write_all(format!("{reply}\r\n").as_bytes()).await.unwrap();
            command
        });
        (port, handle)
    }

    type JivaCalls = Arc<Mutex<Vec<(String, String, String)>>>;

    /// Jiva controller REST endpoint answering every action with `status`.
    /// Records `(volume, action, snapshot name)` per call.
    async fn jiva_controller(status: StatusCode) -> (u16, JivaCalls) {
        let calls = JivaCalls::default();
        let seen = Arc::clone(&calls);
        let app = Router::new().route(
            "/v1/volumes/{volume}",
            post(
                move |Path(volume): Path<String>,
                      Query(query): Query<HashMap<String, String>>,
                      Json(body): Json<serde_json::Value>| {
                    let seen = Arc::clone(&seen);
                    async move {
                        seen.lock().unwrap().push((
                            volume,
                            query.get("action").cloned().unwrap_or_default(),
                            body["name"].as_str().unwrap_or_default().to_owned(),
                        ));
                        (status, "replica rebuilding")
                    }
                },
            ),
        );
        let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (port, calls)
    }

    fn client(cstor_port: u16, jiva_port: u16) -> TargetClient {
        TargetClient::default()
            .with_ports(cstor_port, jiva_port)
            .with_timeout(Duration::from_millis(300))
    }

    #[tokio::test]
    async fn test_cstor_snapshot_commands_follow_the_banner() {
        let (port, target) = cstor_target(Some("200 OK")).await;
        client(port, 0)
            .create_snapshot(Engine::Cstor, LOCALHOST, "pvc-a", "snap-1")
            .await
            .unwrap();
        assert_eq!(target.await.unwrap().as_deref(), Some("SNAPCREATE pvc-a@snap-1"));

        let (port, target) = cstor_target(Some("200 OK")).await;
        client(port, 0)
            .destroy_snapshot(Engine::Cstor, LOCALHOST, "pvc-a", "snap-1")
            .await
            .unwrap();
        assert_eq!(target.await.unwrap().as_deref(), Some("SNAPDESTROY pvc-a@snap-1"));
    }

    #[tokio::test]
    async fn test_cstor_rejection_carries_the_reply() {
        let (port, _target) = cstor_target(Some("500 snapshot exists")).await;
        let err = client(port, 0)
            .create_snapshot(Engine::Cstor, LOCALHOST, "pvc-a", "snap-1")
            .await
            .unwrap_err();
        match err {
            Error::Rejected { command, reply, .. } => {
                assert_eq!(command, "SNAPCREATE pvc-a@snap-1");
                assert_eq!(reply, "500 snapshot exists");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_silent_cstor_target_times_out() {
        let (port, target) = cstor_target(None).await;
        let err = client(port, 0)
            .create_snapshot(Engine::Cstor, LOCALHOST, "pvc-a", "snap-1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }), "{err}");
        target.abort();
    }

    #[tokio::test]
    async fn test_unreachable_cstor_target_fails_to_connect() {
        let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = client(port, 0)
            .create_snapshot(Engine::Cstor, LOCALHOST, "pvc-a", "snap-1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connect { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_jiva_snapshot_actions() {
        let (port, calls) = jiva_controller(StatusCode::OK).await;
        let client = client(0, port);
        client
            .create_snapshot(Engine::Jiva, LOCALHOST, "pvc-b", "snap-1")
            .await
            .unwrap();
        client
            .destroy_snapshot(Engine::Jiva, LOCALHOST, "pvc-b", "snap-1")
            .await
            .unwrap();

        let calls = calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            [
                ("pvc-b".to_owned(), "snapshot".to_owned(), "snap-1".to_owned()),
                ("pvc-b".to_owned(), "deleteSnapshot".to_owned(), "snap-1".to_owned()),
            ]
        );
    }

    #[tokio::test]
    async fn test_jiva_error_status_is_reported() {
        let (port, _calls) = jiva_controller(StatusCode::SERVICE_UNAVAILABLE).await;
        let err = client(0, port)
            .create_snapshot(Engine::Jiva, LOCALHOST, "pvc-b", "snap-1")
            .await
            .unwrap_err();
        match err {
            Error::Status { status, body, .. } => {
                assert_eq!(status, 503);
                assert_eq!(body, "replica rebuilding");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_snapshot_id_splits_on_first_at() {
        let id = snapshot_id("pvc-a", "snap1");
        assert_eq!(id, "pvc-a@snap1");
        assert_eq!(parse_snapshot_id(&id).unwrap(), ("pvc-a", "snap1"));

        assert_eq!(parse_snapshot_id("pvc-a@s@x").unwrap(), ("pvc-a", "s@x"));
    }

    #[test]
    fn test_parse_snapshot_id_rejects_malformed() {
        for id in ["pvc-a", "@snap", "pvc-a@", ""] {
            assert!(matches!(
                parse_snapshot_id(id),
                Err(TypesError::InvalidSnapshotId { .. })
            ));
        }
    }

    #[test]
    fn test_engine_from_cas_type() {
        assert_eq!(Engine::from(CasType::Cstor), Engine::Cstor);
        assert_eq!(Engine::from(CasType::Jiva), Engine::Jiva);
    }
}
