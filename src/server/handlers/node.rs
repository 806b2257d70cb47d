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

use crate::csi::{
    Empty, NodeExpandVolumeRequest, NodeExpandVolumeResponse, NodeGetCapabilitiesResponse,
    NodeGetInfoResponse, NodeGetVolumeStatsRequest, NodeGetVolumeStatsResponse,
    NodePublishVolumeRequest, NodeStageVolumeRequest, NodeUnpublishVolumeRequest,
    NodeUnstageVolumeRequest,
};
use crate::error::Result;
use crate::server::state::AppState;
use axum::{Json, extract::State};

pub async fn stage_volume(
    State(state): State<AppState>,
    Json(req): Json<NodeStageVolumeRequest>,
) -> Result<Json<Empty>> {
    let node = state.node("NodeStageVolume")?;
    Ok(Json(node.stage_volume(req).await?))
}

pub async fn unstage_volume(
    State(state): State<AppState>,
    Json(req): Json<NodeUnstageVolumeRequest>,
) -> Result<Json<Empty>> {
    let node = state.node("NodeUnstageVolume")?;
    Ok(Json(node.unstage_volume(req).await?))
}

pub async fn publish_volume(
    State(state): State<AppState>,
    Json(req): Json<NodePublishVolumeRequest>,
) -> Result<Json<Empty>> {
    let node = state.node("NodePublishVolume")?;
    Ok(Json(node.publish_volume(req).await?))
}

pub async fn unpublish_volume(
    State(state): State<AppState>,
    Json(req): Json<NodeUnpublishVolumeRequest>,
) -> Result<Json<Empty>> {
    let node = state.node("NodeUnpublishVolume")?;
    Ok(Json(node.unpublish_volume(req).await?))
}

pub async fn expand_volume(
    State(state): State<AppState>,
    Json(req): Json<NodeExpandVolumeRequest>,
) -> Result<Json<NodeExpandVolumeResponse>> {
    let node = state.node("NodeExpandVolume")?;
    Ok(Json(node.expand_volume(req).await?))
}

pub async fn get_volume_stats(
    State(state): State<AppState>,
    Json(req): Json<NodeGetVolumeStatsRequest>,
) -> Result<Json<NodeGetVolumeStatsResponse>> {
    let node = state.node("NodeGetVolumeStats")?;
    Ok(Json(node.get_volume_stats(req).await?))
}

pub async fn get_info(State(state): State<AppState>) -> Result<Json<NodeGetInfoResponse>> {
    let node = state.node("NodeGetInfo")?;
    Ok(Json(node.get_info().await?))
}

pub async fn get_capabilities(
    State(state): State<AppState>,
) -> Result<Json<NodeGetCapabilitiesResponse>> {
    let node = state.node("NodeGetCapabilities")?;
    Ok(Json(node.get_capabilities().await?))
}
