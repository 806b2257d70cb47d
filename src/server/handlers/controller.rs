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
    ControllerExpandVolumeRequest, ControllerExpandVolumeResponse,
    ControllerGetCapabilitiesResponse, ControllerGetVolumeRequest, ControllerGetVolumeResponse,
    ControllerPublishVolumeRequest, ControllerPublishVolumeResponse,
    ControllerUnpublishVolumeRequest, CreateSnapshotRequest, CreateSnapshotResponse,
    CreateVolumeRequest, CreateVolumeResponse, DeleteSnapshotRequest, DeleteVolumeRequest, Empty,
    ValidateVolumeCapabilitiesRequest, ValidateVolumeCapabilitiesResponse,
};
use crate::error::{Error, Result};
use crate::server::state::AppState;
use axum::{Json, extract::State};

pub async fn create_volume(
    State(state): State<AppState>,
    Json(req): Json<CreateVolumeRequest>,
) -> Result<Json<CreateVolumeResponse>> {
    let controller = state.controller("CreateVolume")?;
    Ok(Json(controller.create_volume(req).await?))
}

pub async fn delete_volume(
    State(state): State<AppState>,
    Json(req): Json<DeleteVolumeRequest>,
) -> Result<Json<Empty>> {
    let controller = state.controller("DeleteVolume")?;
    Ok(Json(controller.delete_volume(req).await?))
}

pub async fn publish_volume(
    State(state): State<AppState>,
    Json(req): Json<ControllerPublishVolumeRequest>,
) -> Result<Json<ControllerPublishVolumeResponse>> {
    let controller = state.controller("ControllerPublishVolume")?;
    Ok(Json(controller.publish_volume(req).await?))
}

pub async fn unpublish_volume(
    State(state): State<AppState>,
    Json(req): Json<ControllerUnpublishVolumeRequest>,
) -> Result<Json<Empty>> {
    let controller = state.controller("ControllerUnpublishVolume")?;
    Ok(Json(controller.unpublish_volume(req).await?))
}

pub async fn expand_volume(
    State(state): State<AppState>,
    Json(req): Json<ControllerExpandVolumeRequest>,
) -> Result<Json<ControllerExpandVolumeResponse>> {
    let controller = state.controller("ControllerExpandVolume")?;
    Ok(Json(controller.expand_volume(req).await?))
}

pub async fn create_snapshot(
    State(state): State<AppState>,
    Json(req): Json<CreateSnapshotRequest>,
) -> Result<Json<CreateSnapshotResponse>> {
    let controller = state.controller("CreateSnapshot")?;
    Ok(Json(controller.create_snapshot(req).await?))
}

pub async fn delete_snapshot(
    State(state): State<AppState>,
    Json(req): Json<DeleteSnapshotRequest>,
) -> Result<Json<Empty>> {
    let controller = state.controller("DeleteSnapshot")?;
    Ok(Json(controller.delete_snapshot(req).await?))
}

pub async fn get_capabilities(
    State(state): State<AppState>,
) -> Result<Json<ControllerGetCapabilitiesResponse>> {
    let controller = state.controller("ControllerGetCapabilities")?;
    Ok(Json(controller.get_capabilities().await?))
}

pub async fn validate_volume_capabilities(
    State(state): State<AppState>,
    Json(req): Json<ValidateVolumeCapabilitiesRequest>,
) -> Result<Json<ValidateVolumeCapabilitiesResponse>> {
    let controller = state.controller("ValidateVolumeCapabilities")?;
    Ok(Json(controller.validate_volume_capabilities(req).await?))
}

pub async fn get_volume(
    State(state): State<AppState>,
    Json(req): Json<ControllerGetVolumeRequest>,
) -> Result<Json<ControllerGetVolumeResponse>> {
    let controller = state.controller("ControllerGetVolume")?;
    Ok(Json(controller.get_volume(req).await?))
}

pub async fn list_volumes() -> Result<Json<Empty>> {
    Err(unimplemented("ListVolumes"))
}

pub async fn list_snapshots() -> Result<Json<Empty>> {
    Err(unimplemented("ListSnapshots"))
}

pub async fn get_capacity() -> Result<Json<Empty>> {
    Err(unimplemented("GetCapacity"))
}

fn unimplemented(method: &str) -> Error {
    Error::Unimplemented {
        method: method.to_owned(),
    }
}
