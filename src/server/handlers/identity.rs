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

use crate::csi::{GetPluginCapabilitiesResponse, GetPluginInfoResponse, ProbeResponse};
use crate::error::Result;
use crate::server::state::AppState;
use axum::{Json, extract::State};

pub async fn get_plugin_info(State(state): State<AppState>) -> Result<Json<GetPluginInfoResponse>> {
    Ok(Json(state.identity.get_plugin_info().await?))
}

pub async fn probe(State(state): State<AppState>) -> Result<Json<ProbeResponse>> {
    Ok(Json(state.identity.probe().await?))
}

pub async fn get_plugin_capabilities(
    State(state): State<AppState>,
) -> Result<Json<GetPluginCapabilitiesResponse>> {
    Ok(Json(state.identity.get_plugin_capabilities().await?))
}
