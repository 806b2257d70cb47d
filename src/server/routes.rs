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

use crate::server::{handlers, state::AppState};
use axum::{Router, routing::post};

pub fn identity_routes() -> Router<AppState> {
    Router::new()
        .route("/csi.v1.Identity/GetPluginInfo", post(handlers::identity::get_plugin_info))
        .route("/csi.v1.Identity/Probe", post(handlers::identity::probe))
        .route(
            "/csi.v1.Identity/GetPluginCapabilities",
            post(handlers::identity::get_plugin_capabilities),
        )
}

pub fn controller_routes() -> Router<AppState> {
    Router::new()
        .route("/csi.v1.Controller/CreateVolume", post(handlers::controller::create_volume))
        .route("/csi.v1.Controller/DeleteVolume", post(handlers::controller::delete_volume))
        .route(
            "/csi.v1.Controller/ControllerPublishVolume",
            post(handlers::controller::publish_volume),
        )
        .route(
            "/csi.v1.Controller/ControllerUnpublishVolume",
            post(handlers::controller::unpublish_volume),
        )
        .route(
            "/csi.v1.Controller/ControllerExpandVolume",
            post(handlers::controller::expand_volume),
        )
        .route("/csi.v1.Controller/CreateSnapshot", post(handlers::controller::create_snapshot))
        .route("/csi.v1.Controller/DeleteSnapshot", post(handlers::controller::delete_snapshot))
        .route(
            "/csi.v1.Controller/ControllerGetCapabilities",
            post(handlers::controller::get_capabilities),
        )
        .route(
            "/csi.v1.Controller/ValidateVolumeCapabilities",
            post(handlers::controller::validate_volume_capabilities),
        )
        .route(
            "/csi.v1.Controller/ControllerGetVolume",
            post(handlers::controller::get_volume),
        )
        .route("/csi.v1.Controller/ListVolumes", post(handlers::controller::list_volumes))
        .route("/csi.v1.Controller/ListSnapshots", post(handlers::controller::list_snapshots))
        .route("/csi.v1.Controller/GetCapacity", post(handlers::controller::get_capacity))
}

pub fn node_routes() -> Router<AppState> {
    Router::new()
        .route("/csi.v1.Node/NodeStageVolume", post(handlers::node::stage_volume))
        .route("/csi.v1.Node/NodeUnstageVolume", post(handlers::node::unstage_volume))
        .route("/csi.v1.Node/NodePublishVolume", post(handlers::node::publish_volume))
        .route("/csi.v1.Node/NodeUnpublishVolume", post(handlers::node::unpublish_volume))
        .route("/csi.v1.Node/NodeExpandVolume", post(handlers::node::expand_volume))
        .route("/csi.v1.Node/NodeGetVolumeStats", post(handlers::node::get_volume_stats))
        .route("/csi.v1.Node/NodeGetInfo", post(handlers::node::get_info))
        .route("/csi.v1.Node/NodeGetCapabilities", post(handlers::node::get_capabilities))
}
