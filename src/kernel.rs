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

//! Host-side collaborators: the kernel mount table, filesystem tools, the
//! iSCSI initiator and portal reachability.
//!
//! The node plugin only talks to the host through these traits so that the
//! attachment state machine can run against in-memory fakes.

pub mod command;
pub mod iscsi;
pub mod mount;
pub mod probe;

pub use iscsi::IscsiAdm;
pub use mount::{HostMounter, MountEntry, MountTable};
pub use probe::TcpProber;

use async_trait::async_trait;
use snafu::Snafu;
use std::sync::Arc;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("failed to run {}: {}", command, source))]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[snafu(display("{} exited with code {:?}: {}", command, code, stderr.trim()))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[snafu(display("mount {} on {} failed: {}", device, target, source))]
    Mount {
        device: String,
        target: String,
        source: nix::errno::Errno,
    },

    #[snafu(display("unmount {} failed: {}", target, source))]
    Unmount {
        target: String,
        source: nix::errno::Errno,
    },

    #[snafu(display("statfs {} failed: {}", path, source))]
    Stat {
        path: String,
        source: nix::errno::Errno,
    },

    #[snafu(display("{}: {}", path, source))]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("device {} did not appear after login", path))]
    DeviceNotFound { path: String },

    #[snafu(display("unsupported filesystem type '{}'", fs_type))]
    UnsupportedFilesystem { fs_type: String },

    #[snafu(display("device {} holds {} but {} was requested", device, existing, requested))]
    FilesystemMismatch {
        device: String,
        existing: String,
        requested: String,
    },

    #[snafu(display("blocking task failed: {}", source))]
    Join { source: tokio::task::JoinError },
}

/// Usage figures of a mounted filesystem.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FsStats {
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub used_bytes: u64,
    pub total_inodes: u64,
    pub free_inodes: u64,
    pub used_inodes: u64,
}

/// Coordinates of one iSCSI LUN.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IscsiTarget {
    pub iqn: String,
    pub portal: String,
    pub iface: String,
    pub lun: i32,
}

impl IscsiTarget {
    /// udev by-path link of the LUN once the session is logged in.
    pub fn device_path(&self) -> String {
        format!(
            "/dev/disk/by-path/ip-{}-iscsi-{}-lun-{}",
            self.portal, self.iqn, self.lun
        )
    }
}

#[async_trait]
pub trait Mounter: Send + Sync {
    async fn mount_table(&self) -> Result<MountTable, Error>;

    /// Mounts `device` at `target`, creating a filesystem first if the device
    /// holds none.
    async fn format_and_mount(
        &self,
        device: &str,
        target: &str,
        fs_type: &str,
        options: &[String],
    ) -> Result<(), Error>;

    async fn bind_mount(&self, source: &str, target: &str, read_only: bool) -> Result<(), Error>;

    /// Unmounts `target`; a path that is not mounted is not an error.
    async fn unmount(&self, target: &str) -> Result<(), Error>;

    async fn ensure_dir(&self, path: &str, mode: u32) -> Result<(), Error>;

    /// Creates an empty regular file (and its parent directory) at `path`.
    async fn ensure_file(&self, path: &str) -> Result<(), Error>;

    async fn set_permissions(&self, path: &str, mode: u32) -> Result<(), Error>;

    async fn remove_path(&self, path: &str) -> Result<(), Error>;

    async fn resize_fs(&self, fs_type: &str, device: &str, mount_path: &str) -> Result<(), Error>;

    async fn fs_stats(&self, path: &str) -> Result<FsStats, Error>;

    async fn path_exists(&self, path: &str) -> bool;
}

#[async_trait]
pub trait Initiator: Send + Sync {
    /// Discovery, login and device resolution. Returns the device path.
    async fn connect(&self, target: &IscsiTarget) -> Result<String, Error>;

    async fn logout(&self, target: &IscsiTarget) -> Result<(), Error>;

    async fn rescan(&self, target: &IscsiTarget) -> Result<(), Error>;
}

#[async_trait]
pub trait Prober: Send + Sync {
    async fn reachable(&self, portal: &str) -> bool;
}

/// The host collaborators a node plugin works through.
#[derive(Clone)]
pub struct Host {
    pub mounter: Arc<dyn Mounter>,
    pub initiator: Arc<dyn Initiator>,
    pub prober: Arc<dyn Prober>,
}

impl Host {
    /// Collaborators backed by the real kernel and tools.
    pub fn system() -> Self {
        Self {
            mounter: Arc::new(HostMounter::default()),
            initiator: Arc::new(IscsiAdm::default()),
            prober: Arc::new(TcpProber::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_path_uses_by_path_link() {
        let target = IscsiTarget {
            iqn: "iqn.2016-09.com.openebs.cstor:pvc-a".to_owned(),
            portal: "10.0.0.7:3260".to_owned(),
            iface: "default".to_owned(),
            lun: 0,
        };
        assert_eq!(
            target.device_path(),
            "/dev/disk/by-path/ip-10.0.0.7:3260-iscsi-iqn.2016-09.com.openebs.cstor:pvc-a-lun-0"
        );
    }
}
