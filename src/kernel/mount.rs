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

use crate::kernel::command;
use crate::kernel::{
    Error, FilesystemMismatchSnafu, FsStats, IoSnafu, JoinSnafu, MountSnafu, Mounter, StatSnafu,
    UnmountSnafu, UnsupportedFilesystemSnafu,
};
use async_trait::async_trait;
use nix::errno::Errno;
use nix::mount::MsFlags;
use snafu::ResultExt;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::{debug, info, instrument};

const MOUNTS: &str = "/proc/self/mounts";

/// One line of the kernel mount table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountEntry {
    pub device: String,
    pub path: String,
    pub fs_type: String,
    pub options: Vec<String>,
}

impl MountEntry {
    pub fn is_read_only(&self) -> bool {
        self.options.iter().any(|o| o == "ro")
    }
}

/// Snapshot of the kernel mount table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MountTable {
    entries: Vec<MountEntry>,
}

impl MountTable {
    pub fn new(entries: Vec<MountEntry>) -> Self {
        Self { entries }
    }

    /// Parses the `/proc/mounts` format:
    /// `<device> <mountpoint> <fstype> <options> <dump> <pass>`.
    pub fn parse(contents: &str) -> Self {
        let entries = contents
            .lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let device = fields.next()?;
                let path = fields.next()?;
                let fs_type = fields.next()?;
                let options = fields.next().unwrap_or_default();
                Some(MountEntry {
                    device: unescape(device),
                    path: unescape(path),
                    fs_type: fs_type.to_owned(),
                    options: options.split(',').map(str::to_owned).collect(),
                })
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[MountEntry] {
        &self.entries
    }

    /// The mount currently visible at `path`; later entries shadow earlier ones.
    pub fn find(&self, path: &str) -> Option<&MountEntry> {
        let path = path.trim_end_matches('/');
        self.entries
            .iter()
            .rev()
            .find(|e| e.path.trim_end_matches('/') == path)
    }

    pub fn is_mounted(&self, path: &str) -> bool {
        self.find(path).is_some()
    }
}

/// Undo the octal escapes the kernel applies to whitespace and backslashes.
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 3 < bytes.len()
            && bytes[i + 1..i + 4].iter().all(|b| (b'0'..=b'7').contains(b))
        {
            let value = (bytes[i + 1] - b'0') as u32 * 64
                + (bytes[i + 2] - b'0') as u32 * 8
                + (bytes[i + 3] - b'0') as u32;
            if let Ok(byte) = u8::try_from(value) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Splits mount options into kernel flags and filesystem-specific data.
pub fn split_options(options: &[String]) -> (MsFlags, Option<String>) {
    let mut flags = MsFlags::empty();
    let mut data = Vec::new();
    for option in options {
        match option.as_str() {
            "ro" => flags |= MsFlags::MS_RDONLY,
            "rw" | "defaults" => flags &= !MsFlags::MS_RDONLY,
            "noatime" => flags |= MsFlags::MS_NOATIME,
            "nodiratime" => flags |= MsFlags::MS_NODIRATIME,
            "relatime" => flags |= MsFlags::MS_RELATIME,
            "nosuid" => flags |= MsFlags::MS_NOSUID,
            "nodev" => flags |= MsFlags::MS_NODEV,
            "noexec" => flags |= MsFlags::MS_NOEXEC,
            "sync" => flags |= MsFlags::MS_SYNCHRONOUS,
            "" => {}
            other => data.push(other.to_owned()),
        }
    }
    let data = (!data.is_empty()).then(|| data.join(","));
    (flags, data)
}

/// Real mounter: syscalls through `nix`, filesystem tools through the shell.
#[derive(Clone, Debug, Default)]
pub struct HostMounter;

impl HostMounter {
    /// Filesystem currently on `device`, if any.
    async fn probe_fs(&self, device: &str) -> Result<Option<String>, Error> {
        // blkid exits 2 when it finds no signature
        let finished = command::run("blkid", &["-p", "-s", "TYPE", "-o", "value", device], &[2]).await?;
        let fs = finished.stdout.trim();
        Ok((finished.success() && !fs.is_empty()).then(|| fs.to_owned()))
    }

    async fn make_fs(&self, device: &str, fs_type: &str) -> Result<(), Error> {
        let program = format!("mkfs.{fs_type}");
        let args: &[&str] = match fs_type {
            "ext4" | "ext3" | "ext2" => &["-F", "-m0", device],
            "xfs" => &["-f", device],
            _ => return UnsupportedFilesystemSnafu { fs_type }.fail(),
        };
        info!(device, fs_type, "creating filesystem");
        command::run(&program, args, &[]).await?;
        Ok(())
    }
}

async fn blocking<T, F>(f: F) -> Result<T, Error>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, Error> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.context(JoinSnafu)?
}

#[async_trait]
impl Mounter for HostMounter {
    async fn mount_table(&self) -> Result<MountTable, Error> {
        let contents = tokio::fs::read_to_string(MOUNTS)
            .await
            .context(IoSnafu { path: MOUNTS })?;
        Ok(MountTable::parse(&contents))
    }

    #[instrument(skip(self, options))]
    async fn format_and_mount(
        &self,
        device: &str,
        target: &str,
        fs_type: &str,
        options: &[String],
    ) -> Result<(), Error> {
        match self.probe_fs(device).await? {
            None => self.make_fs(device, fs_type).await?,
            Some(existing) if existing != fs_type => {
                return FilesystemMismatchSnafu {
                    device,
                    existing,
                    requested: fs_type,
                }
                .fail();
            }
            Some(_) => debug!(device, "filesystem already present"),
        }

        let (flags, data) = split_options(options);
        let (device, target, fs_type) = (device.to_owned(), target.to_owned(), fs_type.to_owned());
        blocking(move || {
            nix::mount::mount(
                Some(device.as_str()),
                target.as_str(),
                Some(fs_type.as_str()),
                flags,
                data.as_deref(),
            )
            .context(MountSnafu {
                device: device.clone(),
                target: target.clone(),
            })
        })
        .await
    }

    #[instrument(skip(self))]
    async fn bind_mount(&self, source: &str, target: &str, read_only: bool) -> Result<(), Error> {
        let (source, target) = (source.to_owned(), target.to_owned());
        blocking(move || {
            nix::mount::mount(
                Some(source.as_str()),
                target.as_str(),
                None::<&str>,
                MsFlags::MS_BIND,
                None::<&str>,
            )
            .context(MountSnafu {
                device: source.clone(),
                target: target.clone(),
            })?;

            // MS_RDONLY is ignored on the initial bind; it needs a remount.
            if read_only {
                nix::mount::mount(
                    None::<&str>,
                    target.as_str(),
                    None::<&str>,
                    MsFlags::MS_BIND | MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY,
                    None::<&str>,
                )
                .context(MountSnafu {
                    device: source.clone(),
                    target: target.clone(),
                })?;
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn unmount(&self, target: &str) -> Result<(), Error> {
        let target = target.to_owned();
        blocking(move || match nix::mount::umount(target.as_str()) {
            Ok(()) | Err(Errno::EINVAL) | Err(Errno::ENOENT) => Ok(()),
            Err(source) => Err(Error::Unmount { target, source }),
        })
        .await
    }

    async fn ensure_dir(&self, path: &str, mode: u32) -> Result<(), Error> {
        tokio::fs::create_dir_all(path)
            .await
            .context(IoSnafu { path })?;
        self.set_permissions(path, mode).await
    }

    async fn ensure_file(&self, path: &str) -> Result<(), Error> {
        if let Some(parent) = Path::new(path).parent() {
            let parent = parent.to_string_lossy();
            if !parent.is_empty() {
                self.ensure_dir(&parent, 0o750).await?;
            }
        }
        tokio::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .await
            .context(IoSnafu { path })?;
        Ok(())
    }

    async fn set_permissions(&self, path: &str, mode: u32) -> Result<(), Error> {
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .await
            .context(IoSnafu { path })
    }

    async fn remove_path(&self, path: &str) -> Result<(), Error> {
        let result = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir(path).await,
            Ok(_) => tokio::fs::remove_file(path).await,
            Err(e) => Err(e),
        };
        match result {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                Err(Error::Io {
                    path: path.to_owned(),
                    source: e,
                })
            }
            _ => Ok(()),
        }
    }

    #[instrument(skip(self))]
    async fn resize_fs(&self, fs_type: &str, device: &str, mount_path: &str) -> Result<(), Error> {
        match fs_type {
            "ext4" | "ext3" | "ext2" => command::run("resize2fs", &[device], &[]).await?,
            "xfs" => command::run("xfs_growfs", &[mount_path], &[]).await?,
            _ => return UnsupportedFilesystemSnafu { fs_type }.fail(),
        };
        info!(device, mount_path, fs_type, "filesystem resized");
        Ok(())
    }

    async fn fs_stats(&self, path: &str) -> Result<FsStats, Error> {
        let owned = path.to_owned();
        let stat = blocking(move || {
            nix::sys::statvfs::statvfs(owned.as_str()).context(StatSnafu { path: owned.clone() })
        })
        .await?;

        let fragment = stat.fragment_size() as u64;
        let total_bytes = stat.blocks() as u64 * fragment;
        let free_bytes = stat.blocks_free() as u64 * fragment;
        let total_inodes = stat.files() as u64;
        let free_inodes = stat.files_free() as u64;
        Ok(FsStats {
            total_bytes,
            available_bytes: stat.blocks_available() as u64 * fragment,
            used_bytes: total_bytes.saturating_sub(free_bytes),
            total_inodes,
            free_inodes,
            used_inodes: total_inodes.saturating_sub(free_inodes),
        })
    }

    async fn path_exists(&self, path: &str) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }
}
