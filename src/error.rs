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

//! Errors returned by the plugin operations and the status code each maps to.

use crate::ledger::Busy;
use crate::{context, engine, kernel, types};
use serde::{Deserialize, Serialize};
use snafu::Snafu;
use strum::Display;

/// Status codes surfaced to the plugin client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum Code {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    Unavailable,
    Internal,
    Unimplemented,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("invalid argument: {}", message))]
    InvalidArgument { message: String },

    #[snafu(display("{} '{}' not found", kind, name))]
    NotFound { kind: String, name: String },

    #[snafu(display("{}", message))]
    AlreadyExists { message: String },

    /// Transient; the caller is expected to retry.
    #[snafu(display("{}", message))]
    Unavailable { message: String },

    #[snafu(display("{} is not implemented", method))]
    Unimplemented { method: String },

    #[snafu(display("{}", message))]
    Internal { message: String },

    #[snafu(transparent)]
    Busy { source: Busy },

    #[snafu(display("cluster store: {}", source))]
    Store { source: context::Error },

    #[snafu(display("{}", source))]
    Kernel { source: kernel::Error },

    #[snafu(display("engine: {}", source))]
    Engine { source: engine::Error },

    #[snafu(transparent)]
    Types { source: types::error::Error },
}

impl From<context::Error> for Error {
    fn from(source: context::Error) -> Self {
        Error::Store { source }
    }
}

impl From<kernel::Error> for Error {
    fn from(source: kernel::Error) -> Self {
        Error::Kernel { source }
    }
}

impl From<engine::Error> for Error {
    fn from(source: engine::Error) -> Self {
        Error::Engine { source }
    }
}

impl Error {
    pub fn code(&self) -> Code {
        match self {
            Error::InvalidArgument { .. } => Code::InvalidArgument,
            Error::NotFound { .. } => Code::NotFound,
            Error::AlreadyExists { .. } => Code::AlreadyExists,
            Error::Unavailable { .. } | Error::Busy { .. } => Code::Unavailable,
            Error::Unimplemented { .. } => Code::Unimplemented,
            Error::Internal { .. } | Error::Kernel { .. } | Error::Engine { .. } => Code::Internal,
            Error::Store { source } if source.is_not_found() => Code::NotFound,
            Error::Store { source } if source.is_already_exists() => Code::AlreadyExists,
            Error::Store { .. } => Code::Internal,
            Error::Types { source } => match source {
                types::error::Error::InvalidObject { .. }
                | types::error::Error::InvalidQuantity { .. }
                | types::error::Error::InvalidSnapshotId { .. } => Code::InvalidArgument,
                _ => Code::Internal,
            },
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidArgument {
            message: message.into(),
        }
    }

    pub(crate) fn unavailable(message: impl Into<String>) -> Self {
        Error::Unavailable {
            message: message.into(),
        }
    }

    pub(crate) fn not_found(kind: &str, name: &str) -> Self {
        Error::NotFound {
            kind: kind.to_owned(),
            name: name.to_owned(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ledger::TransitionStatus;

    #[test]
    fn test_busy_is_unavailable_and_names_holder() {
        let err: Error = Busy {
            volume_id: "pvc-a".to_owned(),
            status: TransitionStatus::MountUnderProgress,
        }
        .into();
        assert_eq!(err.code(), Code::Unavailable);
        assert_eq!(err.to_string(), "volume pvc-a is busy: MountUnderProgress");
    }

    #[test]
    fn test_store_not_found_maps_to_not_found() {
        let err: Error = context::Error::NotFound {
            kind: "CStorVolumeConfig".to_owned(),
            name: "pvc-a".to_owned(),
        }
        .into();
        assert_eq!(err.code(), Code::NotFound);
    }

    #[test]
    fn test_validation_failures_are_invalid_argument() {
        let err: Error = types::error::Error::InvalidQuantity {
            value: "12Q".to_owned(),
        }
        .into();
        assert_eq!(err.code(), Code::InvalidArgument);

        let err: Error = kernel::Error::DeviceNotFound {
            path: "/dev/sdx".to_owned(),
        }
        .into();
        assert_eq!(err.code(), Code::Internal);
    }
}
