// Copyright 2026 The OpenEBS Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("object has no namespace associated"))]
    NoNamespace,

    #[snafu(display("invalid {}: {}", kind, errors.join("; ")))]
    InvalidObject { kind: String, errors: Vec<String> },

    #[snafu(display("invalid quantity '{}'", value))]
    InvalidQuantity { value: String },

    #[snafu(display("invalid snapshot id '{}', expected <volume>@<snapshot>", id))]
    InvalidSnapshotId { id: String },

    #[snafu(display("serde_json error: {}", source))]
    SerdeJson { source: serde_json::Error },
}

impl From<serde_json::Error> for Error {
    fn from(source: serde_json::Error) -> Self {
        Error::SerdeJson { source }
    }
}

/// Collects validation failures so a constructor can report all of them at once.
#[derive(Debug, Default)]
pub struct Violations {
    kind: &'static str,
    errors: Vec<String>,
}

impl Violations {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            errors: Vec::new(),
        }
    }

    pub fn require(&mut self, ok: bool, message: impl Into<String>) {
        if !ok {
            self.errors.push(message.into());
        }
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish<T>(self, value: T) -> Result<T, Error> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            InvalidObjectSnafu {
                kind: self.kind,
                errors: self.errors,
            }
            .fail()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violations_aggregate_all_messages() {
        let mut v = Violations::new("CStorVolumeConfig");
        v.require(false, "capacity is required");
        v.require(true, "never reported");
        v.push("pool cluster is required");

        let err = v.finish(()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid CStorVolumeConfig: capacity is required; pool cluster is required"
        );
    }

    #[test]
    fn test_violations_empty_passes_value_through() {
        let v = Violations::new("CStorVolumeAttachment");
        assert!(v.is_empty());
        assert_eq!(v.finish(7).unwrap(), 7);
    }
}
