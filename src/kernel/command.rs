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

use crate::kernel::{CommandFailedSnafu, Error, SpawnSnafu};
use snafu::ResultExt;
use tokio::process::Command;
use tracing::debug;

/// Output of a finished command.
#[derive(Debug, Default)]
pub struct Finished {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Finished {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs `program` to completion and returns its output whatever the exit code.
pub async fn capture(program: &str, args: &[&str]) -> Result<Finished, Error> {
    let command = render(program, args);
    debug!(%command, "running");

    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .context(SpawnSnafu {
            command: command.clone(),
        })?;

    Ok(Finished {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Runs `program` and fails unless it exits with 0 or one of `ok_codes`.
pub async fn run(program: &str, args: &[&str], ok_codes: &[i32]) -> Result<Finished, Error> {
    let finished = capture(program, args).await?;
    let accepted = finished.success() || finished.code.is_some_and(|c| ok_codes.contains(&c));
    if !accepted {
        return CommandFailedSnafu {
            command: render(program, args),
            code: finished.code,
            stderr: finished.stderr,
        }
        .fail();
    }
    Ok(finished)
}

fn render(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}
