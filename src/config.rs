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

//! Command-line and environment configuration of the `server` subcommand.

use clap::{Args, ValueEnum};
use snafu::Snafu;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use strum::Display;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("--nodeid (OPENEBS_NODE_ID) is required for the {} plugin", role))]
    MissingNodeId { role: PluginRole },

    #[snafu(display("--namespace (OPENEBS_NAMESPACE) is required"))]
    MissingNamespace,

    #[snafu(display("invalid endpoint '{}', expected unix://<path> or tcp://<host:port>", value))]
    InvalidEndpoint { value: String },

    #[snafu(display("--monitor-interval must be at least one second"))]
    ZeroInterval,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, ValueEnum)]
#[strum(serialize_all = "lowercase")]
pub enum PluginRole {
    Controller,
    Node,
    All,
}

impl PluginRole {
    pub fn runs_controller(self) -> bool {
        matches!(self, PluginRole::Controller | PluginRole::All)
    }

    pub fn runs_node(self) -> bool {
        matches!(self, PluginRole::Node | PluginRole::All)
    }
}

/// Where the plugin listens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Unix(PathBuf),
    Tcp(String),
}

impl FromStr for Endpoint {
    type Err = Error;

    /// `unix://csi/csi.sock` and `unix:///csi/csi.sock` both name
    /// `/csi/csi.sock`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if let Some(path) = value.strip_prefix("unix://")
            && !path.trim_start_matches('/').is_empty()
        {
            return Ok(Endpoint::Unix(PathBuf::from(format!(
                "/{}",
                path.trim_start_matches('/')
            ))));
        }
        if let Some(address) = value.strip_prefix("tcp://")
            && address.contains(':')
        {
            return Ok(Endpoint::Tcp(address.to_owned()));
        }
        InvalidEndpointSnafu { value }.fail()
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
            Endpoint::Tcp(address) => write!(f, "tcp://{address}"),
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct Config {
    /// Plugin endpoint, unix://<path> or tcp://<host:port>
    #[arg(long, env = "CSI_ENDPOINT", default_value = "unix://csi/csi.sock")]
    pub endpoint: Endpoint,

    /// Identifier of the node hosting this process
    #[arg(long = "nodeid", env = "OPENEBS_NODE_ID")]
    pub node_id: Option<String>,

    /// Driver name advertised to the plugin client
    #[arg(long, env = "CSI_DRIVER_NAME", default_value = "cstor.csi.openebs.io")]
    pub name: String,

    #[arg(long, env = "CSI_PLUGIN", value_enum, default_value_t = PluginRole::All)]
    pub plugin: PluginRole,

    /// Namespace holding every object the plugin reads and writes
    #[arg(long, env = "OPENEBS_NAMESPACE")]
    pub namespace: Option<String>,

    /// Seconds between two mount monitor passes
    #[arg(long, env = "CSI_MONITOR_INTERVAL", default_value_t = 5)]
    pub monitor_interval: u64,
}

/// Configuration after validation: every field a role needs is present.
#[derive(Clone, Debug)]
pub struct Settings {
    pub endpoint: Endpoint,
    pub node_id: String,
    pub name: String,
    pub plugin: PluginRole,
    pub namespace: String,
    pub monitor_interval: Duration,
}

impl Config {
    pub fn validate(self) -> Result<Settings, Error> {
        let namespace = self
            .namespace
            .filter(|ns| !ns.is_empty())
            .ok_or(Error::MissingNamespace)?;

        let node_id = self.node_id.filter(|id| !id.is_empty());
        if self.plugin.runs_node() && node_id.is_none() {
            return MissingNodeIdSnafu { role: self.plugin }.fail();
        }
        if self.monitor_interval == 0 {
            return ZeroIntervalSnafu.fail();
        }

        Ok(Settings {
            endpoint: self.endpoint,
            node_id: node_id.unwrap_or_default(),
            name: self.name,
            plugin: self.plugin,
            namespace,
            monitor_interval: Duration::from_secs(self.monitor_interval),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        config: Config,
    }

    fn parse(args: &[&str]) -> Config {
        Cli::try_parse_from(std::iter::once("cstor-csi").chain(args.iter().copied()))
            .unwrap()
            .config
    }

    #[test]
    fn test_endpoint_parsing() {
        assert_eq!(
            "unix://csi/csi.sock".parse::<Endpoint>().unwrap(),
            Endpoint::Unix(PathBuf::from("/csi/csi.sock"))
        );
        assert_eq!(
            "unix:///var/lib/csi.sock".parse::<Endpoint>().unwrap(),
            Endpoint::Unix(PathBuf::from("/var/lib/csi.sock"))
        );
        assert_eq!(
            "tcp://0.0.0.0:10000".parse::<Endpoint>().unwrap(),
            Endpoint::Tcp("0.0.0.0:10000".to_owned())
        );
        assert!("http://x:1".parse::<Endpoint>().is_err());
        assert!("unix://".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_node_role_requires_node_id() {
        let config = parse(&["--namespace", "openebs", "--plugin", "node"]);
        assert!(matches!(config.validate(), Err(Error::MissingNodeId { .. })));

        let config = parse(&["--namespace", "openebs", "--plugin", "controller"]);
        let settings = config.validate().unwrap();
        assert!(settings.plugin.runs_controller());
        assert!(!settings.plugin.runs_node());
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--namespace", "openebs", "--nodeid", "k8s-1"]);
        let settings = config.validate().unwrap();
        assert_eq!(settings.plugin, PluginRole::All);
        assert_eq!(settings.name, "cstor.csi.openebs.io");
        assert_eq!(settings.monitor_interval, Duration::from_secs(5));
        assert_eq!(settings.endpoint.to_string(), "unix:///csi/csi.sock");
    }
}
