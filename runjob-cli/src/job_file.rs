//! Declarative job files
//!
//! A YAML document with the same fields as the command-line flags:
//!
//! ```yaml
//! name: cows
//! namespace: batch
//! image: example/cows:latest
//! serviceAccount: builder
//! command: ["node", "index.js"]
//! args: ["3"]
//! ```
//!
//! Flags given on the command line override the file.

use anyhow::{Context, Result};
use runjob_core::domain::workload::WorkloadRequest;
use serde::Deserialize;
use std::path::Path;

/// Name used when neither a flag nor the file sets one
pub const DEFAULT_NAME: &str = "job1";

/// Contents of a job file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JobFile {
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub image: Option<String>,
    #[serde(alias = "sa")]
    pub service_account: Option<String>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Job fields given as flags
#[derive(Debug, Clone, Default)]
pub struct JobFlags {
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub image: Option<String>,
    pub service_account: Option<String>,
    pub command: Vec<String>,
    pub args: Vec<String>,
}

impl JobFile {
    /// Reads and parses a job file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read job file {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("Invalid job file {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Combines the file with flags, flags taking precedence
    pub fn merge(self, flags: JobFlags) -> WorkloadRequest {
        let command = if flags.command.is_empty() { self.command } else { flags.command };
        let args = if flags.args.is_empty() { self.args } else { flags.args };

        WorkloadRequest {
            name: flags
                .name
                .or(self.name)
                .unwrap_or_else(|| DEFAULT_NAME.to_string()),
            image: flags.image.or(self.image).unwrap_or_default(),
            namespace: flags.namespace.or(self.namespace).unwrap_or_default(),
            service_account: flags.service_account.or(self.service_account),
            command,
            args,
        }
    }
}
