//-
// Copyright (c) 2020, 2023, Jason Lingle
//
// This file is part of Letterbox.
//
// Letterbox is free software: you can  redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Letterbox is distributed  in the hope that  it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License
// for more details.
//
// You should have received a copy of the GNU General Public License along with
// Letterbox. If not, see <http://www.gnu.org/licenses/>.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::Error;
use crate::backend::DialOption;

/// The system-wide configuration consumed by the envelope core.
///
/// This is normally a section of the daemon's own TOML configuration; the
/// daemon is responsible for locating the file.
#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct SystemConfig {
    /// Options relating to how received mail is annotated and inspected.
    #[serde(default)]
    pub smtp: SmtpConfig,

    /// Connection settings for each storage backend, keyed by backend kind
    /// (e.g. `redis`).
    #[serde(default)]
    pub backends: BTreeMap<String, BackendConfig>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SmtpConfig {
    /// The host name to report as in `Received:` headers.
    pub host_name: String,

    /// The maximum number of bytes at the start of a message which are
    /// searched for the header block.
    ///
    /// Messages whose header block is longer than this are treated as having
    /// an incomplete header block.
    pub max_header_bytes: usize,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        SmtpConfig {
            host_name: "localhost".to_owned(),
            max_header_bytes: crate::mime::header::MAX_HEADER_BYTES,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BackendConfig {
    /// The network type passed to the dialer, usually `tcp` or `unix`.
    #[serde(default = "default_network")]
    pub network: String,
    /// The address passed to the dialer, e.g. `127.0.0.1:6379`.
    pub address: String,
    /// The logical database to select after connecting, if the backend has
    /// such a concept.
    #[serde(default)]
    pub database: Option<u32>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
    #[serde(default)]
    pub read_timeout_ms: Option<u64>,
    #[serde(default)]
    pub write_timeout_ms: Option<u64>,
}

fn default_network() -> String {
    "tcp".to_owned()
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            network: default_network(),
            address: String::new(),
            database: None,
            password: None,
            connect_timeout_ms: None,
            read_timeout_ms: None,
            write_timeout_ms: None,
        }
    }
}

impl SystemConfig {
    /// Read and parse the configuration at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, Error> {
        Ok(toml::from_str(text)?)
    }
}

impl BackendConfig {
    /// Translate this configuration into the options handed to a dialer.
    pub fn dial_options(&self) -> Vec<DialOption> {
        let mut options = Vec::new();
        if let Some(ms) = self.connect_timeout_ms {
            options.push(DialOption::ConnectTimeout(Duration::from_millis(ms)));
        }
        if let Some(ms) = self.read_timeout_ms {
            options.push(DialOption::ReadTimeout(Duration::from_millis(ms)));
        }
        if let Some(ms) = self.write_timeout_ms {
            options.push(DialOption::WriteTimeout(Duration::from_millis(ms)));
        }
        if let Some(db) = self.database {
            options.push(DialOption::Database(db));
        }
        if let Some(ref password) = self.password {
            options.push(DialOption::Password(password.clone()));
        }
        options
    }
}
