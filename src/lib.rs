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

//! Message-normalization core of an SMTP daemon.
//!
//! This crate turns what a session receives on the wire into an `Envelope`:
//! validated sender and recipient `Address`es, the raw message data, and
//! values derived from its header (such as the decoded subject). It also
//! defines the `backend::Registry` through which envelopes are handed to
//! pluggable storage backends.

#[cfg(test)]
macro_rules! assert_matches {
    ($expected:pat, $actual:expr) => {
        match $actual {
            $expected => (),
            unexpected => panic!(
                "Expected {} matches {}, got {:?}",
                stringify!($expected),
                stringify!($actual),
                unexpected
            ),
        }
    };
}

pub mod backend;
pub mod mime;
pub mod smtp;
pub mod support;

#[cfg(test)]
mod test_data;

use std::path::Path;

use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

pub use crate::backend::Registry;
pub use crate::smtp::address::Address;
pub use crate::smtp::envelope::Envelope;
pub use crate::support::error::Error;
pub use crate::support::system_config::SystemConfig;

/// Log everything at `level` or above to standard error.
pub fn init_simple_log(level: log::LevelFilter) -> Result<(), Error> {
    init_console_log(
        level,
        "{d(%Y-%m-%dT%H:%M:%S%.3f)} [{l}][{t}] {m}{n}",
    )
}

/// Configure logging from a `log4rs` TOML file.
pub fn init_file_log(path: impl AsRef<Path>) -> Result<(), Error> {
    log4rs::init_file(path, log4rs::file::Deserializers::new())
        .map_err(|e| Error::BadLogConfig(e.to_string()))
}

fn init_console_log(
    level: log::LevelFilter,
    pattern: &str,
) -> Result<(), Error> {
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(pattern)))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level))
        .map_err(|e| Error::BadLogConfig(e.to_string()))?;
    log4rs::init_config(config)
        .map_err(|e| Error::BadLogConfig(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
static INIT_TEST_LOG: std::sync::Once = std::sync::Once::new();

#[cfg(test)]
fn init_test_log() {
    INIT_TEST_LOG.call_once(|| {
        init_console_log(
            log::LevelFilter::Debug,
            "{d(%H:%M:%S%.3f)} [{l}][{t}] {m}{n}",
        )
        .unwrap();
    })
}
