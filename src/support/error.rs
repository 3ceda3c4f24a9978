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

use std::error::Error as StdError;
use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed address: {0:?}")]
    MalformedAddress(String),
    /// No header/body separator was found in the data buffer.
    ///
    /// This is not fatal; it only means that no derived header values could
    /// be extracted.
    #[error("Header block absent or incomplete")]
    HeaderParseIncomplete,
    #[error("No dialer registered for backend {0:?}")]
    NotRegistered(String),
    #[error("Dial failed: {0}")]
    DialFailed(#[source] Box<dyn StdError + Send + Sync>),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    BadConfig(#[from] toml::de::Error),
    #[error("Bad logging configuration: {0}")]
    BadLogConfig(String),
}

impl Error {
    /// Wrap an error produced by a backend's connection attempt.
    pub fn dial_failed(e: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Error::DialFailed(e.into())
    }

    /// Whether this error only indicates that header parsing ran out of data.
    pub fn is_incomplete(&self) -> bool {
        matches!(*self, Error::HeaderParseIncomplete)
    }
}
