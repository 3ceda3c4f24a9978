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

//! The boundary between the envelope core and storage backends.
//!
//! The core never links against a concrete client library. Instead, each
//! backend plugin supplies a [`Dialer`] which produces boxed [`Connection`]s,
//! and the composing application registers every dialer it wants into a
//! [`Registry`] during startup. The registry is then shared (typically in an
//! `Arc`) with whatever pipeline processes envelopes.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::{error, info, warn};

use crate::support::error::Error;
use crate::support::system_config::BackendConfig;

/// The well-known kind identifier for key-value stores speaking the Redis
/// protocol.
pub const REDIS: &str = "redis";

/// A value returned by a backend in response to a command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Nil,
    Status(String),
    Integer(i64),
    Bulk(Vec<u8>),
    Array(Vec<Reply>),
    /// The backend executed the command and reported failure.
    Error(String),
}

/// The minimal set of operations a generic backend client needs.
///
/// `send` queues a command, `flush` pushes queued commands to the backend,
/// and `receive` reads one reply. Commands and replies are matched strictly
/// in order.
pub trait Connection: Send {
    fn send(&mut self, command: &str, args: &[&[u8]]) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
    fn receive(&mut self) -> io::Result<Reply>;
    fn close(&mut self) -> io::Result<()>;

    /// Send one command and wait for its reply.
    fn execute(&mut self, command: &str, args: &[&[u8]]) -> io::Result<Reply> {
        self.send(command, args)?;
        self.flush()?;
        self.receive()
    }
}

/// Optional configuration passed to a dialer.
///
/// Dialers ignore options which make no sense for their backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DialOption {
    ConnectTimeout(Duration),
    ReadTimeout(Duration),
    WriteTimeout(Duration),
    KeepAlive(Duration),
    Database(u32),
    Password(String),
    /// Anything backend-specific, as a key/value pair.
    Other(String, String),
}

/// A function which opens a connection to a backend given a network type
/// (e.g. `tcp`), an address, and options.
///
/// Failures should be reported as `Error::DialFailed`. The registry applies
/// no retry or pooling policy of its own.
pub type Dialer = Arc<
    dyn Fn(&str, &str, &[DialOption]) -> Result<Box<dyn Connection>, Error>
        + Send
        + Sync,
>;

/// Process-wide map from backend kind to dialer.
///
/// Dialers are registered during startup, before any envelope is processed,
/// and only looked up afterwards. Registering a kind a second time replaces
/// the earlier dialer.
#[derive(Default)]
pub struct Registry {
    dialers: RwLock<HashMap<String, Dialer>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `dialer` as the way to connect to backends of `kind`.
    pub fn register<F>(&self, kind: &str, dialer: F)
    where
        F: Fn(&str, &str, &[DialOption]) -> Result<Box<dyn Connection>, Error>
            + Send
            + Sync
            + 'static,
    {
        let replaced = self
            .write_dialers()
            .insert(kind.to_owned(), Arc::new(dialer))
            .is_some();
        if replaced {
            warn!("Dialer for backend {:?} replaced", kind);
        } else {
            info!("Registered dialer for backend {:?}", kind);
        }
    }

    /// Find the dialer for backends of `kind`.
    pub fn lookup(&self, kind: &str) -> Result<Dialer, Error> {
        self.read_dialers()
            .get(kind)
            .map(Arc::clone)
            .ok_or_else(|| Error::NotRegistered(kind.to_owned()))
    }

    /// Return the registered kinds, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds =
            self.read_dialers().keys().cloned().collect::<Vec<_>>();
        kinds.sort();
        kinds
    }

    /// Look up the dialer for `kind` and invoke it.
    ///
    /// The dialer runs without any lock held, so a slow connection attempt
    /// does not block other lookups.
    pub fn dial(
        &self,
        kind: &str,
        network: &str,
        address: &str,
        options: &[DialOption],
    ) -> Result<Box<dyn Connection>, Error> {
        let dialer = self.lookup(kind)?;
        dialer(network, address, options).map_err(|e| {
            error!(
                "Failed to connect to {} backend at {}!{}: {}",
                kind, network, address, e
            );
            e
        })
    }

    /// Dial `kind` using the settings from its configuration section.
    pub fn dial_configured(
        &self,
        kind: &str,
        config: &BackendConfig,
    ) -> Result<Box<dyn Connection>, Error> {
        self.dial(
            kind,
            &config.network,
            &config.address,
            &config.dial_options(),
        )
    }

    // A panic while holding the lock cannot leave the map half-updated, so
    // poisoning is ignored.
    fn read_dialers(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<String, Dialer>> {
        self.dialers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_dialers(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Dialer>> {
        self.dialers.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
