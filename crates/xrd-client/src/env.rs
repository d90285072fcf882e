//! Runtime configuration: separate int and string namespaces with
//! shell-import precedence.
//!
//! A value imported from the process environment (`XRD_<UPPERNAME>`) is
//! pinned: in-process writes cannot override it. In-process values may be
//! overwritten freely.

use std::collections::HashMap;
use std::sync::RwLock;

/// Configuration defaults.
pub mod defaults {
    /// Seconds a single connection attempt may take.
    pub const CONNECTION_WINDOW: i64 = 120;
    /// Connection attempts before giving up.
    pub const CONNECTION_RETRY: i64 = 5;
    /// Seconds before an in-flight request expires.
    pub const REQUEST_TIMEOUT: i64 = 300;
    /// Seconds after a fatal stream error during which reconnects fail
    /// fast.
    pub const STREAM_ERROR_WINDOW: i64 = 1800;
    /// Streams kept per channel.
    pub const STREAMS_PER_CHANNEL: i64 = 1;
    /// Seconds between expiration sweeps.
    pub const TIMEOUT_RESOLUTION: i64 = 15;
    /// Idle seconds before a data-server sub-stream is closed.
    pub const DATA_SERVER_TTL: i64 = 300;
    /// Idle seconds before a manager sub-stream is closed.
    pub const MANAGER_TTL: i64 = 1200;
    /// Initial working directory of the shell.
    pub const CWD: &str = "/";
}

/// The key→value store behind all tunables.
#[derive(Debug, Default)]
pub struct Env {
    ints: RwLock<HashMap<String, (i64, bool)>>,
    strings: RwLock<HashMap<String, (String, bool)>>,
}

impl Env {
    /// An empty environment.
    pub fn new() -> Self {
        Env::default()
    }

    /// An environment preloaded with the defaults and refined from the
    /// process environment.
    pub fn with_defaults() -> Self {
        let env = Env::new();
        env.put_int("ConnectionWindow", defaults::CONNECTION_WINDOW);
        env.put_int("ConnectionRetry", defaults::CONNECTION_RETRY);
        env.put_int("RequestTimeout", defaults::REQUEST_TIMEOUT);
        env.put_int("StreamErrorWindow", defaults::STREAM_ERROR_WINDOW);
        env.put_int("StreamsPerChannel", defaults::STREAMS_PER_CHANNEL);
        env.put_int("TimeoutResolution", defaults::TIMEOUT_RESOLUTION);
        env.put_int("DataServerTTL", defaults::DATA_SERVER_TTL);
        env.put_int("ManagerTTL", defaults::MANAGER_TTL);
        env.put_string("CWD", defaults::CWD);

        for key in [
            "ConnectionWindow",
            "ConnectionRetry",
            "RequestTimeout",
            "StreamErrorWindow",
            "StreamsPerChannel",
            "TimeoutResolution",
            "DataServerTTL",
            "ManagerTTL",
        ] {
            env.import_int(key, &format!("XRD_{}", key.to_uppercase()));
        }
        env.import_string("CWD", "XRD_CWD");
        env
    }

    /// Read an integer entry.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.ints.read().unwrap().get(key).map(|(v, _)| *v)
    }

    /// Read an integer entry, falling back to `default`.
    pub fn get_int_or(&self, key: &str, default: i64) -> i64 {
        self.get_int(key).unwrap_or(default)
    }

    /// Write an integer entry. Fails when the entry was imported from the
    /// shell.
    pub fn put_int(&self, key: &str, value: i64) -> bool {
        let mut map = self.ints.write().unwrap();
        if let Some((_, from_shell)) = map.get(key) {
            if *from_shell {
                tracing::debug!(target: "xrd::util", key, "refusing to override shell-imported entry");
                return false;
            }
        }
        map.insert(key.to_string(), (value, false));
        true
    }

    /// Read a string entry.
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.strings.read().unwrap().get(key).map(|(v, _)| v.clone())
    }

    /// Write a string entry. Fails when the entry was imported from the
    /// shell.
    pub fn put_string(&self, key: &str, value: impl Into<String>) -> bool {
        let mut map = self.strings.write().unwrap();
        if let Some((_, from_shell)) = map.get(key) {
            if *from_shell {
                tracing::debug!(target: "xrd::util", key, "refusing to override shell-imported entry");
                return false;
            }
        }
        map.insert(key.to_string(), (value.into(), false));
        true
    }

    /// Import an integer entry from the process environment; a present,
    /// well-formed value becomes immutable to in-process writers.
    pub fn import_int(&self, key: &str, shell_key: &str) -> bool {
        let Ok(text) = std::env::var(shell_key) else {
            return false;
        };
        let Ok(value) = text.trim().parse::<i64>() else {
            tracing::error!(target: "xrd::util", shell_key, value = %text,
                "not a proper integer, ignoring import");
            return false;
        };
        tracing::info!(target: "xrd::util", shell_key, value, key, "imported from shell");
        self.ints
            .write()
            .unwrap()
            .insert(key.to_string(), (value, true));
        true
    }

    /// Import a string entry from the process environment; a present value
    /// becomes immutable to in-process writers.
    pub fn import_string(&self, key: &str, shell_key: &str) -> bool {
        let Ok(value) = std::env::var(shell_key) else {
            return false;
        };
        tracing::info!(target: "xrd::util", shell_key, value = %value, key, "imported from shell");
        self.strings
            .write()
            .unwrap()
            .insert(key.to_string(), (value, true));
        true
    }
}
