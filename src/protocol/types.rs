//! Requests and replies of the memcached text protocol.

use bytes::Bytes;

/// Storage command variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Store unconditionally
    Set,
    /// Store only if the key is absent
    Add,
    /// Store only if the key is present
    Replace,
}

impl StoreMode {
    pub fn verb(&self) -> &'static str {
        match self {
            StoreMode::Set => "set",
            StoreMode::Add => "add",
            StoreMode::Replace => "replace",
        }
    }
}

/// One request sent to a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Store {
        mode: StoreMode,
        key: String,
        flags: u32,
        exptime: u32,
        data: Bytes,
    },
    Get {
        keys: Vec<String>,
    },
    Delete {
        key: String,
    },
    Touch {
        key: String,
        exptime: u32,
    },
    Incr {
        key: String,
        delta: u64,
    },
    Decr {
        key: String,
        delta: u64,
    },
    Version,
    FlushAll,
}

impl Command {
    /// Protocol verb, used for logging and timeout messages
    pub fn name(&self) -> &'static str {
        match self {
            Command::Store { mode, .. } => mode.verb(),
            Command::Get { .. } => "get",
            Command::Delete { .. } => "delete",
            Command::Touch { .. } => "touch",
            Command::Incr { .. } => "incr",
            Command::Decr { .. } => "decr",
            Command::Version => "version",
            Command::FlushAll => "flush_all",
        }
    }
}

/// One item returned by a retrieval command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub key: String,
    pub flags: u32,
    pub data: Bytes,
}

/// One complete reply read from a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `VALUE ...` blocks terminated by `END` (empty on a miss)
    Values(Vec<Item>),
    Stored,
    NotStored,
    Exists,
    NotFound,
    Deleted,
    Touched,
    Ok,
    /// Reply to `incr` / `decr`
    Number(u64),
    Version(String),
    /// `ERROR`, `CLIENT_ERROR ...` or `SERVER_ERROR ...`, kept verbatim
    Error(String),
}
