//! Protocol and client constants shared across modules.

/// Maximum key length accepted by memcached, namespace prefix included
pub const MAX_KEY_LENGTH: usize = 250;

/// Item flag: value was written through a serialization codec
pub const FLAG_SERIALIZED: u32 = 0x1;

/// Item flag: value was compressed by the writer
pub const FLAG_COMPRESSED: u32 = 0x2;

/// Default number of ring points per server (scaled by weight)
pub const DEFAULT_POINTS_PER_SERVER: u32 = 160;

/// Default memcached port used when an address omits one
pub const DEFAULT_PORT: u16 = 11211;

/// TTLs above this many seconds must be sent as absolute Unix timestamps
pub const MAX_RELATIVE_EXPIRATION_SECS: u64 = 60 * 60 * 24 * 30;

/// Default maximum encoded value size (memcached's default item size)
pub const DEFAULT_VALUE_MAX_BYTES: usize = 1024 * 1024;

/// Separator between namespace and key
pub const NAMESPACE_SEPARATOR: char = ':';
