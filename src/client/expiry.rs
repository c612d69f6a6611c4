//! TTL to memcached `exptime` conversion.

use crate::constants::MAX_RELATIVE_EXPIRATION_SECS;
use chrono::Utc;
use std::time::Duration;

/// Convert a TTL to the `exptime` field.
///
/// `None` or zero means never expire. Up to 30 days the server takes relative
/// seconds; anything longer must be an absolute Unix timestamp, otherwise the
/// server reads it as a date in 1970 and expires the item immediately.
pub(crate) fn exptime(ttl: Option<Duration>) -> u32 {
    let Some(ttl) = ttl else {
        return 0;
    };

    // Round sub-second TTLs up so they do not become "never expire"
    let secs = if ttl.subsec_nanos() > 0 {
        ttl.as_secs().saturating_add(1)
    } else {
        ttl.as_secs()
    };

    if secs <= MAX_RELATIVE_EXPIRATION_SECS {
        return secs as u32;
    }

    let now = u64::try_from(Utc::now().timestamp()).unwrap_or(0);
    u32::try_from(now.saturating_add(secs)).unwrap_or(u32::MAX)
}
