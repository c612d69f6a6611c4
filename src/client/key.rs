//! Key qualification and validation.

use crate::constants::{MAX_KEY_LENGTH, NAMESPACE_SEPARATOR};
use crate::error::{CacheError, CacheResult};

/// Prefix `key` with the namespace and check it can travel on the wire.
///
/// The length limit applies to the qualified key, since that is what the
/// server stores.
pub(crate) fn qualify(namespace: Option<&str>, key: &str) -> CacheResult<String> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("key must not be empty".to_string()));
    }

    let qualified = match namespace {
        Some(namespace) => format!("{namespace}{NAMESPACE_SEPARATOR}{key}"),
        None => key.to_string(),
    };

    if qualified.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidKey(format!(
            "key is {} bytes, limit is {MAX_KEY_LENGTH}",
            qualified.len()
        )));
    }
    if let Some(position) = qualified
        .bytes()
        .position(|b| b.is_ascii_whitespace() || b.is_ascii_control())
    {
        return Err(CacheError::InvalidKey(format!(
            "key contains whitespace or a control character at byte {position}"
        )));
    }

    Ok(qualified)
}
