//! Client device fingerprinting.
//!
//! Clients send a device descriptor shaped `userAgent|language|screen`. Only
//! its SHA-256 digest is stored; the locale region is kept as a coarse
//! location hint.

use sha2::{Digest, Sha256};

/// Hex SHA-256 of the raw device descriptor; `None` when the client sent
/// no descriptor, so anonymous clients never share a fingerprint.
pub fn device_hash(device_info: &str) -> Option<String> {
    if device_info.trim().is_empty() {
        return None;
    }
    Some(hex::encode(Sha256::digest(device_info.as_bytes())))
}

/// Region from the descriptor's locale (`en-US` -> `US`, `fr` -> `FR`).
pub fn geo_location(device_info: &str) -> Option<String> {
    let lang = device_info.split('|').nth(1)?.trim();
    if lang.is_empty() {
        return None;
    }

    let region = match lang.split_once(['-', '_']) {
        Some((_, region)) => region,
        None => lang,
    };
    (!region.is_empty()).then(|| region.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_hash_is_stable_hex() {
        let a = device_hash("Mozilla/5.0|en-US|1920x1080").unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(Some(a.clone()), device_hash("Mozilla/5.0|en-US|1920x1080"));
        assert_ne!(Some(a), device_hash("Mozilla/5.0|en-GB|1920x1080"));
    }

    #[test]
    fn test_missing_descriptor_has_no_hash() {
        assert_eq!(device_hash(""), None);
        assert_eq!(device_hash("   "), None);
    }

    #[test]
    fn test_geo_from_locale() {
        assert_eq!(geo_location("ua|en-US|1x1").as_deref(), Some("US"));
        assert_eq!(geo_location("ua|pt_br|1x1").as_deref(), Some("BR"));
        assert_eq!(geo_location("ua|fr").as_deref(), Some("FR"));
        assert_eq!(geo_location("ua"), None);
        assert_eq!(geo_location("ua||1x1"), None);
    }
}
