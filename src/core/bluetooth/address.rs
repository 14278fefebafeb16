//! Hardware address and UUID helpers.

use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use crate::core::bluetooth::constants::BLUETOOTH_BASE_UUID;

static MAC_IN_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9A-Fa-f]{2}[:_-]){5}([0-9A-Fa-f]{2})").expect("valid MAC regex")
});

static MAC_EXACT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}$").expect("valid MAC regex"));

/// Validate a colon-separated hardware address and return it uppercased
pub fn normalize_address(address: &str) -> Option<String> {
    let address = address.trim();
    MAC_EXACT
        .is_match(address)
        .then(|| address.to_uppercase())
}

/// Pull the last MAC address out of a platform device id.
///
/// BlueZ ids look like `/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF`, other stacks
/// embed the address with `:` or `-`.
pub fn extract_mac_address(device_id: &str) -> Option<String> {
    MAC_IN_TEXT
        .find_iter(device_id)
        .last()
        .map(|m| m.as_str().replace(['_', '-'], ":").to_uppercase())
}

/// Parse a characteristic UUID, expanding 16-bit and 32-bit short forms
/// against the Bluetooth base UUID.
pub fn parse_uuid(text: &str) -> Option<Uuid> {
    let text = text.trim();
    let is_hex = !text.is_empty() && text.chars().all(|c| c.is_ascii_hexdigit());
    if is_hex && (text.len() == 4 || text.len() == 8) {
        let short = u32::from_str_radix(text, 16).ok()?;
        return Some(Uuid::from_u128(BLUETOOTH_BASE_UUID.as_u128() | (u128::from(short) << 96)));
    }
    Uuid::parse_str(text).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_valid_addresses() {
        assert_eq!(
            normalize_address(" aa:bb:cc:dd:ee:ff "),
            Some("AA:BB:CC:DD:EE:FF".to_string())
        );
        assert_eq!(normalize_address("AA-BB-CC-DD-EE-FF"), None);
        assert_eq!(normalize_address("AA:BB:CC:DD:EE"), None);
    }

    #[test]
    fn extracts_mac_from_bluez_path() {
        assert_eq!(
            extract_mac_address("/org/bluez/hci0/dev_aa_bb_cc_dd_ee_ff"),
            Some("AA:BB:CC:DD:EE:FF".to_string())
        );
        assert_eq!(extract_mac_address("9F1C2E10-0000-4000-8000-000000000000"), None);
    }

    #[test]
    fn expands_short_uuids() {
        let uuid = parse_uuid("1234").unwrap();
        assert_eq!(uuid.to_string(), "00001234-0000-1000-8000-00805f9b34fb");

        let upper = parse_uuid("19B10001-E8F2-537E-4F6C-D104768A1214").unwrap();
        let lower = parse_uuid("19b10001-e8f2-537e-4f6c-d104768a1214").unwrap();
        assert_eq!(upper, lower);

        assert_eq!(parse_uuid("xyz"), None);
        assert_eq!(parse_uuid(""), None);
    }
}
