use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::error;

/// Token action for the bulk user form.
pub const BULK_ACTION: &str = "bulk-action";
/// Token action for the settings form.
pub const SAVE_SETTINGS: &str = "save-settings";

type HmacSha256 = Hmac<Sha256>;

fn mac_for(secret: &str, action: &str, session: i64) -> Option<HmacSha256> {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(e) => {
            error!("Failed to create HMAC: {}", e);
            return None;
        }
    };
    mac.update(format!("{action}:{session}").as_bytes());
    Some(mac)
}

/// Issues the request token an admin form must echo back. Bound to the action and to the
/// acting administrator's id.
pub fn issue_token(secret: &str, action: &str, session: i64) -> String {
    match mac_for(secret, action, session) {
        Some(mac) => hex::encode(mac.finalize().into_bytes()),
        None => String::new(),
    }
}

/// Constant-time check of a submitted token.
pub fn verify_token(secret: &str, action: &str, session: i64, token: &str) -> bool {
    let Ok(submitted) = hex::decode(token.trim()) else {
        return false;
    };
    match mac_for(secret, action, session) {
        Some(mac) => mac.verify_slice(&submitted).is_ok(),
        None => false,
    }
}

/// Constant-time comparison of a presented service key with the configured one.
pub fn service_key_matches(expected: &str, presented: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    let (Some(expected_mac), Some(presented_mac)) =
        (mac_for(expected, "service-key", 0), mac_for(presented, "service-key", 0))
    else {
        return false;
    };
    expected_mac
        .verify_slice(&presented_mac.finalize().into_bytes())
        .is_ok()
}
