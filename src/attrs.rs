//! Node attribute blobs.
//!
//! An attribute blob is `"MEGA" + JSON`, zero-padded to a block boundary,
//! encrypted with AES-128-CBC under a zero IV and base64url-encoded. The
//! display name lives in field `n`.

use serde_json::{Map, Value};

use crate::crypto::{cbc_decrypt, cbc_encrypt};

const MAGIC: &[u8; 4] = b"MEGA";

/// Decrypted node attributes.
///
/// Attribute blobs are best-effort metadata, so a blob that cannot be
/// decoded, decrypted or parsed is represented as [`Attributes::None`]
/// rather than as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attributes {
    /// Successfully decrypted key/value pairs.
    Some(Map<String, Value>),
    /// Nothing usable was found.
    None,
}

impl Attributes {
    /// Returns the display name, if present and a string.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.get("n").and_then(Value::as_str)
    }

    /// Returns a raw attribute value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        match self {
            Self::Some(map) => map.get(field),
            Self::None => None,
        }
    }

    /// Returns `true` if nothing was decrypted.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Decrypts an attribute blob with a 128-bit node key.
///
/// Never fails: any problem yields [`Attributes::None`].
#[must_use]
pub fn decrypt_attributes(blob: &str, key: &[u8; 16]) -> Attributes {
    let Ok(ciphertext) = crate::base64::decode(blob) else {
        log::debug!("attribute blob is not valid base64");
        return Attributes::None;
    };
    let Some(plaintext) = cbc_decrypt(&ciphertext, key) else {
        log::debug!("attribute blob is not block aligned ({} bytes)", ciphertext.len());
        return Attributes::None;
    };
    let Some(body) = plaintext.strip_prefix(MAGIC) else {
        return Attributes::None;
    };
    let end = body.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    match serde_json::from_slice::<Value>(&body[..end]) {
        Ok(Value::Object(map)) => Attributes::Some(map),
        Ok(_) | Err(_) => Attributes::None,
    }
}

/// Builds an attribute blob for the given JSON value.
///
/// The inverse of [`decrypt_attributes`]; used to construct listings.
#[must_use]
pub fn encrypt_attributes(value: &Value, key: &[u8; 16]) -> String {
    let mut plaintext = MAGIC.to_vec();
    plaintext.extend_from_slice(value.to_string().as_bytes());
    crate::base64::encode(&cbc_encrypt(&plaintext, key))
}
