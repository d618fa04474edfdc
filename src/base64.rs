//! The service's URL-safe base64 variant.
//!
//! Link fragments, key blobs and attribute blobs use base64 with `-` in
//! place of `+`, `_` in place of `/`, and no `=` padding.

use ::base64::Engine;
use ::base64::alphabet;
use ::base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};

/// Standard alphabet, tolerant of non-zero trailing bits like most decoders
/// the service's links were produced for.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// Decodes a URL-safe, unpadded string.
///
/// `-`/`_` are mapped back to `+`/`/` and padding is restored to a multiple
/// of four characters before decoding with the standard alphabet.
///
/// # Errors
///
/// Returns the underlying decode error if the input is not valid base64
/// after substitution.
pub fn decode(s: &str) -> std::result::Result<Vec<u8>, ::base64::DecodeError> {
    let mut standard: String = s
        .trim()
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    let padding = (4 - standard.len() % 4) % 4;
    standard.extend(std::iter::repeat_n('=', padding));
    LENIENT.decode(standard)
}

/// Encodes bytes with the URL-safe alphabet and no padding.
#[must_use]
pub fn encode(data: &[u8]) -> String {
    ::base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
}
