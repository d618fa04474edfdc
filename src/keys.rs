//! Key material carried in links and node listings.
//!
//! Keys travel as arrays of big-endian 32-bit words. Four words are a plain
//! 128-bit key. Eight words are a file key: the AES key is the XOR of the two
//! halves, and words 4..6 hold the counter-mode nonce.

use crate::error::{Error, Result};

/// A decoded key blob, as 32-bit big-endian words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMaterial(Vec<u32>);

/// Cipher key and counter nonce ready for use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedKey {
    /// 128-bit AES key.
    pub key: [u8; 16],
    /// 64-bit nonce that prefixes the CTR counter block.
    pub iv: [u8; 8],
}

impl KeyMaterial {
    /// Wraps raw words.
    #[must_use]
    pub const fn from_words(words: Vec<u32>) -> Self {
        Self(words)
    }

    /// Interprets bytes as big-endian words, zero-padding a trailing partial
    /// word.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let words = bytes
            .chunks(4)
            .map(|chunk| {
                let mut word = [0u8; 4];
                word[..chunk.len()].copy_from_slice(chunk);
                u32::from_be_bytes(word)
            })
            .collect();
        Self(words)
    }

    /// Decodes a URL-safe base64 key blob.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the blob is not valid base64.
    pub fn from_base64(blob: &str) -> Result<Self> {
        crate::base64::decode(blob)
            .map(|bytes| Self::from_bytes(&bytes))
            .map_err(|e| Error::Validation(format!("key is not valid base64: {e}")))
    }

    /// Returns the words.
    #[must_use]
    pub fn words(&self) -> &[u32] {
        &self.0
    }

    /// Returns the number of words.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no words.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serializes the words back to big-endian bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|w| w.to_be_bytes()).collect()
    }

    /// Folds a 256-bit value into 128 bits by XOR-ing words 0..4 with 4..8.
    ///
    /// Material shorter than eight words is returned unchanged.
    #[must_use]
    pub fn fold(&self) -> Self {
        if self.0.len() < 8 {
            return self.clone();
        }
        Self(xor_halves(&self.0))
    }

    /// Derives the AES key and CTR nonce.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] unless the material has exactly four
    /// words or at least eight.
    pub fn derive(&self) -> Result<DerivedKey> {
        let words = &self.0;
        match words.len() {
            4 => Ok(DerivedKey {
                key: words_to_key(words),
                iv: [0; 8],
            }),
            n if n >= 8 => {
                let mut iv = [0u8; 8];
                iv[..4].copy_from_slice(&words[4].to_be_bytes());
                iv[4..].copy_from_slice(&words[5].to_be_bytes());
                Ok(DerivedKey {
                    key: words_to_key(&xor_halves(words)),
                    iv,
                })
            }
            n => Err(Error::Validation(format!(
                "key material has {n} words, expected 4 or at least 8"
            ))),
        }
    }
}

fn xor_halves(words: &[u32]) -> Vec<u32> {
    words[..4]
        .iter()
        .zip(&words[4..8])
        .map(|(a, b)| a ^ b)
        .collect()
}

fn words_to_key(words: &[u32]) -> [u8; 16] {
    let mut key = [0u8; 16];
    for (dst, word) in key.chunks_exact_mut(4).zip(words) {
        dst.copy_from_slice(&word.to_be_bytes());
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bytes_is_big_endian() {
        let km = KeyMaterial::from_bytes(&[0x01, 0x02, 0x03, 0x04, 0xff, 0x00, 0x00, 0x00]);
        assert_eq!(km.words(), &[0x0102_0304, 0xff00_0000]);
    }

    #[test]
    fn from_bytes_pads_partial_word() {
        let km = KeyMaterial::from_bytes(&[0xaa, 0xbb]);
        assert_eq!(km.words(), &[0xaabb_0000]);
    }

    #[test]
    fn to_bytes_round_trips() {
        let bytes: Vec<u8> = (0u8..32).collect();
        assert_eq!(KeyMaterial::from_bytes(&bytes).to_bytes(), bytes);
    }

    #[test]
    fn four_words_give_zero_iv() {
        let km = KeyMaterial::from_words(vec![1, 2, 3, 4]);
        let derived = km.derive().unwrap();
        assert_eq!(derived.iv, [0; 8]);
        assert_eq!(derived.key[..4], [0, 0, 0, 1]);
        assert_eq!(derived.key[12..], [0, 0, 0, 4]);
    }

    #[test]
    fn eight_words_xor_and_take_nonce() {
        let km = KeyMaterial::from_words(vec![
            0xffff_ffff,
            0,
            0x1234_5678,
            0,
            0x0f0f_0f0f,
            0xdead_beef,
            0x1234_5678,
            7,
        ]);
        let derived = km.derive().unwrap();
        let expected = KeyMaterial::from_words(vec![0xf0f0_f0f0, 0xdead_beef, 0, 7]).to_bytes();
        assert_eq!(derived.key.as_slice(), expected.as_slice());
        assert_eq!(derived.iv, [0x0f, 0x0f, 0x0f, 0x0f, 0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn longer_material_uses_first_eight_words() {
        let mut words: Vec<u32> = (1..=8).collect();
        let base = KeyMaterial::from_words(words.clone()).derive().unwrap();
        words.extend([99, 100]);
        assert_eq!(KeyMaterial::from_words(words).derive().unwrap(), base);
    }

    #[test]
    fn other_word_counts_are_rejected() {
        for n in [0usize, 1, 3, 5, 6, 7] {
            let km = KeyMaterial::from_words(vec![0; n]);
            assert!(
                matches!(km.derive(), Err(Error::Validation(_))),
                "{n} words should be rejected"
            );
        }
    }

    #[test]
    fn fold_xors_halves() {
        let km = KeyMaterial::from_words(vec![1, 2, 3, 4, 1, 2, 3, 5]);
        assert_eq!(km.fold().words(), &[0, 0, 0, 1]);
    }

    #[test]
    fn fold_leaves_short_material_alone() {
        let km = KeyMaterial::from_words(vec![1, 2, 3, 4]);
        assert_eq!(km.fold(), km);
    }

    #[test]
    fn from_base64_rejects_invalid_blob() {
        assert!(matches!(
            KeyMaterial::from_base64("@@@@"),
            Err(Error::Validation(_))
        ));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn four_words_always_zero_iv(words in proptest::array::uniform4(any::<u32>())) {
                let derived = KeyMaterial::from_words(words.to_vec()).derive().unwrap();
                prop_assert_eq!(derived.iv, [0u8; 8]);
                prop_assert_eq!(derived.key.to_vec(), KeyMaterial::from_words(words.to_vec()).to_bytes());
            }

            #[test]
            fn eight_words_key_is_xor_of_halves(words in proptest::collection::vec(any::<u32>(), 8..12)) {
                let derived = KeyMaterial::from_words(words.clone()).derive().unwrap();
                let expected: Vec<u32> = (0..4).map(|i| words[i] ^ words[i + 4]).collect();
                prop_assert_eq!(derived.key.to_vec(), KeyMaterial::from_words(expected).to_bytes());
                prop_assert_eq!(derived.iv.to_vec(), KeyMaterial::from_words(words[4..6].to_vec()).to_bytes());
            }
        }
    }
}
