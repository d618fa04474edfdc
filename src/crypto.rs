//! AES-128 primitives used by the link format.
//!
//! - ECB: per-node keys wrapped with the shared folder key
//! - CBC with a zero IV and no padding: attribute blobs
//! - CTR with a 64-bit nonce and a counter starting at zero: file bodies

use aes::Aes128;
use aes::cipher::block_padding::NoPadding;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{
    BlockDecrypt, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit,
    StreamCipher,
};

use crate::keys::DerivedKey;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

const ZERO_IV: [u8; BLOCK_SIZE] = [0; BLOCK_SIZE];

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// Decrypts whole blocks independently.
///
/// Returns `None` for empty input or input that is not block aligned.
#[must_use]
pub fn ecb_decrypt(data: &[u8], key: &[u8; 16]) -> Option<Vec<u8>> {
    if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
        return None;
    }
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut out = data.to_vec();
    for chunk in out.chunks_exact_mut(BLOCK_SIZE) {
        cipher.decrypt_block(GenericArray::from_mut_slice(chunk));
    }
    Some(out)
}

/// Encrypts whole blocks independently.
///
/// Returns `None` for input that is not block aligned.
#[must_use]
pub fn ecb_encrypt(data: &[u8], key: &[u8; 16]) -> Option<Vec<u8>> {
    if data.len() % BLOCK_SIZE != 0 {
        return None;
    }
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut out = data.to_vec();
    for chunk in out.chunks_exact_mut(BLOCK_SIZE) {
        cipher.encrypt_block(GenericArray::from_mut_slice(chunk));
    }
    Some(out)
}

/// CBC-decrypts with an all-zero IV, leaving any padding in place.
///
/// Returns `None` if the input is not block aligned.
#[must_use]
pub fn cbc_decrypt(data: &[u8], key: &[u8; 16]) -> Option<Vec<u8>> {
    let mut buf = data.to_vec();
    let len = Aes128CbcDec::new(GenericArray::from_slice(key), GenericArray::from_slice(&ZERO_IV))
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .ok()?
        .len();
    buf.truncate(len);
    Some(buf)
}

/// CBC-encrypts with an all-zero IV after zero-padding to a block boundary.
#[must_use]
pub fn cbc_encrypt(data: &[u8], key: &[u8; 16]) -> Vec<u8> {
    let mut buf = data.to_vec();
    buf.resize(data.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE, 0);
    let len = buf.len();
    Aes128CbcEnc::new(GenericArray::from_slice(key), GenericArray::from_slice(&ZERO_IV))
        .encrypt_padded_mut::<NoPadding>(&mut buf, len)
        .map_or_else(|_| Vec::new(), <[u8]>::to_vec)
}

/// Counter-mode keystream for one file body.
///
/// The counter block is the 8-byte nonce followed by a 64-bit big-endian
/// counter starting at zero. Applying the keystream is position based, so
/// the same instance must see every byte of the body exactly once, in order.
pub struct FileCipher {
    inner: Aes128Ctr,
}

impl FileCipher {
    /// Creates a keystream positioned at byte zero.
    #[must_use]
    pub fn new(key: &DerivedKey) -> Self {
        let mut counter_block = [0u8; BLOCK_SIZE];
        counter_block[..8].copy_from_slice(&key.iv);
        Self {
            inner: Aes128Ctr::new(
                GenericArray::from_slice(&key.key),
                GenericArray::from_slice(&counter_block),
            ),
        }
    }

    /// XORs the next `buf.len()` keystream bytes into `buf`.
    ///
    /// Encryption and decryption are the same operation.
    pub fn apply(&mut self, buf: &mut [u8]) {
        self.inner.apply_keystream(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NIST_KEY: [u8; 16] = [
        0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09, 0xcf, 0x4f,
        0x3c,
    ];

    #[test]
    fn ecb_matches_fips197_vector() {
        let key: [u8; 16] = core::array::from_fn(|i| u8::try_from(i).unwrap());
        let plaintext = [
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
            0xee, 0xff,
        ];
        let expected = [
            0x69, 0xc4, 0xe0, 0xd8, 0x6a, 0x7b, 0x04, 0x30, 0xd8, 0xcd, 0xb7, 0x80, 0x70, 0xb4,
            0xc5, 0x5a,
        ];
        assert_eq!(ecb_encrypt(&plaintext, &key).unwrap(), expected);
        assert_eq!(ecb_decrypt(&expected, &key).unwrap(), plaintext);
    }

    #[test]
    fn ecb_rejects_unaligned_input() {
        assert!(ecb_decrypt(&[0u8; 15], &NIST_KEY).is_none());
        assert!(ecb_decrypt(&[], &NIST_KEY).is_none());
        assert!(ecb_encrypt(&[0u8; 17], &NIST_KEY).is_none());
    }

    #[test]
    fn cbc_zero_iv_round_trip_keeps_zero_padding() {
        let ciphertext = cbc_encrypt(b"MEGA{\"n\":\"a\"}", &NIST_KEY);
        assert_eq!(ciphertext.len(), 16);
        let plaintext = cbc_decrypt(&ciphertext, &NIST_KEY).unwrap();
        assert_eq!(&plaintext[..13], b"MEGA{\"n\":\"a\"}");
        assert!(plaintext[13..].iter().all(|&b| b == 0));
    }

    #[test]
    fn cbc_first_block_equals_ecb_with_zero_iv() {
        let block = [0x42u8; 16];
        assert_eq!(cbc_encrypt(&block, &NIST_KEY), ecb_encrypt(&block, &NIST_KEY).unwrap());
    }

    #[test]
    fn cbc_rejects_unaligned_input() {
        assert!(cbc_decrypt(&[1u8; 20], &NIST_KEY).is_none());
    }

    #[test]
    fn ctr_first_block_is_encrypted_counter() {
        let key = DerivedKey {
            key: NIST_KEY,
            iv: [0xf0, 0xf1, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7],
        };
        let mut counter_block = [0u8; 16];
        counter_block[..8].copy_from_slice(&key.iv);
        let keystream = ecb_encrypt(&counter_block, &NIST_KEY).unwrap();

        let mut buf = [0u8; 16];
        FileCipher::new(&key).apply(&mut buf);
        assert_eq!(buf.as_slice(), keystream.as_slice());
    }

    #[test]
    fn ctr_second_block_uses_incremented_counter() {
        let key = DerivedKey {
            key: NIST_KEY,
            iv: [7; 8],
        };
        let mut counter_block = [0u8; 16];
        counter_block[..8].copy_from_slice(&key.iv);
        counter_block[15] = 1;
        let keystream = ecb_encrypt(&counter_block, &NIST_KEY).unwrap();

        let mut buf = [0u8; 32];
        FileCipher::new(&key).apply(&mut buf);
        assert_eq!(&buf[16..], keystream.as_slice());
    }

    #[test]
    fn ctr_is_symmetric() {
        let key = DerivedKey {
            key: NIST_KEY,
            iv: [1, 2, 3, 4, 5, 6, 7, 8],
        };
        let original = b"counter mode has no padding at all".to_vec();
        let mut data = original.clone();
        FileCipher::new(&key).apply(&mut data);
        assert_ne!(data, original);
        FileCipher::new(&key).apply(&mut data);
        assert_eq!(data, original);
    }
}
