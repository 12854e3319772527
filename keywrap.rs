//! RFC 3394 AES key wrap.
//!
//! The 64-bit integrity check value doubles as the "is this the right key"
//! test when trying candidate passphrases and suites.

use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::cipher::AesBlock;
use crate::error::{AxCryptError, Result};

const DEFAULT_IV: [u8; 8] = [0xA6; 8];
const ROUNDS: u64 = 6;

/// Wrap `key` (a multiple of 8 bytes, at least 16) under `kek`.
pub fn wrap(kek: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    if key.len() < 16 || key.len() % 8 != 0 {
        return Err(AxCryptError::key(format!(
            "cannot wrap a {} byte key",
            key.len()
        )));
    }
    let aes = AesBlock::new(kek)?;
    let n = key.len() / 8;

    let mut a = DEFAULT_IV;
    let mut r = Zeroizing::new(key.to_vec());
    let mut block = [0u8; 16];
    for j in 0..ROUNDS {
        for i in 0..n {
            block[..8].copy_from_slice(&a);
            block[8..].copy_from_slice(&r[i * 8..i * 8 + 8]);
            aes.encrypt(&mut block);
            let t = (n as u64) * j + (i as u64) + 1;
            a.copy_from_slice(&block[..8]);
            for (x, y) in a.iter_mut().zip(t.to_be_bytes()) {
                *x ^= y;
            }
            r[i * 8..i * 8 + 8].copy_from_slice(&block[8..]);
        }
    }

    let mut out = Vec::with_capacity(key.len() + 8);
    out.extend_from_slice(&a);
    out.extend_from_slice(&r);
    Ok(out)
}

/// Unwrap `wrapped` under `kek`. A failed integrity check is reported as
/// [`AxCryptError::Authentication`].
pub fn unwrap(kek: &[u8], wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if wrapped.len() < 24 || wrapped.len() % 8 != 0 {
        return Err(AxCryptError::malformed(format!(
            "wrapped key has invalid length {}",
            wrapped.len()
        )));
    }
    let aes = AesBlock::new(kek)?;
    let n = wrapped.len() / 8 - 1;

    let mut a = [0u8; 8];
    a.copy_from_slice(&wrapped[..8]);
    let mut r = Zeroizing::new(wrapped[8..].to_vec());
    let mut block = Zeroizing::new([0u8; 16]);
    for j in (0..ROUNDS).rev() {
        for i in (0..n).rev() {
            let t = (n as u64) * j + (i as u64) + 1;
            for (x, y) in a.iter_mut().zip(t.to_be_bytes()) {
                *x ^= y;
            }
            block[..8].copy_from_slice(&a);
            block[8..].copy_from_slice(&r[i * 8..i * 8 + 8]);
            aes.decrypt(&mut block);
            a.copy_from_slice(&block[..8]);
            r[i * 8..i * 8 + 8].copy_from_slice(&block[8..]);
        }
    }

    if bool::from(a[..].ct_eq(&DEFAULT_IV[..])) {
        Ok(r)
    } else {
        Err(AxCryptError::Authentication)
    }
}
