//! Password hashing for the credential store.
//!
//! Passwords are hashed with PBKDF2-HMAC-SHA256 and a random per-user salt.
//! The stored format is `iterations$salt_hex$digest_hex`, so the iteration
//! count can be raised without invalidating existing credentials.

use rand::RngCore;
use ring::pbkdf2;
use std::num::NonZeroU32;
use subtle::ConstantTimeEq;

/// Length of the random per-user salt in bytes
const SALT_LENGTH: usize = 32;

/// Length of the derived digest in bytes (SHA-256 output)
const DIGEST_LENGTH: usize = 32;

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; DIGEST_LENGTH] {
    let mut digest = [0u8; DIGEST_LENGTH];
    // Iteration count comes from config and is validated at construction;
    // clamp to 1 rather than panic on a zero from a hand-edited file.
    let iterations = NonZeroU32::new(iterations).unwrap_or(NonZeroU32::MIN);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        password.as_bytes(),
        &mut digest,
    );
    digest
}

/// Hash a password with a fresh random salt.
///
/// Returns the encoded form `iterations$salt_hex$digest_hex`.
pub fn hash_password(password: &str, iterations: u32) -> String {
    let mut salt = [0u8; SALT_LENGTH];
    rand::rng().fill_bytes(&mut salt);

    let digest = derive(password, &salt, iterations);
    format!("{}${}${}", iterations, hex::encode(salt), hex::encode(digest))
}

/// Verify a password against a stored hash.
///
/// Malformed stored hashes verify false rather than erroring, and the digest
/// comparison is constant-time. Callers must report a failed verification the
/// same way as an unknown user.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    let (Some(iterations), Some(salt), Some(digest)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    if iterations == 0 {
        return false;
    }
    let Ok(salt) = hex::decode(salt) else {
        return false;
    };
    let Ok(expected) = hex::decode(digest) else {
        return false;
    };
    if expected.len() != DIGEST_LENGTH {
        return false;
    }

    let computed = derive(password, &salt, iterations);
    computed.ct_eq(expected.as_slice()).into()
}
