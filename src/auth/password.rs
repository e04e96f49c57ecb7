// scrypt password hashing, stored as `hex(key).salt`
//
// The salt is 16 random bytes hex-encoded; the hex text itself is fed to
// scrypt so hashes stay interchangeable with existing account rows.

use rand::RngCore;
use scrypt::{scrypt, Params};

use crate::error::{AppResult, AuthError};

const LOG_N: u8 = 14;
const R: u32 = 8;
const P: u32 = 1;
const KEY_LEN: usize = 64;
const SALT_LEN: usize = 16;

fn derive(password: &str, salt: &str) -> AppResult<Vec<u8>> {
    let params = Params::new(LOG_N, R, P, KEY_LEN).map_err(|e| AuthError::Hashing(e.to_string()))?;
    let mut key = vec![0u8; KEY_LEN];
    scrypt(password.as_bytes(), salt.as_bytes(), &params, &mut key)
        .map_err(|e| AuthError::Hashing(e.to_string()))?;
    Ok(key)
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    let salt = hex::encode(salt);
    let key = derive(password, &salt)?;
    Ok(format!("{}.{}", hex::encode(key), salt))
}

/// Malformed stored hashes never match
pub fn verify_password(password: &str, stored: &str) -> AppResult<bool> {
    let Some((hashed, salt)) = stored.split_once('.') else {
        return Ok(false);
    };
    let Ok(expected) = hex::decode(hashed) else {
        return Ok(false);
    };
    let supplied = derive(password, salt)?;
    Ok(constant_time_eq(&expected, &supplied))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let stored = hash_password("correct horse").unwrap();
        let (key, salt) = stored.split_once('.').unwrap();
        assert_eq!(key.len(), KEY_LEN * 2);
        assert_eq!(salt.len(), SALT_LEN * 2);

        assert!(verify_password("correct horse", &stored).unwrap());
        assert!(!verify_password("wrong horse", &stored).unwrap());
    }

    #[test]
    fn test_salts_differ() {
        assert_ne!(hash_password("same").unwrap(), hash_password("same").unwrap());
    }

    #[test]
    fn test_malformed_hash_rejected() {
        assert!(!verify_password("pw", "no-dot-here").unwrap());
        assert!(!verify_password("pw", "zz.abcd").unwrap());
        assert!(!verify_password("pw", "abcd.abcd").unwrap());
    }
}
