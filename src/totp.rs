// totp.rs
// TOTP utilities: build a TOTP instance for a user and generate Base32 secrets.

use anyhow::Result;
use data_encoding::BASE32_NOPAD;
use rand::RngCore;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::models::User;

pub const MIN_SECRET_BYTES: usize = 16; // 128 bits
pub const DEFAULT_SECRET_BYTES: usize = 20; // 160 bits
pub const DEFAULT_ISSUER: &str = "Prezio";

/// Build a TOTP instance from an issuer, account name (email) and Base32 secret.
pub fn build_totp(issuer: &str, email: &str, base32_secret: &str) -> Result<TOTP> {
    let secret = Secret::Encoded(base32_secret.to_string()).to_bytes()?;
    if secret.len() < MIN_SECRET_BYTES {
        anyhow::bail!(
            "Shared secret too short: {} bytes, need >= {} ({} bits)",
            secret.len(),
            MIN_SECRET_BYTES,
            MIN_SECRET_BYTES * 8
        );
    }
    let totp = TOTP::new(
        Algorithm::SHA1, // compatible with Google Authenticator
        6,
        1, // skew: one step either side
        30,
        secret,
        Some(issuer.to_string()),
        email.to_string(),
    )?;
    Ok(totp)
}

/// The user's company name, or the product name when none is set.
pub fn issuer_for(user: &User) -> &str {
    let company = user.company_name.trim();
    if company.is_empty() { DEFAULT_ISSUER } else { company }
}

pub fn totp_for_user(user: &User) -> Result<TOTP> {
    build_totp(issuer_for(user), &user.email, &user.secret)
}

/// Generate a random Base32 (NOPAD) secret of `bytes` length.
pub fn generate_base32_secret_n(bytes: usize) -> String {
    let n = bytes.max(MIN_SECRET_BYTES);
    let mut buf = vec![0u8; n];
    rand::rng().fill_bytes(&mut buf);
    BASE32_NOPAD.encode(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_secret_builds_a_totp() {
        let secret = generate_base32_secret_n(DEFAULT_SECRET_BYTES);
        let totp = build_totp("Acme", "owner@acme.test", &secret).unwrap();
        let code = totp.generate_current().unwrap();
        assert!(totp.check_current(&code).unwrap());
    }

    #[test]
    fn short_secrets_are_rejected() {
        let short = BASE32_NOPAD.encode(&[1u8; 8]);
        assert!(build_totp("Acme", "owner@acme.test", &short).is_err());
    }

    #[test]
    fn secrets_never_shorter_than_minimum() {
        let secret = generate_base32_secret_n(4);
        assert_eq!(BASE32_NOPAD.decode(secret.as_bytes()).unwrap().len(), MIN_SECRET_BYTES);
    }
}
