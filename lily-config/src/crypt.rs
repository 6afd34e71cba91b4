//! One-way password hashing.
//!
//! Hashes are self-describing strings of the form
//! `$pbkdf2-sha256$<rounds>$<salt>$<digest>` with base64 encoded salt and
//! digest, so the round count can be raised later without invalidating
//! stored hashes.

use anyhow::{bail, format_err, Error};
use openssl::hash::MessageDigest;

const PREFIX: &str = "pbkdf2-sha256";
const ROUNDS: u32 = 65536;
const SALT_LEN: usize = 16;
const DIGEST_LEN: usize = 32;

fn derive(password: &str, salt: &[u8], rounds: u32) -> Result<[u8; DIGEST_LEN], Error> {
    let mut digest = [0u8; DIGEST_LEN];
    openssl::pkcs5::pbkdf2_hmac(
        password.as_bytes(),
        salt,
        rounds as usize,
        MessageDigest::sha256(),
        &mut digest,
    )
    .map_err(|err| format_err!("key derivation failed - {}", err))?;
    Ok(digest)
}

pub fn encrypt_pw(password: &str) -> Result<String, Error> {
    let mut salt = [0u8; SALT_LEN];
    openssl::rand::rand_bytes(&mut salt)
        .map_err(|err| format_err!("unable to generate salt - {}", err))?;

    let digest = derive(password, &salt, ROUNDS)?;

    Ok(format!(
        "${}${}${}${}",
        PREFIX,
        ROUNDS,
        base64::encode_config(salt, base64::STANDARD_NO_PAD),
        base64::encode_config(digest, base64::STANDARD_NO_PAD),
    ))
}

pub fn verify_pw(password: &str, enc_password: &str) -> Result<(), Error> {
    let mut parts = enc_password.splitn(5, '$');
    let valid = parts.next() == Some("");
    let valid = valid && parts.next() == Some(PREFIX);

    let rounds: u32 = match (valid, parts.next()) {
        (true, Some(rounds)) => rounds
            .parse()
            .map_err(|_| format_err!("malformed password hash"))?,
        _ => bail!("malformed password hash"),
    };

    let salt = parts
        .next()
        .and_then(|raw| base64::decode_config(raw, base64::STANDARD_NO_PAD).ok())
        .ok_or_else(|| format_err!("malformed password hash"))?;
    let stored = parts
        .next()
        .and_then(|raw| base64::decode_config(raw, base64::STANDARD_NO_PAD).ok())
        .ok_or_else(|| format_err!("malformed password hash"))?;

    if stored.len() != DIGEST_LEN {
        bail!("malformed password hash");
    }

    let digest = derive(password, &salt, rounds)?;

    // constant time comparison
    if !openssl::memcmp::eq(&digest, &stored) {
        bail!("invalid credentials");
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::{encrypt_pw, verify_pw};

    #[test]
    fn test_hash_verify_roundtrip() {
        let hash = encrypt_pw("correct horse").unwrap();
        assert!(hash.starts_with("$pbkdf2-sha256$"));

        verify_pw("correct horse", &hash).unwrap();
        assert!(verify_pw("battery staple", &hash).is_err());
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = encrypt_pw("p").unwrap();
        let b = encrypt_pw("p").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_hash() {
        assert!(verify_pw("p", "not-a-hash").is_err());
        assert!(verify_pw("p", "$pbkdf2-sha256$x$y$z").is_err());
        assert!(verify_pw("p", "").is_err());
    }
}
