use crate::error::{Error, Result};
use argon2rs::{verifier::Encoded, Argon2, Variant};
use lazy_static::lazy_static;
use log::{debug, warn};
use ring::rand::{SecureRandom, SystemRandom};
use serde::Deserialize;

const SALT_LEN: usize = 32;
/// Shortest salt and digest argon2 accepts, longest secret key.
const MIN_SALT_LEN: usize = 8;
const MIN_DIGEST_LEN: usize = 4;
const MAX_KEY_LEN: usize = 32;

/// Algorithm tag written by [`PasswordHasher::hash_password`].
const ALGORITHM: &str = "argon2i";

lazy_static! {
    static ref RNG: SystemRandom = SystemRandom::new();
}

/// Argon2 work factor.
///
/// `passes` is the cost factor; raising it makes every hash (and every
/// brute-force guess) proportionally slower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct HashConfig {
    pub passes: u32,
    pub lanes: u32,
    pub memory_kib: u32,
}

impl Default for HashConfig {
    fn default() -> HashConfig {
        HashConfig {
            passes: 10,
            lanes: 1,
            memory_kib: 4096,
        }
    }
}

impl HashConfig {
    fn argon2(&self) -> Result<Argon2> {
        Argon2::new(self.passes, self.lanes, self.memory_kib, Variant::Argon2i).map_err(|_| {
            Error::Hash(format!(
                "invalid argon2 parameters (passes={}, lanes={}, memory_kib={})",
                self.passes, self.lanes, self.memory_kib
            ))
        })
    }
}

/// Generate a random 32-byte salt value.
fn random_salt(rng: &SystemRandom) -> Result<[u8; SALT_LEN]> {
    let mut salt = [0; SALT_LEN];
    rng.fill(&mut salt)
        .map_err(|_| Error::Hash("system randomness source failed".to_string()))?;
    Ok(salt)
}

/// Check the structure of `stored_hash`, then hand it to argon2rs.
///
/// argon2rs asserts on short salts, oversized keys and truncated input
/// instead of returning an error, so anything it cannot take is turned away
/// here first.
fn decode(stored_hash: &str) -> Result<(EncodedParams, Encoded)> {
    let params = EncodedParams::parse(stored_hash).map_err(|e| {
        warn!("Stored password hash could not be parsed");
        e
    })?;
    let encoded = Encoded::from_u8(stored_hash.as_bytes()).map_err(|_| {
        warn!("Stored password hash could not be parsed");
        Error::Format("not an argon2 encoded hash".to_string())
    })?;
    Ok((params, encoded))
}

/// Salts and hashes plaintext passwords with a fixed work factor.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    config: HashConfig,
}

impl PasswordHasher {
    /// Fails if the argon2 parameters in `config` are out of range.
    pub fn new(config: HashConfig) -> Result<PasswordHasher> {
        config.argon2()?;
        Ok(PasswordHasher { config })
    }

    pub fn config(&self) -> &HashConfig {
        &self.config
    }

    /// Generate a fresh salt and hash `plaintext` with it.
    ///
    /// The result is the full encoded form (algorithm, parameters, salt and
    /// digest), e.g. `$argon2i$m=4096,t=10,p=1$<salt>$<digest>`. Length rules
    /// are checked by the caller before this is reached.
    pub fn hash_password(&self, plaintext: &str) -> Result<String> {
        let salt = random_salt(&RNG)?;
        let encoded = Encoded::new(self.config.argon2()?, plaintext.as_bytes(), &salt, b"", b"");
        String::from_utf8(encoded.to_u8())
            .map_err(|_| Error::Hash("encoded hash is not valid utf-8".to_string()))
    }

    /// Whether `stored_hash` was made with parameters other than ours.
    pub fn needs_rehash(&self, stored_hash: &str) -> Result<bool> {
        let (params, _) = decode(stored_hash)?;
        Ok(params.algorithm != ALGORITHM
            || params.memory_kib != self.config.memory_kib
            || params.passes != self.config.passes
            || params.lanes != self.config.lanes)
    }

    /// Burn the same amount of work as a real verification, then fail.
    ///
    /// Used when there is no stored hash to check against, so that an
    /// unknown account takes as long to reject as a wrong password.
    pub fn verify_dummy(&self, plaintext: &str) -> bool {
        let _ = self.hash_password(plaintext);
        false
    }
}

/// Check `plaintext` against a hash produced by [`PasswordHasher::hash_password`].
///
/// The salt and parameters are taken from `stored_hash`, so this does not
/// depend on the current [`HashConfig`]. The digest comparison is constant-time.
pub fn verify_password(plaintext: &str, stored_hash: &str) -> Result<bool> {
    let (_, encoded) = decode(stored_hash)?;
    let matched = encoded.verify(plaintext.as_bytes());
    debug!("Password verification {}", if matched { "succeeded" } else { "failed" });
    Ok(matched)
}

/// The header of an encoded hash: `$<algorithm>$m=..,t=..,p=..[,keyid=..][,data=..]$<salt>$<digest>`.
#[derive(Debug, PartialEq, Eq)]
struct EncodedParams {
    algorithm: String,
    memory_kib: u32,
    passes: u32,
    lanes: u32,
}

fn malformed(what: &str) -> Error {
    Error::Format(what.to_string())
}

fn b64(field: &str, what: &str) -> Result<Vec<u8>> {
    base64::decode_config(field, base64::STANDARD_NO_PAD)
        .map_err(|_| Error::Format(format!("{} is not valid base64", what)))
}

fn number(pair: Option<&str>, key: &str) -> Result<u32> {
    pair.and_then(|pair| pair.strip_prefix(key))
        .and_then(|rest| rest.strip_prefix('='))
        .and_then(|value| value.parse().ok())
        .ok_or_else(|| Error::Format(format!("missing or bad '{}' parameter", key)))
}

impl EncodedParams {
    fn parse(stored_hash: &str) -> Result<EncodedParams> {
        let fields: Vec<&str> = stored_hash.split('$').collect();
        let (algorithm, params, salt, digest) = match fields.as_slice() {
            ["", algorithm, params, salt, digest] => (*algorithm, *params, *salt, *digest),
            _ => return Err(malformed("expected $algorithm$params$salt$digest")),
        };
        let variant = match algorithm {
            "argon2i" => Variant::Argon2i,
            "argon2d" => Variant::Argon2d,
            _ => return Err(Error::Format(format!("unknown algorithm '{}'", algorithm))),
        };

        let mut pairs = params.split(',').peekable();
        let memory_kib = number(pairs.next(), "m")?;
        let passes = number(pairs.next(), "t")?;
        let lanes = number(pairs.next(), "p")?;
        if let Some(keyid) = pairs.peek().copied().and_then(|pair| pair.strip_prefix("keyid=")) {
            if b64(keyid, "keyid")?.len() > MAX_KEY_LEN {
                return Err(malformed("keyid is too long"));
            }
            pairs.next();
        }
        if let Some(data) = pairs.peek().copied().and_then(|pair| pair.strip_prefix("data=")) {
            b64(data, "data")?;
            pairs.next();
        }
        if pairs.next().is_some() {
            return Err(malformed("unexpected parameter"));
        }
        Argon2::new(passes, lanes, memory_kib, variant)
            .map_err(|_| malformed("parameters out of range"))?;

        if b64(salt, "salt")?.len() < MIN_SALT_LEN {
            return Err(malformed("salt is too short"));
        }
        if b64(digest, "digest")?.len() < MIN_DIGEST_LEN {
            return Err(malformed("digest is too short"));
        }

        Ok(EncodedParams {
            algorithm: algorithm.to_string(),
            memory_kib,
            passes,
            lanes,
        })
    }
}
