//! API token format and hashing.
//!
//! A raw token reads `cairn_<kind>_<lookup>_<secret>`. `kind` is `u` for a
//! user and `s` for a service account, `lookup` locates the stored row and
//! only an Argon2id hash of the whole raw token is kept.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::RngCore;

use crate::error::{Error, Result};

const ARGON2_MEMORY: u32 = 64 * 1024; // 64KB
const ARGON2_ITERATIONS: u32 = 1;
const ARGON2_PARALLELISM: u32 = 4;
const ARGON2_OUTPUT_LEN: usize = 32;

const TOKEN_PREFIX: &str = "cairn";
const LOOKUP_BYTES: usize = 6;
const SECRET_BYTES: usize = 16;

/// The kind of subject a token authenticates as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    User,
    ServiceAccount,
}

impl TokenKind {
    fn code(self) -> &'static str {
        match self {
            TokenKind::User => "u",
            TokenKind::ServiceAccount => "s",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "u" => Some(TokenKind::User),
            "s" => Some(TokenKind::ServiceAccount),
            _ => None,
        }
    }
}

/// A freshly generated token. `raw` is handed to the caller once and never
/// persisted.
#[derive(Debug)]
pub struct GeneratedToken {
    pub raw: String,
    pub lookup: String,
    pub hash: String,
}

/// The parts of a raw token needed before its hash is checked.
#[derive(Debug, PartialEq, Eq)]
pub struct ParsedToken<'a> {
    pub kind: TokenKind,
    pub lookup: &'a str,
}

pub struct TokenGenerator {
    argon2: Argon2<'static>,
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenGenerator {
    #[must_use]
    pub fn new() -> Self {
        let params = Params::new(
            ARGON2_MEMORY,
            ARGON2_ITERATIONS,
            ARGON2_PARALLELISM,
            Some(ARGON2_OUTPUT_LEN),
        )
        .unwrap_or_default();

        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }

    pub fn generate(&self, kind: TokenKind) -> Result<GeneratedToken> {
        let lookup = random_hex(LOOKUP_BYTES);
        let secret = random_hex(SECRET_BYTES);
        let raw = format!("{TOKEN_PREFIX}_{}_{lookup}_{secret}", kind.code());
        let hash = self.hash(&raw)?;
        Ok(GeneratedToken { raw, lookup, hash })
    }

    fn hash(&self, raw: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(raw.as_bytes(), &salt)
            .map_err(|e| Error::internal(format!("failed to hash token: {e}")))?;
        Ok(hash.to_string())
    }

    /// Checks a raw token against a stored PHC hash.
    pub fn verify(&self, raw: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| Error::internal(format!("invalid token hash: {e}")))?;

        match self.argon2.verify_password(raw.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(Error::internal(format!("failed to verify token: {e}"))),
        }
    }
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn is_lower_hex(s: &str, bytes: usize) -> bool {
    s.len() == bytes * 2 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

pub fn parse_token(raw: &str) -> Result<ParsedToken<'_>> {
    let mut parts = raw.split('_');
    let (Some(TOKEN_PREFIX), Some(kind), Some(lookup), Some(secret), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(Error::InvalidTokenFormat);
    };

    let kind = TokenKind::from_code(kind).ok_or(Error::InvalidTokenFormat)?;
    if !is_lower_hex(lookup, LOOKUP_BYTES) || !is_lower_hex(secret, SECRET_BYTES) {
        return Err(Error::InvalidTokenFormat);
    }

    Ok(ParsedToken { kind, lookup })
}
