use std::io::Cursor;

use pgp::types::PublicKeyTrait;
use pgp::{Deserializable, SignedPublicKey, StandaloneSignature};
use thiserror::Error;

const ARMOR_HEADER: &[u8] = b"-----BEGIN PGP";

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("malformed signature: {0}")]
    MalformedSignature(String),
    #[error("malformed public key: {0}")]
    MalformedKey(String),
    #[error("signature does not name an issuer key id")]
    MissingIssuer,
    #[error("no matching key")]
    NoMatchingKey,
}

/// Identity of an armored public key, as stored on a `GpgKey` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyInfo {
    pub key_id: u64,
    pub fingerprint: String,
}

/// Formats a 64-bit key id the way GnuPG prints long key ids.
#[must_use]
pub fn format_key_id(key_id: u64) -> String {
    format!("{key_id:016X}")
}

/// Parses the first signature packet, accepting either ASCII armor or the
/// binary form served by most registries for `SHA256SUMS.sig`.
pub fn parse_signature(data: &[u8]) -> Result<StandaloneSignature, SignatureError> {
    let trimmed = data.trim_ascii_start();
    let parsed = if trimmed.starts_with(ARMOR_HEADER) {
        StandaloneSignature::from_armor_single(Cursor::new(trimmed)).map(|(sig, _)| sig)
    } else {
        StandaloneSignature::from_bytes(Cursor::new(data))
    };
    parsed.map_err(|e| SignatureError::MalformedSignature(e.to_string()))
}

/// Reads the issuer key id from the first packet of a detached signature.
pub fn signature_issuer_key_id(data: &[u8]) -> Result<u64, SignatureError> {
    let signature = parse_signature(data)?;
    let issuer = signature
        .signature
        .issuer()
        .into_iter()
        .next()
        .ok_or(SignatureError::MissingIssuer)?;
    key_id_to_u64(issuer.as_ref())
}

pub fn inspect_public_key(armor: &str) -> Result<PublicKeyInfo, SignatureError> {
    let key = parse_public_key(armor)?;
    Ok(PublicKeyInfo {
        key_id: key_id_to_u64(key.key_id().as_ref())?,
        fingerprint: hex::encode_upper(key.fingerprint().as_bytes()),
    })
}

/// Checks a detached signature over `content` against each candidate key in
/// order and returns the index of the first key that verifies it.
pub fn verify_detached(
    content: &[u8],
    signature: &[u8],
    armored_keys: &[String],
) -> Result<usize, SignatureError> {
    let signature = parse_signature(signature)?;

    for (idx, armor) in armored_keys.iter().enumerate() {
        let key = match parse_public_key(armor) {
            Ok(key) => key,
            Err(e) => {
                tracing::debug!("skipping candidate key {idx}: {e}");
                continue;
            }
        };

        if signature.verify(&key, content).is_ok() {
            return Ok(idx);
        }

        if key
            .public_subkeys
            .iter()
            .any(|subkey| signature.verify(&subkey.key, content).is_ok())
        {
            return Ok(idx);
        }
    }

    Err(SignatureError::NoMatchingKey)
}

fn parse_public_key(armor: &str) -> Result<SignedPublicKey, SignatureError> {
    SignedPublicKey::from_armor_single(Cursor::new(armor.as_bytes()))
        .map(|(key, _)| key)
        .map_err(|e| SignatureError::MalformedKey(e.to_string()))
}

fn key_id_to_u64(bytes: &[u8]) -> Result<u64, SignatureError> {
    let bytes = <[u8; 8]>::try_from(bytes).map_err(|_| SignatureError::MissingIssuer)?;
    Ok(u64::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNER1: &str = include_str!("../../tests/fixtures/signer1.asc");
    const SIGNER2: &str = include_str!("../../tests/fixtures/signer2.asc");
    const SIGNER3: &str = include_str!("../../tests/fixtures/signer3.asc");
    const SHA256SUMS: &[u8] = include_bytes!("../../tests/fixtures/SHA256SUMS");
    const SIG_BINARY: &[u8] = include_bytes!("../../tests/fixtures/SHA256SUMS.sig");
    const SIG_ARMORED: &[u8] = include_bytes!("../../tests/fixtures/SHA256SUMS.sig.asc");

    const SIGNER2_KEY_ID: u64 = 0x2AAA_491E_8FAF_7966;

    fn keys(armors: &[&str]) -> Vec<String> {
        armors.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_second_of_three_keys_verifies() {
        let candidates = keys(&[SIGNER1, SIGNER2, SIGNER3]);
        assert_eq!(verify_detached(SHA256SUMS, SIG_BINARY, &candidates).unwrap(), 1);
        assert_eq!(verify_detached(SHA256SUMS, SIG_ARMORED, &candidates).unwrap(), 1);
    }

    #[test]
    fn test_no_candidate_verifies() {
        let candidates = keys(&[SIGNER1, SIGNER3, SIGNER1]);
        let err = verify_detached(SHA256SUMS, SIG_BINARY, &candidates).unwrap_err();
        assert!(matches!(err, SignatureError::NoMatchingKey));
        assert_eq!(err.to_string(), "no matching key");
    }

    #[test]
    fn test_unparseable_candidate_is_skipped() {
        let candidates = keys(&["not a key", SIGNER2]);
        assert_eq!(verify_detached(SHA256SUMS, SIG_BINARY, &candidates).unwrap(), 1);
    }

    #[test]
    fn test_tampered_content_fails() {
        let mut tampered = SHA256SUMS.to_vec();
        tampered[0] = if tampered[0] == b'0' { b'1' } else { b'0' };
        let candidates = keys(&[SIGNER2]);
        assert!(matches!(
            verify_detached(&tampered, SIG_BINARY, &candidates),
            Err(SignatureError::NoMatchingKey)
        ));
    }

    #[test]
    fn test_issuer_key_id() {
        assert_eq!(signature_issuer_key_id(SIG_BINARY).unwrap(), SIGNER2_KEY_ID);
        assert_eq!(signature_issuer_key_id(SIG_ARMORED).unwrap(), SIGNER2_KEY_ID);
        assert!(matches!(
            signature_issuer_key_id(b"garbage"),
            Err(SignatureError::MalformedSignature(_))
        ));
    }

    #[test]
    fn test_inspect_public_key() {
        let info = inspect_public_key(SIGNER2).unwrap();
        assert_eq!(info.key_id, SIGNER2_KEY_ID);
        assert_eq!(info.fingerprint, "39CA952B25DC3D571D2EB9A72AAA491E8FAF7966");
        assert_eq!(format_key_id(info.key_id), "2AAA491E8FAF7966");
    }
}
