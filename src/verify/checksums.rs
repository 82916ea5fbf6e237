use std::collections::BTreeMap;
use std::io::Read;

use thiserror::Error;

use super::signature::{SignatureError, verify_detached};

/// Filename to SHA-256 digest, as listed in a SHA256SUMS manifest.
pub type Checksums = BTreeMap<String, [u8; 32]>;

#[derive(Debug, Error)]
pub enum ChecksumError {
    #[error("failed to read checksum manifest: {0}")]
    Read(#[from] std::io::Error),
    #[error("checksum manifest is not valid UTF-8")]
    Encoding,
    #[error("line {line}: expected 2 fields, found {found}")]
    FieldCount { line: usize, found: usize },
    #[error("line {line}: invalid checksum hex: {source}")]
    InvalidHex {
        line: usize,
        source: hex::FromHexError,
    },
    #[error("line {line}: checksum must be 32 bytes, got {len}")]
    InvalidLength { line: usize, len: usize },
    #[error("checksum manifest contains no entries")]
    Empty,
    #[error(transparent)]
    Signature(#[from] SignatureError),
}

/// Parses `<sha256 hex> <filename>` lines.
pub fn parse_checksums(data: &[u8]) -> Result<Checksums, ChecksumError> {
    let text = std::str::from_utf8(data).map_err(|_| ChecksumError::Encoding)?;
    let mut checksums = Checksums::new();

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 2 {
            return Err(ChecksumError::FieldCount {
                line: line_no,
                found: fields.len(),
            });
        }

        let decoded = hex::decode(fields[0]).map_err(|source| ChecksumError::InvalidHex {
            line: line_no,
            source,
        })?;
        let digest: [u8; 32] =
            decoded
                .as_slice()
                .try_into()
                .map_err(|_| ChecksumError::InvalidLength {
                    line: line_no,
                    len: decoded.len(),
                })?;

        checksums.insert(fields[1].to_string(), digest);
    }

    if checksums.is_empty() {
        return Err(ChecksumError::Empty);
    }

    Ok(checksums)
}

/// Reads a manifest once, parses it, and checks the detached signature over
/// those same bytes against the candidate keys. Any one key is sufficient.
pub fn verify_checksums<R: Read>(
    mut manifest: R,
    signature: &[u8],
    armored_keys: &[String],
) -> Result<Checksums, ChecksumError> {
    let mut data = Vec::new();
    manifest.read_to_end(&mut data)?;

    let checksums = parse_checksums(&data)?;
    verify_detached(&data, signature, armored_keys)?;

    Ok(checksums)
}

/// Serde adapter writing digests as lowercase hex strings.
pub mod hex_checksums {
    use std::collections::BTreeMap;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::Checksums;

    pub fn serialize<S: Serializer>(value: &Checksums, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded: BTreeMap<&str, String> = value
            .iter()
            .map(|(name, digest)| (name.as_str(), hex::encode(digest)))
            .collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Checksums, D::Error> {
        let encoded = BTreeMap::<String, String>::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|(name, digest)| {
                let mut bytes = [0u8; 32];
                hex::decode_to_slice(&digest, &mut bytes).map_err(D::Error::custom)?;
                Ok((name, bytes))
            })
            .collect()
    }
}
