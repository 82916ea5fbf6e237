//! Checksum manifest parsing and detached OpenPGP signature checks.
//!
//! Everything here is a pure transform over caller-supplied bytes: no network,
//! no disk, no database.

mod checksums;
mod signature;

pub use checksums::{ChecksumError, Checksums, hex_checksums, parse_checksums, verify_checksums};
pub use signature::{
    PublicKeyInfo, SignatureError, format_key_id, inspect_public_key, parse_signature,
    signature_issuer_key_id, verify_detached,
};
