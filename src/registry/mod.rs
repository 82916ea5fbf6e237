//! Provider Registry Protocol: addressing, wire types and the upstream client.

mod address;
mod client;
pub mod dto;

pub use address::{
    AddressError, ProviderAddress, canonical_filename, normalize_hostname, validate_provider_part,
};
pub use client::{PackageInfo, RegistryClient, RegistryClientConfig, RegistryClientError};
