//! # Cairn
//!
//! A Terraform provider registry and provider network mirror, usable both as
//! a standalone binary and as a library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! cairn = { version = "0.0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use cairn::objectstore::FilesystemObjectStore;
//! use cairn::registry::{RegistryClient, RegistryClientConfig};
//! use cairn::server::{AppState, create_router};
//! use cairn::store::SqliteStore;
//!
//! let store = SqliteStore::new("./data/cairn.db")?;
//! store.initialize().await?;
//!
//! let objects = Arc::new(FilesystemObjectStore::new(
//!     "./data".as_ref(),
//!     "https://registry.example.com",
//!     "signing-secret",
//!     Duration::from_secs(900),
//! ));
//! let registry = RegistryClient::new(RegistryClientConfig::default())?;
//! let router = create_router(Arc::new(AppState::new(store, objects, registry)));
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `cairn` binary. Disable with `default-features = false`.

pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod objectstore;
pub mod registry;
pub mod server;
pub mod services;
pub mod store;
pub mod types;
pub mod verify;
