//! Domain services. Each public method resolves the caller from its
//! [`RequestContext`](crate::context::RequestContext), checks permissions and
//! runs in its own transaction.

pub mod access;
mod activity;
mod gpg_keys;
mod limits;
mod mirrors;
mod providers;
mod spool;

pub use gpg_keys::GpgKeyService;
pub use limits::{LimitChecker, StoreLimitChecker};
pub use mirrors::{CreateProviderVersionMirrorInput, ProviderMirrorService};
pub use providers::{
    CreateProviderInput, CreateProviderPlatformInput, CreateProviderVersionInput,
    ProviderRegistryService, UpdateProviderInput,
};
pub use spool::MAX_PACKAGE_SIZE;
