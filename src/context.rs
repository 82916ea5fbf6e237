use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::types::{Caller, SystemCaller};

/// Per-request state handed to every service entry point.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    caller: Option<Caller>,
    cancel: CancellationToken,
}

impl RequestContext {
    #[must_use]
    pub fn new(caller: Caller) -> Self {
        Self {
            caller: Some(caller),
            cancel: CancellationToken::new(),
        }
    }

    /// A context with no authenticated caller. Service methods reject it
    /// with `Unauthorized`.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn system() -> Self {
        Self::new(Caller::System(SystemCaller))
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn caller(&self) -> Result<&Caller> {
        self.caller.as_ref().ok_or(Error::Unauthorized)
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Drives `fut` to completion unless the request is cancelled first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Error::Cancelled),
            out = fut => out,
        }
    }
}
