//! Per-build shared state.
//!
//! Groups the HTTP client, progress reporter, script runner and cancellation
//! token so they can be passed around as one value. Nothing here is global.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::reporter::{NullReporter, Reporter};
use crate::scripts::{ChrootRunner, ScriptRunner};

/// Shared state for one build, cheap to clone.
#[derive(Clone)]
pub struct Context {
    /// HTTP client used for keys, indexes and archives.
    pub client: reqwest::Client,
    /// Progress sink.
    pub reporter: Arc<dyn Reporter>,
    /// Lifecycle script executor.
    pub runner: Arc<dyn ScriptRunner>,
    /// Cancels every in-flight operation of the build.
    pub cancel: CancellationToken,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("runner", &self.runner)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Build a context from its parts with a fresh cancellation token.
    pub fn new(
        client: reqwest::Client,
        reporter: Arc<dyn Reporter>,
        runner: Arc<dyn ScriptRunner>,
    ) -> Self {
        Self {
            client,
            reporter,
            runner,
            cancel: CancellationToken::new(),
        }
    }

    /// A silent context that runs scripts with [`ChrootRunner`].
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be constructed.
    pub fn with_defaults() -> Result<Self> {
        Ok(Self::new(
            http_client()?,
            Arc::new(NullReporter),
            Arc::new(ChrootRunner::default()),
        ))
    }

    /// Replace the reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Replace the script runner.
    #[must_use]
    pub fn with_runner(mut self, runner: Arc<dyn ScriptRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Use an externally owned cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// A clone whose token is cancelled with this one but can also be
    /// cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            ..self.clone()
        }
    }

    /// Fail once the token has fired.
    ///
    /// # Errors
    ///
    /// [`Error::Cancelled`].
    pub fn ensure_active(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// HTTP client with the apkroot user agent.
///
/// # Errors
///
/// Fails if the TLS backend cannot be initialised.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(crate::USER_AGENT)
        .build()
        .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))
}
