//! Per-invocation execution options.

use std::fmt;
use std::sync::Arc;

use opflow_core::Backoff;

/// Computes the input of the next attempt from the input of the failed one.
pub type InputHook<I, D> = Arc<dyn Fn(&I, &D) -> I + Send + Sync>;

/// Default upper bound on handler attempts per invocation.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Retry policy for a single invocation.
pub struct RetryConfig<I, D> {
    /// Maximum number of handler attempts, including the first.
    pub max_attempts: u32,

    /// Delay schedule between attempts.
    pub backoff: Backoff,

    /// Run the handler exactly once.
    pub disable_retry: bool,

    /// Applied to the input after every failed attempt that will be retried.
    pub input_hook: Option<InputHook<I, D>>,
}

impl<I, D> RetryConfig<I, D> {
    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            disable_retry: true,
            ..Self::default()
        }
    }

    /// Set the maximum number of attempts.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Turn retries off or back on.
    pub fn with_disable_retry(mut self, disable_retry: bool) -> Self {
        self.disable_retry = disable_retry;
        self
    }

    /// Set the backoff schedule.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the input hook.
    pub fn with_input_hook(mut self, hook: impl Fn(&I, &D) -> I + Send + Sync + 'static) -> Self {
        self.input_hook = Some(Arc::new(hook));
        self
    }

    /// Number of attempts the retry loop will make at most.
    pub fn effective_attempts(&self) -> u32 {
        if self.disable_retry {
            1
        } else {
            self.max_attempts.max(1)
        }
    }
}

impl<I, D> Default for RetryConfig<I, D> {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Backoff::default(),
            disable_retry: false,
            input_hook: None,
        }
    }
}

impl<I, D> Clone for RetryConfig<I, D> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            backoff: self.backoff.clone(),
            disable_retry: self.disable_retry,
            input_hook: self.input_hook.clone(),
        }
    }
}

impl<I, D> fmt::Debug for RetryConfig<I, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("disable_retry", &self.disable_retry)
            .field("input_hook", &self.input_hook.is_some())
            .finish()
    }
}

/// Options for one call to the engine, layered over the engine defaults.
pub struct ExecuteOptions<I, D> {
    pub(crate) retry: RetryConfig<I, D>,
    pub(crate) reuse_previous: bool,
}

impl<I, D> ExecuteOptions<I, D> {
    /// Engine defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the retry policy.
    pub fn with_retry_config(mut self, retry: RetryConfig<I, D>) -> Self {
        self.retry = retry;
        self
    }

    /// Return an earlier successful report with the same definition and
    /// input instead of running the handler again.
    pub fn reuse_previous(mut self, reuse: bool) -> Self {
        self.reuse_previous = reuse;
        self
    }

    /// The retry policy in effect.
    pub fn retry_config(&self) -> &RetryConfig<I, D> {
        &self.retry
    }
}

impl<I, D> Default for ExecuteOptions<I, D> {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            reuse_previous: false,
        }
    }
}

impl<I, D> Clone for ExecuteOptions<I, D> {
    fn clone(&self) -> Self {
        Self {
            retry: self.retry.clone(),
            reuse_previous: self.reuse_previous,
        }
    }
}

impl<I, D> fmt::Debug for ExecuteOptions<I, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecuteOptions")
            .field("retry", &self.retry)
            .field("reuse_previous", &self.reuse_previous)
            .finish()
    }
}
