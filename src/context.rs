//! # Request Context
//!
//! Carries caller-supplied cancellation and an optional deadline down to every
//! delegate store call.
//!
//! ```rust
//! use dual_writer::context::RequestContext;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (ctx, handle) = RequestContext::with_cancel();
//!     let ctx = ctx.with_timeout(Duration::from_secs(5));
//!
//!     assert!(ctx.run(async { 42 }).await.is_ok());
//!     handle.cancel();
//!     assert!(ctx.is_done());
//! }
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Why a context stopped accepting work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Cancelled,
    DeadlineExceeded,
}

impl std::fmt::Display for Interrupt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Interrupt::Cancelled => write!(f, "context cancelled"),
            Interrupt::DeadlineExceeded => write!(f, "context deadline exceeded"),
        }
    }
}

/// Cancellation and deadline for one request.
///
/// Cheap to clone; clones observe the same cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancel: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// Cancels every clone of the context it was created with.
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl RequestContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// A cancellable context and the handle that cancels it.
    pub fn with_cancel() -> (Self, CancelHandle) {
        let (sender, receiver) = watch::channel(false);
        let ctx = Self {
            cancel: Some(receiver),
            deadline: None,
        };
        (ctx, CancelHandle { sender })
    }

    /// Tightens the deadline to `timeout` from now. An earlier deadline is kept.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns why the context is done, if it is.
    pub fn err(&self) -> Option<Interrupt> {
        if let Some(cancel) = &self.cancel {
            if *cancel.borrow() {
                return Some(Interrupt::Cancelled);
            }
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Interrupt::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Drives `fut` until it completes or the context is done.
    ///
    /// A context that is already done never polls `fut`.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Interrupt> {
        if let Some(interrupt) = self.err() {
            return Err(interrupt);
        }

        let cancelled = {
            let cancel = self.cancel.clone();
            async move {
                let Some(mut cancel) = cancel else {
                    return std::future::pending::<()>().await;
                };
                loop {
                    if *cancel.borrow_and_update() {
                        return;
                    }
                    // Sender gone: cancellation can no longer happen.
                    if cancel.changed().await.is_err() {
                        return std::future::pending::<()>().await;
                    }
                }
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Err(Interrupt::Cancelled),
            _ = expired => Err(Interrupt::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}
