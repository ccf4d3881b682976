//! 单次赋值、可被多方等待的异步结果槽。
//! A single-assignment asynchronous result slot that many callers can await.

use crate::error::{Error, Result};
use std::fmt;
use tokio::sync::watch;

/// An asynchronous result slot that resolves exactly once.
///
/// The first call to [`resolve`](Self::resolve) wins; later calls are no-ops
/// that return `false`. Every caller of [`wait`](Self::wait), before or after
/// the resolution, observes the same outcome.
///
/// 一个只解决一次的异步结果槽。
///
/// 第一次调用 [`resolve`](Self::resolve) 生效，之后的调用不产生任何效果并返回 `false`。
/// 所有 [`wait`](Self::wait) 的调用者，无论在解决之前还是之后，都会观察到同一个结果。
pub struct PendingOperation<T> {
    slot: watch::Sender<Option<Result<T>>>,
}

impl<T: Clone> PendingOperation<T> {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self { slot }
    }

    /// Resolves the operation. Returns `false` if it was already resolved.
    ///
    /// 解决该操作。如果已经被解决则返回 `false`。
    pub fn resolve(&self, outcome: Result<T>) -> bool {
        let mut outcome = Some(outcome);
        self.slot.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = outcome.take();
            true
        })
    }

    pub fn succeed(&self, value: T) -> bool {
        self.resolve(Ok(value))
    }

    pub fn fail(&self, error: Error) -> bool {
        self.resolve(Err(error))
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Returns the outcome without waiting, if there is one.
    /// 不等待直接返回结果（如果已有）。
    pub fn outcome(&self) -> Option<Result<T>> {
        (*self.slot.borrow()).clone()
    }

    /// Waits for the operation to be resolved and returns its outcome.
    ///
    /// 等待操作被解决并返回其结果。
    pub async fn wait(&self) -> Result<T> {
        let mut rx = self.slot.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(slot) => (*slot).clone().unwrap_or(Err(Error::Cancelled)),
            Err(_) => Err(Error::Cancelled),
        }
    }
}

impl<T: Clone> Default for PendingOperation<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for PendingOperation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOperation")
            .field("resolved", &self.slot.borrow().is_some())
            .finish()
    }
}
