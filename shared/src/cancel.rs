use crate::error::ApiError;
use futures::future::{AbortHandle, Abortable};
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

#[derive(Default)]
struct Inner {
    cancelled: bool,
    next_id: u64,
    running: Vec<(u64, AbortHandle)>,
    hooks: Vec<Box<dyn FnOnce()>>,
}

/// Cancellation handle shared by every request of one upload cycle.
///
/// Clones observe the same state. Cancelling aborts all futures currently
/// running under [`CancelToken::run`] and fires the registered hooks once.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Rc<RefCell<Inner>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.borrow().cancelled
    }

    pub fn cancel(&self) {
        let (running, hooks) = {
            let mut inner = self.inner.borrow_mut();
            if inner.cancelled {
                return;
            }
            inner.cancelled = true;
            (
                std::mem::take(&mut inner.running),
                std::mem::take(&mut inner.hooks),
            )
        };

        log::debug!(
            "Cancelling {} running request(s), {} hook(s)",
            running.len(),
            hooks.len()
        );

        for (_, handle) in running {
            handle.abort();
        }
        for hook in hooks {
            hook();
        }
    }

    /// Registers `hook` to run on cancel. Runs it right away if the token
    /// has already been cancelled.
    pub fn on_cancel<F>(&self, hook: F)
    where
        F: FnOnce() + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        if inner.cancelled {
            drop(inner);
            hook();
        } else {
            inner.hooks.push(Box::new(hook));
        }
    }

    /// Drives `fut` to completion unless the token fires first.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, ApiError>
    where
        F: Future,
    {
        let (handle, registration) = AbortHandle::new_pair();
        let id = {
            let mut inner = self.inner.borrow_mut();
            if inner.cancelled {
                return Err(ApiError::Cancelled);
            }
            let id = inner.next_id;
            inner.next_id += 1;
            inner.running.push((id, handle));
            id
        };

        let result = Abortable::new(fut, registration).await;

        let mut inner = self.inner.borrow_mut();
        inner.running.retain(|(running_id, _)| *running_id != id);
        // a future that finished in the same poll as the cancel still loses
        if inner.cancelled {
            return Err(ApiError::Cancelled);
        }
        result.map_err(|_| ApiError::Cancelled)
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("CancelToken")
            .field("cancelled", &inner.cancelled)
            .field("running", &inner.running.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use futures::future::{self, Either};
    use std::cell::Cell;

    #[test]
    fn test_run_completes_when_not_cancelled() {
        let token = CancelToken::new();
        let value = block_on(token.run(async { 7 }));
        assert_eq!(value, Ok(7));
        assert_eq!(token.inner.borrow().running.len(), 0);
    }

    #[test]
    fn test_run_after_cancel_is_rejected() {
        let token = CancelToken::new();
        token.cancel();
        assert_eq!(block_on(token.run(async { 7 })), Err(ApiError::Cancelled));
    }

    #[test]
    fn test_cancel_aborts_pending_future() {
        let token = CancelToken::new();
        let canceller = token.clone();

        let outcome = block_on(async {
            let pending = Box::pin(token.run(future::pending::<()>()));
            let trigger = Box::pin(async move { canceller.cancel() });
            match future::select(pending, trigger).await {
                Either::Left(_) => panic!("pending future finished on its own"),
                Either::Right((_, pending)) => pending.await,
            }
        });

        assert_eq!(outcome, Err(ApiError::Cancelled));
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_result_discarded_when_cancelled_mid_flight() {
        let token = CancelToken::new();
        let trigger = token.clone();
        let outcome = block_on(token.run(async move {
            trigger.cancel();
            "late response"
        }));
        assert_eq!(outcome, Err(ApiError::Cancelled));
    }

    #[test]
    fn test_callback_reply_racing_cancel_is_dropped() {
        use futures::channel::oneshot;

        let token = CancelToken::new();
        let aborted = Rc::new(Cell::new(false));
        let flag = aborted.clone();
        token.on_cancel(move || flag.set(true));

        let (sender, receiver) = oneshot::channel::<&str>();
        let trigger = token.clone();
        let outcome = block_on(token.run(async move {
            assert!(sender.send("task-1").is_ok());
            trigger.cancel();
            receiver.await
        }));

        assert_eq!(outcome, Err(ApiError::Cancelled));
        assert!(aborted.get());
    }

    #[test]
    fn test_hooks_fire_once() {
        let token = CancelToken::new();
        let fired = Rc::new(Cell::new(0));

        let counter = fired.clone();
        token.on_cancel(move || counter.set(counter.get() + 1));
        token.cancel();
        token.cancel();
        assert_eq!(fired.get(), 1);

        let counter = fired.clone();
        token.on_cancel(move || counter.set(counter.get() + 10));
        assert_eq!(fired.get(), 11);
    }
}
