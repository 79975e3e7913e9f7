//! Awaiting a [`Deferred`] from an ordinary `async` context.
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::deferred::Deferred;
use crate::resolution::Resolution;
use crate::Error;

#[derive(Debug)]
enum WakerState {
    Fresh,
    Tainted,
}

struct Watch<T, E> {
    outcome: Option<Result<T, E>>,
    // `Err(Tainted)` once an outcome was delivered.
    waker: Result<Waker, WakerState>,
}

impl<T, E> Watch<T, E> {
    fn is_delivered(&self) -> bool {
        matches!(self.waker, Err(WakerState::Tainted))
    }

    fn deliver(&mut self, outcome: Result<T, E>) {
        if self.is_delivered() {
            return;
        }
        self.outcome = Some(outcome);
        if let Ok(waker) = std::mem::replace(&mut self.waker, Err(WakerState::Tainted)) {
            waker.wake()
        }
    }
}

/// Shared by both branches of the continuation. Dropped undelivered means the
/// runtime went away with the future still pending.
struct Orphan<T, E> {
    watch: Rc<RefCell<Watch<T, E>>>,
    reason: Option<E>,
}

impl<T, E> Orphan<T, E> {
    fn deliver(&self, outcome: Result<T, E>) {
        self.watch.borrow_mut().deliver(outcome);
    }
}

impl<T, E> Drop for Orphan<T, E> {
    fn drop(&mut self) {
        let Some(reason) = self.reason.take() else {
            return;
        };
        let Ok(mut watch) = self.watch.try_borrow_mut() else {
            return;
        };
        if !watch.is_delivered() {
            tracing::debug!("runtime dropped under a settled future");
            watch.deliver(Err(reason));
        }
    }
}

/// A `std::future::Future` that completes with a [`Deferred`]'s outcome.
///
/// It only makes progress while something drives the owning runtime. If the
/// runtime is dropped first it completes with [`Error::RuntimeDropped`];
/// polling it again after completion yields [`Error::PolledAfterCompletion`].
///
/// ```
/// use promise_aplus::{Error, Runtime};
/// use futures::executor::block_on;
/// let runtime = Runtime::new();
/// let settled = runtime.fulfilled::<&str, Error>("🍓").settled();
/// runtime.run_until_idle().unwrap();
/// assert_eq!(block_on(settled), Ok("🍓"));
/// ```
pub struct Settled<T, E> {
    watch: Rc<RefCell<Watch<T, E>>>,
    spent: E,
}

impl<T, E> Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    pub fn settled(&self) -> Settled<T, E> {
        let watch = Rc::new(RefCell::new(Watch {
            outcome: None,
            waker: Err(WakerState::Fresh),
        }));
        let orphan = Rc::new(Orphan {
            watch: watch.clone(),
            reason: Some(E::from(Error::RuntimeDropped)),
        });
        let on_rejected = orphan.clone();
        self.then(
            move |value| {
                orphan.deliver(Ok(value));
                Ok(Resolution::Value(()))
            },
            move |reason| {
                on_rejected.deliver(Err(reason));
                Ok(Resolution::Value(()))
            },
        );
        Settled {
            watch,
            spent: E::from(Error::PolledAfterCompletion),
        }
    }
}

impl<T, E> Unpin for Settled<T, E> {}

impl<T, E: Clone> Future for Settled<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut watch = this.watch.borrow_mut();
        if let Some(outcome) = watch.outcome.take() {
            return Poll::Ready(outcome);
        }
        if watch.is_delivered() {
            tracing::warn!("settled future polled after completion");
            return Poll::Ready(Err(this.spent.clone()));
        }
        watch.waker = Ok(cx.waker().clone());
        Poll::Pending
    }
}
