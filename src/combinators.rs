//! `all` and `race`, built only on `resolved`, `rejected`, `pair` and `then`.
use std::cell::RefCell;
use std::rc::Rc;

use crate::deferred::Deferred;
use crate::resolution::Resolution;
use crate::{Error, Runtime, Settle};

/// Input to a combinator.
///
/// `Single` stands for a caller passing something other than a sequence;
/// combinators reject it immediately instead of panicking, so the result can
/// always be chained.
pub enum Collection<T, E> {
    Sequence(Vec<Resolution<T, E>>),
    Single(Resolution<T, E>),
}

impl<T, E> From<Vec<Resolution<T, E>>> for Collection<T, E> {
    fn from(items: Vec<Resolution<T, E>>) -> Self {
        Collection::Sequence(items)
    }
}

impl<T, E> From<Vec<Deferred<T, E>>> for Collection<T, E> {
    fn from(futures: Vec<Deferred<T, E>>) -> Self {
        Collection::Sequence(futures.into_iter().map(Resolution::Future).collect())
    }
}

impl<T, E> FromIterator<Resolution<T, E>> for Collection<T, E> {
    fn from_iter<I: IntoIterator<Item = Resolution<T, E>>>(iter: I) -> Self {
        Collection::Sequence(iter.into_iter().collect())
    }
}

struct Gather<T> {
    results: Vec<Option<T>>,
    done: usize,
}

impl Runtime {
    /// Fulfills with every element's value, in input order, once all of them
    /// have fulfilled. The first rejection rejects the whole.
    ///
    /// ```
    /// use promise_aplus::{Error, Resolution, Runtime, State};
    /// let runtime = Runtime::new();
    /// let all = runtime.all::<i32, Error>(vec![Resolution::Value(1), Resolution::Value(2)]);
    /// runtime.run_until_idle().unwrap();
    /// assert_eq!(all.state(), State::Fulfilled(vec![1, 2]));
    /// ```
    pub fn all<T, E>(&self, input: impl Into<Collection<T, E>>) -> Deferred<Vec<T>, E>
    where
        T: Clone + 'static,
        E: Clone + From<Error> + 'static,
    {
        let items = match input.into() {
            Collection::Single(_) => {
                tracing::debug!("all called without a sequence");
                return self.rejected(E::from(Error::NotASequence { combinator: "all" }));
            }
            Collection::Sequence(items) if items.is_empty() => return self.fulfilled(Vec::new()),
            Collection::Sequence(items) => items,
        };

        let total = items.len();
        let (resolver, combined) = self.pair::<Vec<T>, E>();
        let gather = Rc::new(RefCell::new(Gather {
            results: (0..total).map(|_| None).collect(),
            done: 0,
        }));
        for (index, item) in items.into_iter().enumerate() {
            let on_fulfilled = resolver.clone();
            let on_rejected = resolver.clone();
            let gather = gather.clone();
            self.resolved(item).then(
                move |value| {
                    let complete = {
                        let mut gather = gather.borrow_mut();
                        gather.results[index] = Some(value);
                        gather.done += 1;
                        if gather.done == total {
                            std::mem::take(&mut gather.results)
                                .into_iter()
                                .collect::<Option<Vec<T>>>()
                        } else {
                            None
                        }
                    };
                    if let Some(values) = complete {
                        on_fulfilled.fulfill(values);
                    }
                    Ok(Resolution::Value(()))
                },
                move |reason| {
                    on_rejected.reject(reason);
                    Ok(Resolution::Value(()))
                },
            );
        }
        combined
    }

    /// Settles like whichever element settles first. An empty sequence
    /// rejects at once rather than staying pending forever.
    pub fn race<T, E>(&self, input: impl Into<Collection<T, E>>) -> Deferred<T, E>
    where
        T: Clone + 'static,
        E: Clone + From<Error> + 'static,
    {
        let items = match input.into() {
            Collection::Single(_) => {
                tracing::debug!("race called without a sequence");
                return self.rejected(E::from(Error::NotASequence { combinator: "race" }));
            }
            Collection::Sequence(items) if items.is_empty() => {
                tracing::debug!("race called with an empty sequence");
                return self.rejected(E::from(Error::EmptyRace));
            }
            Collection::Sequence(items) => items,
        };

        let (resolver, winner) = self.pair::<T, E>();
        for item in items {
            let on_fulfilled = resolver.clone();
            let on_rejected = resolver.clone();
            self.resolved(item).then(
                move |value| {
                    on_fulfilled.fulfill(value);
                    Ok(Resolution::Value(()))
                },
                move |reason| {
                    on_rejected.reject(reason);
                    Ok(Resolution::Value(()))
                },
            );
        }
        winner
    }
}
