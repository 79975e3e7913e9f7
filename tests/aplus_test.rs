#[cfg(test)]
mod tests {
    use promise_aplus::{
        Deferred, Error, Resolution, Runtime, Settle, State, ThenCallbacks, Thenable,
    };
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    enum Reason {
        Core(Error),
        Msg(&'static str),
    }

    impl From<Error> for Reason {
        fn from(err: Error) -> Self {
            Reason::Core(err)
        }
    }

    type Future<T> = Deferred<T, Reason>;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    #[test]
    fn test_single_settlement() {
        init_tracing();
        let runtime = Runtime::new();
        let future: Future<i32> = runtime.future(|resolver| {
            resolver.fulfill(1);
            resolver.reject(Reason::Msg("late"));
            resolver.fulfill(2);
            Ok(())
        });
        assert_eq!(future.state(), State::Fulfilled(1));

        let future: Future<i32> = runtime.future(|resolver| {
            resolver.reject(Reason::Msg("first"));
            resolver.fulfill(2);
            Ok(())
        });
        assert_eq!(future.state(), State::Rejected(Reason::Msg("first")));
    }

    #[test]
    fn test_initializer_error_ignored_once_settled() {
        let runtime = Runtime::new();
        let resolved: Future<&str> = runtime.future(|resolver| {
            resolver.fulfill("some");
            Err(Reason::Msg("error"))
        });
        let rejected: Future<&str> = runtime.future(|resolver| {
            resolver.reject(Reason::Msg("some"));
            Err(Reason::Msg("error"))
        });
        let thrown: Future<&str> = runtime.future(|_| Err(Reason::Msg("error")));

        assert_eq!(resolved.state(), State::Fulfilled("some"));
        assert_eq!(rejected.state(), State::Rejected(Reason::Msg("some")));
        assert_eq!(thrown.state(), State::Rejected(Reason::Msg("error")));
    }

    #[test]
    fn test_initializer_error_ignored_while_following_thenable() {
        let runtime = Runtime::new();
        let stash: Rc<RefCell<Option<ThenCallbacks<i32, Reason>>>> = Rc::default();
        let keep = stash.clone();
        let future: Future<i32> = runtime.future(move |resolver| {
            resolver.resolve(Resolution::thenable(move |cb: ThenCallbacks<i32, Reason>| {
                *keep.borrow_mut() = Some(cb);
                Ok(())
            }));
            Err(Reason::Msg("error"))
        });
        assert!(future.is_pending());
        stash.borrow_mut().take().unwrap().fulfill(8);
        assert_eq!(future.state(), State::Fulfilled(8));
    }

    #[test]
    fn test_self_resolution_rejects() {
        let runtime = Runtime::new();
        let future: Future<i32> = runtime.future(|resolver| {
            resolver.resolve(Resolution::Future(resolver.future().unwrap()));
            Ok(())
        });
        assert_eq!(future.state(), State::Rejected(Reason::Core(Error::SelfResolution)));
    }

    #[test]
    fn test_thenable_resolving_with_target_rejects() {
        let runtime = Runtime::new();
        let future: Future<i32> = runtime.future(|resolver| {
            let target = resolver.future().unwrap();
            resolver.resolve(Resolution::thenable(move |cb: ThenCallbacks<i32, Reason>| {
                cb.resolve(Resolution::Future(target));
                Ok(())
            }));
            Ok(())
        });
        assert_eq!(future.state(), State::Rejected(Reason::Core(Error::SelfResolution)));
    }

    #[test]
    fn test_handler_returning_source_rejects_derived() {
        let runtime = Runtime::new();
        let source: Future<i32> = runtime.fulfilled(1);
        let again = source.clone();
        let derived = source.then_ok(move |_| Ok(Resolution::Future(again)));
        runtime.run_until_idle().unwrap();
        assert_eq!(derived.state(), State::Rejected(Reason::Core(Error::SelfResolution)));
        assert_eq!(source.state(), State::Fulfilled(1));
    }

    #[test]
    fn test_handler_returning_derived_rejects() {
        let runtime = Runtime::new();
        let (resolver, source) = runtime.pair::<i32, Reason>();
        let slot: Rc<RefCell<Option<Future<i32>>>> = Rc::default();
        let lookup = slot.clone();
        let derived = source.then_ok(move |_| {
            let derived = lookup.borrow_mut().take().unwrap();
            Ok(Resolution::Future(derived))
        });
        *slot.borrow_mut() = Some(derived.clone());
        resolver.fulfill(1);
        runtime.run_until_idle().unwrap();
        assert_eq!(derived.state(), State::Rejected(Reason::Core(Error::SelfResolution)));
    }

    #[test]
    fn test_thenable_unwraps() {
        let runtime = Runtime::new();
        let future: Future<i32> = runtime.resolved(Resolution::thenable(
            |cb: ThenCallbacks<i32, Reason>| {
                cb.fulfill(5);
                Ok(())
            },
        ));
        assert_eq!(future.state(), State::Fulfilled(5));
    }

    #[test]
    fn test_thenable_chain_into_native_future() {
        let runtime = Runtime::new();
        let (resolver, inner) = runtime.pair::<i32, Reason>();
        let future: Future<i32> = runtime.resolved(Resolution::thenable(
            move |cb: ThenCallbacks<i32, Reason>| {
                cb.resolve(Resolution::thenable(move |cb: ThenCallbacks<i32, Reason>| {
                    cb.resolve(Resolution::Future(inner));
                    Ok(())
                }));
                Ok(())
            },
        ));
        assert!(future.is_pending());
        resolver.reject(Reason::Msg("inner"));
        runtime.run_until_idle().unwrap();
        assert_eq!(future.state(), State::Rejected(Reason::Msg("inner")));
    }

    #[test]
    fn test_idempotent_inner_callbacks() {
        let runtime = Runtime::new();
        let future: Future<i32> = runtime.resolved(Resolution::thenable(
            |cb: ThenCallbacks<i32, Reason>| {
                cb.fulfill(1);
                cb.reject(Reason::Msg("second"));
                cb.fulfill(3);
                Err(Reason::Msg("thrown"))
            },
        ));
        let settlements = Rc::new(Cell::new(0));
        let fulfilled = settlements.clone();
        let rejected = settlements.clone();
        future.then(
            move |_| {
                fulfilled.set(fulfilled.get() + 1);
                Ok(Resolution::Value(()))
            },
            move |_| {
                rejected.set(rejected.get() + 1);
                Ok(Resolution::Value(()))
            },
        );
        runtime.run_until_idle().unwrap();
        assert_eq!(future.state(), State::Fulfilled(1));
        assert_eq!(settlements.get(), 1);
    }

    #[test]
    fn test_thenable_signalling_from_later_turn() {
        let runtime = Runtime::new();
        let poster = runtime.clone();
        let future: Future<i32> = runtime.resolved(Resolution::thenable(
            move |cb: ThenCallbacks<i32, Reason>| {
                poster.defer(move |_| {
                    cb.reject(Reason::Msg("late"));
                    cb.fulfill(2);
                });
                Ok(())
            },
        ));
        assert!(future.is_pending());
        runtime.run_until_idle().unwrap();
        assert_eq!(future.state(), State::Rejected(Reason::Msg("late")));
    }

    #[test]
    fn test_thenable_throwing_before_signal_rejects() {
        let runtime = Runtime::new();
        let future: Future<i32> = runtime.resolved(Resolution::thenable(
            |_cb: ThenCallbacks<i32, Reason>| Err(Reason::Msg("getter threw")),
        ));
        assert_eq!(future.state(), State::Rejected(Reason::Msg("getter threw")));
    }

    struct Nested(u32);

    impl Thenable<u32, Reason> for Nested {
        fn then(self: Box<Self>, callbacks: ThenCallbacks<u32, Reason>) -> Result<(), Reason> {
            match self.0 {
                0 => callbacks.fulfill(0),
                n => callbacks.resolve(Resolution::thenable(Nested(n - 1))),
            }
            Ok(())
        }
    }

    #[test]
    fn test_deep_thenable_chain_uses_constant_stack() {
        let runtime = Runtime::new();
        let future: Future<u32> = runtime.resolved(Resolution::thenable(Nested(100_000)));
        assert_eq!(future.state(), State::Fulfilled(0));
    }

    #[test]
    fn test_continuations_run_in_attachment_order() {
        let runtime = Runtime::new();
        let (resolver, future) = runtime.pair::<&str, Reason>();
        let calls = Rc::new(RefCell::new(Vec::new()));
        for name in ["fn1", "fn2", "fn3"] {
            let calls = calls.clone();
            future.then_ok(move |x| {
                calls.borrow_mut().push((name, x));
                Ok(Resolution::Value(()))
            });
        }
        resolver.fulfill("x");
        assert!(calls.borrow().is_empty());
        runtime.run_until_idle().unwrap();
        assert_eq!(
            *calls.borrow(),
            vec![("fn1", "x"), ("fn2", "x"), ("fn3", "x")]
        );
    }

    #[test]
    fn test_then_on_fulfilled_is_never_synchronous() {
        let runtime = Runtime::new();
        let future: Future<i32> = runtime.fulfilled(1);
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        future.then_ok(move |_| {
            flag.set(true);
            Ok(Resolution::Value(()))
        });
        assert!(!ran.get());
        assert!(runtime.turn());
        assert!(ran.get());
    }

    #[test]
    fn test_continuation_attached_while_draining() {
        let runtime = Runtime::new();
        let future: Future<i32> = runtime.fulfilled(1);
        let order = Rc::new(RefCell::new(Vec::new()));
        let outer = order.clone();
        let again = future.clone();
        future.then_ok(move |_| {
            outer.borrow_mut().push("outer");
            let inner = outer.clone();
            again.then_ok(move |_| {
                inner.borrow_mut().push("inner");
                Ok(Resolution::Value(()))
            });
            Ok(Resolution::Value(()))
        });
        let sibling = order.clone();
        future.then_ok(move |_| {
            sibling.borrow_mut().push("sibling");
            Ok(Resolution::Value(()))
        });
        runtime.run_until_idle().unwrap();
        assert_eq!(*order.borrow(), vec!["outer", "sibling", "inner"]);
    }

    #[test]
    fn test_handler_error_rejects_derived() {
        let runtime = Runtime::new();
        let derived = runtime
            .fulfilled::<i32, Reason>(1)
            .then_ok::<i32, _>(|_| Err(Reason::Msg("handler threw")));
        runtime.run_until_idle().unwrap();
        assert_eq!(derived.state(), State::Rejected(Reason::Msg("handler threw")));
    }

    #[test]
    fn test_missing_handlers_pass_through() {
        type Handler = fn(i32) -> Result<Resolution<i32, Reason>, Reason>;
        type Recover = fn(Reason) -> Result<Resolution<i32, Reason>, Reason>;

        let runtime = Runtime::new();
        let value = runtime
            .fulfilled::<i32, Reason>(7)
            .then_opt(None::<Handler>, None::<Recover>);
        let reason = runtime
            .rejected::<i32, Reason>(Reason::Msg("no"))
            .then_opt(None::<Handler>, None::<Recover>)
            .map(|v| v + 1);
        runtime.run_until_idle().unwrap();
        assert_eq!(value.state(), State::Fulfilled(7));
        assert_eq!(reason.state(), State::Rejected(Reason::Msg("no")));
    }

    #[test]
    fn test_handler_returning_pending_future_chains() {
        let runtime = Runtime::new();
        let (resolver, later) = runtime.pair::<String, Reason>();
        let derived = runtime
            .fulfilled::<i32, Reason>(1)
            .then_ok(move |_| Ok(Resolution::Future(later)));
        runtime.run_until_idle().unwrap();
        assert!(derived.is_pending());
        resolver.fulfill("🍓".to_string());
        runtime.run_until_idle().unwrap();
        assert_eq!(derived.state(), State::Fulfilled("🍓".to_string()));
    }

    #[test]
    fn test_rejection_handler_recovers() {
        let runtime = Runtime::new();
        let derived = runtime
            .rejected::<i32, Reason>(Reason::Msg("💥"))
            .then(
                |v| Ok(Resolution::Value(v)),
                |reason| match reason {
                    Reason::Msg(msg) => Ok(Resolution::Value(msg.len() as i32)),
                    other => Err(other),
                },
            );
        runtime.run_until_idle().unwrap();
        assert_eq!(derived.state(), State::Fulfilled(4));
    }

    #[test]
    fn test_future_from_other_runtime_is_thenable() {
        let home = Runtime::new();
        let away = Runtime::new();
        let (resolver, foreign) = away.pair::<i32, Reason>();
        let local: Future<i32> = home.resolved(Resolution::Future(foreign));
        resolver.fulfill(11);
        home.run_until_idle().unwrap();
        assert!(local.is_pending());
        away.run_until_idle().unwrap();
        assert_eq!(local.state(), State::Fulfilled(11));
    }

    #[test]
    fn test_unhandled_rejections_reported() {
        let runtime = Runtime::new();
        let quiet: Future<i32> = runtime.rejected(Reason::Msg("nobody listens"));
        let watched: Future<i32> = runtime.rejected(Reason::Msg("caught"));
        let recovered = watched.catch(|_| Ok(Resolution::Value(0)));
        runtime.run_until_idle().unwrap();
        assert_eq!(recovered.state(), State::Fulfilled(0));
        assert_eq!(runtime.unhandled_rejections(), vec![quiet.id()]);
    }

    #[test]
    fn test_never_settling_future_keeps_continuations() {
        let runtime = Runtime::new();
        let (_resolver, future) = runtime.pair::<i32, Reason>();
        let derived = future.map(|v| v + 1);
        runtime.run_until_idle().unwrap();
        assert!(derived.is_pending());
        assert_eq!(runtime.waiting(future.id()), 1);
    }
}
