//! Advice executor.
//!
//! An [`AdviceChain`] wraps one terminal [`Resolver`] in an ordered list of
//! [`Advice`]s. Each invocation walks the chain with a fresh [`Next`] cursor
//! that borrows the immutable advice array; the cursor is consumed by
//! [`Next::proceed`], so an advice can continue deeper at most once.
//!
//! An advice can:
//! - inspect or mutate the input before calling `proceed`;
//! - skip `proceed` and return its own result, short-circuiting the rest of
//!   the chain and the terminal resolver;
//! - translate or recover from errors returned by `proceed`.
//!
//! # Example
//!
//! ```rust,ignore
//! let trim = |raw: &mut Option<String>, next: Next<'_, Option<String>, Value>| {
//!     if let Some(s) = raw.as_mut() {
//!         *s = s.trim().to_string();
//!     }
//!     next.proceed(raw)
//! };
//! let chain = AdviceChain::new(vec![Arc::new(trim)], converter);
//! ```

use std::fmt;
use std::sync::Arc;

use spindle_core::error::BoxError;

use crate::resolver::Resolver;

/// A decorator around a resolver.
pub trait Advice<I: ?Sized, O>: Send + Sync {
    /// Runs around the rest of the chain.
    fn around(&self, input: &mut I, next: Next<'_, I, O>) -> Result<O, BoxError>;
}

impl<I, O, F> Advice<I, O> for F
where
    I: ?Sized,
    F: Fn(&mut I, Next<'_, I, O>) -> Result<O, BoxError> + Send + Sync,
{
    fn around(&self, input: &mut I, next: Next<'_, I, O>) -> Result<O, BoxError> {
        self(input, next)
    }
}

/// Cursor into an advice chain, valid for one invocation.
pub struct Next<'a, I: ?Sized, O> {
    advices: &'a [Arc<dyn Advice<I, O>>],
    terminal: &'a dyn Resolver<I, O>,
}

impl<'a, I: ?Sized, O> Next<'a, I, O> {
    /// Creates a cursor at the start of `advices`.
    pub fn new(advices: &'a [Arc<dyn Advice<I, O>>], terminal: &'a dyn Resolver<I, O>) -> Self {
        Self { advices, terminal }
    }

    /// Runs the next advice, or the terminal resolver if none is left.
    pub fn proceed(self, input: &mut I) -> Result<O, BoxError> {
        match self.advices.split_first() {
            Some((advice, rest)) => advice.around(input, Next::new(rest, self.terminal)),
            None => self.terminal.resolve(input),
        }
    }

    /// Advices still ahead of the terminal resolver.
    pub fn remaining(&self) -> usize {
        self.advices.len()
    }
}

impl<I: ?Sized, O> fmt::Debug for Next<'_, I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.advices.len())
            .finish_non_exhaustive()
    }
}

/// An immutable advice array around one terminal resolver.
pub struct AdviceChain<I: ?Sized, O> {
    advices: Arc<[Arc<dyn Advice<I, O>>]>,
    terminal: Arc<dyn Resolver<I, O>>,
}

impl<I: ?Sized, O> Clone for AdviceChain<I, O> {
    fn clone(&self) -> Self {
        Self {
            advices: Arc::clone(&self.advices),
            terminal: Arc::clone(&self.terminal),
        }
    }
}

impl<I: ?Sized, O> AdviceChain<I, O> {
    /// Creates a chain. `advices` run in the given order.
    pub fn new(advices: Vec<Arc<dyn Advice<I, O>>>, terminal: Arc<dyn Resolver<I, O>>) -> Self {
        Self {
            advices: advices.into(),
            terminal,
        }
    }

    /// Runs the chain with a fresh cursor.
    pub fn invoke(&self, input: &mut I) -> Result<O, BoxError> {
        Next::new(&self.advices, &*self.terminal).proceed(input)
    }

    /// Number of advices.
    pub fn len(&self) -> usize {
        self.advices.len()
    }

    /// Returns true if the chain only runs the terminal resolver.
    pub fn is_empty(&self) -> bool {
        self.advices.is_empty()
    }
}

impl<I: ?Sized, O> Resolver<I, O> for AdviceChain<I, O> {
    fn resolve(&self, input: &mut I) -> Result<O, BoxError> {
        self.invoke(input)
    }
}

impl<I: ?Sized, O> fmt::Debug for AdviceChain<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdviceChain")
            .field("advices", &self.advices.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;

    type Log = Arc<Mutex<Vec<String>>>;

    fn advice(f: impl Advice<i32, i32> + 'static) -> Arc<dyn Advice<i32, i32>> {
        Arc::new(f)
    }

    fn terminal(f: impl Resolver<i32, i32> + 'static) -> Arc<dyn Resolver<i32, i32>> {
        Arc::new(f)
    }

    struct Recording {
        name: &'static str,
        log: Log,
        proceeded: AtomicUsize,
    }

    impl Advice<i32, i32> for Recording {
        fn around(&self, input: &mut i32, next: Next<'_, i32, i32>) -> Result<i32, BoxError> {
            self.log.lock().push(format!("{} before", self.name));
            self.proceeded.fetch_add(1, Ordering::SeqCst);
            let out = next.proceed(input)?;
            self.log.lock().push(format!("{} after", self.name));
            Ok(out)
        }
    }

    fn recording(name: &'static str, log: &Log) -> Arc<Recording> {
        Arc::new(Recording {
            name,
            log: Arc::clone(log),
            proceeded: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_each_advice_and_terminal_run_once_in_order() {
        let log: Log = Arc::default();
        let advices: Vec<_> = ["a", "b", "c"].iter().map(|n| recording(*n, &log)).collect();
        let terminal_calls = Arc::new(AtomicUsize::new(0));
        let calls = Arc::clone(&terminal_calls);
        let terminal_log = Arc::clone(&log);
        let doubling = terminal(move |input: &mut i32| -> Result<i32, BoxError> {
            calls.fetch_add(1, Ordering::SeqCst);
            terminal_log.lock().push("terminal".to_string());
            Ok(*input * 2)
        });

        let chain = AdviceChain::new(
            advices
                .iter()
                .map(|a| Arc::clone(a) as Arc<dyn Advice<i32, i32>>)
                .collect(),
            doubling,
        );

        assert_eq!(chain.invoke(&mut 21).unwrap(), 42);
        assert_eq!(terminal_calls.load(Ordering::SeqCst), 1);
        for advice in &advices {
            assert_eq!(advice.proceeded.load(Ordering::SeqCst), 1);
        }
        assert_eq!(
            *log.lock(),
            [
                "a before", "b before", "c before", "terminal", "c after", "b after", "a after"
            ]
        );

        // A second invocation starts from a fresh cursor.
        assert_eq!(chain.invoke(&mut 1).unwrap(), 2);
        assert_eq!(terminal_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_short_circuit_skips_terminal() {
        let terminal_calls = Arc::new(AtomicUsize::new(0));
        let calls = Arc::clone(&terminal_calls);
        let zero = terminal(move |_: &mut i32| -> Result<i32, BoxError> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        });
        let negative = advice(|input: &mut i32, next: Next<'_, i32, i32>| {
            if *input < 0 { Ok(-1) } else { next.proceed(input) }
        });

        let chain = AdviceChain::new(vec![negative], zero);
        assert_eq!(chain.invoke(&mut -5).unwrap(), -1);
        assert_eq!(terminal_calls.load(Ordering::SeqCst), 0);
        assert_eq!(chain.invoke(&mut 5).unwrap(), 0);
        assert_eq!(terminal_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mutation_and_error_translation() {
        let bounded = terminal(|input: &mut i32| -> Result<i32, BoxError> {
            if *input > 100 {
                Err("too large".into())
            } else {
                Ok(*input)
            }
        });
        let double = advice(|input: &mut i32, next: Next<'_, i32, i32>| {
            *input *= 2;
            next.proceed(input)
        });
        let clamp = advice(|input: &mut i32, next: Next<'_, i32, i32>| {
            next.proceed(input).or_else(|_| Ok::<_, BoxError>(100))
        });

        let chain = AdviceChain::new(vec![clamp, double], bounded);
        assert_eq!(chain.invoke(&mut 10).unwrap(), 20);
        assert_eq!(chain.invoke(&mut 80).unwrap(), 100);
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_chains_compose() {
        let inner = AdviceChain::new(
            vec![advice(|i: &mut i32, next: Next<'_, i32, i32>| {
                *i += 1;
                next.proceed(i)
            })],
            terminal(|i: &mut i32| -> Result<i32, BoxError> { Ok(*i) }),
        );
        let outer = AdviceChain::new(
            vec![advice(|i: &mut i32, next: Next<'_, i32, i32>| {
                *i *= 10;
                next.proceed(i)
            })],
            terminal(inner),
        );
        assert_eq!(outer.invoke(&mut 1).unwrap(), 11);
    }
}
