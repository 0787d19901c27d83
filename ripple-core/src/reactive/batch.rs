//! Batching and untracked reads on the current runtime.

use super::runtime::Runtime;
use crate::error::Result;

/// Run `f` with all writes coalesced; effects run once when the outermost
/// batch ends.
///
/// ```rust
/// use ripple_core::reactive::{batch, Signal};
///
/// let a = Signal::new(1);
/// let b = Signal::new(2);
/// batch(|| {
///     a.set(10);
///     b.set(20);
/// });
/// ```
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
    Runtime::current().batch(f)
}

/// Like [`batch`], returning the first effect failure of the flush.
pub fn try_batch<T>(f: impl FnOnce() -> T) -> Result<T> {
    Runtime::current().try_batch(f)
}

/// Run `f` without recording reads as dependencies.
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    Runtime::current().untrack(f)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::reactive::{Effect, Signal};

    #[test]
    fn batch_defers_effects_until_the_outermost_end() {
        let source = Signal::new(0);
        let runs = Rc::new(Cell::new(0));
        let last = Rc::new(Cell::new(0));

        let _effect = Effect::new({
            let (source, runs, last) = (source.clone(), runs.clone(), last.clone());
            move || {
                runs.set(runs.get() + 1);
                last.set(source.get());
            }
        });

        batch(|| {
            source.set(1);
            batch(|| source.set(2));
            assert_eq!(runs.get(), 1);
        });

        assert_eq!(runs.get(), 2);
        assert_eq!(last.get(), 2);
    }

    #[test]
    fn batch_returns_the_closure_value() {
        assert_eq!(batch(|| 7), 7);
        assert_eq!(try_batch(|| "ok"), Ok("ok"));
    }

    #[test]
    fn untracked_reads_do_not_subscribe() {
        let tracked = Signal::new(0);
        let hidden = Signal::new(0);
        let runs = Rc::new(Cell::new(0));

        let _effect = Effect::new({
            let (tracked, hidden, runs) = (tracked.clone(), hidden.clone(), runs.clone());
            move || {
                runs.set(runs.get() + 1);
                tracked.get();
                untrack(|| hidden.get());
            }
        });

        hidden.set(1);
        assert_eq!(runs.get(), 1);
        tracked.set(1);
        assert_eq!(runs.get(), 2);
    }
}
