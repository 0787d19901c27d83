//! Creation options shared by signals and computeds.

use std::fmt;
use std::rc::Rc;

/// Equality check deciding whether a new value counts as a change.
pub(crate) type EqualsFn<T> = Rc<dyn Fn(&T, &T) -> bool>;

/// Options for [`Signal`](super::Signal) and [`Computed`](super::Computed).
///
/// By default a new value equal (`PartialEq`) to the old one is not a change
/// and notifies nobody.
///
/// ```rust
/// use ripple_core::reactive::{Options, Signal};
///
/// // Compare by length only
/// let name = Signal::with_options(
///     String::from("abc"),
///     Options::with_equals(|a: &String, b: &String| a.len() == b.len()),
/// );
/// name.set(String::from("xyz"));
/// assert_eq!(name.get(), "abc");
/// ```
pub struct Options<T> {
    pub(crate) equals: EqualsFn<T>,
}

impl<T: 'static> Options<T> {
    /// Use a custom equality check.
    pub fn with_equals(equals: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self {
            equals: Rc::new(equals),
        }
    }

    /// Treat every write as a change.
    pub fn never_equal() -> Self {
        Self::with_equals(|_, _| false)
    }
}

impl<T: PartialEq + 'static> Default for Options<T> {
    fn default() -> Self {
        Self::with_equals(|a: &T, b: &T| a == b)
    }
}

impl<T> Clone for Options<T> {
    fn clone(&self) -> Self {
        Self {
            equals: Rc::clone(&self.equals),
        }
    }
}

impl<T> fmt::Debug for Options<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options").finish_non_exhaustive()
    }
}
