/// A result type for attribute bag and dictionary operations.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All recoverable errors that `mixer` can produce.
///
/// Release-discipline violations (using a bag after [`MutableBag::done`], or
/// releasing it twice) are deliberately absent: they are programming errors
/// and panic at the call site.
///
/// [`MutableBag::done`]: crate::MutableBag::done
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A dictionary index does not resolve in either the global dictionary
    /// or the per-message word list.
    #[error("unknown dictionary index {index}")]
    UnknownIndex { index: i32 },

    /// Two bags passed to [`MutableBag::merge`] set the same attribute to
    /// different values.
    ///
    /// [`MutableBag::merge`]: crate::MutableBag::merge
    #[error("conflicting value for attribute {name}")]
    MergeConflict { name: String },
}
