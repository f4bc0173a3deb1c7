//! Extensions for [`Result`].

/// Extension methods for [`Result`].
pub trait ResultEx<T, E> {
    /// Turns an error into `Ok(T::default())` if `pred` returns `true` for
    /// it, otherwise leaves the result unchanged.
    ///
    /// # Examples
    /// ```
    /// # use lymbo_stdx::result::ResultEx;
    /// let res: Result<(), &str> = Err("ignored");
    /// assert_eq!(res.ignore_default(|e| *e == "ignored"), Ok(()));
    ///
    /// let res: Result<(), &str> = Err("kept");
    /// assert_eq!(res.ignore_default(|e| *e == "ignored"), Err("kept"));
    /// ```
    fn ignore_default(self, pred: impl FnOnce(&E) -> bool) -> Result<T, E>
    where
        T: Default;
}

impl<T, E> ResultEx<T, E> for Result<T, E> {
    fn ignore_default(self, pred: impl FnOnce(&E) -> bool) -> Result<T, E>
    where
        T: Default,
    {
        match self {
            Ok(t) => Ok(t),
            Err(e) if pred(&e) => Ok(T::default()),
            Err(e) => Err(e),
        }
    }
}
