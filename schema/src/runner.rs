use crate::Dispatcher;

/// A `Runner` drives a `Dispatcher` through a sequence of commands and
/// reports what happened.
pub trait Runner<S: Dispatcher> {
    type Success;
    type Error;

    /// Run the `Runner`'s commands against the provided `Dispatcher`.
    fn run(&self, dispatcher: S) -> Result<Self::Success, Self::Error>;
}
