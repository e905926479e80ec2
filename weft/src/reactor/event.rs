/// An I/O event reported by the poller.
///
/// Hang-ups and errors are reported as both readable and writable so that
/// every waiter retries its syscall and observes the condition itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Event {
    /// Token of the registration the event belongs to.
    pub(crate) token: usize,

    pub(crate) readable: bool,

    pub(crate) writable: bool,
}
