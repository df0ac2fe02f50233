use crate::error::ActionError;
use crate::request::Request;

/// Drives a remote operation one request/response cycle at a time. Actions
/// never perform I/O; an [`Executor`](crate::executor::Executor) asks for the
/// next request, sends it, and feeds the raw body back.
pub trait Action {
    /// True while another request must be sent. Stays false once it has
    /// returned false.
    fn has_more_requests(&self) -> bool;

    /// The next outgoing request. Fails with `IllegalState` once the action
    /// has completed.
    fn next_request(&mut self) -> Result<Request, ActionError>;

    /// Consumes the body answering `request` and returns a diagnostic string
    /// (often empty). Parse failures and server error markers are returned as
    /// errors; either way the action makes no further progress.
    fn process_response(&mut self, raw: &str, request: &Request) -> Result<String, ActionError>;
}

/// Position of a multi-step action in its request chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Token,
    Result,
    Done,
}

impl Phase {
    pub fn is_done(self) -> bool {
        self == Phase::Done
    }
}

pub(crate) fn completed_error(name: &str) -> ActionError {
    ActionError::IllegalState(format!("{name} has no more requests"))
}

/// Runs `step` and forces the action into `Done` when it fails, so a broken
/// response never leaves an action waiting for a request it cannot build.
pub(crate) fn finish_on_error<T>(
    phase: &mut Phase,
    step: impl FnOnce(&mut Phase) -> Result<T, ActionError>,
) -> Result<T, ActionError> {
    let result = step(phase);
    if result.is_err() {
        *phase = Phase::Done;
    }
    result
}
