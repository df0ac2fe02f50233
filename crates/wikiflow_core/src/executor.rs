use crate::action::Action;
use crate::error::ActionError;
use crate::request::Request;

pub trait Transport {
    fn execute(&mut self, request: &Request) -> Result<String, ActionError>;
}

pub trait ErrorPolicy {
    fn handle(&self, error: ActionError) -> Result<(), ActionError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Rethrow;

impl ErrorPolicy for Rethrow {
    fn handle(&self, error: ActionError) -> Result<(), ActionError> {
        Err(error)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogBusinessErrors;

impl ErrorPolicy for LogBusinessErrors {
    fn handle(&self, error: ActionError) -> Result<(), ActionError> {
        if error.is_business() {
            tracing::warn!(%error, "ignoring business error by policy");
            return Ok(());
        }
        Err(error)
    }
}

pub struct Executor {
    transport: Box<dyn Transport + Send>,
    policy: Box<dyn ErrorPolicy + Send + Sync>,
    request_count: usize,
}

impl Executor {
    pub fn new(transport: impl Transport + Send + 'static) -> Self {
        Self::with_policy(transport, Rethrow)
    }

    pub fn with_policy(
        transport: impl Transport + Send + 'static,
        policy: impl ErrorPolicy + Send + Sync + 'static,
    ) -> Self {
        Self {
            transport: Box::new(transport),
            policy: Box::new(policy),
            request_count: 0,
        }
    }

    pub fn request_count(&self) -> usize {
        self.request_count
    }

    pub fn perform<A: Action + ?Sized>(&mut self, action: &mut A) -> Result<(), ActionError> {
        match self.drive(action) {
            Ok(()) => Ok(()),
            Err(error) => self.policy.handle(error),
        }
    }

    fn drive<A: Action + ?Sized>(&mut self, action: &mut A) -> Result<(), ActionError> {
        while action.has_more_requests() {
            let request = action.next_request()?;
            tracing::debug!(%request, "sending API request");
            self.request_count += 1;
            let body = self.transport.execute(&request)?;
            let result = action.process_response(&body, &request)?;
            if !result.is_empty() {
                tracing::debug!(%result, "action reported result");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Executor, LogBusinessErrors};
    use crate::action::Action;
    use crate::error::ActionError;
    use crate::request::{ApiRequestBuilder, Request};
    use crate::test_support::ScriptedTransport;

    struct TwoStep {
        remaining: usize,
        seen: Vec<String>,
    }

    impl Action for TwoStep {
        fn has_more_requests(&self) -> bool {
            self.remaining > 0
        }

        fn next_request(&mut self) -> Result<Request, ActionError> {
            Ok(ApiRequestBuilder::new()
                .action("query")
                .param("step", self.remaining)
                .build_get())
        }

        fn process_response(
            &mut self,
            raw: &str,
            _request: &Request,
        ) -> Result<String, ActionError> {
            if raw.contains("<error") {
                return Err(ActionError::Business {
                    code: "x".to_string(),
                    info: "y".to_string(),
                    hint: None,
                });
            }
            self.seen.push(raw.to_string());
            self.remaining -= 1;
            Ok(String::new())
        }
    }

    #[test]
    fn drives_action_until_complete() {
        let transport = ScriptedTransport::new(["<a/>", "<b/>"]);
        let log = transport.log();
        let mut executor = Executor::new(transport);
        let mut action = TwoStep {
            remaining: 2,
            seen: Vec::new(),
        };
        executor.perform(&mut action).expect("perform");
        assert_eq!(action.seen, vec!["<a/>", "<b/>"]);
        assert_eq!(log.len(), 2);
        assert_eq!(log.requests()[0].param("step"), Some("2"));
        assert_eq!(executor.request_count(), 2);
    }

    #[test]
    fn transport_errors_propagate_unchanged() {
        let transport = ScriptedTransport::new(Vec::<String>::new());
        let mut executor = Executor::new(transport);
        let mut action = TwoStep {
            remaining: 1,
            seen: Vec::new(),
        };
        let error = executor.perform(&mut action).expect_err("no scripted body");
        assert!(matches!(error, ActionError::Transport(_)));
    }

    #[test]
    fn injected_policy_can_swallow_business_errors() {
        let mut executor =
            Executor::with_policy(ScriptedTransport::new(["<error/>"]), LogBusinessErrors);
        let mut action = TwoStep {
            remaining: 1,
            seen: Vec::new(),
        };
        executor.perform(&mut action).expect("swallowed");

        let mut executor = Executor::new(ScriptedTransport::new(["<error/>"]));
        let mut action = TwoStep {
            remaining: 1,
            seen: Vec::new(),
        };
        assert!(executor.perform(&mut action).expect_err("rethrown").is_business());
    }
}
