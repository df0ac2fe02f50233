use crate::action::{Action, Phase, completed_error, finish_on_error};
use crate::error::ActionError;
use crate::request::{ApiRequestBuilder, Request};
use crate::version::{ActionKind, Version, ensure_supported};
use crate::xml::{XmlElement, parse_api_response};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Edit,
    Delete,
    Move,
    Protect,
}

impl TokenKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::Edit => "edit",
            TokenKind::Delete => "delete",
            TokenKind::Move => "move",
            TokenKind::Protect => "protect",
        }
    }
}

#[derive(Debug)]
pub struct GetApiToken {
    version: Version,
    kind: TokenKind,
    title: String,
    done: bool,
    token: Option<String>,
}

impl GetApiToken {
    pub fn new(version: Version, kind: TokenKind, title: &str) -> Result<Self, ActionError> {
        ensure_supported(ActionKind::Token, version)?;
        Ok(Self {
            version,
            kind,
            title: title.to_string(),
            done: false,
            token: None,
        })
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn uses_csrf(&self) -> bool {
        self.version >= Version::Mw1_24
    }

    fn extract(&self, root: &XmlElement) -> Option<String> {
        if self.uses_csrf() {
            return root
                .find("tokens")
                .and_then(|tokens| tokens.attr("csrftoken"))
                .map(ToString::to_string);
        }
        let attribute = format!("{}token", self.kind.as_str());
        root.descendants("page")
            .into_iter()
            .find_map(|page| page.attr(&attribute))
            .map(ToString::to_string)
    }
}

impl Action for GetApiToken {
    fn has_more_requests(&self) -> bool {
        !self.done
    }

    fn next_request(&mut self) -> Result<Request, ActionError> {
        if self.done {
            return Err(completed_error("token"));
        }
        let builder = ApiRequestBuilder::new().action("query").format_xml();
        let request = if self.uses_csrf() {
            builder.param("meta", "tokens").param("type", "csrf")
        } else {
            builder
                .param("prop", "info")
                .param("intoken", self.kind.as_str())
                .param("titles", &self.title)
        };
        Ok(request.build_get())
    }

    fn process_response(&mut self, raw: &str, _request: &Request) -> Result<String, ActionError> {
        self.done = true;
        let root = parse_api_response(raw, "token")?;
        self.token = self.extract(&root);
        Ok(String::new())
    }
}

pub trait GuardedOperation {
    fn token_kind(&self) -> TokenKind;

    fn token_title(&self) -> &str;

    fn build_request(&self, token: &str) -> Request;

    fn process_result(&mut self, root: &XmlElement) -> Result<String, ActionError>;

    fn context(&self) -> &'static str;
}

#[derive(Debug)]
pub struct TokenChain<O> {
    phase: Phase,
    token_action: GetApiToken,
    operation: O,
}

impl<O: GuardedOperation> TokenChain<O> {
    pub fn new(version: Version, operation: O) -> Result<Self, ActionError> {
        let token_action =
            GetApiToken::new(version, operation.token_kind(), operation.token_title())?;
        Ok(Self {
            phase: Phase::Token,
            token_action,
            operation,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn operation(&self) -> &O {
        &self.operation
    }

    pub fn into_operation(self) -> O {
        self.operation
    }

    fn token(&self) -> Result<&str, ActionError> {
        self.token_action
            .token()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                ActionError::precondition(format!(
                    "{} requires a non-empty {} token",
                    self.operation.context(),
                    self.operation.token_kind().as_str()
                ))
            })
    }
}

impl<O: GuardedOperation> Action for TokenChain<O> {
    fn has_more_requests(&self) -> bool {
        !self.phase.is_done()
    }

    fn next_request(&mut self) -> Result<Request, ActionError> {
        match self.phase {
            Phase::Token => self.token_action.next_request(),
            Phase::Result => {
                let token = self.token().map(str::to_string);
                let token = match token {
                    Ok(token) => token,
                    Err(error) => {
                        self.phase = Phase::Done;
                        return Err(error);
                    }
                };
                Ok(self.operation.build_request(&token))
            }
            Phase::Done => Err(completed_error(self.operation.context())),
        }
    }

    fn process_response(&mut self, raw: &str, request: &Request) -> Result<String, ActionError> {
        let mut phase = self.phase;
        let result = finish_on_error(&mut phase, |phase| match *phase {
            Phase::Token => {
                let result = self.token_action.process_response(raw, request)?;
                if !self.token_action.has_more_requests() {
                    // validate now so an empty token never reaches the wire
                    self.token()?;
                    *phase = Phase::Result;
                }
                Ok(result)
            }
            Phase::Result => {
                let root = parse_api_response(raw, self.operation.context())?;
                let result = self.operation.process_result(&root)?;
                *phase = Phase::Done;
                Ok(result)
            }
            Phase::Done => Err(completed_error(self.operation.context())),
        });
        self.phase = phase;
        result
    }
}
