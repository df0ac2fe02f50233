use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ActionError;
use crate::executor::Transport;
use crate::request::Request;

#[derive(Clone, Default)]
pub struct RequestLog {
    requests: Arc<Mutex<Vec<Request>>>,
}

impl RequestLog {
    pub fn len(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }
}

pub struct ScriptedTransport {
    responses: Arc<Mutex<VecDeque<String>>>,
    log: RequestLog,
}

impl ScriptedTransport {
    pub fn new<S: Into<String>>(responses: impl IntoIterator<Item = S>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(
                responses.into_iter().map(Into::into).collect(),
            )),
            log: RequestLog::default(),
        }
    }

    pub fn log(&self) -> RequestLog {
        self.log.clone()
    }
}

impl Transport for ScriptedTransport {
    fn execute(&mut self, request: &Request) -> Result<String, ActionError> {
        self.log.requests.lock().push(request.clone());
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| ActionError::Transport("no scripted response left".to_string()))
    }
}

pub const SITEINFO_1_23: &str = r#"<?xml version="1.0"?><api><query><general mainpage="Main Page" generator="MediaWiki 1.23.4" sitename="Test" /></query></api>"#;

pub fn userinfo_xml(name: &str, rights: &[&str]) -> String {
    let rights = rights
        .iter()
        .map(|right| format!("<r>{right}</r>"))
        .collect::<String>();
    format!(
        r#"<?xml version="1.0"?><api><query><userinfo id="7" name="{name}"><groups><g>*</g><g>user</g></groups><rights>{rights}</rights></userinfo></query></api>"#
    )
}

pub fn csrf_token_xml(token: &str) -> String {
    format!(r#"<?xml version="1.0"?><api><query><tokens csrftoken="{token}" /></query></api>"#)
}
