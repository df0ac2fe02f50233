use std::collections::BTreeSet;

use serde::Serialize;

use crate::action::{Action, Phase, completed_error, finish_on_error};
use crate::error::ActionError;
use crate::request::{ApiRequestBuilder, Request};
use crate::version::{ActionKind, Version, ensure_supported};
use crate::xml::{XmlElement, parse_api_response};

#[derive(Debug, Default)]
pub struct GetVersion {
    version: Option<Version>,
    generator: Option<String>,
}

impl GetVersion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> Version {
        self.version.unwrap_or(Version::Unknown)
    }

    pub fn generator(&self) -> Option<&str> {
        self.generator.as_deref()
    }
}

impl Action for GetVersion {
    fn has_more_requests(&self) -> bool {
        self.version.is_none()
    }

    fn next_request(&mut self) -> Result<Request, ActionError> {
        if !self.has_more_requests() {
            return Err(completed_error("siteinfo"));
        }
        Ok(ApiRequestBuilder::new()
            .action("query")
            .format_xml()
            .param("meta", "siteinfo")
            .param("siprop", "general")
            .build_get())
    }

    fn process_response(&mut self, raw: &str, _request: &Request) -> Result<String, ActionError> {
        self.version = Some(Version::Unknown);
        if raw.trim().is_empty() {
            return Ok(String::new());
        }
        let root = parse_api_response(raw, "siteinfo")?;
        let generator = root
            .find("general")
            .and_then(|general| general.attr("generator"))
            .map(ToString::to_string);
        if let Some(generator) = &generator {
            self.version = Some(Version::parse_generator(generator));
        }
        self.generator = generator;
        Ok(String::new())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Userinfo {
    pub username: String,
    pub groups: BTreeSet<String>,
    pub rights: BTreeSet<String>,
}

impl Userinfo {
    pub fn has_right(&self, right: &str) -> bool {
        self.rights.contains(right)
    }

    fn from_element(element: &XmlElement) -> Self {
        let names = |container: &str, item: &str| {
            element
                .child(container)
                .map(|node| {
                    node.descendants(item)
                        .into_iter()
                        .map(|entry| entry.text().to_string())
                        .collect::<BTreeSet<_>>()
                })
                .unwrap_or_default()
        };
        Self {
            username: element.attr("name").unwrap_or_default().to_string(),
            groups: names("groups", "g"),
            rights: names("rights", "r"),
        }
    }
}

#[derive(Debug)]
pub struct GetUserinfo {
    done: bool,
    userinfo: Option<Userinfo>,
}

impl GetUserinfo {
    pub fn new(version: Version) -> Result<Self, ActionError> {
        ensure_supported(ActionKind::GetUserinfo, version)?;
        Ok(Self {
            done: false,
            userinfo: None,
        })
    }

    pub fn userinfo(&self) -> Option<&Userinfo> {
        self.userinfo.as_ref()
    }

    pub fn into_userinfo(self) -> Option<Userinfo> {
        self.userinfo
    }
}

impl Action for GetUserinfo {
    fn has_more_requests(&self) -> bool {
        !self.done
    }

    fn next_request(&mut self) -> Result<Request, ActionError> {
        if self.done {
            return Err(completed_error("userinfo"));
        }
        Ok(ApiRequestBuilder::new()
            .action("query")
            .format_xml()
            .param("meta", "userinfo")
            .param("uiprop", "groups|rights")
            .build_get())
    }

    fn process_response(&mut self, raw: &str, _request: &Request) -> Result<String, ActionError> {
        self.done = true;
        let root = parse_api_response(raw, "userinfo")?;
        let element = root
            .find("userinfo")
            .ok_or_else(|| ActionError::parse("userinfo", "missing <userinfo> element"))?;
        self.userinfo = Some(Userinfo::from_element(element));
        Ok(String::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginData {
    pub username: String,
    pub user_id: Option<u64>,
}

#[derive(Debug)]
pub struct PostLogin {
    version: Version,
    username: String,
    password: String,
    domain: Option<String>,
    phase: Phase,
    token: Option<String>,
    login: Option<LoginData>,
}

impl PostLogin {
    pub fn new(
        version: Version,
        username: &str,
        password: &str,
        domain: Option<&str>,
    ) -> Result<Self, ActionError> {
        ensure_supported(ActionKind::Login, version)?;
        if username.trim().is_empty() {
            return Err(ActionError::precondition("login requires a username"));
        }
        Ok(Self {
            version,
            username: username.to_string(),
            password: password.to_string(),
            domain: domain.map(ToString::to_string),
            phase: Phase::Token,
            token: None,
            login: None,
        })
    }

    pub fn login_data(&self) -> Option<&LoginData> {
        self.login.as_ref()
    }

    fn uses_token_query(&self) -> bool {
        self.version >= Version::Mw1_27
    }

    fn login_request(&self, token: Option<&str>) -> Request {
        ApiRequestBuilder::new()
            .action("login")
            .format_xml()
            .param("lgname", &self.username)
            .param("lgpassword", &self.password)
            .param_opt("lgdomain", self.domain.as_deref())
            .param_opt("lgtoken", token)
            .build_post()
    }

    fn accept_token(&mut self, root: &XmlElement) -> Result<(), ActionError> {
        let token = if self.uses_token_query() {
            root.find("tokens").and_then(|tokens| tokens.attr("logintoken"))
        } else {
            root.find("login")
                .filter(|login| login.attr("result") == Some("NeedToken"))
                .and_then(|login| login.attr("token"))
        };
        match token {
            Some(token) if !token.is_empty() => {
                self.token = Some(token.to_string());
                Ok(())
            }
            _ => Err(ActionError::precondition("login token missing or empty")),
        }
    }

    fn accept_result(&mut self, root: &XmlElement) -> Result<(), ActionError> {
        let login = root
            .find("login")
            .ok_or_else(|| ActionError::parse("login", "missing <login> element"))?;
        match login.attr("result") {
            Some("Success") => {
                let data = LoginData {
                    username: login
                        .attr("lgusername")
                        .unwrap_or(&self.username)
                        .to_string(),
                    user_id: login.attr("lguserid").and_then(|id| id.parse().ok()),
                };
                tracing::info!(username = %data.username, "logged in");
                self.login = Some(data);
                Ok(())
            }
            other => Err(ActionError::Business {
                code: other.unwrap_or("unknown").to_string(),
                info: login
                    .attr("reason")
                    .unwrap_or("login was not successful")
                    .to_string(),
                hint: None,
            }),
        }
    }
}

impl Action for PostLogin {
    fn has_more_requests(&self) -> bool {
        !self.phase.is_done()
    }

    fn next_request(&mut self) -> Result<Request, ActionError> {
        match self.phase {
            Phase::Token if self.uses_token_query() => Ok(ApiRequestBuilder::new()
                .action("query")
                .format_xml()
                .param("meta", "tokens")
                .param("type", "login")
                .build_get()),
            Phase::Token => Ok(self.login_request(None)),
            Phase::Result => {
                let token = self
                    .token
                    .as_deref()
                    .filter(|token| !token.is_empty())
                    .ok_or_else(|| ActionError::precondition("login token missing or empty"))?;
                Ok(self.login_request(Some(token)))
            }
            Phase::Done => Err(completed_error("login")),
        }
    }

    fn process_response(&mut self, raw: &str, _request: &Request) -> Result<String, ActionError> {
        let mut phase = self.phase;
        let result = finish_on_error(&mut phase, |phase| {
            let root = parse_api_response(raw, "login")?;
            match *phase {
                Phase::Token => {
                    self.accept_token(&root)?;
                    *phase = Phase::Result;
                }
                Phase::Result => {
                    self.accept_result(&root)?;
                    *phase = Phase::Done;
                }
                Phase::Done => return Err(completed_error("login")),
            }
            Ok(String::new())
        });
        self.phase = phase;
        result
    }
}
