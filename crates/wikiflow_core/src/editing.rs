use serde::Serialize;

use crate::error::ActionError;
use crate::meta::Userinfo;
use crate::request::{ApiRequestBuilder, Request};
use crate::token::{GuardedOperation, TokenChain, TokenKind};
use crate::version::{ActionKind, Version, ensure_supported};
use crate::xml::{XmlElement, delete_right_hint};

pub const INVALID_TITLE_CHARS: &[char] = &['[', ']', '{', '}', '<', '>', '|'];

pub type PostDelete = TokenChain<DeleteOperation>;
pub type PostModifyContent = TokenChain<EditOperation>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub title: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DeleteOperation {
    title: String,
    reason: Option<String>,
    outcome: Option<DeleteOutcome>,
}

impl DeleteOperation {
    pub fn outcome(&self) -> Option<&DeleteOutcome> {
        self.outcome.as_ref()
    }
}

pub fn post_delete(
    version: Version,
    userinfo: &Userinfo,
    title: &str,
    reason: Option<&str>,
) -> Result<PostDelete, ActionError> {
    ensure_supported(ActionKind::Delete, version)?;
    let title = title.trim();
    if title.is_empty() {
        return Err(ActionError::precondition(
            "delete requires a non-empty title",
        ));
    }
    if !userinfo.has_right("delete") {
        return Err(ActionError::precondition(format!(
            "user '{}' doesn't have the rights to delete. {}",
            userinfo.username,
            delete_right_hint()
        )));
    }
    TokenChain::new(
        version,
        DeleteOperation {
            title: title.to_string(),
            reason: reason
                .map(str::trim)
                .filter(|reason| !reason.is_empty())
                .map(ToString::to_string),
            outcome: None,
        },
    )
}

impl GuardedOperation for DeleteOperation {
    fn token_kind(&self) -> TokenKind {
        TokenKind::Delete
    }

    fn token_title(&self) -> &str {
        &self.title
    }

    fn build_request(&self, token: &str) -> Request {
        ApiRequestBuilder::new()
            .action("delete")
            .format_xml()
            .param("title", &self.title)
            .param_opt("reason", self.reason.as_deref())
            .param("token", token)
            .build_post()
    }

    fn process_result(&mut self, root: &XmlElement) -> Result<String, ActionError> {
        let delete = root.find("delete").ok_or_else(|| {
            ActionError::parse("delete", "unknown reply, not a reply for a delete action")
        })?;
        let outcome = DeleteOutcome {
            title: delete.attr("title").unwrap_or(&self.title).to_string(),
            reason: delete.attr("reason").map(ToString::to_string),
        };
        tracing::info!(
            title = %outcome.title,
            reason = outcome.reason.as_deref().unwrap_or(""),
            "deleted page"
        );
        self.outcome = Some(outcome);
        Ok(String::new())
    }

    fn context(&self) -> &'static str {
        "delete"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Article {
    pub title: String,
    pub text: String,
    pub summary: String,
    pub minor: bool,
    pub bot: bool,
}

impl Article {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditOutcome {
    pub title: String,
    pub page_id: Option<u64>,
    pub new_revision_id: Option<u64>,
    pub no_change: bool,
}

#[derive(Debug, Clone)]
pub struct EditOperation {
    article: Article,
    outcome: Option<EditOutcome>,
}

impl EditOperation {
    pub fn outcome(&self) -> Option<&EditOutcome> {
        self.outcome.as_ref()
    }
}

pub fn check_title(title: &str) -> Result<&str, ActionError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ActionError::precondition("impossible request, no title"));
    }
    if let Some(invalid) = title.chars().find(|ch| INVALID_TITLE_CHARS.contains(ch)) {
        return Err(ActionError::precondition(format!(
            "invalid character \"{invalid}\" in label \"{title}\""
        )));
    }
    Ok(title)
}

pub fn post_modify_content(
    version: Version,
    article: &Article,
) -> Result<PostModifyContent, ActionError> {
    ensure_supported(ActionKind::Edit, version)?;
    let title = check_title(&article.title)?;
    let article = Article {
        title: title.to_string(),
        ..article.clone()
    };
    TokenChain::new(
        version,
        EditOperation {
            article,
            outcome: None,
        },
    )
}

impl GuardedOperation for EditOperation {
    fn token_kind(&self) -> TokenKind {
        TokenKind::Edit
    }

    fn token_title(&self) -> &str {
        &self.article.title
    }

    fn build_request(&self, token: &str) -> Request {
        let mut builder = ApiRequestBuilder::new()
            .action("edit")
            .format_xml()
            .param("title", &self.article.title)
            .param("text", &self.article.text)
            .param("summary", &self.article.summary);
        if self.article.minor {
            builder = builder.param("minor", "1");
        }
        if self.article.bot {
            builder = builder.param("bot", "1");
        }
        builder.param("token", token).build_post()
    }

    fn process_result(&mut self, root: &XmlElement) -> Result<String, ActionError> {
        let edit = root
            .find("edit")
            .ok_or_else(|| ActionError::parse("edit", "missing <edit> element"))?;
        let result = edit.attr("result").unwrap_or("unknown");
        if result != "Success" {
            return Err(ActionError::Business {
                code: result.to_string(),
                info: format!("edit of {} was not successful", self.article.title),
                hint: None,
            });
        }
        let outcome = EditOutcome {
            title: edit.attr("title").unwrap_or(&self.article.title).to_string(),
            page_id: edit.attr("pageid").and_then(|id| id.parse().ok()),
            new_revision_id: edit.attr("newrevid").and_then(|id| id.parse().ok()),
            no_change: edit.attr("nochange").is_some(),
        };
        tracing::info!(title = %outcome.title, no_change = outcome.no_change, "edited page");
        self.outcome = Some(outcome);
        Ok(String::new())
    }

    fn context(&self) -> &'static str {
        "edit"
    }
}
