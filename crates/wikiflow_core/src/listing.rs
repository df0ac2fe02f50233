use std::str::FromStr;

use serde::Serialize;

use crate::client::WikiClient;
use crate::error::ActionError;
use crate::query::{Cursor, Page, PageSource, Query};
use crate::request::{ApiRequestBuilder, Request, namespace_filter};
use crate::version::{ActionKind, Version};
use crate::xml::{XmlElement, html_unescape};

pub const PAGE_LIMIT: usize = 50;
pub const NS_MAIN: i32 = 0;
pub const NS_FILE: i32 = 6;
pub const NS_CATEGORY: i32 = 14;

// value MediaWiki emits in <continue> for a single list module
const SIMPLE_CONTINUE: &str = "-||";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RedirectFilter {
    #[default]
    All,
    Redirects,
    NonRedirects,
}

impl RedirectFilter {
    fn as_str(self) -> &'static str {
        match self {
            RedirectFilter::All => "all",
            RedirectFilter::Redirects => "redirects",
            RedirectFilter::NonRedirects => "nonredirects",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleListing {
    kind: ActionKind,
    prefix: &'static str,
    element: &'static str,
    params: Vec<(String, String)>,
}

pub type TitleQuery<'c> = Query<'c, TitleListing>;

impl TitleListing {
    fn new(kind: ActionKind, prefix: &'static str, element: &'static str) -> Self {
        Self {
            kind,
            prefix,
            element,
            params: Vec::new(),
        }
    }

    fn with(mut self, suffix: &str, value: impl ToString) -> Self {
        self.params
            .push((format!("{}{suffix}", self.prefix), value.to_string()));
        self
    }

    pub fn category_members(category: &str, namespaces: &[i32]) -> Self {
        Self::new(ActionKind::CategoryMembers, "cm", "cm")
            .with("title", category_title(category))
            .with("namespace", namespace_filter(namespaces))
    }

    pub fn backlinks(title: &str, namespaces: &[i32], redirects: RedirectFilter) -> Self {
        Self::new(ActionKind::Backlinks, "bl", "bl")
            .with("title", title.trim())
            .with("namespace", namespace_filter(namespaces))
            .with("filterredir", redirects.as_str())
    }

    pub fn image_usage(image: &str, namespaces: &[i32]) -> Self {
        Self::new(ActionKind::ImageUsage, "iu", "iu")
            .with("title", file_title(image))
            .with("namespace", namespace_filter(namespaces))
    }

    pub fn recent_changes(namespaces: &[i32]) -> Self {
        Self::new(ActionKind::RecentChanges, "rc", "rc")
            .with("namespace", namespace_filter(namespaces))
            .with("prop", "title|timestamp")
    }

    pub fn all_pages(namespace: i32) -> Self {
        Self::new(ActionKind::AllPages, "ap", "p").with("namespace", namespace)
    }

    fn list(&self) -> &'static str {
        self.kind.as_str()
    }

    fn continue_param(&self, version: Version) -> String {
        let suffix = match self.kind {
            ActionKind::RecentChanges if version < Version::Mw1_23 => "start",
            ActionKind::AllPages if version < Version::Mw1_20 => "from",
            _ => "continue",
        };
        format!("{}{suffix}", self.prefix)
    }

    fn base_request(&self, version: Version, cursor: Option<&Cursor>) -> ApiRequestBuilder {
        let mut builder = ApiRequestBuilder::new()
            .action("query")
            .format_xml()
            .param("list", self.list());
        for (key, value) in &self.params {
            builder = builder.param(key, value);
        }
        builder = builder.param(&format!("{}limit", self.prefix), PAGE_LIMIT);
        if let Some(cursor) = cursor {
            builder = builder.param(&self.continue_param(version), cursor.as_str());
            if version >= Version::Mw1_26 {
                builder = builder.param("continue", SIMPLE_CONTINUE);
            }
        }
        builder
    }

    fn items<'a>(&self, root: &'a XmlElement) -> Vec<&'a XmlElement> {
        root.find("query")
            .and_then(|query| query.child(self.list()))
            .map(|list| list.descendants(self.element))
            .unwrap_or_default()
    }

    fn cursor(&self, root: &XmlElement) -> Option<Cursor> {
        let candidates =
            ["continue", "start", "from"].map(|suffix| format!("{}{suffix}", self.prefix));
        let modern = root.child("continue");
        let legacy = root
            .child("query-continue")
            .and_then(|node| node.child(self.list()));
        [modern, legacy]
            .into_iter()
            .flatten()
            .find_map(|node| candidates.iter().find_map(|name| node.attr(name)))
            .and_then(Cursor::new)
    }
}

impl PageSource for TitleListing {
    type Item = String;

    fn kind(&self) -> ActionKind {
        self.kind
    }

    fn request(&self, version: Version, cursor: Option<&Cursor>) -> Request {
        self.base_request(version, cursor).build_get()
    }

    fn read_page(&self, root: &XmlElement) -> Result<Page<String>, ActionError> {
        let items = self
            .items(root)
            .into_iter()
            .filter_map(|item| item.attr("title"))
            .map(|title| html_unescape(title).into_owned())
            .collect();
        Ok(Page {
            items,
            cursor: self.cursor(root),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryItem {
    pub title: String,
    pub namespace: i32,
    pub page_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryMembersFull {
    listing: TitleListing,
}

impl CategoryMembersFull {
    pub fn new(category: &str, namespaces: &[i32]) -> Self {
        Self {
            listing: TitleListing::category_members(category, namespaces),
        }
    }
}

impl PageSource for CategoryMembersFull {
    type Item = CategoryItem;

    fn kind(&self) -> ActionKind {
        ActionKind::CategoryMembers
    }

    fn request(&self, version: Version, cursor: Option<&Cursor>) -> Request {
        self.listing
            .base_request(version, cursor)
            .param("cmprop", "ids|title")
            .build_get()
    }

    fn read_page(&self, root: &XmlElement) -> Result<Page<CategoryItem>, ActionError> {
        let items = self
            .listing
            .items(root)
            .into_iter()
            .map(|item| {
                let title = item
                    .attr("title")
                    .ok_or_else(|| ActionError::parse("categorymembers", "member without title"))?;
                Ok(CategoryItem {
                    title: html_unescape(title).into_owned(),
                    namespace: numeric_attr(item, "ns")?,
                    page_id: numeric_attr(item, "pageid")?,
                })
            })
            .collect::<Result<Vec<_>, ActionError>>()?;
        Ok(Page {
            items,
            cursor: self.listing.cursor(root),
        })
    }
}

fn numeric_attr<T: FromStr>(item: &XmlElement, name: &str) -> Result<T, ActionError> {
    item.attr(name)
        .and_then(|value| value.parse().ok())
        .ok_or_else(|| {
            ActionError::parse(
                "categorymembers",
                format!(
                    "member {} without numeric {name}",
                    item.attr("title").unwrap_or_default()
                ),
            )
        })
}

pub fn category_title(category: &str) -> String {
    let name = category.trim();
    let name = name.strip_prefix("Category:").unwrap_or(name);
    format!("Category:{name}")
}

fn file_title(image: &str) -> String {
    let image = image.trim();
    if image.contains(':') {
        image.to_string()
    } else {
        format!("File:{image}")
    }
}

pub fn category_members<'c>(
    client: &'c WikiClient,
    category: &str,
    namespaces: &[i32],
) -> Result<TitleQuery<'c>, ActionError> {
    Query::new(client, TitleListing::category_members(category, namespaces))
}

pub fn category_members_full<'c>(
    client: &'c WikiClient,
    category: &str,
    namespaces: &[i32],
) -> Result<Query<'c, CategoryMembersFull>, ActionError> {
    Query::new(client, CategoryMembersFull::new(category, namespaces))
}

pub fn backlinks<'c>(
    client: &'c WikiClient,
    title: &str,
    namespaces: &[i32],
) -> Result<TitleQuery<'c>, ActionError> {
    Query::new(
        client,
        TitleListing::backlinks(title, namespaces, RedirectFilter::All),
    )
}

pub fn image_usage<'c>(
    client: &'c WikiClient,
    image: &str,
    namespaces: &[i32],
) -> Result<TitleQuery<'c>, ActionError> {
    Query::new(client, TitleListing::image_usage(image, namespaces))
}

pub fn recent_changes<'c>(
    client: &'c WikiClient,
    namespaces: &[i32],
) -> Result<TitleQuery<'c>, ActionError> {
    Query::new(client, TitleListing::recent_changes(namespaces))
}

pub fn all_pages<'c>(client: &'c WikiClient, namespace: i32) -> Result<TitleQuery<'c>, ActionError> {
    Query::new(client, TitleListing::all_pages(namespace))
}
