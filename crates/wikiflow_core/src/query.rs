use std::collections::VecDeque;
use std::fmt;

use crate::action::{Action, completed_error};
use crate::client::WikiClient;
use crate::error::ActionError;
use crate::request::Request;
use crate::version::{ActionKind, Version, ensure_supported};
use crate::xml::{XmlElement, parse_api_response};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor(String);

impl Cursor {
    /// Empty strings are treated exactly like an absent cursor.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub cursor: Option<Cursor>,
}

impl<T> Page<T> {
    pub fn is_last(&self) -> bool {
        self.items.is_empty() || self.cursor.is_none()
    }
}

pub trait PageSource: Clone {
    type Item;

    fn kind(&self) -> ActionKind;

    /// Request for the page after `cursor`, or the first page when `None`.
    fn request(&self, version: Version, cursor: Option<&Cursor>) -> Request;

    fn read_page(&self, root: &XmlElement) -> Result<Page<Self::Item>, ActionError>;

    fn parse_page(&self, raw: &str) -> Result<Page<Self::Item>, ActionError> {
        let root = parse_api_response(raw, self.kind().as_str())?;
        self.read_page(&root)
    }
}

pub struct PageAction<'s, S: PageSource> {
    source: &'s S,
    version: Version,
    cursor: Option<Cursor>,
    done: bool,
    page: Option<Page<S::Item>>,
}

impl<'s, S: PageSource> PageAction<'s, S> {
    pub fn new(source: &'s S, version: Version, cursor: Option<Cursor>) -> Self {
        Self {
            source,
            version,
            cursor,
            done: false,
            page: None,
        }
    }

    pub fn into_page(self) -> Option<Page<S::Item>> {
        self.page
    }
}

impl<S: PageSource> Action for PageAction<'_, S> {
    fn has_more_requests(&self) -> bool {
        !self.done
    }

    fn next_request(&mut self) -> Result<Request, ActionError> {
        if self.done {
            return Err(completed_error(self.source.kind().as_str()));
        }
        Ok(self.source.request(self.version, self.cursor.as_ref()))
    }

    fn process_response(&mut self, raw: &str, _request: &Request) -> Result<String, ActionError> {
        self.done = true;
        self.page = Some(self.source.parse_page(raw)?);
        Ok(String::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryState {
    Fresh,
    Continuing,
    Exhausted,
}

/// Lazy sequence over every item of a listing. Each pull that finds the
/// local buffer empty costs one round trip. Errors are yielded on the pull
/// that hit them and leave the cursor where it was.
pub struct Query<'c, S: PageSource> {
    client: &'c WikiClient,
    source: S,
    version: Version,
    cursor: Option<Cursor>,
    buffer: VecDeque<S::Item>,
    state: QueryState,
    pages_fetched: usize,
}

impl<'c, S: PageSource> Query<'c, S> {
    pub fn new(client: &'c WikiClient, source: S) -> Result<Self, ActionError> {
        let version = client.version()?;
        ensure_supported(source.kind(), version)?;
        Ok(Self::fresh(client, source, version))
    }

    fn fresh(client: &'c WikiClient, source: S, version: Version) -> Self {
        Self {
            client,
            source,
            version,
            cursor: None,
            buffer: VecDeque::new(),
            state: QueryState::Fresh,
            pages_fetched: 0,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == QueryState::Exhausted && self.buffer.is_empty()
    }

    pub fn prepare_next_request(&self) -> Request {
        self.source.request(self.version, self.cursor.as_ref())
    }

    pub fn restart(&self) -> Self {
        Self::fresh(self.client, self.source.clone(), self.version)
    }

    /// Pulls up to `n` items, in server order. Asking for zero items sends
    /// nothing.
    pub fn materialize(&mut self, n: usize) -> Result<Vec<S::Item>, ActionError> {
        self.collect_up_to(Some(n))
    }

    pub fn materialize_all(&mut self) -> Result<Vec<S::Item>, ActionError> {
        self.collect_up_to(None)
    }

    // On failure the items taken so far go back to the buffer, so a later
    // pull sees them again ahead of the page that failed.
    fn collect_up_to(&mut self, limit: Option<usize>) -> Result<Vec<S::Item>, ActionError> {
        let mut items = Vec::new();
        while limit.is_none_or(|limit| items.len() < limit) {
            match self.next() {
                Some(Ok(item)) => items.push(item),
                Some(Err(error)) => {
                    for item in items.into_iter().rev() {
                        self.buffer.push_front(item);
                    }
                    return Err(error);
                }
                None => break,
            }
        }
        Ok(items)
    }

    fn fetch_page(&mut self) -> Result<(), ActionError> {
        let mut action = PageAction::new(&self.source, self.version, self.cursor.clone());
        self.client.perform(&mut action)?;
        let Some(page) = action.into_page() else {
            tracing::warn!(
                listing = self.source.kind().as_str(),
                "page fetch stopped by error policy; ending listing"
            );
            self.state = QueryState::Exhausted;
            return Ok(());
        };
        self.pages_fetched += 1;
        tracing::debug!(
            listing = self.source.kind().as_str(),
            items = page.items.len(),
            cursor = page.cursor.as_ref().map(Cursor::as_str).unwrap_or(""),
            "fetched page"
        );

        let repeated = page.cursor.is_some() && page.cursor == self.cursor;
        if page.is_last() || repeated {
            if repeated {
                tracing::warn!(
                    listing = self.source.kind().as_str(),
                    "server returned the same cursor twice; ending listing"
                );
            }
            self.state = QueryState::Exhausted;
            self.cursor = None;
        } else {
            self.state = QueryState::Continuing;
            self.cursor = page.cursor;
        }
        self.buffer.extend(page.items);
        Ok(())
    }
}

impl<S: PageSource> Iterator for Query<'_, S> {
    type Item = Result<S::Item, ActionError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if self.state == QueryState::Exhausted {
                return None;
            }
            if let Err(error) = self.fetch_page() {
                return Some(Err(error));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Cursor, Page, PageSource, Query};
    use crate::client::WikiClient;
    use crate::error::ActionError;
    use crate::request::{ApiRequestBuilder, Request};
    use crate::test_support::ScriptedTransport;
    use crate::version::{ActionKind, Version};
    use crate::xml::XmlElement;

    #[derive(Clone)]
    struct Numbers {
        category: String,
    }

    impl PageSource for Numbers {
        type Item = u32;

        fn kind(&self) -> ActionKind {
            ActionKind::CategoryMembers
        }

        fn request(&self, _version: Version, cursor: Option<&Cursor>) -> Request {
            ApiRequestBuilder::new()
                .action("query")
                .param("cmtitle", &self.category)
                .param_opt("cmcontinue", cursor.map(Cursor::as_str))
                .build_get()
        }

        fn read_page(&self, root: &XmlElement) -> Result<Page<u32>, ActionError> {
            let items = root
                .descendants("n")
                .into_iter()
                .map(|node| {
                    node.text()
                        .parse()
                        .map_err(|_| ActionError::parse("numbers", "bad number"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let cursor = root
                .child("continue")
                .and_then(|node| node.attr("cmcontinue"))
                .and_then(Cursor::new);
            Ok(Page { items, cursor })
        }
    }

    fn page_xml(items: std::ops::Range<u32>, cursor: Option<&str>) -> String {
        let body = items.map(|n| format!("<n>{n}</n>")).collect::<String>();
        let cont = cursor
            .map(|cursor| format!(r#"<continue cmcontinue="{cursor}" />"#))
            .unwrap_or_default();
        format!("<api>{cont}<list>{body}</list></api>")
    }

    fn synthetic_pages() -> Vec<String> {
        (0..10u32)
            .map(|page| {
                let cursor = (page < 9).then(|| format!("page-{}", page + 1));
                page_xml(page * 50..(page + 1) * 50, cursor.as_deref())
            })
            .collect()
    }

    fn source() -> Numbers {
        Numbers {
            category: "Category:Numbers".to_string(),
        }
    }

    #[test]
    fn materialize_spans_pages_using_cursor() {
        let transport = ScriptedTransport::new(synthetic_pages());
        let log = transport.log();
        let client = WikiClient::with_version(transport, Version::Mw1_28);
        let mut query = Query::new(&client, source()).expect("query");

        let items = query.materialize(75).expect("materialize");
        assert_eq!(items, (0..75).collect::<Vec<_>>());

        let requests = log.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].param("cmcontinue"), None);
        assert_eq!(requests[1].param("cmcontinue"), Some("page-1"));
    }

    #[test]
    fn materialize_beyond_total_returns_everything() {
        let transport = ScriptedTransport::new(synthetic_pages());
        let log = transport.log();
        let client = WikiClient::with_version(transport, Version::Mw1_28);
        let mut query = Query::new(&client, source()).expect("query");
        let items = query.materialize(10_000).expect("materialize");
        assert_eq!(items.len(), 500);
        assert_eq!(log.len(), 10);
        assert!(query.is_exhausted());
        assert!(query.next().is_none());
        assert_eq!(log.len(), 10);
    }

    #[test]
    fn materialize_zero_sends_nothing() {
        let transport = ScriptedTransport::new(synthetic_pages());
        let log = transport.log();
        let client = WikiClient::with_version(transport, Version::Mw1_28);
        let mut query = Query::new(&client, source()).expect("query");
        assert!(query.materialize(0).expect("zero").is_empty());
        assert_eq!(log.len(), 0);
    }

    #[test]
    fn empty_listing_ends_without_error() {
        let transport = ScriptedTransport::new([page_xml(0..0, None)]);
        let client = WikiClient::with_version(transport, Version::Mw1_28);
        let mut query = Query::new(&client, source()).expect("query");
        assert!(query.next().is_none());
        assert!(query.next().is_none());
        assert!(query.is_exhausted());
    }

    #[test]
    fn empty_cursor_counts_as_last_page() {
        let transport = ScriptedTransport::new([page_xml(0..3, Some(""))]);
        let log = transport.log();
        let client = WikiClient::with_version(transport, Version::Mw1_28);
        let mut query = Query::new(&client, source()).expect("query");
        assert_eq!(query.materialize_all().expect("all"), vec![0, 1, 2]);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn restart_reproduces_first_page() {
        let mut script = synthetic_pages()[..2].to_vec();
        script.push(synthetic_pages()[0].clone());
        let transport = ScriptedTransport::new(script);
        let log = transport.log();
        let client = WikiClient::with_version(transport, Version::Mw1_28);
        let mut query = Query::new(&client, source()).expect("query");
        let first = query.materialize(60).expect("first run");
        assert_eq!(query.cursor().map(Cursor::as_str), Some("page-2"));

        let mut again = query.restart();
        assert!(again.cursor().is_none());
        assert_eq!(again.prepare_next_request(), log.requests()[0]);
        let second = again.materialize(50).expect("second run");
        assert_eq!(second, first[..50].to_vec());
        assert_eq!(log.requests()[2].param("cmcontinue"), None);
    }

    #[test]
    fn malformed_page_errors_on_that_pull_only() {
        let transport = ScriptedTransport::new([
            page_xml(0..2, Some("next")),
            "<api><list>".to_string(),
            page_xml(2..4, None),
        ]);
        let log = transport.log();
        let client = WikiClient::with_version(transport, Version::Mw1_28);
        let mut query = Query::new(&client, source()).expect("query");

        let earlier = query.materialize(2).expect("first page");
        assert_eq!(earlier, vec![0, 1]);
        let error = query.next().expect("pull").expect_err("malformed");
        assert!(matches!(error, ActionError::ProtocolParse { .. }));
        assert_eq!(earlier, vec![0, 1]);
        assert!(!query.is_exhausted());

        // the failed pull kept its cursor, so the next pull asks for the same page
        assert_eq!(query.materialize_all().expect("retry"), vec![2, 3]);
        assert_eq!(log.requests()[2].param("cmcontinue"), Some("next"));
    }

    #[test]
    fn failed_materialize_keeps_items_for_retry() {
        let pages = synthetic_pages();
        let transport = ScriptedTransport::new([
            pages[0].clone(),
            "<api><list>".to_string(),
            pages[1].clone(),
            pages[2].clone(),
        ]);
        let log = transport.log();
        let client = WikiClient::with_version(transport, Version::Mw1_28);
        let mut query = Query::new(&client, source()).expect("query");

        let error = query.materialize(75).expect_err("second page malformed");
        assert!(matches!(error, ActionError::ProtocolParse { .. }));
        assert_eq!(query.cursor().map(Cursor::as_str), Some("page-1"));

        let items = query.materialize(75).expect("retry");
        assert_eq!(items, (0..75).collect::<Vec<_>>());
        assert_eq!(log.len(), 3);
        assert_eq!(log.requests()[2].param("cmcontinue"), Some("page-1"));
    }

    #[test]
    fn unsupported_version_rejected_at_construction() {
        let transport = ScriptedTransport::new(Vec::<String>::new());
        let log = transport.log();
        let client = WikiClient::with_version(transport, Version::Unknown);
        let error = Query::new(&client, source()).err().expect("gated");
        assert!(matches!(error, ActionError::UnsupportedVersion { .. }));
        assert_eq!(log.len(), 0);
    }
}
