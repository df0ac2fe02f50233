pub mod action;
pub mod client;
pub mod config;
pub mod editing;
pub mod error;
pub mod executor;
pub mod listing;
pub mod meta;
pub mod query;
pub mod request;
pub mod token;
pub mod transport;
pub mod version;
pub mod xml;

#[cfg(test)]
pub(crate) mod test_support;

pub use action::{Action, Phase};
pub use client::WikiClient;
pub use error::ActionError;
pub use executor::{ErrorPolicy, Executor, LogBusinessErrors, Rethrow, Transport};
pub use query::{Cursor, Page, PageSource, Query};
pub use request::{ApiRequestBuilder, Method, Request};
pub use version::{ActionKind, Version, VersionGate};
