//! Browser port - the page-automation backend behind the browser tools.
//!
//! The engine never talks to a browser directly. Browser tools translate
//! their JSON arguments into calls on [`BrowserPort`] and format the returned
//! entities as observations.

mod http;

pub use http::HttpBrowser;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An interactive element visible on the page.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UiElement {
    pub id: String,
    /// Element kind, e.g. `link`, `button`, `input`
    pub kind: String,
    pub text: String,
    pub aria_label: String,
    pub selector: String,
}

impl UiElement {
    /// Text, then aria label, then `fallback`.
    pub fn label<'a>(&'a self, fallback: &'a str) -> &'a str {
        if !self.text.is_empty() {
            &self.text
        } else if !self.aria_label.is_empty() {
            &self.aria_label
        } else {
            fallback
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageContext {
    pub url: String,
    pub title: String,
    /// Readable text preview of the page
    pub text_content: String,
    pub elements: Vec<UiElement>,
}

/// One node of the semantic page outline.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StructureElement {
    pub tag_name: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub text: String,
    pub selector: String,
    /// Nesting depth, used for indentation
    pub level: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageStructure {
    pub url: String,
    pub title: String,
    pub elements: Vec<StructureElement>,
}

/// Observed effect of a click.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageChanges {
    pub new_url: Option<String>,
    pub modal_opened: bool,
    pub modal_closed: bool,
    pub new_elements: Vec<UiElement>,
    pub elements_removed: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryElementsRequest {
    pub selector: String,
    #[serde(default)]
    pub limit: Option<usize>,
    /// Sub-selector (or `_self`) to extraction type: `text`, `html`,
    /// `selector` or `attr:<name>`
    #[serde(default)]
    pub extract: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueriedElement {
    pub selector: String,
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    Text,
    Contains,
    Selector,
    Id,
}

impl SearchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchKind::Text => "text",
            SearchKind::Contains => "contains",
            SearchKind::Selector => "selector",
            SearchKind::Id => "id",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchRequest {
    #[serde(rename = "type")]
    pub kind: SearchKind,
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchMatch {
    pub tag_name: String,
    pub selector: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_selector: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    #[serde(rename = "type")]
    pub kind: SearchKind,
    pub query: String,
    pub matches: Vec<SearchMatch>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Screenshot {
    pub data: Vec<u8>,
    /// Image format, e.g. `png`
    pub format: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Top,
    Bottom,
}

impl ScrollDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
            ScrollDirection::Top => "top",
            ScrollDirection::Bottom => "bottom",
        }
    }
}

/// Page-automation backend.
///
/// Implementations own their session state and must stay usable after a
/// failed call.
#[async_trait]
pub trait BrowserPort: Send + Sync {
    async fn navigate(&self, url: &str) -> anyhow::Result<()>;

    async fn click(&self, selector: &str) -> anyhow::Result<()>;

    /// Click and report what changed on the page.
    async fn click_observed(&self, selector: &str) -> anyhow::Result<PageChanges>;

    async fn batch_click(&self, selectors: &[String]) -> anyhow::Result<()>;

    async fn fill(&self, selector: &str, text: &str) -> anyhow::Result<()>;

    async fn batch_fill(&self, fields: &BTreeMap<String, String>) -> anyhow::Result<()>;

    async fn press_enter(&self) -> anyhow::Result<()>;

    async fn scroll(&self, direction: ScrollDirection) -> anyhow::Result<()>;

    async fn screenshot(&self) -> anyhow::Result<Screenshot>;

    async fn page_context(&self) -> anyhow::Result<PageContext>;

    async fn page_structure(&self) -> anyhow::Result<PageStructure>;

    async fn query_elements(&self, request: &QueryElementsRequest) -> anyhow::Result<Vec<QueriedElement>>;

    async fn search(&self, request: &SearchRequest) -> anyhow::Result<SearchResult>;

    async fn current_url(&self) -> String;
}
