//! Read-only page session over plain HTTP.
//!
//! Pages are fetched with `reqwest` and inspected with a fixed set of
//! patterns. There is no DOM and no script execution, so only observation
//! primitives work; interactive primitives fail with a descriptive error
//! that the model sees as an observation.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::Mutex;
use url::Url;

use super::{
    BrowserPort, PageChanges, PageContext, PageStructure, QueriedElement, QueryElementsRequest, Screenshot,
    ScrollDirection, SearchKind, SearchMatch, SearchRequest, SearchResult, StructureElement, UiElement,
};
use crate::util::preview;

const USER_AGENT: &str = concat!("browser-agent/", env!("CARGO_PKG_VERSION"));
const TEXT_PREVIEW_CHARS: usize = 2000;
const MAX_UI_ELEMENTS: usize = 100;
const DEFAULT_QUERY_LIMIT: usize = 20;
const MAX_QUERY_LIMIT: usize = 100;
const DEFAULT_SEARCH_LIMIT: usize = 10;

const STRUCTURAL_TAGS: &[&str] = &[
    "header", "nav", "main", "section", "article", "aside", "footer", "form", "h1", "h2", "h3", "div",
];

struct LoadedPage {
    url: Url,
    html: String,
}

/// An opening tag found in the page source.
struct Tag {
    name: String,
    attrs: BTreeMap<String, String>,
    /// Byte offset just past the closing `>`
    end: usize,
}

impl Tag {
    fn id(&self) -> Option<&str> {
        self.attrs.get("id").map(String::as_str).filter(|s| !s.is_empty())
    }

    fn classes(&self) -> Vec<String> {
        self.attrs
            .get("class")
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Best stable selector for this element.
    fn selector(&self) -> String {
        if let Some(id) = self.id() {
            return format!("#{}", id);
        }
        if let Some(name) = self.attrs.get("name").filter(|n| !n.is_empty()) {
            return format!("{}[name=\"{}\"]", self.name, name);
        }
        match self.classes().first() {
            Some(class) => format!("{}.{}", self.name, class),
            None => self.name.clone(),
        }
    }
}

/// `tag`, `#id`, `.class`, `tag#id` or `tag.class`.
#[derive(Debug, Default, PartialEq)]
struct SimpleSelector {
    tag: Option<String>,
    id: Option<String>,
    class: Option<String>,
}

impl SimpleSelector {
    fn parse(selector: &str) -> Option<Self> {
        let selector = selector.trim();
        if selector.is_empty()
            || selector
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '>' | '[' | ':' | ',' | '+' | '~' | '*'))
        {
            return None;
        }

        let split = selector.find(['#', '.']).unwrap_or(selector.len());
        let (tag, rest) = selector.split_at(split);
        let mut parsed = SimpleSelector {
            tag: (!tag.is_empty()).then(|| tag.to_ascii_lowercase()),
            ..Self::default()
        };
        if let Some(id) = rest.strip_prefix('#') {
            if id.is_empty() || id.contains(['#', '.']) {
                return None;
            }
            parsed.id = Some(id.to_string());
        } else if let Some(class) = rest.strip_prefix('.') {
            if class.is_empty() || class.contains(['#', '.']) {
                return None;
            }
            parsed.class = Some(class.to_string());
        }
        Some(parsed)
    }

    fn matches(&self, tag: &Tag) -> bool {
        self.tag.as_deref().map_or(true, |t| t == tag.name)
            && self.id.as_deref().map_or(true, |id| tag.id() == Some(id))
            && self
                .class
                .as_ref()
                .map_or(true, |class| tag.classes().iter().any(|c| c == class))
    }
}

/// Compiled page patterns.
struct HtmlPatterns {
    title: Regex,
    hidden_block: Regex,
    open_tag: Regex,
    any_tag: Regex,
    attribute: Regex,
    whitespace: Regex,
}

impl HtmlPatterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            title: Regex::new(r"(?is)<title[^>]*>(.*?)</title>")?,
            hidden_block: Regex::new(r"(?is)<(?:script|style|noscript|template)\b.*?</(?:script|style|noscript|template)>")?,
            open_tag: Regex::new(r"(?s)<([a-zA-Z][a-zA-Z0-9-]*)((?:[^>\x22']|\x22[^\x22]*\x22|'[^']*')*)>")?,
            any_tag: Regex::new(r"(?s)<[^>]*>")?,
            attribute: Regex::new(
                r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#,
            )?,
            whitespace: Regex::new(r"\s+")?,
        })
    }

    fn title(&self, html: &str) -> String {
        self.title
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| self.text_of(m.as_str()))
            .unwrap_or_default()
    }

    /// Visible text of an HTML fragment, whitespace collapsed.
    fn text_of(&self, html: &str) -> String {
        let without_hidden = self.hidden_block.replace_all(html, " ");
        let without_tags = self.any_tag.replace_all(&without_hidden, " ");
        let decoded = decode_entities(&without_tags);
        self.whitespace.replace_all(&decoded, " ").trim().to_string()
    }

    fn tags<'h>(&'h self, html: &'h str) -> impl Iterator<Item = Tag> + 'h {
        self.open_tag.captures_iter(html).filter_map(move |caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?.as_str().to_ascii_lowercase();
            let raw_attrs = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            let attrs = self
                .attribute
                .captures_iter(raw_attrs)
                .filter_map(|a| {
                    let key = a.get(1)?.as_str().to_ascii_lowercase();
                    let value = a.get(2).or_else(|| a.get(3)).or_else(|| a.get(4))?.as_str();
                    Some((key, decode_entities(value)))
                })
                .collect();
            Some(Tag {
                name,
                attrs,
                end: whole.end(),
            })
        })
    }

    /// Inner HTML from `tag` to the first matching close tag.
    fn inner_html<'h>(&self, html: &'h str, tag: &Tag) -> &'h str {
        let rest = &html[tag.end..];
        let close = format!("</{}", tag.name);
        let end = rest.to_ascii_lowercase().find(&close).unwrap_or(0);
        &rest[..end]
    }

    /// Text directly after `tag`, up to the next tag.
    fn leading_text(&self, html: &str, tag: &Tag) -> String {
        let rest = &html[tag.end..];
        let end = rest.find('<').unwrap_or(rest.len());
        self.text_of(&rest[..end])
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Accept `example.com` as well as full URLs; only http(s) is allowed.
pub(crate) fn normalize_url(input: &str) -> anyhow::Result<Url> {
    let input = input.trim();
    if input.is_empty() {
        anyhow::bail!("url must not be empty");
    }
    let candidate = if input.contains("://") {
        input.to_string()
    } else {
        format!("https://{}", input)
    };
    let url = Url::parse(&candidate).map_err(|e| anyhow::anyhow!("invalid url '{}': {}", input, e))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => anyhow::bail!("unsupported url scheme '{}'", other),
    }
}

/// Browser port backed by HTTP fetches.
pub struct HttpBrowser {
    client: reqwest::Client,
    patterns: HtmlPatterns,
    page: Mutex<Option<LoadedPage>>,
}

impl HttpBrowser {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            patterns: HtmlPatterns::compile()?,
            page: Mutex::new(None),
        })
    }

    async fn set_page(&self, url: Url, html: String) {
        *self.page.lock().await = Some(LoadedPage { url, html });
    }

    /// Run `f` over the loaded page.
    async fn with_page<T>(&self, f: impl FnOnce(&LoadedPage) -> anyhow::Result<T>) -> anyhow::Result<T> {
        let guard = self.page.lock().await;
        match guard.as_ref() {
            Some(page) => f(page),
            None => anyhow::bail!("no page loaded; navigate to a URL first"),
        }
    }

    fn unsupported<T>(action: &str) -> anyhow::Result<T> {
        anyhow::bail!(
            "{} is not supported by the HTTP page session (read-only); report this limitation instead",
            action
        )
    }

    fn ui_elements(&self, html: &str) -> Vec<UiElement> {
        self.patterns
            .tags(html)
            .filter_map(|tag| {
                let kind = match tag.name.as_str() {
                    "a" if tag.attrs.contains_key("href") => "link",
                    "button" => "button",
                    "input" => match tag.attrs.get("type").map(String::as_str) {
                        Some("hidden") => return None,
                        Some("submit") | Some("button") => "button",
                        Some("checkbox") => "checkbox",
                        Some("radio") => "radio",
                        _ => "input",
                    },
                    "select" => "select",
                    "textarea" => "textarea",
                    _ => return None,
                };
                let text = match tag.name.as_str() {
                    "a" | "button" => self.patterns.text_of(self.patterns.inner_html(html, &tag)),
                    _ => tag
                        .attrs
                        .get("placeholder")
                        .or_else(|| tag.attrs.get("value"))
                        .cloned()
                        .unwrap_or_default(),
                };
                Some(UiElement {
                    id: String::new(),
                    kind: kind.to_string(),
                    text,
                    aria_label: tag.attrs.get("aria-label").cloned().unwrap_or_default(),
                    selector: tag.selector(),
                })
            })
            .take(MAX_UI_ELEMENTS)
            .enumerate()
            .map(|(i, mut element)| {
                element.id = format!("e{}", i + 1);
                element
            })
            .collect()
    }

    fn structure(&self, html: &str) -> Vec<StructureElement> {
        let mut depth: usize = 0;
        let mut last_end = 0;
        let lower = html.to_ascii_lowercase();
        let mut elements = Vec::new();

        for tag in self.patterns.tags(html) {
            if !STRUCTURAL_TAGS.contains(&tag.name.as_str()) {
                continue;
            }
            // approximate nesting from structural open/close tags seen so far
            let between = &lower[last_end..tag.end];
            let closes = STRUCTURAL_TAGS
                .iter()
                .map(|t| between.matches(&format!("</{}", t)).count())
                .sum::<usize>();
            depth = depth.saturating_sub(closes);
            last_end = tag.end;

            let level = depth;
            depth += 1;
            if tag.name == "div" && tag.id().is_none() && tag.classes().is_empty() {
                continue;
            }
            elements.push(StructureElement {
                tag_name: tag.name.clone(),
                id: tag.id().map(str::to_string),
                classes: tag.classes(),
                text: self.patterns.leading_text(html, &tag),
                selector: tag.selector(),
                level,
            });
        }
        elements
    }

    fn extract_value(&self, html: &str, tag: &Tag, kind: &str) -> String {
        match kind {
            "text" => self.patterns.text_of(self.patterns.inner_html(html, tag)),
            "html" => self.patterns.inner_html(html, tag).trim().to_string(),
            "selector" => tag.selector(),
            other => match other.strip_prefix("attr:") {
                Some(name) => tag.attrs.get(name).cloned().unwrap_or_default(),
                None => String::new(),
            },
        }
    }
}

#[async_trait]
impl BrowserPort for HttpBrowser {
    async fn navigate(&self, url: &str) -> anyhow::Result<()> {
        let url = normalize_url(url)?;
        tracing::info!(url = %url, "Fetching page");

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        let final_url = response.url().clone();
        if !status.is_success() {
            anyhow::bail!("HTTP {} while loading {}", status.as_u16(), final_url);
        }
        let html = response.text().await?;
        tracing::debug!(url = %final_url, bytes = html.len(), "Page loaded");
        self.set_page(final_url, html).await;
        Ok(())
    }

    async fn click(&self, _selector: &str) -> anyhow::Result<()> {
        Self::unsupported("click")
    }

    async fn click_observed(&self, _selector: &str) -> anyhow::Result<PageChanges> {
        Self::unsupported("click")
    }

    async fn batch_click(&self, _selectors: &[String]) -> anyhow::Result<()> {
        Self::unsupported("click")
    }

    async fn fill(&self, _selector: &str, _text: &str) -> anyhow::Result<()> {
        Self::unsupported("fill")
    }

    async fn batch_fill(&self, _fields: &BTreeMap<String, String>) -> anyhow::Result<()> {
        Self::unsupported("fill")
    }

    async fn press_enter(&self) -> anyhow::Result<()> {
        Self::unsupported("press enter")
    }

    async fn scroll(&self, _direction: ScrollDirection) -> anyhow::Result<()> {
        // The whole document is always visible to observation
        self.with_page(|_| Ok(())).await
    }

    async fn screenshot(&self) -> anyhow::Result<Screenshot> {
        Self::unsupported("screenshot")
    }

    async fn page_context(&self) -> anyhow::Result<PageContext> {
        self.with_page(|page| {
            Ok(PageContext {
                url: page.url.to_string(),
                title: self.patterns.title(&page.html),
                text_content: preview(&self.patterns.text_of(&page.html), TEXT_PREVIEW_CHARS),
                elements: self.ui_elements(&page.html),
            })
        })
        .await
    }

    async fn page_structure(&self) -> anyhow::Result<PageStructure> {
        self.with_page(|page| {
            Ok(PageStructure {
                url: page.url.to_string(),
                title: self.patterns.title(&page.html),
                elements: self.structure(&page.html),
            })
        })
        .await
    }

    async fn query_elements(&self, request: &QueryElementsRequest) -> anyhow::Result<Vec<QueriedElement>> {
        let selector = SimpleSelector::parse(&request.selector).ok_or_else(|| {
            anyhow::anyhow!(
                "selector '{}' is not supported; use tag, #id, .class, tag#id or tag.class",
                request.selector
            )
        })?;
        let limit = request.limit.unwrap_or(DEFAULT_QUERY_LIMIT).clamp(1, MAX_QUERY_LIMIT);

        self.with_page(|page| {
            let html = page.html.as_str();
            let mut results = Vec::new();
            for (n, tag) in self.patterns.tags(html).filter(|t| selector.matches(t)).enumerate() {
                if results.len() >= limit {
                    break;
                }
                let element_selector = match tag.id() {
                    Some(id) => format!("#{}", id),
                    None => format!("{}:nth-of-type({})", request.selector, n + 1),
                };

                let mut data = BTreeMap::new();
                for (key, kind) in &request.extract {
                    let value = if key == "_self" {
                        self.extract_value(html, &tag, kind)
                    } else {
                        let inner = self.patterns.inner_html(html, &tag);
                        SimpleSelector::parse(key)
                            .and_then(|sub| self.patterns.tags(inner).find(|t| sub.matches(t)))
                            .map(|child| self.extract_value(inner, &child, kind))
                            .unwrap_or_default()
                    };
                    data.insert(key.clone(), value);
                }
                results.push(QueriedElement {
                    selector: element_selector,
                    data,
                });
            }
            Ok(results)
        })
        .await
    }

    async fn search(&self, request: &SearchRequest) -> anyhow::Result<SearchResult> {
        let limit = request.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).max(1);
        let query = request.query.trim();
        let query_lower = query.to_lowercase();
        let selector = match request.kind {
            SearchKind::Selector => Some(SimpleSelector::parse(query).ok_or_else(|| {
                anyhow::anyhow!("selector '{}' is not supported by the HTTP page session", query)
            })?),
            _ => None,
        };

        self.with_page(|page| {
            let html = page.html.as_str();
            let mut parents: Vec<String> = Vec::new();
            let mut matches = Vec::new();

            for tag in self.patterns.tags(html) {
                if matches.len() >= limit {
                    break;
                }
                if STRUCTURAL_TAGS.contains(&tag.name.as_str()) && (tag.id().is_some() || !tag.classes().is_empty()) {
                    parents.push(tag.selector());
                }
                let text = self.patterns.leading_text(html, &tag);
                let hit = match request.kind {
                    SearchKind::Text => !text.is_empty() && text == query,
                    SearchKind::Contains => !text.is_empty() && text.to_lowercase().contains(&query_lower),
                    SearchKind::Id => tag.id() == Some(query),
                    SearchKind::Selector => selector.as_ref().map_or(false, |s| s.matches(&tag)),
                };
                if hit {
                    matches.push(SearchMatch {
                        tag_name: tag.name.clone(),
                        selector: tag.selector(),
                        text,
                        parent_selector: parents.last().cloned(),
                    });
                }
            }

            Ok(SearchResult {
                kind: request.kind,
                query: request.query.clone(),
                matches,
            })
        })
        .await
    }

    async fn current_url(&self) -> String {
        self.page
            .lock()
            .await
            .as_ref()
            .map(|p| p.url.to_string())
            .unwrap_or_else(|| "about:blank".to_string())
    }
}
