//! Browser tools - JSON front-ends over a [`BrowserPort`].
//!
//! Each tool validates its arguments, performs one port operation and turns
//! the result into a compact text observation for the model.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_args, Tool, ToolName};
use crate::agents::AgentContext;
use crate::browser::{
    BrowserPort, PageChanges, PageStructure, QueriedElement, QueryElementsRequest, ScrollDirection,
    SearchRequest, SearchResult,
};

const MAX_BATCH_CLICKS: usize = 50;
const MAX_BATCH_FIELDS: usize = 20;
const DEFAULT_OBSERVE_LIMIT: usize = 50;
const MAX_SEARCH_LIMIT: usize = 50;
const DEFAULT_SEARCH_LIMIT: usize = 10;

/// All nine browser tools over one port, in canonical order.
pub fn browser_tools(browser: Arc<dyn BrowserPort>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(NavigateTool::new(browser.clone())) as Arc<dyn Tool>,
        Arc::new(ClickTool::new(browser.clone())),
        Arc::new(FillTool::new(browser.clone())),
        Arc::new(ScrollTool::new(browser.clone())),
        Arc::new(ScreenshotTool::new(browser.clone())),
        Arc::new(PressEnterTool::new(browser.clone())),
        Arc::new(ObserveTool::new(browser.clone())),
        Arc::new(QueryElementsTool::new(browser.clone())),
        Arc::new(SearchTool::new(browser)),
    ]
}

macro_rules! browser_tool {
    ($name:ident) => {
        pub struct $name {
            browser: Arc<dyn BrowserPort>,
        }

        impl $name {
            pub fn new(browser: Arc<dyn BrowserPort>) -> Self {
                Self { browser }
            }
        }
    };
}

browser_tool!(NavigateTool);
browser_tool!(ClickTool);
browser_tool!(FillTool);
browser_tool!(ScrollTool);
browser_tool!(ScreenshotTool);
browser_tool!(PressEnterTool);
browser_tool!(ObserveTool);
browser_tool!(QueryElementsTool);
browser_tool!(SearchTool);

fn empty_schema() -> Value {
    json!({"type": "object", "properties": {}, "required": []})
}

// ============================================================================
// Navigation
// ============================================================================

#[derive(Deserialize)]
struct NavigateArgs {
    url: String,
}

#[async_trait]
impl Tool for NavigateTool {
    fn name(&self) -> ToolName {
        ToolName::BrowserNavigate
    }

    fn description(&self) -> String {
        "Navigate the browser to a URL. Accepts full URLs (https://example.com) or bare domains. \
         Returns the final URL after redirects."
            .to_string()
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "URL to navigate to"}
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, _ctx: &AgentContext, args: &str) -> anyhow::Result<String> {
        let args: NavigateArgs = parse_args(args)?;
        self.browser.navigate(&args.url).await?;
        Ok(format!("Navigated to {}", self.browser.current_url().await))
    }
}

#[derive(Deserialize)]
struct ScrollArgs {
    direction: ScrollDirection,
}

#[async_trait]
impl Tool for ScrollTool {
    fn name(&self) -> ToolName {
        ToolName::BrowserScroll
    }

    fn description(&self) -> String {
        "Scroll the page: 'up' or 'down' by one viewport, 'top' or 'bottom' to the page edges. \
         Observe again afterwards to see newly visible elements."
            .to_string()
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "direction": {
                    "type": "string",
                    "enum": ["up", "down", "top", "bottom"],
                    "description": "Scroll direction"
                }
            },
            "required": ["direction"]
        })
    }

    async fn execute(&self, _ctx: &AgentContext, args: &str) -> anyhow::Result<String> {
        let args: ScrollArgs = parse_args(args)?;
        self.browser.scroll(args.direction).await?;
        Ok(format!("Scrolled {}", args.direction.as_str()))
    }
}

// ============================================================================
// Interaction
// ============================================================================

#[derive(Deserialize)]
struct ClickArgs {
    #[serde(default)]
    selectors: Vec<String>,
    #[serde(default)]
    observe: bool,
}

#[async_trait]
impl Tool for ClickTool {
    fn name(&self) -> ToolName {
        ToolName::BrowserClick
    }

    fn description(&self) -> String {
        format!(
            "Click page elements. Pass one selector for a single click or up to {} for a batch, \
             clicked in order. Set 'observe' to report what changed after a single click \
             (URL change, modals, new elements).",
            MAX_BATCH_CLICKS
        )
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "selectors": {
                    "type": "array",
                    "items": {"type": "string"},
                    "maxItems": MAX_BATCH_CLICKS,
                    "description": "CSS selectors to click, e.g. [\"#submit\"]"
                },
                "observe": {
                    "type": "boolean",
                    "default": false,
                    "description": "Report page changes after clicking (single selector only)"
                }
            },
            "required": ["selectors"]
        })
    }

    async fn execute(&self, _ctx: &AgentContext, args: &str) -> anyhow::Result<String> {
        let args: ClickArgs = parse_args(args)?;
        match args.selectors.len() {
            0 => anyhow::bail!("selectors array is required and must not be empty"),
            n if n > MAX_BATCH_CLICKS => {
                anyhow::bail!("too many selectors (max {}, got {})", MAX_BATCH_CLICKS, n)
            }
            n if n > 1 && args.observe => {
                anyhow::bail!("observe mode only works with a single selector")
            }
            _ => {}
        }

        if args.observe {
            let changes = self.browser.click_observed(&args.selectors[0]).await?;
            return Ok(format_changes(&changes));
        }
        if let [selector] = args.selectors.as_slice() {
            self.browser.click(selector).await?;
            return Ok("Click successful".to_string());
        }
        self.browser.batch_click(&args.selectors).await?;
        Ok(format!("Successfully clicked {} elements", args.selectors.len()))
    }
}

fn format_changes(changes: &PageChanges) -> String {
    let mut out = String::from("Click successful");
    if let Some(url) = &changes.new_url {
        let _ = write!(out, "\n✓ URL changed to: {}", url);
    }
    if changes.modal_opened {
        out.push_str("\n✓ Modal/dialog opened");
    }
    if changes.modal_closed {
        out.push_str("\n✓ Modal/dialog closed");
    }
    if !changes.new_elements.is_empty() {
        let _ = write!(out, "\n✓ {} new elements appeared:", changes.new_elements.len());
        for el in changes.new_elements.iter().take(10) {
            let _ = write!(out, "\n  - [{}] {} (selector: {})", el.kind, el.label(&el.kind), el.selector);
        }
        if changes.new_elements.len() > 10 {
            let _ = write!(out, "\n  ... and {} more", changes.new_elements.len() - 10);
        }
    }
    if changes.elements_removed > 0 {
        let _ = write!(out, "\n✓ {} elements removed", changes.elements_removed);
    }
    out
}

#[derive(Deserialize)]
struct FillArgs {
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    fields: BTreeMap<String, String>,
}

#[async_trait]
impl Tool for FillTool {
    fn name(&self) -> ToolName {
        ToolName::BrowserFill
    }

    fn description(&self) -> String {
        format!(
            "Type text into form fields, replacing existing content. Use 'selector' and 'text' for \
             one field or 'fields' (selector to value, up to {}) for several. Submit with \
             browser_press_enter or a click.",
            MAX_BATCH_FIELDS
        )
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "selector": {"type": "string", "description": "CSS selector of a single field"},
                "text": {"type": "string", "description": "Text for the single field"},
                "fields": {
                    "type": "object",
                    "maxProperties": MAX_BATCH_FIELDS,
                    "description": "Selector to value map, e.g. {\"#name\": \"John\", \"#email\": \"john@example.com\"}"
                }
            },
            "oneOf": [
                {"required": ["selector", "text"]},
                {"required": ["fields"]}
            ]
        })
    }

    async fn execute(&self, _ctx: &AgentContext, args: &str) -> anyhow::Result<String> {
        let args: FillArgs = parse_args(args)?;

        if !args.fields.is_empty() {
            if args.fields.len() > MAX_BATCH_FIELDS {
                anyhow::bail!("too many fields (max {}, got {})", MAX_BATCH_FIELDS, args.fields.len());
            }
            self.browser.batch_fill(&args.fields).await?;
            return Ok(format!("Successfully filled {} fields", args.fields.len()));
        }

        match (args.selector.as_deref(), args.text.as_deref()) {
            (Some(selector), Some(text)) if !selector.is_empty() => {
                self.browser.fill(selector, text).await?;
                Ok(format!("Filled '{}' with text", selector))
            }
            _ => anyhow::bail!("either ('selector' and 'text') or 'fields' is required"),
        }
    }
}

#[async_trait]
impl Tool for PressEnterTool {
    fn name(&self) -> ToolName {
        ToolName::BrowserPressEnter
    }

    fn description(&self) -> String {
        "Press Enter in the focused element, e.g. to submit a search after filling it.".to_string()
    }

    fn parameters_schema(&self) -> Value {
        empty_schema()
    }

    async fn execute(&self, _ctx: &AgentContext, _args: &str) -> anyhow::Result<String> {
        self.browser.press_enter().await?;
        Ok("Enter pressed".to_string())
    }
}

// ============================================================================
// Observation
// ============================================================================

#[async_trait]
impl Tool for ScreenshotTool {
    fn name(&self) -> ToolName {
        ToolName::BrowserScreenshot
    }

    fn description(&self) -> String {
        "Capture the visible viewport. Returns a base64 image data URL.".to_string()
    }

    fn parameters_schema(&self) -> Value {
        empty_schema()
    }

    async fn execute(&self, _ctx: &AgentContext, _args: &str) -> anyhow::Result<String> {
        let shot = self.browser.screenshot().await?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&shot.data);
        Ok(format!("data:image/{};base64,{}", shot.format, encoded))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ObserveMode {
    Interactive,
    #[default]
    Structure,
    Full,
}

#[derive(Deserialize)]
struct ObserveArgs {
    #[serde(default)]
    mode: ObserveMode,
    #[serde(default)]
    limit: Option<usize>,
}

#[async_trait]
impl Tool for ObserveTool {
    fn name(&self) -> ToolName {
        ToolName::BrowserObserve
    }

    fn description(&self) -> String {
        "Observe the current page. Modes: 'interactive' lists buttons, links and inputs with \
         selectors; 'structure' (default) shows the semantic layout with key selectors; 'full' \
         combines both."
            .to_string()
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "mode": {
                    "type": "string",
                    "enum": ["interactive", "structure", "full"],
                    "default": "structure",
                    "description": "What to observe"
                },
                "limit": {
                    "type": "number",
                    "default": DEFAULT_OBSERVE_LIMIT,
                    "description": "Maximum structure elements to list"
                }
            },
            "required": []
        })
    }

    async fn execute(&self, _ctx: &AgentContext, args: &str) -> anyhow::Result<String> {
        let args: ObserveArgs = parse_args(args)?;
        let limit = args.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_OBSERVE_LIMIT);

        match args.mode {
            ObserveMode::Interactive => self.observe_interactive().await,
            ObserveMode::Structure => self.observe_structure(limit).await,
            ObserveMode::Full => {
                let interactive = self.observe_interactive().await?;
                let structure = self.observe_structure(limit).await?;
                Ok(format!("{}\n\n{}", interactive, structure))
            }
        }
    }
}

impl ObserveTool {
    async fn observe_interactive(&self) -> anyhow::Result<String> {
        let page = self.browser.page_context().await?;
        let mut out = format!(
            "PAGE OBSERVATION (Interactive Mode):\n\nURL: {}\nTitle: {}\nVisible Elements: {} elements found\n\nINTERACTIVE ELEMENTS:\n",
            page.url,
            page.title,
            page.elements.len()
        );
        for el in &page.elements {
            let _ = writeln!(
                out,
                "- [{}] {}: \"{}\" (selector: {})",
                el.id,
                el.kind,
                el.label("(no text)"),
                el.selector
            );
        }
        let _ = write!(out, "\nPAGE CONTENT PREVIEW:\n{}\n", page.text_content);
        Ok(out)
    }

    async fn observe_structure(&self, limit: usize) -> anyhow::Result<String> {
        let structure = self.browser.page_structure().await?;
        Ok(format_structure(&structure, limit))
    }
}

fn clip(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

fn format_structure(structure: &PageStructure, limit: usize) -> String {
    let mut out = format!(
        "PAGE STRUCTURE:\n\nURL: {}\nTitle: {}\n\nSEMANTIC STRUCTURE:\n",
        structure.url, structure.title
    );

    for el in structure.elements.iter().take(limit) {
        out.push_str(&"  ".repeat(el.level));
        let _ = write!(out, "<{}>", el.tag_name);
        if let Some(id) = &el.id {
            let _ = write!(out, " #{}", id);
        }
        for class in el.classes.iter().take(2) {
            let _ = write!(out, ".{}", class);
        }
        if !el.text.is_empty() {
            let _ = write!(out, ": \"{}\"", clip(&el.text, 50));
        }
        let _ = writeln!(out, " [{}]", el.selector);
    }
    if structure.elements.len() > limit {
        let _ = writeln!(
            out,
            "\n... and {} more elements (use limit parameter to see more)",
            structure.elements.len() - limit
        );
    }

    out.push_str("\nKEY SELECTORS (use these in search/query/click/fill tools):\n");
    let key_elements = structure
        .elements
        .iter()
        .filter(|el| {
            el.id.is_some()
                || (!el.classes.is_empty()
                    && matches!(el.tag_name.as_str(), "section" | "div" | "main" | "article"))
        })
        .take(10);
    for el in key_elements {
        let mut desc = el.tag_name.clone();
        if !el.text.is_empty() {
            let _ = write!(desc, ": \"{}\"", clip(&el.text, 30));
        }
        let _ = writeln!(out, "- {} → {}", desc, el.selector);
    }
    out
}

#[async_trait]
impl Tool for QueryElementsTool {
    fn name(&self) -> ToolName {
        ToolName::BrowserQueryElements
    }

    fn description(&self) -> String {
        "Extract structured data from repeated elements (list items, rows, cards) matched by an \
         exact CSS selector. 'extract' maps sub-selectors (or '_self') to 'text', 'html', \
         'selector' or 'attr:<name>'. Use browser_search first if the selector is unknown."
            .to_string()
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "selector": {
                    "type": "string",
                    "description": "CSS selector of the repeated elements, e.g. '.product'"
                },
                "limit": {
                    "type": "number",
                    "description": "Maximum elements to return (default 20, max 100)"
                },
                "extract": {
                    "type": "object",
                    "description": "Sub-selector to extraction type, e.g. {'.title': 'text', 'a': 'attr:href', '_self': 'selector'}"
                }
            },
            "required": ["selector", "extract"]
        })
    }

    async fn execute(&self, _ctx: &AgentContext, args: &str) -> anyhow::Result<String> {
        let request: QueryElementsRequest = parse_args(args)?;
        if request.selector.trim().is_empty() {
            anyhow::bail!("selector is required");
        }
        if request.extract.is_empty() {
            anyhow::bail!("extract map is required and must not be empty");
        }
        let elements = self.browser.query_elements(&request).await?;
        Ok(format_query_result(&elements))
    }
}

fn format_query_result(elements: &[QueriedElement]) -> String {
    if elements.is_empty() {
        return "No elements found".to_string();
    }
    let mut out = format!("Found {} elements:\n\n", elements.len());
    for (i, el) in elements.iter().enumerate() {
        let _ = writeln!(out, "#{} [{}]", i + 1, el.selector);
        for (key, value) in el.data.iter().filter(|(_, v)| !v.is_empty()) {
            let _ = writeln!(out, "  {}: {:?}", key, value);
        }
        out.push('\n');
    }
    out
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> ToolName {
        ToolName::BrowserSearch
    }

    fn description(&self) -> String {
        "Find elements on the page and return their selectors. Types: 'text' (exact text), \
         'contains' (partial text, case-insensitive), 'selector' (CSS selector), 'id' (element id)."
            .to_string()
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "type": {
                    "type": "string",
                    "enum": ["text", "contains", "selector", "id"],
                    "description": "Search type"
                },
                "query": {
                    "type": "string",
                    "description": "Text, CSS selector or id to search for"
                },
                "limit": {
                    "type": "number",
                    "default": DEFAULT_SEARCH_LIMIT,
                    "description": "Maximum results (default 10, max 50)"
                }
            },
            "required": ["type", "query"]
        })
    }

    async fn execute(&self, _ctx: &AgentContext, args: &str) -> anyhow::Result<String> {
        let mut request: SearchRequest = parse_args(args)?;
        if request.query.trim().is_empty() {
            anyhow::bail!("query is required");
        }
        request.limit = Some(
            request
                .limit
                .filter(|l| *l > 0)
                .unwrap_or(DEFAULT_SEARCH_LIMIT)
                .min(MAX_SEARCH_LIMIT),
        );
        let result = self.browser.search(&request).await?;
        format_search_result(&result)
    }
}

fn format_search_result(result: &SearchResult) -> anyhow::Result<String> {
    if result.matches.is_empty() {
        return Ok(format!(
            "No results found for {} search: \"{}\"",
            result.kind.as_str(),
            result.query
        ));
    }
    let body = json!({
        "type": result.kind,
        "query": result.query,
        "found": result.matches.len(),
        "results": result.matches,
    });
    Ok(serde_json::to_string_pretty(&body)?)
}
