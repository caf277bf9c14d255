//! Markdown to HTML conversion with pulldown-cmark.
//!
//! Fenced code blocks are routed through a [`FenceHook`] first; blocks the hook
//! declines are tagged with a `language-*` class for the highlighter.

use super::traits::{FenceHook, MarkdownTransform, RenderError};
use crate::dom::escape_html;
use once_cell::sync::Lazy;
use pulldown_cmark::{CodeBlockKind, CowStr, Event, LinkType, Options, Parser, Tag, TagEnd};
use regex::Regex;

static BARE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"]+"#).expect("valid regex"));

/// Options for rendering markdown to HTML.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Enable GitHub Flavored Markdown tables
    pub enable_tables: bool,
    /// Enable strikethrough syntax (~~text~~)
    pub enable_strikethrough: bool,
    /// Enable task list items ([x] and [ ]), always rendered disabled
    pub enable_tasklists: bool,
    /// Enable footnotes ([^1])
    pub enable_footnotes: bool,
    /// Replace straight quotes and dashes with typographic ones
    pub enable_smart_punctuation: bool,
    /// Turn bare http(s) URLs in prose into links
    pub enable_autolinks: bool,
}

impl RenderOptions {
    /// GitHub Flavored Markdown with typographic punctuation.
    pub fn gfm() -> Self {
        Self {
            enable_tables: true,
            enable_strikethrough: true,
            enable_tasklists: true,
            enable_footnotes: true,
            enable_smart_punctuation: true,
            enable_autolinks: true,
        }
    }

    fn to_pulldown_options(&self) -> Options {
        let mut options = Options::empty();
        if self.enable_tables {
            options.insert(Options::ENABLE_TABLES);
        }
        if self.enable_strikethrough {
            options.insert(Options::ENABLE_STRIKETHROUGH);
        }
        if self.enable_tasklists {
            options.insert(Options::ENABLE_TASKLISTS);
        }
        if self.enable_footnotes {
            options.insert(Options::ENABLE_FOOTNOTES);
        }
        if self.enable_smart_punctuation {
            options.insert(Options::ENABLE_SMART_PUNCTUATION);
        }
        options
    }
}

/// Markdown transform backed by pulldown-cmark.
#[derive(Debug, Clone)]
pub struct PulldownTransform {
    options: RenderOptions,
}

impl Default for PulldownTransform {
    fn default() -> Self {
        Self::new(RenderOptions::gfm())
    }
}

impl PulldownTransform {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }
}

/// Default rendering of a fenced block the hook declined.
fn default_fence(language: &str, content: &str) -> String {
    let code = escape_html(content);
    if language.is_empty() {
        format!("<pre><code>{code}</code></pre>\n")
    } else {
        let language = escape_html(language);
        format!("<pre><code class=\"language-{language} hljs\">{code}</code></pre>\n")
    }
}

fn render_fence(info: &str, content: &str, fence_hook: &dyn FenceHook) -> String {
    let language = info.split_whitespace().next().unwrap_or("");
    fence_hook
        .render_fence(language, content)
        .unwrap_or_else(|| default_fence(language, content))
}

/// Length of `url` without trailing sentence punctuation and unbalanced `)`.
fn trim_url_end(url: &str) -> usize {
    let mut end = url.len();
    while let Some(last) = url[..end].chars().next_back() {
        let unbalanced_paren = last == ')'
            && url[..end].matches(')').count() > url[..end].matches('(').count();
        let punctuation = matches!(last, '.' | ',' | ';' | ':' | '!' | '?' | '\'' | '*' | '_');
        if punctuation || unbalanced_paren {
            end -= last.len_utf8();
        } else {
            break;
        }
    }
    end
}

/// Splits `text` into text and link events around bare URLs.
fn linkify_text<'a>(text: &str, out: &mut Vec<Event<'a>>) {
    let mut cursor = 0;
    for found in BARE_URL.find_iter(text) {
        let end = found.start() + trim_url_end(found.as_str());
        if text[found.start()..end].ends_with("://") {
            continue;
        }
        if found.start() > cursor {
            out.push(Event::Text(text[cursor..found.start()].to_string().into()));
        }
        let url: CowStr<'a> = text[found.start()..end].to_string().into();
        out.push(Event::Start(Tag::Link {
            link_type: LinkType::Autolink,
            dest_url: url.clone(),
            title: "".into(),
            id: "".into(),
        }));
        out.push(Event::Text(url));
        out.push(Event::End(TagEnd::Link));
        cursor = end;
    }
    if cursor < text.len() {
        out.push(Event::Text(text[cursor..].to_string().into()));
    }
}

/// Links bare URLs in prose text, leaving links, images and code alone.
///
/// Adjacent text events are merged first since the parser may split a URL at
/// emphasis delimiter candidates.
fn autolink(events: Vec<Event<'_>>) -> Vec<Event<'_>> {
    let mut output = Vec::with_capacity(events.len());
    let mut text = String::new();
    // Nesting depth of links, images and code blocks.
    let mut opaque = 0usize;

    for event in events {
        if opaque == 0 {
            if let Event::Text(fragment) = &event {
                text.push_str(fragment);
                continue;
            }
        }
        if !text.is_empty() {
            linkify_text(&std::mem::take(&mut text), &mut output);
        }
        match &event {
            Event::Start(Tag::Link { .. } | Tag::Image { .. } | Tag::CodeBlock(_)) => opaque += 1,
            Event::End(TagEnd::Link | TagEnd::Image | TagEnd::CodeBlock) => {
                opaque = opaque.saturating_sub(1)
            }
            _ => {}
        }
        output.push(event);
    }
    if !text.is_empty() {
        linkify_text(&text, &mut output);
    }

    output
}

impl MarkdownTransform for PulldownTransform {
    fn render(&self, markdown: &str, fence_hook: &dyn FenceHook) -> Result<String, RenderError> {
        let parser = Parser::new_ext(markdown, self.options.to_pulldown_options());

        let mut processed_events = Vec::new();
        // (info string, accumulated content) of the fenced block being read.
        let mut fence: Option<(String, String)> = None;

        for event in parser {
            match (fence.take(), event) {
                (Some((info, mut content)), Event::Text(text)) => {
                    content.push_str(&text);
                    fence = Some((info, content));
                }
                (Some((info, content)), Event::End(TagEnd::CodeBlock)) => {
                    let html = render_fence(&info, &content, fence_hook);
                    processed_events.push(Event::Html(html.into()));
                }
                (Some(state), _) => fence = Some(state),
                (None, Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info)))) => {
                    fence = Some((info.to_string(), String::new()));
                }
                (None, event) => processed_events.push(event),
            }
        }

        if self.options.enable_autolinks {
            processed_events = autolink(processed_events);
        }

        let mut html_output = String::with_capacity(markdown.len() * 3 / 2);
        pulldown_cmark::html::push_html(&mut html_output, processed_events.into_iter());

        tracing::trace!(
            markdown_len = markdown.len(),
            html_len = html_output.len(),
            "Rendered markdown"
        );

        Ok(html_output)
    }
}
