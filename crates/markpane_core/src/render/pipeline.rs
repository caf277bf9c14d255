use super::{
    ContentSanitizer, DiagramSanitizer, MarkdownTransform, NavSanitizer, PulldownTransform,
    RenderError, Sanitizer,
};
use crate::diagram::{
    render_diagrams, DiagramFenceHook, DiagramRenderer, DiagramSource, DiagramSummary,
    DiagramTheme, SourceOnlyRenderer,
};
use crate::document::Document;
use crate::dom::ContentTree;
use crate::highlight::{Highlighter, SyntectHighlighter, CODE_BLOCK_SELECTOR};
use crate::search::{find_in_content, FindHit, FindQuery};
use crate::settings::Settings;
use crate::slug::Slugger;
use crate::toc::{
    self, ActiveChange, HeadingEntry, NavAction, NavKey, ScrollSpy, TocNavigator, TocNode,
    EMPTY_TOC,
};
use crate::viewport::{ScrollOffsetCache, ScrollRatio, Viewport};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tokio::sync::{mpsc, watch};

/// File content delivered by the host on load and on every external change.
#[derive(Debug, Clone, Default)]
pub struct FilePayload {
    pub content: String,
    pub display_name: Option<String>,
    /// Rendering for PDF export, which always uses the light theme.
    pub pdf_export: bool,
}

/// Summary of one completed render pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// 1-based sequence number of the pass.
    pub pass: u64,
    pub headings: usize,
    /// Non-checkbox inputs dropped by the hardening step.
    pub inputs_removed: usize,
    pub code_blocks: usize,
    pub diagrams: DiagramSummary,
    /// Set when the pass was aborted before the content was committed.
    pub error: Option<String>,
}

#[derive(Debug)]
struct Request {
    content: String,
    /// Scroll position to reapply once the pass, diagrams included, is done.
    restore: Option<ScrollRatio>,
}

/// Everything derived from the headings of the latest pass.
#[derive(Debug)]
struct TocState {
    entries: Vec<HeadingEntry>,
    nav_html: String,
    cache: ScrollOffsetCache,
    spy: ScrollSpy,
    navigator: TocNavigator,
}

impl Default for TocState {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            nav_html: EMPTY_TOC.to_string(),
            cache: ScrollOffsetCache::new(),
            spy: ScrollSpy::default(),
            navigator: TocNavigator::default(),
        }
    }
}

/// Clears the `active` flag however the trampoline exits.
struct ActiveGuard<'a>(&'a Cell<bool>);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Turns markdown into the content tree, one pass at a time.
///
/// A pass runs frontmatter split, markdown transform, sanitize, commit,
/// input hardening, TOC extraction, highlighting, diagram rendering and the
/// scroll cache rebuild, in that order. Diagram rendering is the only
/// suspension point.
///
/// Requests arriving while a pass is running are not run concurrently: they
/// land in a single pending slot, each replacing the previous one, and the
/// running pass picks the slot up when it finishes. The pipeline is `!Send`
/// and meant to live on one thread, typically inside a
/// [`tokio::task::LocalSet`].
pub struct RenderPipeline {
    transform: Box<dyn MarkdownTransform>,
    sanitizer: Box<dyn Sanitizer>,
    nav_sanitizer: NavSanitizer,
    diagram_sanitizer: DiagramSanitizer,
    highlighter: Box<dyn Highlighter>,
    diagrams: Box<dyn DiagramRenderer>,
    viewport: Rc<dyn Viewport>,
    tree: ContentTree,
    toc: RefCell<TocState>,
    settings: RefCell<Settings>,
    system_prefers_dark: Cell<bool>,
    pdf_export: Cell<bool>,
    display_name: RefCell<Option<String>>,
    active: Cell<bool>,
    pending: RefCell<Option<Request>>,
    /// Scroll position the pass in flight will restore.
    restoring: Cell<Option<ScrollRatio>>,
    theme_dirty: Cell<bool>,
    layout_dirty: Cell<bool>,
    passes: Cell<u64>,
    last_report: RefCell<PassReport>,
    errors: RefCell<Option<mpsc::UnboundedSender<String>>>,
    completed: watch::Sender<u64>,
}

impl std::fmt::Debug for RenderPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPipeline")
            .field("active", &self.active.get())
            .field("passes", &self.passes.get())
            .field("settings", &self.settings.borrow())
            .finish_non_exhaustive()
    }
}

impl RenderPipeline {
    /// Pipeline with the default collaborators: pulldown-cmark, ammonia,
    /// syntect and a diagram renderer that shows diagram sources as text.
    pub fn new(viewport: Rc<dyn Viewport>) -> Self {
        let (completed, _) = watch::channel(0);
        let pipeline = Self {
            transform: Box::new(PulldownTransform::default()),
            sanitizer: Box::new(ContentSanitizer::new()),
            nav_sanitizer: NavSanitizer::default(),
            diagram_sanitizer: DiagramSanitizer::default(),
            highlighter: Box::new(SyntectHighlighter::new()),
            diagrams: Box::new(SourceOnlyRenderer),
            viewport,
            tree: ContentTree::new(),
            toc: RefCell::new(TocState::default()),
            settings: RefCell::new(Settings::default()),
            system_prefers_dark: Cell::new(false),
            pdf_export: Cell::new(false),
            display_name: RefCell::new(None),
            active: Cell::new(false),
            pending: RefCell::new(None),
            restoring: Cell::new(None),
            theme_dirty: Cell::new(false),
            layout_dirty: Cell::new(false),
            passes: Cell::new(0),
            last_report: RefCell::new(PassReport::default()),
            errors: RefCell::new(None),
            completed,
        };
        pipeline.initialize_diagrams();
        pipeline
    }

    pub fn with_transform(mut self, transform: impl MarkdownTransform + 'static) -> Self {
        self.transform = Box::new(transform);
        self
    }

    pub fn with_sanitizer(mut self, sanitizer: impl Sanitizer + 'static) -> Self {
        self.sanitizer = Box::new(sanitizer);
        self
    }

    pub fn with_highlighter(mut self, highlighter: impl Highlighter + 'static) -> Self {
        self.highlighter = Box::new(highlighter);
        self
    }

    pub fn with_diagram_renderer(mut self, renderer: impl DiagramRenderer + 'static) -> Self {
        self.diagrams = Box::new(renderer);
        self.initialize_diagrams();
        self
    }

    /// Look-ahead used by the scroll-spy, in pixels.
    pub fn with_scroll_threshold(self, threshold: f64) -> Self {
        self.toc.borrow_mut().spy = ScrollSpy::new(threshold);
        self
    }

    pub fn with_settings(self, settings: Settings) -> Self {
        self.settings.replace(settings);
        self.initialize_diagrams();
        self
    }

    /// Whether a pass is in flight.
    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub fn tree(&self) -> &ContentTree {
        &self.tree
    }

    pub fn settings(&self) -> Settings {
        self.settings.borrow().clone()
    }

    pub fn display_name(&self) -> Option<String> {
        self.display_name.borrow().clone()
    }

    pub fn is_pdf_export(&self) -> bool {
        self.pdf_export.get()
    }

    /// Effective color scheme: PDF export is always light.
    pub fn is_dark(&self) -> bool {
        !self.pdf_export.get()
            && self
                .settings
                .borrow()
                .theme
                .is_dark(self.system_prefers_dark.get())
    }

    pub fn last_report(&self) -> PassReport {
        self.last_report.borrow().clone()
    }

    /// Headings of the latest completed pass.
    pub fn headings(&self) -> Vec<HeadingEntry> {
        self.toc.borrow().entries.clone()
    }

    pub fn toc_tree(&self) -> Vec<TocNode> {
        toc::build_tree(&self.toc.borrow().entries)
    }

    /// Sanitized navigation markup of the latest completed pass.
    pub fn toc_html(&self) -> String {
        self.toc.borrow().nav_html.clone()
    }

    pub fn scroll_offsets(&self) -> ScrollOffsetCache {
        self.toc.borrow().cache.clone()
    }

    /// Receiver of the number of completed passes.
    pub fn subscribe_completed(&self) -> watch::Receiver<u64> {
        self.completed.subscribe()
    }

    /// Receiver of render error messages.
    ///
    /// Subscribing again replaces the previous subscription, whose receiver
    /// then sees the channel closed.
    pub fn subscribe_errors(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.errors.replace(Some(tx));
        rx
    }

    fn emit_error(&self, message: &str) {
        tracing::error!(%message, "Render pass failed");
        let mut errors = self.errors.borrow_mut();
        if let Some(tx) = errors.as_ref() {
            if tx.send(message.to_string()).is_err() {
                errors.take();
            }
        }
    }

    fn initialize_diagrams(&self) {
        let theme = DiagramTheme::new(self.is_dark());
        tracing::debug!(theme = theme.theme, "Initializing diagram renderer");
        self.diagrams.initialize(&theme);
    }

    /// Run `change` and schedule a diagram re-theme if the scheme flipped.
    fn track_theme(&self, change: impl FnOnce()) {
        let was_dark = self.is_dark();
        change();
        if self.is_dark() != was_dark {
            self.theme_dirty.set(true);
        }
    }

    /// Render `content`, or queue it if a pass is in flight.
    pub async fn render(&self, content: impl Into<String>) {
        self.submit(Request {
            content: content.into(),
            restore: None,
        })
        .await
    }

    /// Initial load of a file.
    pub async fn load(&self, payload: FilePayload) {
        let FilePayload {
            content,
            display_name,
            pdf_export,
        } = payload;

        if display_name.is_some() {
            self.display_name.replace(display_name);
        }
        self.track_theme(|| self.pdf_export.set(pdf_export));

        self.render(content).await
    }

    /// Re-render after an external change, keeping the proportional scroll
    /// position.
    pub async fn reload(&self, content: impl Into<String>) {
        let ratio = self.reload_ratio();
        tracing::debug!(ratio = ratio.value(), "Reloading content");
        self.submit(Request {
            content: content.into(),
            restore: Some(ratio),
        })
        .await
    }

    /// Apply new display settings.
    ///
    /// A theme flip re-renders the diagrams; any change re-measures the
    /// headings. Both are deferred until the pass in flight ends.
    pub async fn apply_settings(&self, settings: Settings) {
        if *self.settings.borrow() == settings {
            return;
        }
        self.track_theme(|| {
            self.settings.replace(settings);
        });
        self.layout_dirty.set(true);
        self.drive().await
    }

    /// The host's color scheme changed. Ignored while exporting to PDF.
    pub async fn set_system_dark(&self, prefers_dark: bool) {
        self.track_theme(|| self.system_prefers_dark.set(prefers_dark));
        self.drive().await
    }

    /// The viewport was resized; offsets are re-measured now or at the end of
    /// the pass in flight.
    pub fn on_resize(&self) {
        if self.active.get() {
            self.layout_dirty.set(true);
        } else {
            self.rebuild_scroll_cache();
        }
    }

    /// A scroll event; `true` means the host should schedule a frame and then
    /// call [`Self::on_frame`].
    pub fn on_scroll(&self) -> bool {
        self.toc.borrow_mut().spy.on_scroll()
    }

    /// Recompute the active TOC entry for the current scroll position.
    pub fn on_frame(&self) -> Option<ActiveChange> {
        let scroll_top = self.viewport.scroll_top();
        let mut toc = self.toc.borrow_mut();
        let TocState { cache, spy, .. } = &mut *toc;
        spy.on_frame(cache, scroll_top)
    }

    /// Keyboard input on the TOC. Activation scrolls to the heading.
    pub fn handle_toc_key(&self, key: NavKey) -> NavAction {
        let action = self.toc.borrow_mut().navigator.handle_key(key);
        if let NavAction::Activate(id) = &action {
            self.scroll_to_heading(id);
        }
        action
    }

    /// Scroll so the heading `id` is at the top. Returns `false` for unknown
    /// or unmeasured headings.
    pub fn scroll_to_heading(&self, id: &str) -> bool {
        let offset = self
            .toc
            .borrow()
            .cache
            .entries()
            .iter()
            .find(|(heading, _)| heading == id)
            .map(|(_, offset)| *offset);
        match offset {
            Some(offset) => {
                self.viewport.set_scroll_top(offset);
                true
            }
            None => false,
        }
    }

    /// Find-in-page over the latest completed pass.
    pub fn find(&self, query: &FindQuery) -> Vec<FindHit> {
        find_in_content(&self.tree, query, &self.toc.borrow().entries)
    }

    /// Position a new reload should come back to.
    ///
    /// While a pass runs the layout is in flux, so the position captured for
    /// the queued or in-flight reload is carried over instead of measuring.
    fn reload_ratio(&self) -> ScrollRatio {
        let queued = self
            .pending
            .borrow()
            .as_ref()
            .and_then(|request| request.restore);
        let in_flight = self.active.get().then(|| self.restoring.get()).flatten();
        queued
            .or(in_flight)
            .unwrap_or_else(|| ScrollRatio::capture(self.viewport.as_ref()))
    }

    async fn submit(&self, request: Request) {
        if self.pending.replace(Some(request)).is_some() {
            tracing::debug!("Queued render superseded by a newer request");
        }
        self.drive().await
    }

    /// Run queued work until none is left. Returns at once if another caller
    /// is already driving; that caller will pick up whatever was queued.
    async fn drive(&self) {
        if self.active.replace(true) {
            return;
        }
        let _guard = ActiveGuard(&self.active);

        loop {
            let request = self.pending.borrow_mut().take();
            if let Some(request) = request {
                if self.theme_dirty.take() {
                    self.initialize_diagrams();
                }
                self.layout_dirty.set(false);
                self.run_pass(request).await;
            } else if self.theme_dirty.take() {
                self.initialize_diagrams();
                self.rerender_diagrams().await;
                self.layout_dirty.set(true);
            } else if self.layout_dirty.take() {
                self.rebuild_scroll_cache();
            } else {
                break;
            }
        }
    }

    /// Frontmatter split, transform and sanitize.
    fn prepare(&self, content: &str) -> Result<String, RenderError> {
        let document = Document::new(content);
        let body_html = self.transform.render(document.body(), &DiagramFenceHook)?;
        let html = match document.frontmatter_html() {
            Some(frontmatter_html) => frontmatter_html + &body_html,
            None => body_html,
        };
        self.sanitizer.sanitize(&html)
    }

    async fn run_pass(&self, request: Request) {
        let pass = self.passes.get() + 1;
        self.passes.set(pass);
        let mut report = PassReport {
            pass,
            ..Default::default()
        };
        self.restoring.set(request.restore);

        // Heading nodes of the previous pass must not outlive its content.
        {
            let mut toc = self.toc.borrow_mut();
            toc.entries.clear();
            toc.cache.invalidate();
            toc.spy.reset();
        }

        match self.prepare(&request.content) {
            Ok(html) => {
                self.tree.commit(&html);
                report.inputs_removed = self.tree.harden_inputs();

                let entries = toc::extract(&self.tree, &mut Slugger::new());
                let nav_html = toc::render_nav(&entries, &self.nav_sanitizer);
                report.headings = entries.len();
                {
                    let mut toc = self.toc.borrow_mut();
                    toc.navigator = TocNavigator::new(&entries);
                    toc.nav_html = nav_html;
                    toc.entries = entries;
                }

                for code in self.tree.select(CODE_BLOCK_SELECTOR) {
                    self.highlighter.highlight_element(&code);
                    report.code_blocks += 1;
                }

                report.diagrams = render_diagrams(
                    &self.tree,
                    self.diagrams.as_ref(),
                    &self.diagram_sanitizer,
                    pass,
                    DiagramSource::Content,
                )
                .await;
            }
            Err(err) => {
                let message = err.to_string();
                self.tree.show_error(&message);
                {
                    let mut toc = self.toc.borrow_mut();
                    toc.navigator = TocNavigator::default();
                    toc.nav_html = EMPTY_TOC.to_string();
                }
                self.emit_error(&message);
                report.error = Some(message);
            }
        }

        self.rebuild_scroll_cache();
        if let Some(ratio) = self.restoring.take() {
            ratio.restore(self.viewport.as_ref());
        }

        tracing::debug!(
            pass,
            headings = report.headings,
            code_blocks = report.code_blocks,
            diagrams_rendered = report.diagrams.rendered,
            diagrams_failed = report.diagrams.failed,
            "Render pass completed"
        );

        self.last_report.replace(report);
        self.completed.send_replace(pass);
    }

    async fn rerender_diagrams(&self) {
        let pass = self.passes.get();
        if pass == 0 {
            return;
        }
        let summary = render_diagrams(
            &self.tree,
            self.diagrams.as_ref(),
            &self.diagram_sanitizer,
            pass,
            DiagramSource::Original,
        )
        .await;
        tracing::debug!(
            rendered = summary.rendered,
            failed = summary.failed,
            "Diagrams re-rendered for theme change"
        );
    }

    fn rebuild_scroll_cache(&self) {
        let scroll_top = self.viewport.scroll_top();
        let mut toc = self.toc.borrow_mut();
        let TocState {
            entries,
            cache,
            spy,
            ..
        } = &mut *toc;
        cache.rebuild(entries.iter().map(|entry| entry.id.as_str()), self.viewport.as_ref());
        spy.update(cache, scroll_top);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::DiagramError;
    use crate::dom::escape_html;
    use crate::render::FenceHook;
    use crate::settings::ThemeMode;
    use crate::viewport::StaticViewport;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::task::{spawn_local, yield_now, LocalSet};

    #[derive(Clone, Default)]
    struct Recorder {
        sources: Rc<RefCell<Vec<String>>>,
        themes: Rc<RefCell<Vec<&'static str>>>,
    }

    struct FakeDiagrams {
        recorder: Recorder,
        delay: Duration,
        on_render: Option<Rc<dyn Fn()>>,
    }

    impl FakeDiagrams {
        fn new(recorder: &Recorder) -> Self {
            Self {
                recorder: recorder.clone(),
                delay: Duration::from_millis(50),
                on_render: None,
            }
        }
    }

    #[async_trait(?Send)]
    impl DiagramRenderer for FakeDiagrams {
        fn initialize(&self, theme: &DiagramTheme) {
            self.recorder.themes.borrow_mut().push(theme.theme);
        }

        async fn render_one(&self, _id: &str, source: &str) -> Result<String, DiagramError> {
            let source = source.trim().to_string();
            self.recorder.sources.borrow_mut().push(source.clone());
            tokio::time::sleep(self.delay).await;
            if let Some(on_render) = &self.on_render {
                on_render();
            }
            if source.contains("invalid") {
                Err(DiagramError::Syntax("Parse error".into()))
            } else {
                Ok(format!("<svg>{}</svg>", escape_html(&source)))
            }
        }
    }

    struct CountingHighlighter(Rc<Cell<usize>>);

    impl Highlighter for CountingHighlighter {
        fn highlight_element(&self, _node: &kuchikiki::NodeRef) {
            self.0.set(self.0.get() + 1);
        }
    }

    struct FailingTransform;

    impl MarkdownTransform for FailingTransform {
        fn render(
            &self,
            _markdown: &str,
            _fence_hook: &dyn FenceHook,
        ) -> Result<String, RenderError> {
            Err(RenderError::Transform("boom".into()))
        }
    }

    fn pipeline(viewport: Rc<StaticViewport>, recorder: &Recorder) -> RenderPipeline {
        RenderPipeline::new(viewport)
            .with_highlighter(CountingHighlighter(Rc::default()))
            .with_diagram_renderer(FakeDiagrams::new(recorder))
    }

    fn heading_texts(pipeline: &RenderPipeline) -> Vec<String> {
        pipeline.headings().into_iter().map(|h| h.text).collect()
    }

    fn diagram(source: &str) -> String {
        format!("```mermaid\n{source}\n```\n")
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_pass() {
        let highlighted = Rc::new(Cell::new(0));
        let recorder = Recorder::default();
        let pipeline = RenderPipeline::new(Rc::new(StaticViewport::new(600.0)))
            .with_highlighter(CountingHighlighter(highlighted.clone()))
            .with_diagram_renderer(FakeDiagrams::new(&recorder));

        let markdown = format!(
            "---\ntitle: <x>\n---\n# Title\n\n- [x] done\n\n<input type=\"text\">\n\n\
             ```rust\nfn main() {{}}\n```\n\n{}\n<script>alert(1)</script>\n",
            diagram("graph TD; A-->B")
        );
        pipeline.render(markdown).await;

        let html = pipeline.tree().inner_html();
        assert!(html.contains("<section class=\"frontmatter\">"));
        assert!(html.contains("title: &lt;x&gt;"));
        assert!(html.contains("<h1 id=\"user-content-title\">Title</h1>"));
        assert!(html.contains("<svg>graph TD; A--&gt;B</svg>"));
        assert!(!html.contains("<script>"));
        assert!(!html.contains("type=\"text\""));

        let report = pipeline.last_report();
        assert_eq!(report.pass, 1);
        assert_eq!(report.headings, 1);
        assert_eq!(report.code_blocks, 1);
        assert_eq!(report.diagrams, DiagramSummary { rendered: 1, failed: 0 });
        assert_eq!(report.error, None);
        assert_eq!(highlighted.get(), 1);
        assert_eq!(*pipeline.subscribe_completed().borrow(), 1);
        assert!(!pipeline.is_active());

        for checkbox in pipeline.tree().select("input") {
            assert!(crate::dom::attribute(&checkbox, "disabled").is_some());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_renders_last_write_wins() {
        LocalSet::new()
            .run_until(async {
                let recorder = Recorder::default();
                let pipeline = Rc::new(pipeline(Rc::new(StaticViewport::new(600.0)), &recorder));

                let first = spawn_local({
                    let pipeline = pipeline.clone();
                    async move { pipeline.render(format!("# A\n\n{}", diagram("A"))).await }
                });
                while !pipeline.is_active() {
                    yield_now().await;
                }

                // Both return immediately; only the latest stays queued.
                pipeline.render(format!("# B\n\n{}", diagram("B"))).await;
                pipeline.render(format!("# C\n\n{}", diagram("C"))).await;
                assert!(pipeline.is_active());

                first.await.unwrap();

                assert!(!pipeline.is_active());
                assert_eq!(heading_texts(&pipeline), vec!["C"]);
                assert_eq!(pipeline.tree().select("h1").len(), 1);
                assert_eq!(pipeline.tree().select("div.mermaid").len(), 1);
                assert_eq!(*recorder.sources.borrow(), vec!["A", "C"]);
                assert_eq!(pipeline.last_report().pass, 2);
                assert_eq!(*pipeline.subscribe_completed().borrow(), 2);
            })
            .await;
    }

    #[tokio::test]
    async fn test_empty_toc() {
        let viewport = Rc::new(StaticViewport::new(600.0));
        let pipeline = pipeline(viewport, &Recorder::default());
        pipeline.render("Just a paragraph.").await;

        assert_eq!(pipeline.toc_html(), EMPTY_TOC);
        assert!(pipeline.scroll_offsets().is_empty());
        assert!(pipeline.toc_tree().is_empty());
    }

    #[tokio::test]
    async fn test_outline_and_offsets() {
        let viewport = Rc::new(StaticViewport::new(600.0));
        viewport.set_layout(
            3000.0,
            [
                ("user-content-a".to_string(), 0.0),
                ("user-content-a1".to_string(), 700.0),
                ("user-content-b".to_string(), 1500.0),
            ],
        );
        let pipeline = pipeline(viewport.clone(), &Recorder::default());
        pipeline.render("## A\n\n### A1\n\n## B\n").await;

        let tree = pipeline.toc_tree();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].children.len(), 1);
        assert!(tree[1].children.is_empty());

        let offsets = pipeline.scroll_offsets();
        assert!(offsets.is_valid());
        assert_eq!(offsets.len(), 3);

        assert!(pipeline.on_scroll());
        assert!(!pipeline.on_scroll());
        viewport.set_scroll_top(1450.0);
        let change = pipeline.on_frame().unwrap();
        assert_eq!(change.previous.as_deref(), Some("user-content-a"));
        assert_eq!(change.current, "user-content-b");
        assert_eq!(pipeline.on_frame(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_diagram_error_isolation() {
        let recorder = Recorder::default();
        let pipeline = pipeline(Rc::new(StaticViewport::new(600.0)), &recorder);
        let markdown = format!(
            "# Before\n\n{}\n{}\n## After\n",
            diagram("graph TD; ok"),
            diagram("invalid !!")
        );
        pipeline.render(markdown).await;

        let html = pipeline.tree().inner_html();
        assert!(html.contains("<svg>graph TD; ok</svg>"));
        assert!(html.contains("<div class=\"mermaid-error\">Diagram error: Parse error</div>"));
        assert_eq!(heading_texts(&pipeline), vec!["Before", "After"]);
        assert_eq!(
            pipeline.last_report().diagrams,
            DiagramSummary { rendered: 1, failed: 1 }
        );
    }

    #[tokio::test]
    async fn test_transform_failure_is_shown_and_reported() {
        let pipeline = RenderPipeline::new(Rc::new(StaticViewport::new(600.0)))
            .with_transform(FailingTransform)
            .with_highlighter(CountingHighlighter(Rc::default()));

        let mut replaced = pipeline.subscribe_errors();
        let mut errors = pipeline.subscribe_errors();
        assert_eq!(replaced.recv().await, None);

        pipeline.render("# Ignored").await;

        assert_eq!(
            pipeline.tree().inner_html(),
            "<div class=\"error-message\">Failed to render markdown: boom</div>"
        );
        assert_eq!(errors.try_recv().unwrap(), "Failed to render markdown: boom");
        assert!(errors.try_recv().is_err());
        assert_eq!(pipeline.toc_html(), EMPTY_TOC);
        assert_eq!(
            pipeline.last_report().error.as_deref(),
            Some("Failed to render markdown: boom")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_restores_ratio_after_diagrams() {
        let viewport = Rc::new(StaticViewport::new(500.0));
        viewport.set_layout(2000.0, []);
        viewport.set_scroll_top(500.0);

        let mut diagrams = FakeDiagrams::new(&Recorder::default());
        let reflow = viewport.clone();
        // Diagram injection doubles the height and resets the scroll position.
        diagrams.on_render = Some(Rc::new(move || {
            reflow.set_layout(4000.0, []);
            reflow.set_scroll_top(0.0);
        }));

        let pipeline = RenderPipeline::new(viewport.clone())
            .with_highlighter(CountingHighlighter(Rc::default()))
            .with_diagram_renderer(diagrams);

        pipeline.reload(format!("# Doc\n\n{}", diagram("A"))).await;
        assert_eq!(viewport.scroll_top(), 1000.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_theme_change_deferred_while_active() {
        LocalSet::new()
            .run_until(async {
                let recorder = Recorder::default();
                let pipeline = Rc::new(pipeline(Rc::new(StaticViewport::new(600.0)), &recorder));
                assert_eq!(*recorder.themes.borrow(), vec!["neutral"]);

                let first = spawn_local({
                    let pipeline = pipeline.clone();
                    async move { pipeline.render(diagram("A")).await }
                });
                while !pipeline.is_active() {
                    yield_now().await;
                }

                pipeline
                    .apply_settings(Settings {
                        theme: ThemeMode::Dark,
                        ..Default::default()
                    })
                    .await;
                assert_eq!(*recorder.themes.borrow(), vec!["neutral"]);

                first.await.unwrap();

                assert_eq!(*recorder.themes.borrow(), vec!["neutral", "dark"]);
                assert_eq!(*recorder.sources.borrow(), vec!["A", "A"]);
                assert_eq!(pipeline.tree().select("svg").len(), 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_pdf_export_forces_light() {
        let recorder = Recorder::default();
        let pipeline = pipeline(Rc::new(StaticViewport::new(600.0)), &recorder)
            .with_settings(Settings {
                theme: ThemeMode::Dark,
                ..Default::default()
            });
        assert!(pipeline.is_dark());

        pipeline
            .load(FilePayload {
                content: diagram("A"),
                display_name: Some("notes.md".into()),
                pdf_export: true,
            })
            .await;

        assert!(!pipeline.is_dark());
        assert_eq!(recorder.themes.borrow().last(), Some(&"neutral"));
        assert_eq!(pipeline.display_name().as_deref(), Some("notes.md"));

        // The host scheme is ignored while exporting.
        pipeline.set_system_dark(true).await;
        assert!(!pipeline.is_dark());
    }

    #[tokio::test]
    async fn test_keyboard_activation_scrolls() {
        let viewport = Rc::new(StaticViewport::new(100.0));
        viewport.set_layout(
            1000.0,
            [
                ("user-content-one".to_string(), 0.0),
                ("user-content-two".to_string(), 400.0),
            ],
        );
        let pipeline = pipeline(viewport.clone(), &Recorder::default());
        pipeline.render("# One\n\n# Two\n").await;

        pipeline.handle_toc_key(NavKey::End);
        assert_eq!(
            pipeline.handle_toc_key(NavKey::Enter),
            NavAction::Activate("user-content-two".into())
        );
        assert_eq!(viewport.scroll_top(), 400.0);
        assert!(!pipeline.scroll_to_heading("user-content-missing"));
    }

    #[tokio::test]
    async fn test_find_uses_latest_headings() {
        let pipeline = pipeline(Rc::new(StaticViewport::new(100.0)), &Recorder::default());
        pipeline.render("# Setup\n\nInstall the tool.\n").await;

        let hits = pipeline.find(&FindQuery::new("install").unwrap());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].heading_id.as_deref(), Some("user-content-setup"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_during_pass_keeps_reader_position() {
        LocalSet::new()
            .run_until(async {
                let viewport = Rc::new(StaticViewport::new(500.0));
                viewport.set_layout(4000.0, []);
                viewport.set_scroll_top(1000.0);

                let mut diagrams = FakeDiagrams::new(&Recorder::default());
                let reflow = viewport.clone();
                diagrams.on_render = Some(Rc::new(move || {
                    reflow.set_layout(4000.0, []);
                    reflow.set_scroll_top(0.0);
                }));
                let pipeline = Rc::new(
                    RenderPipeline::new(viewport.clone())
                        .with_highlighter(CountingHighlighter(Rc::default()))
                        .with_diagram_renderer(diagrams),
                );

                let two_diagrams =
                    |title: &str| format!("# {title}\n\n{}\n{}", diagram("A"), diagram("B"));

                let first = spawn_local({
                    let pipeline = pipeline.clone();
                    let content = two_diagrams("First");
                    async move { pipeline.reload(content).await }
                });

                // The first diagram has reset the scroll, the second is still rendering.
                tokio::time::sleep(Duration::from_millis(75)).await;
                assert!(pipeline.is_active());
                assert_eq!(viewport.scroll_top(), 0.0);

                pipeline.reload(two_diagrams("Second")).await;
                pipeline.reload(two_diagrams("Third")).await;

                first.await.unwrap();

                assert_eq!(heading_texts(&pipeline), vec!["Third"]);
                assert_eq!(pipeline.last_report().pass, 2);
                assert_eq!(viewport.scroll_top(), 1000.0);
            })
            .await;
    }

    #[tokio::test]
    async fn test_resize_rebuilds_offsets() {
        let viewport = Rc::new(StaticViewport::new(600.0));
        viewport.set_layout(
            2000.0,
            [
                ("user-content-a".to_string(), 0.0),
                ("user-content-b".to_string(), 800.0),
            ],
        );
        let pipeline = pipeline(viewport.clone(), &Recorder::default());
        pipeline.render("# A\n\n# B\n").await;
        assert_eq!(
            pipeline.scroll_offsets().entries()[1],
            ("user-content-b".to_string(), 800.0)
        );

        // A narrower window wraps more lines.
        viewport.set_client_height(300.0);
        viewport.set_layout(
            3000.0,
            [
                ("user-content-a".to_string(), 0.0),
                ("user-content-b".to_string(), 1400.0),
            ],
        );
        pipeline.on_resize();

        let offsets = pipeline.scroll_offsets();
        assert!(offsets.is_valid());
        assert_eq!(offsets.entries()[1], ("user-content-b".to_string(), 1400.0));
    }

    struct MeasuringViewport {
        inner: StaticViewport,
        lookups: Cell<usize>,
    }

    impl Viewport for MeasuringViewport {
        fn scroll_top(&self) -> f64 {
            self.inner.scroll_top()
        }

        fn scroll_height(&self) -> f64 {
            self.inner.scroll_height()
        }

        fn client_height(&self) -> f64 {
            self.inner.client_height()
        }

        fn set_scroll_top(&self, top: f64) {
            self.inner.set_scroll_top(top)
        }

        fn offset_of(&self, id: &str) -> Option<f64> {
            self.lookups.set(self.lookups.get() + 1);
            self.inner.offset_of(id)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_resize_during_pass_is_deferred() {
        LocalSet::new()
            .run_until(async {
                let viewport = Rc::new(MeasuringViewport {
                    inner: StaticViewport::new(600.0),
                    lookups: Cell::new(0),
                });
                viewport.inner.set_layout(
                    2000.0,
                    [
                        ("user-content-a".to_string(), 0.0),
                        ("user-content-b".to_string(), 800.0),
                    ],
                );
                let pipeline = Rc::new(
                    RenderPipeline::new(viewport.clone())
                        .with_highlighter(CountingHighlighter(Rc::default()))
                        .with_diagram_renderer(FakeDiagrams::new(&Recorder::default())),
                );

                let running = spawn_local({
                    let pipeline = pipeline.clone();
                    async move { pipeline.render(format!("# A\n\n# B\n\n{}", diagram("A"))).await }
                });
                while !pipeline.is_active() {
                    yield_now().await;
                }

                viewport.inner.set_layout(
                    3000.0,
                    [
                        ("user-content-a".to_string(), 0.0),
                        ("user-content-b".to_string(), 1400.0),
                    ],
                );
                pipeline.on_resize();
                assert!(!pipeline.scroll_offsets().is_valid());
                assert_eq!(viewport.lookups.get(), 0);

                running.await.unwrap();

                // Two headings measured at the end of the pass, then again for the resize.
                assert_eq!(viewport.lookups.get(), 4);
                let offsets = pipeline.scroll_offsets();
                assert!(offsets.is_valid());
                assert_eq!(offsets.entries()[1], ("user-content-b".to_string(), 1400.0));
            })
            .await;
    }

    struct RejectingSanitizer;

    impl Sanitizer for RejectingSanitizer {
        fn sanitize(&self, _html: &str) -> Result<String, RenderError> {
            Err(RenderError::Sanitize("allow-list unavailable".into()))
        }
    }

    #[tokio::test]
    async fn test_sanitizer_failure_aborts_pass() {
        let pipeline = pipeline(Rc::new(StaticViewport::new(600.0)), &Recorder::default())
            .with_sanitizer(RejectingSanitizer);
        pipeline.render("# Hidden\n").await;

        assert_eq!(
            pipeline.tree().inner_html(),
            "<div class=\"error-message\">Failed to sanitize content: allow-list unavailable</div>"
        );
        assert!(pipeline.headings().is_empty());
        assert!(pipeline.last_report().error.is_some());
    }
}
