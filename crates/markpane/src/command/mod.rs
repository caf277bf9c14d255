pub mod render;
pub mod toc;
pub mod watch;

use crate::config::Config;
use crate::diagram::CommandDiagramRenderer;
use crate::page::Page;
use anyhow::{Context, Result};
use markpane_core::{
    is_markdown_path, FilePayload, RenderPipeline, Settings, StaticViewport, SyntectHighlighter,
    ThemeMode,
};
use std::path::Path;
use std::rc::Rc;

/// Height of the virtual viewport used when there is no window.
const HEADLESS_CLIENT_HEIGHT: f64 = 800.0;

/// A render pipeline wired up from the config, without a window.
pub struct Preview {
    pipeline: RenderPipeline,
    highlighter: SyntectHighlighter,
}

impl Preview {
    pub fn new(config: &Config, theme: Option<ThemeMode>) -> Self {
        let settings = Settings {
            theme: theme.unwrap_or(config.settings.theme),
            ..config.settings.clone()
        };

        let viewport = Rc::new(StaticViewport::new(HEADLESS_CLIENT_HEIGHT));
        let mut pipeline = RenderPipeline::new(viewport)
            .with_scroll_threshold(config.preview.scroll_threshold)
            .with_settings(settings);

        match CommandDiagramRenderer::new(&config.diagram.command, config.diagram.timeout()) {
            Some(renderer) => {
                tracing::debug!(command = ?config.diagram.command, "Using external diagram renderer");
                pipeline = pipeline.with_diagram_renderer(renderer);
            }
            None => tracing::debug!("No diagram command configured, showing diagram sources"),
        }

        Self {
            pipeline,
            highlighter: SyntectHighlighter::new(),
        }
    }

    pub fn pipeline(&self) -> &RenderPipeline {
        &self.pipeline
    }

    /// Initial render of `path`, returning the content that was rendered.
    pub async fn load(&self, path: &Path, pdf_export: bool) -> Result<String> {
        let content = read_markdown(path).await?;
        self.pipeline
            .load(FilePayload {
                content: content.clone(),
                display_name: display_name(path),
                pdf_export,
            })
            .await;
        self.log_report();
        Ok(content)
    }

    /// Re-render with new content after the file changed.
    pub async fn reload(&self, content: String) {
        self.pipeline.reload(content).await;
        self.log_report();
    }

    pub fn html(&self) -> String {
        Page::from_pipeline(&self.pipeline).build_html(&self.highlighter)
    }

    pub fn error_html(&self, message: &str) -> String {
        Page::error(
            self.pipeline.display_name(),
            message,
            self.pipeline.settings(),
            self.pipeline.is_dark(),
        )
        .build_html(&self.highlighter)
    }

    fn log_report(&self) {
        let report = self.pipeline.last_report();
        tracing::info!(
            pass = report.pass,
            headings = report.headings,
            code_blocks = report.code_blocks,
            diagrams = report.diagrams.rendered,
            failed_diagrams = report.diagrams.failed,
            "Render pass completed"
        );
    }
}

/// Reads a markdown file, rejecting other file types up front.
pub async fn read_markdown(path: &Path) -> Result<String> {
    is_markdown_path(path)?;
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}

pub fn display_name(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// Writes `html` to `output`, or to stdout without one.
///
/// Files are replaced through a sibling temporary file so a browser never
/// sees a half-written page.
pub async fn write_output(output: Option<&Path>, html: &str) -> Result<()> {
    let Some(output) = output else {
        use tokio::io::AsyncWriteExt;
        let mut stdout = tokio::io::stdout();
        stdout.write_all(html.as_bytes()).await?;
        stdout.flush().await?;
        return Ok(());
    };

    let mut partial = output.as_os_str().to_owned();
    partial.push(".partial");

    tokio::fs::write(&partial, html)
        .await
        .with_context(|| format!("failed to write {}", Path::new(&partial).display()))?;
    tokio::fs::rename(&partial, output)
        .await
        .with_context(|| format!("failed to replace {}", output.display()))?;

    Ok(())
}
