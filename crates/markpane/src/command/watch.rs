use super::{write_output, Preview};
use crate::config::Config;
use anyhow::{anyhow, Result};
use clap::Parser;
use markpane_core::{LiveReload, ThemeMode, WatchEvent};
use std::path::PathBuf;

/// Keep an HTML page in sync with a markdown file.
#[derive(Parser, Debug, Clone)]
pub struct Watch {
    /// Markdown file to watch.
    pub file: PathBuf,

    /// Page rewritten on every change.
    #[clap(short, long)]
    pub output: PathBuf,

    /// Override the configured theme: system, light or dark.
    #[clap(long)]
    pub theme: Option<ThemeMode>,
}

impl Watch {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let preview = Preview::new(config, self.theme);
        let loaded = preview.load(&self.file, false).await?;
        write_output(Some(&self.output), &preview.html()).await?;

        let mut live_reload = LiveReload::new(config.preview.watcher_config());
        // Edits made between the initial read and the watcher starting are
        // picked up against the rendered content.
        live_reload.start_watching_from(&self.file, loaded)?;

        tracing::info!(
            file = %self.file.display(),
            output = %self.output.display(),
            "Watching for changes"
        );

        let result = self.event_loop(&preview, &mut live_reload).await;
        live_reload.stop_watching();
        result
    }

    async fn event_loop(&self, preview: &Preview, live_reload: &mut LiveReload) -> Result<()> {
        loop {
            let event = tokio::select! {
                event = live_reload.recv() => event,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted, stopping");
                    None
                }
            };

            let Some(event) = event else {
                return Ok(());
            };

            match event {
                WatchEvent::Changed(content) => {
                    tracing::debug!(len = content.len(), "File changed");
                    preview.reload(content).await;
                    write_output(Some(&self.output), &preview.html()).await?;
                }
                WatchEvent::ReadFailed(error) => {
                    tracing::warn!(%error, "Failed to read the watched file, keeping the last page");
                }
                WatchEvent::Removed(path) => {
                    let message = format!("File was removed: {}", path.display());
                    write_output(Some(&self.output), &preview.error_html(&message)).await?;
                    return Err(anyhow!(message));
                }
            }
        }
    }
}
