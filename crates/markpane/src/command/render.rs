use super::{write_output, Preview};
use crate::config::Config;
use anyhow::{anyhow, Result};
use clap::Parser;
use markpane_core::ThemeMode;
use std::path::PathBuf;

/// Render a markdown file to a standalone HTML page.
#[derive(Parser, Debug, Clone)]
pub struct Render {
    /// Markdown file to render.
    pub file: PathBuf,

    /// Write the page here instead of stdout.
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Override the configured theme: system, light or dark.
    #[clap(long)]
    pub theme: Option<ThemeMode>,

    /// Render for printing, which always uses the light theme.
    #[clap(long)]
    pub pdf: bool,
}

impl Render {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let preview = Preview::new(config, self.theme);
        preview.load(&self.file, self.pdf).await?;

        write_output(self.output.as_deref(), &preview.html()).await?;

        // The page carries the inline error; the exit status reports it too.
        match preview.pipeline().last_report().error {
            Some(error) => Err(anyhow!("failed to render {}: {error}", self.file.display())),
            None => Ok(()),
        }
    }
}
