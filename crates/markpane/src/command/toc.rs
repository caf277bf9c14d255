use super::Preview;
use crate::config::Config;
use anyhow::Result;
use clap::Parser;
use markpane_core::TocNode;
use std::path::PathBuf;

/// Print the table of contents of a markdown file.
#[derive(Parser, Debug, Clone)]
pub struct Toc {
    /// Markdown file to outline.
    pub file: PathBuf,

    /// Print the outline as JSON.
    #[clap(long)]
    pub json: bool,
}

impl Toc {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let preview = Preview::new(config, None);
        preview.load(&self.file, false).await?;

        let outline = preview.pipeline().toc_tree();
        if self.json {
            println!("{}", serde_json::to_string_pretty(&outline)?);
        } else {
            print!("{}", format_outline(&outline));
        }

        Ok(())
    }
}

/// Indented plain-text outline, one heading per line.
fn format_outline(nodes: &[TocNode]) -> String {
    fn walk(nodes: &[TocNode], depth: usize, out: &mut String) {
        for node in nodes {
            out.push_str(&"  ".repeat(depth));
            out.push_str(&format!("- {} (#{})\n", node.text, node.id));
            walk(&node.children, depth + 1, out);
        }
    }

    let mut out = String::new();
    walk(nodes, 0, &mut out);
    out
}
