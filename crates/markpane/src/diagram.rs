//! Diagram rendering through an external program.

use async_trait::async_trait;
use markpane_core::diagram::{DiagramError, DiagramRenderer, DiagramTheme};
use std::cell::RefCell;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Environment variable carrying the engine theme name (`dark` or `neutral`).
pub const THEME_ENV: &str = "MARKPANE_DIAGRAM_THEME";

/// Environment variable carrying the full engine configuration as JSON.
pub const CONFIG_ENV: &str = "MARKPANE_DIAGRAM_CONFIG";

/// Environment variable carrying the id of the diagram being rendered.
pub const ID_ENV: &str = "MARKPANE_DIAGRAM_ID";

/// Runs `program args..` once per diagram, source on stdin, SVG on stdout.
///
/// A non-zero exit status is a syntax error whose message is the program's
/// stderr.
#[derive(Debug)]
pub struct CommandDiagramRenderer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    theme: RefCell<DiagramTheme>,
}

impl CommandDiagramRenderer {
    /// Returns `None` for an empty command line.
    pub fn new(command: &[String], timeout: Duration) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
            theme: RefCell::new(DiagramTheme::new(false)),
        })
    }

    async fn run(&self, id: &str, source: &str) -> Result<String, DiagramError> {
        let (theme_name, config) = {
            let theme = self.theme.borrow();
            (theme.theme, theme.to_json().to_string())
        };

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env(THEME_ENV, theme_name)
            .env(CONFIG_ENV, config)
            .env(ID_ENV, id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| DiagramError::Unavailable(format!("{}: {err}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(source.as_bytes())
                .await
                .map_err(|err| DiagramError::Unavailable(err.to_string()))?;
            // Dropping stdin closes the pipe so the program sees EOF.
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|err| DiagramError::Unavailable(err.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr.trim();
            return Err(DiagramError::Syntax(if message.is_empty() {
                format!("{} exited with {}", self.program, output.status)
            } else {
                message.to_string()
            }));
        }

        let svg = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if svg.is_empty() {
            return Err(DiagramError::Syntax(format!(
                "{} produced no output",
                self.program
            )));
        }

        Ok(svg)
    }
}

#[async_trait(?Send)]
impl DiagramRenderer for CommandDiagramRenderer {
    fn initialize(&self, theme: &DiagramTheme) {
        tracing::debug!(theme = theme.theme, program = %self.program, "Diagram renderer initialized");
        self.theme.replace(theme.clone());
    }

    async fn render_one(&self, id: &str, source: &str) -> Result<String, DiagramError> {
        match tokio::time::timeout(self.timeout, self.run(id, source)).await {
            Ok(result) => result,
            Err(_) => Err(DiagramError::Unavailable(format!(
                "{} timed out after {:?}",
                self.program, self.timeout
            ))),
        }
    }
}
