use crate::command;
use crate::config::load_config;
use crate::logging;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
pub enum RunCmd {
    /// Render a markdown file to a standalone HTML page.
    #[clap(name = "render")]
    Render(command::render::Render),
    /// Rewrite an HTML page whenever a markdown file changes.
    #[clap(name = "watch")]
    Watch(command::watch::Watch),
    /// Print the table of contents of a markdown file.
    #[clap(name = "toc")]
    Toc(command::toc::Toc),
}

/// MarkPane CLI arguments.
#[derive(Parser, Debug)]
pub struct Args {
    /// Specify the path of the log file.
    ///
    /// Logs go to stderr unless this, `MARKPANE_LOG_PATH` or `[log] log-file` is set.
    #[clap(long)]
    pub log: Option<PathBuf>,

    /// Specify the path of the config file.
    #[clap(long)]
    pub config_file: Option<PathBuf>,
}

impl RunCmd {
    pub async fn run(self, args: Args) -> Result<()> {
        let (config, config_err) = load_config(args.config_file);

        let log_path = logging::log_path(args.log, &config.log);
        let _guard = logging::init(log_path.as_deref(), &config.log)?;

        if let Some(err) = config_err {
            tracing::warn!("Invalid config file, using the defaults: {err}");
        }

        match self {
            Self::Render(render) => render.run(&config).await,
            Self::Watch(watch) => watch.run(&config).await,
            Self::Toc(toc) => toc.run(&config).await,
        }
    }
}
