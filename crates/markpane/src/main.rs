mod app;
mod command;
mod config;
mod diagram;
mod logging;
mod page;

use app::{Args, RunCmd};
use clap::Parser;

#[derive(Parser, Debug)]
#[clap(name = "markpane", version, about = "Headless live markdown previewer")]
pub struct Markpane {
    #[clap(flatten)]
    pub args: Args,

    #[clap(subcommand)]
    pub cmd: RunCmd,
}

// The render pipeline is single-threaded, so is the runtime.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let markpane = Markpane::parse();

    if let Err(e) = markpane.cmd.run(markpane.args).await {
        eprintln!("error: {e:?}");
        std::process::exit(1);
    }
}
