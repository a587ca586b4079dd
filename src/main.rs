use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use shortfeed::app::RunOptions;
use shortfeed::model::FeedType;

const USAGE: &str = "shortfeed - Scroll a short-video feed from the terminal.

  --feed <for-you|following>  Feed to open on start
  --config <PATH>             Read configuration from PATH
  --version, -V               Show version and exit
  --help,    -h               Show this help message";

enum Cli {
    Run(RunOptions),
    Exit,
}

fn main() {
    let options = match parse_args(std::env::args().skip(1)) {
        Ok(Cli::Run(options)) => options,
        Ok(Cli::Exit) => return,
        Err(err) => {
            eprintln!("error: {err:?}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    if let Err(err) = shortfeed::run(options) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<Cli> {
    let mut options = RunOptions::default();
    let mut args = args;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("shortfeed {}", shortfeed::VERSION);
                return Ok(Cli::Exit);
            }
            "--help" | "-h" => {
                println!("{USAGE}");
                return Ok(Cli::Exit);
            }
            "--feed" => {
                let value = args.next().context("--feed needs a value")?;
                options.feed_type = Some(value.parse::<FeedType>()?);
            }
            "--config" => {
                let value = args.next().context("--config needs a path")?;
                options.config_path = Some(PathBuf::from(value));
            }
            other => bail!("unknown argument {other:?}"),
        }
    }
    Ok(Cli::Run(options))
}
