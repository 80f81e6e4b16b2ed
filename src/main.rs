mod cli;
mod commands;
mod settings;

use clap::Parser;
use tracing::error;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.debug);

    if let Err(e) = commands::run(cli).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins; otherwise `--debug` selects debug, default info
fn init_tracing(debug: bool) {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;

    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if debug {
        builder.with_file(true).with_line_number(true).init();
    } else {
        builder.with_target(false).without_time().init();
    }
}
