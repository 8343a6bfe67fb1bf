//! docgen's main application entry point.
//! Parses the command line, builds the configuration and runs the HTTP service.

use anyhow::Context;
use docgen::{
    binder::NullPolicy,
    cli::{get_args, Args},
    config::{get_config, Config},
    error::default_error_handler,
    logger::init_logger,
    server::{serve, AppState},
};

/// Main application entry point.
fn main() {
    let args = get_args();
    init_logger(args.verbose);

    if let Err(err) = run(args) {
        default_error_handler(err);
    }
}

/// Applies command-line flags on top of file and environment settings.
fn apply_args(config: &mut Config, args: &Args) {
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(dir) = &args.templates_dir {
        config.templates_dir = dir.clone();
    }
    if args.strict {
        config.default_policy = NullPolicy::Strict;
    }
}

/// Main application logic execution.
///
/// # Flow
/// 1. Loads configuration (file, environment, flags)
/// 2. Builds the shared application state
/// 3. Serves HTTP requests until Ctrl-C
fn run(args: Args) -> anyhow::Result<()> {
    let mut config = get_config(args.config.as_deref())?;
    apply_args(&mut config, &args);
    log::debug!("Effective configuration: {:?}", config);

    let state = AppState::new(config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("cannot start the async runtime")?;
    runtime.block_on(serve(state))?;
    Ok(())
}
