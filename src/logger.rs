/// Initialises env_logger for the service.
///
/// docgen logs at Info (Debug with `verbose`), dependencies only at Warn.
/// `RUST_LOG` overrides both.
pub fn init_logger(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Warn)
        .filter_module("docgen", level)
        .parse_default_env()
        .init();
}
