use runner::config::LoggingConfig;
use runner::EXECUTION_LOG_TARGET;

pub const LOG_LEVEL_ENV: &str = "DSRUNNER_LOG_LEVEL";

/// Main log to stderr (and optionally a file); payload dumps only to the
/// execution log when one is configured.
pub fn setup_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let level_name = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| config.level.clone());
    let level = level_name.parse::<log::LevelFilter>().unwrap_or(log::LevelFilter::Warn);

    let mut base_config = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                chrono::Local::now().format("%Y-%m-%d][%H:%M:%S"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(level);

    let mut main_log = fern::Dispatch::new()
        .filter(|metadata| metadata.target() != EXECUTION_LOG_TARGET)
        .chain(std::io::stderr());
    if let Some(path) = &config.output {
        main_log = main_log.chain(fern::log_file(path)?);
    }
    base_config = base_config.chain(main_log);

    if let Some(path) = &config.execution_log {
        let execution_log = fern::Dispatch::new()
            .filter(|metadata| metadata.target() == EXECUTION_LOG_TARGET)
            .chain(fern::log_file(path)?);
        base_config = base_config
            .level_for(EXECUTION_LOG_TARGET, log::LevelFilter::Debug)
            .chain(execution_log);
    }

    base_config.apply()?;
    Ok(())
}
