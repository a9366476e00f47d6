use std::process::ExitCode;

use taskmonitor::app::App;
use taskmonitor::cli;
use taskmonitor::config::Config;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = cli::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            log::error!("failed to load config from {}: {}", args.config.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let app = match App::new(config) {
        Ok(app) => app,
        Err(e) => {
            log::error!("failed to start: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = app.run() {
        log::error!("exiting on error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
