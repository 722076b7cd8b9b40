use log::debug;

use sh61::utils::config::Config;
use sh61::utils::log::init_logger;
use sh61::Shell;

fn main() {
    let config = Config::new();
    init_logger(&config);
    debug!(
        "config loaded: quiet={} script={:?}",
        config.quiet, config.script
    );

    let mut shell = Shell::new(&config);
    if let Err(err) = shell.run() {
        eprintln!("sh61: {}", err);
        std::process::exit(1);
    }
}
