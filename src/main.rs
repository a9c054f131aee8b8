use clap::Parser;

use bncs_lobbyd::app::args::Args;
use bncs_lobbyd::app::{load_settings, logger, run};

fn main() {
    let args = Args::parse();
    logger::init(&args.log_level, args.log_format, args.no_color);

    let settings = match load_settings(&args) {
        Ok(s) => s,
        Err(e) => {
            log::error!("failed to load settings: {e}");
            std::process::exit(exitcode::CONFIG);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("failed to start tokio runtime: {e}");
            std::process::exit(exitcode::OSERR);
        }
    };

    let exit_code = runtime.block_on(async {
        match run(&settings).await {
            Ok(()) => exitcode::OK,
            Err(e) => {
                log::error!("server exited with error: {e}");
                exitcode::SOFTWARE
            }
        }
    });

    std::process::exit(exit_code);
}
