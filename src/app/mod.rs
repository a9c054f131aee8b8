//! Process bootstrap: parse args, load config, init logging, run the server
//! until shutdown. Grounded in the teacher's `app::server::run_server`
//! top-level shape, pared down to this crate's single listener / single
//! pool.

pub mod args;
pub mod logger;

use std::path::Path;

use args::Args;

use crate::config::{self, Settings};
use crate::server::Server;

/// Loads settings from `--config` if given, applies CLI overrides, and
/// installs the result as the process-wide config.
pub fn load_settings(args: &Args) -> Result<Settings, Box<dyn std::error::Error>> {
    let mut settings = match &args.config {
        Some(path) => Settings::load(Path::new(path))?,
        None => Settings::default(),
    };

    if let Some(addr) = &args.listen_addr {
        settings.listen_addr = addr.clone();
    }

    config::set_settings(settings.clone());
    Ok(settings)
}

/// Binds the listener, runs the accept loop to completion, and returns once
/// a shutdown signal has been handled and every session has been closed.
pub async fn run(settings: &Settings) -> Result<(), crate::errors::Error> {
    let (server, listener) = Server::bind(settings).await?;
    server.serve(listener, crate::server::shutdown_signal()).await;
    Ok(())
}
