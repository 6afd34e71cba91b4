use std::path::PathBuf;

use anyhow::{bail, Error};

use lily::server::{catch_shutdown_signal, connection, cron};
use lily::Server;
use lily_config::{log_level_from_str, ServerConfig};

const DEFAULT_CONFIG: &str = "/etc/lily/server.json";

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {}", err);
        std::process::exit(-1);
    }
}

fn config_path() -> Result<PathBuf, Error> {
    let mut args = std::env::args().skip(1);
    let mut path = PathBuf::from(DEFAULT_CONFIG);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => match args.next() {
                Some(value) => path = PathBuf::from(value),
                None => bail!("--config requires a path"),
            },
            "--help" | "-h" => {
                println!("usage: lily-server [--config <path>]");
                std::process::exit(0);
            }
            other => bail!("unknown argument '{}'", other),
        }
    }
    Ok(path)
}

fn run() -> Result<(), Error> {
    let config_path = config_path()?;
    let config = ServerConfig::load(&config_path)?;

    let level = log_level_from_str(&config.log_level).unwrap_or(log::LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp_millis()
        .init();

    log::info!(
        "starting lily server '{}' (config {:?})",
        config.name,
        config_path
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let server = Server::new(config)?;

        catch_shutdown_signal(server.clone())?;
        cron::spawn(server.clone());

        connection::serve(server.clone()).await?;

        // the cron tasks flush on shutdown as well, but a final synchronous
        // pass here guarantees nothing dirty is lost if they lose the race
        // against runtime teardown
        cron::flush(&server).await;

        log::info!("lily server stopped");
        Ok(())
    })
}
