use anyhow::Result;
use clap::Parser;
use softphone::app::AppBuilder;
use softphone::callservice::CreateCall;
use softphone::config::{Cli, Config};
use softphone::useragent::Command;
use std::fs::File;
use tokio::select;
use tracing::{info, level_filters::LevelFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = cli
        .conf
        .map(|conf| Config::load(&conf).expect("Failed to load config"))
        .unwrap_or_default();

    let mut log_fmt = tracing_subscriber::fmt();
    if let Some(ref level) = config.log_level {
        if let Ok(lv) = level.as_str().parse::<LevelFilter>() {
            log_fmt = log_fmt.with_max_level(lv);
        }
    }

    let _guard;
    if let Some(ref log_file) = config.log_file {
        let file = File::create(log_file).expect("Failed to create log file");
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        _guard = guard;
        log_fmt.with_writer(non_blocking).try_init().ok();
    } else {
        log_fmt.try_init().ok();
    }

    let app = AppBuilder::new().with_config(config).build()?;
    let handle = app.handle();

    info!("starting softphone in {:?} mode", app.config.settings.mode);
    if let Some(number) = cli.dial {
        handle.command(Command::PlaceCall {
            data: CreateCall::outgoing(number),
        })?;
    }

    select! {
        result = app.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received CTRL+C, shutting down");
        }
    }
    Ok(())
}
