use clap::Parser;
use tracing::{debug, error, info, warn};

mod log;
mod utils;

#[derive(Parser)]
#[command(version)]
struct Args {
    /// Set config file path
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let cfg: livegate::config::Config = utils::load("livegate", args.config)?;
    cfg.validate()?;

    log::set(format!(
        "livegate={},http_log={}",
        cfg.log.level, cfg.log.level
    ));
    warn!("set log level : {}", cfg.log.level);
    debug!("config : {:?}", cfg);

    livegate::metrics_register()?;
    let listeners = livegate::Listeners::bind(&cfg).await.map_err(|e| {
        error!("bind error: {}", e);
        e
    })?;
    livegate::serve(cfg, listeners, utils::shutdown_signal()).await?;
    info!("Server shutdown");
    Ok(())
}
