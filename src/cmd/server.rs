use anyhow::Context;
use clap::Parser;
use teavpn2_server::{config, engine, utils};

fn main() -> anyhow::Result<()> {
    utils::init_tracing().map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    let cli = config::Cli::parse();
    let cfg = config::resolve(cli)
        .map_err(|e| anyhow::anyhow!("{}", e))
        .context("failed to resolve configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cfg.thread.max(1) as usize)
        .enable_all()
        .build()
        .context("failed to build the Tokio runtime")?;

    runtime
        .block_on(engine::server::run(cfg))
        .map_err(|e| anyhow::anyhow!("{}", e))
        .context("server exited with an error")?;

    Ok(())
}
