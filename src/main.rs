use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use treemirror_lib::config::{CliArgs, MirrorConfig};
use treemirror_lib::core::{MirrorEngine, Scheduler};
use treemirror_lib::logging::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let config = match MirrorConfig::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("配置错误: {}", e);
            std::process::exit(2);
        }
    };

    init_logging(&config);
    info!("treemirror 已启动{}", config);

    let engine = Arc::new(MirrorEngine::new(&config));

    if args.once {
        let report = engine.run_cycle().await?;
        if report.has_failures() {
            std::process::exit(1);
        }
        return Ok(());
    }

    let scheduler = Scheduler::new(Duration::from_secs(config.interval_secs), engine)?;
    scheduler.start();

    tokio::signal::ctrl_c()
        .await
        .context("等待退出信号失败")?;

    info!("收到退出信号，等待当前同步结束");
    scheduler.stop();
    scheduler.wait_idle().await;
    info!("treemirror 已退出");

    Ok(())
}
