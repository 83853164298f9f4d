//! camp - 带密码保护的摄像头实时画面
//!
//! 主入口程序

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use camp::cli::{Args, Commands};
use camp::commands;
use camp::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    match &args.command {
        Some(Commands::Password { path }) => return commands::handle_password(path.clone()),
        Some(Commands::Config { path }) => return commands::handle_config(path.clone()),
        Some(Commands::Serve) | None => {}
    }

    // 加载配置
    let config_path = Config::get_config_path(args.config.as_deref());
    let mut config = Config::load(&config_path)?;
    commands::init_logging(args.verbose, &config.logging.level);

    if config_path.exists() {
        info!("配置加载成功: {}", config_path.display());
    } else {
        warn!("配置文件不存在: {}, 使用默认配置", config_path.display());
    }

    info!("camp v{} 启动中...", env!("CARGO_PKG_VERSION"));

    // 命令行参数覆盖配置
    commands::apply_cli_overrides(&mut config, &args);

    // 配置错误在启动时直接退出
    let settings = config.validate()?;

    commands::serve(settings).await
}
