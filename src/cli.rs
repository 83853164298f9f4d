//! CLI argument definitions for camp
//!
//! 命令行参数覆盖配置文件中的同名值

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// camp - 带密码保护的摄像头实时画面
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// 配置文件路径
    #[arg(short, long, env = "CAMP_CONFIG")]
    pub config: Option<PathBuf>,

    /// 监听端口
    #[arg(short, long, env = "CAMP_PORT")]
    pub port: Option<u16>,

    /// 初始分辨率 (high, medium, low)
    #[arg(short, long)]
    pub resolution: Option<String>,

    /// 访问前需要登录
    #[arg(long)]
    pub require_login: bool,

    /// 使用 USB 摄像头
    #[arg(long)]
    pub use_usb: bool,

    /// 初始亮度 (0-100，仅板载摄像头)
    #[arg(short, long)]
    pub brightness: Option<u32>,

    /// 垂直翻转
    #[arg(long)]
    pub vflip: bool,

    /// 水平翻转
    #[arg(long)]
    pub hflip: bool,

    /// 启用 TLS
    #[arg(long)]
    pub use_ssl: bool,

    /// 使用合成测试图案代替摄像头
    #[arg(long)]
    pub test_pattern: bool,

    /// 日志级别 (0=warn, 1=info, 2=debug, 3=trace)
    #[arg(short, long)]
    pub verbose: Option<u8>,
}

/// 子命令
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 启动服务 (默认)
    Serve,

    /// 设置访问密码
    Password {
        /// 密码文件路径
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// 生成配置文件
    Config {
        /// 配置文件路径
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
}
