//! camp - 带密码保护的摄像头实时画面
//!
//! 通过 WebSocket 向浏览器推送 JPEG 帧，浏览器可以远程调整分辨率和亮度

pub mod camera;
pub mod cli;
pub mod commands;
pub mod config;
pub mod protocol;
pub mod security;
pub mod server;
pub mod stream;
