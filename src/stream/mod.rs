//! 推流循环
//!
//! 每个 WebSocket 连接对应一个 `StreamSession`，运行在独立的 tokio task 中。
//! 控制命令和周期 tick 在同一个 task 里串行处理：命令只改配置，
//! tick 读取配置快照后在阻塞线程里完成 configure + capture。
//!
//! 状态机: Idle -> Streaming -> Closing -> Closed，Closed 之后不能再推流。

pub mod handle;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task;
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::camera::device::DeviceProvider;
use crate::camera::{open_camera, Camera, CameraError, DeviceOptions};
use crate::protocol::{Applied, Command, StreamConfig};

pub use handle::CameraHandle;

/// 默认 tick 周期 (上限，不是保证)
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(10);

/// 推流状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// 未打开摄像头，等待 start
    Idle,
    /// 摄像头已打开，tick 运行中
    Streaming,
    /// 正在释放摄像头
    Closing,
    /// 终止状态
    Closed,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StreamState::Idle => "idle",
            StreamState::Streaming => "streaming",
            StreamState::Closing => "closing",
            StreamState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// 会话级错误。客户端断开不是错误
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("camera could not be opened")]
    DeviceUnavailable(#[source] CameraError),

    #[error("capture failed mid-stream")]
    Capture(#[source] CameraError),
}

/// 会话选项
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub tick_interval: Duration,
    pub device: DeviceOptions,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            device: DeviceOptions::default(),
        }
    }
}

/// 会话正常结束时的统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    pub ticks: u64,
    pub frames_sent: u64,
    pub final_state: StreamState,
}

/// tick 的结果
enum TickOutcome {
    Sent,
    ClientGone,
}

/// 单个连接的推流会话
pub struct StreamSession {
    peer: String,
    config: StreamConfig,
    provider: Arc<dyn DeviceProvider>,
    options: SessionOptions,
    handle: CameraHandle,
    state: StreamState,
    ticks: u64,
    frames_sent: u64,
}

impl StreamSession {
    pub fn new(
        peer: impl Into<String>,
        config: StreamConfig,
        provider: Arc<dyn DeviceProvider>,
        options: SessionOptions,
    ) -> Self {
        Self {
            peer: peer.into(),
            config,
            provider,
            options,
            handle: CameraHandle::new(),
            state: StreamState::Idle,
            ticks: 0,
            frames_sent: 0,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// 运行会话直到客户端断开或出现不可恢复的错误
    ///
    /// `commands` 关闭表示客户端断开；`frames` 的接收端关闭表示推送失败。
    /// 两种情况都会在下一个 tick 之前释放摄像头。
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<String>,
        frames: mpsc::Sender<String>,
    ) -> Result<SessionReport, StreamError> {
        info!(
            peer = %self.peer,
            backend = %self.config.backend,
            resolution = %self.config.settings.resolution,
            "会话开始"
        );

        let mut ticker = time::interval(self.options.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                biased;

                message = commands.recv() => match message {
                    Some(text) => {
                        if let Err(e) = self.handle_message(&text, &mut ticker).await {
                            break Err(e);
                        }
                    }
                    None => {
                        debug!(peer = %self.peer, "客户端已断开");
                        break Ok(());
                    }
                },

                _ = ticker.tick(), if self.state == StreamState::Streaming => {
                    match self.tick(&frames).await {
                        Ok(TickOutcome::Sent) => {}
                        Ok(TickOutcome::ClientGone) => break Ok(()),
                        Err(e) => break Err(e),
                    }
                }
            }
        };

        self.shutdown();

        match result {
            Ok(()) => {
                info!(
                    peer = %self.peer,
                    frames = self.frames_sent,
                    "会话结束"
                );
                Ok(self.report())
            }
            Err(e) => {
                warn!(peer = %self.peer, "会话异常结束: {}: {}", e, source_of(&e));
                Err(e)
            }
        }
    }

    fn report(&self) -> SessionReport {
        SessionReport {
            ticks: self.ticks,
            frames_sent: self.frames_sent,
            final_state: self.state,
        }
    }

    async fn handle_message(
        &mut self,
        text: &str,
        ticker: &mut Interval,
    ) -> Result<(), StreamError> {
        let command = Command::parse(text);
        match self.config.apply(&command) {
            Applied::StartRequested => self.start(ticker).await,
            _ => Ok(()),
        }
    }

    /// 打开摄像头、应用当前配置并进入 Streaming。已在推流时是空操作
    ///
    /// 配置失败同样视为设备不可用：摄像头在返回前关闭，不会进入 Streaming。
    async fn start(&mut self, ticker: &mut Interval) -> Result<(), StreamError> {
        if self.state != StreamState::Idle || self.handle.is_active() {
            debug!(peer = %self.peer, "摄像头已打开，忽略重复的 start");
            return Ok(());
        }

        let provider = self.provider.clone();
        let kind = self.config.backend;
        let options = self.options.device.clone();
        let settings = self.config.settings;

        let opened = task::spawn_blocking(move || -> Result<Box<dyn Camera>, CameraError> {
            let mut camera = open_camera(kind, provider.as_ref(), &options)?;
            if let Err(e) = camera.configure(&settings) {
                camera.close();
                return Err(e);
            }
            Ok(camera)
        })
        .await
        .map_err(|e| CameraError::DeviceUnavailable(format!("open task failed: {}", e)))
        .and_then(|r| r);

        match opened {
            Ok(camera) => {
                self.handle.install(camera);
                self.transition(StreamState::Streaming);
                ticker.reset_immediately();
                Ok(())
            }
            Err(e) => Err(StreamError::DeviceUnavailable(e)),
        }
    }

    /// 一个 tick: configure -> capture -> base64 -> push
    async fn tick(&mut self, frames: &mpsc::Sender<String>) -> Result<TickOutcome, StreamError> {
        self.ticks += 1;

        let Some(mut camera) = self.handle.checkout() else {
            return Ok(TickOutcome::ClientGone);
        };
        // 配置快照：采集期间收到的命令在下一个 tick 生效
        let settings = self.config.settings;

        let joined = task::spawn_blocking(move || {
            let result = camera
                .configure(&settings)
                .and_then(|()| camera.capture_frame());
            (camera, result)
        })
        .await;

        let captured = match joined {
            Ok((camera, result)) => {
                self.handle.checkin(camera);
                result
            }
            Err(e) => {
                self.handle.forfeit();
                Err(CameraError::Capture(format!("capture task failed: {}", e)))
            }
        };
        let frame = captured.map_err(StreamError::Capture)?;

        if self.handle.is_closed() {
            return Ok(TickOutcome::ClientGone);
        }

        let payload = STANDARD.encode(&frame.jpeg);
        if frames.send(payload).await.is_err() {
            debug!(peer = %self.peer, "推送失败，客户端已断开");
            return Ok(TickOutcome::ClientGone);
        }
        self.frames_sent += 1;
        Ok(TickOutcome::Sent)
    }

    /// Streaming/Idle -> Closing -> Closed，释放摄像头
    fn shutdown(&mut self) {
        if self.state == StreamState::Closed {
            return;
        }
        self.transition(StreamState::Closing);
        if self.handle.release() {
            info!(peer = %self.peer, "摄像头已释放");
        }
        self.transition(StreamState::Closed);
    }

    fn transition(&mut self, next: StreamState) {
        debug!(peer = %self.peer, "状态 {} -> {}", self.state, next);
        self.state = next;
    }
}

fn source_of(e: &StreamError) -> &CameraError {
    match e {
        StreamError::DeviceUnavailable(inner) | StreamError::Capture(inner) => inner,
    }
}
