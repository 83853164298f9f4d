//! 测试用设备：在测试图案之上记录打开/释放/采集次数，并可注入故障

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::device::{Control, DeviceProvider, DeviceTarget, PixelFormat, RawFrame, VideoDevice};
use super::test_pattern::TestPatternDevice;
use super::CameraError;

#[derive(Debug, Default)]
struct MockState {
    opens: usize,
    releases: usize,
    open_now: usize,
    max_open: usize,
    captures: usize,
    format_calls: usize,
    last_format: Option<(u32, u32, PixelFormat)>,
    controls: HashMap<String, i32>,
}

/// 共享统计信息
#[derive(Debug, Clone, Default)]
pub struct MockStats {
    state: Arc<Mutex<MockState>>,
}

impl MockStats {
    fn with<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn opens(&self) -> usize {
        self.with(|s| s.opens)
    }

    pub fn releases(&self) -> usize {
        self.with(|s| s.releases)
    }

    pub fn open_now(&self) -> usize {
        self.with(|s| s.open_now)
    }

    pub fn max_open(&self) -> usize {
        self.with(|s| s.max_open)
    }

    pub fn captures(&self) -> usize {
        self.with(|s| s.captures)
    }

    pub fn format_calls(&self) -> usize {
        self.with(|s| s.format_calls)
    }

    pub fn last_format(&self) -> Option<(u32, u32, PixelFormat)> {
        self.with(|s| s.last_format)
    }

    pub fn control(&self, control: Control) -> Option<i32> {
        self.with(|s| s.controls.get(&format!("{:?}", control)).copied())
    }
}

/// 可注入故障的设备提供者
#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    stats: MockStats,
    fail_open: bool,
    fail_format: bool,
    fail_capture_after: Option<usize>,
    raw_format: Option<PixelFormat>,
    capture_delay: Option<Duration>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// 设备能打开，但设置格式失败 (节点被其他进程占用)
    pub fn fail_format(mut self) -> Self {
        self.fail_format = true;
        self
    }

    /// 成功采集 n 帧后开始失败
    pub fn fail_capture_after(mut self, n: usize) -> Self {
        self.fail_capture_after = Some(n);
        self
    }

    /// 固定设备输出的原始格式
    pub fn with_raw_format(mut self, format: PixelFormat) -> Self {
        self.raw_format = Some(format);
        self
    }

    /// 每次读帧前阻塞一段时间
    pub fn with_capture_delay(mut self, delay: Duration) -> Self {
        self.capture_delay = Some(delay);
        self
    }

    pub fn stats(&self) -> MockStats {
        self.stats.clone()
    }
}

impl DeviceProvider for MockProvider {
    fn open(&self, target: &DeviceTarget) -> Result<Box<dyn VideoDevice>, CameraError> {
        if self.fail_open {
            return Err(CameraError::DeviceUnavailable(format!("{} is busy", target)));
        }
        self.stats.with(|s| {
            s.opens += 1;
            s.open_now += 1;
            s.max_open = s.max_open.max(s.open_now);
        });
        Ok(Box::new(MockDevice {
            inner: TestPatternDevice::new(target),
            stats: self.stats.clone(),
            provider: self.clone(),
            captured: 0,
        }))
    }
}

struct MockDevice {
    inner: TestPatternDevice,
    stats: MockStats,
    provider: MockProvider,
    captured: usize,
}

impl VideoDevice for MockDevice {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn set_format(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<(u32, u32), CameraError> {
        self.stats.with(|s| {
            s.format_calls += 1;
            s.last_format = Some((width, height, format));
        });
        if self.provider.fail_format {
            return Err(CameraError::Capture(
                "set format: Device or resource busy (os error 16)".into(),
            ));
        }
        let format = self.provider.raw_format.unwrap_or(format);
        self.inner.set_format(width, height, format)
    }

    fn set_control(&mut self, control: Control, value: i32) -> Result<(), CameraError> {
        self.stats
            .with(|s| s.controls.insert(format!("{:?}", control), value));
        self.inner.set_control(control, value)
    }

    fn read_frame(&mut self) -> Result<RawFrame, CameraError> {
        if let Some(delay) = self.provider.capture_delay {
            std::thread::sleep(delay);
        }
        if let Some(limit) = self.provider.fail_capture_after {
            if self.captured >= limit {
                return Err(CameraError::Capture("device stopped responding".into()));
            }
        }
        self.captured += 1;
        self.stats.with(|s| s.captures += 1);
        self.inner.read_frame()
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.stats.with(|s| {
            s.releases += 1;
            s.open_now -= 1;
        });
    }
}
