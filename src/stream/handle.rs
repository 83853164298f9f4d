//! 摄像头句柄
//!
//! 每个连接最多持有一个打开的摄像头。采集时摄像头被借出到阻塞线程，
//! 归还时如果句柄已经关闭，立即释放，保证不会对已释放的设备继续采集。

use tracing::debug;

use crate::camera::Camera;

#[derive(Default)]
pub struct CameraHandle {
    camera: Option<Box<dyn Camera>>,
    /// 摄像头是否借出
    checked_out: bool,
    closed: bool,
    releases: usize,
}

impl CameraHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 安装新摄像头。已有摄像头会先被释放，不会同时打开两个设备
    pub fn install(&mut self, camera: Box<dyn Camera>) {
        if let Some(mut previous) = self.camera.take() {
            debug!("替换已打开的摄像头");
            previous.close();
            self.releases += 1;
        }
        self.camera = Some(camera);
        self.closed = false;
    }

    /// 是否持有 (或借出) 一个打开的摄像头
    pub fn is_active(&self) -> bool {
        !self.closed && (self.camera.is_some() || self.checked_out)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// 借出摄像头；句柄已关闭时返回 None
    pub fn checkout(&mut self) -> Option<Box<dyn Camera>> {
        if self.closed {
            return None;
        }
        let camera = self.camera.take()?;
        self.checked_out = true;
        Some(camera)
    }

    /// 归还摄像头。句柄在借出期间被关闭时，立即释放归还的摄像头
    pub fn checkin(&mut self, mut camera: Box<dyn Camera>) {
        self.checked_out = false;
        if self.closed {
            camera.close();
            self.releases += 1;
            return;
        }
        self.camera = Some(camera);
    }

    /// 借出的摄像头丢失 (采集线程 panic)，视为已释放
    pub fn forfeit(&mut self) {
        if self.checked_out {
            self.checked_out = false;
            self.releases += 1;
        }
    }

    /// 关闭句柄并释放摄像头；只有第一次调用真正释放，返回是否释放了设备
    pub fn release(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        match self.camera.take() {
            Some(mut camera) => {
                camera.close();
                self.releases += 1;
                true
            }
            // 借出中：由 checkin 负责释放
            None => false,
        }
    }

    /// 已释放的设备数
    pub fn releases(&self) -> usize {
        self.releases
    }
}

impl Drop for CameraHandle {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::mock::MockProvider;
    use crate::camera::{open_camera, BackendKind, DeviceOptions};

    fn camera(provider: &MockProvider) -> Box<dyn Camera> {
        open_camera(BackendKind::Usb, provider, &DeviceOptions::default()).unwrap()
    }

    #[test]
    fn test_release_is_idempotent() {
        let provider = MockProvider::new();
        let mut handle = CameraHandle::new();
        handle.install(camera(&provider));

        assert!(handle.release());
        assert!(!handle.release());
        drop(handle);

        assert_eq!(provider.stats().releases(), 1);
        assert_eq!(provider.stats().open_now(), 0);
    }

    #[test]
    fn test_install_replaces_previous_camera() {
        let provider = MockProvider::new();
        let mut handle = CameraHandle::new();
        handle.install(camera(&provider));
        handle.install(camera(&provider));

        assert_eq!(provider.stats().open_now(), 1);
        assert_eq!(provider.stats().releases(), 1);
        assert_eq!(handle.releases(), 1);
    }

    #[test]
    fn test_checkin_after_release_closes_camera() {
        let provider = MockProvider::new();
        let mut handle = CameraHandle::new();
        handle.install(camera(&provider));

        let cam = handle.checkout().unwrap();
        assert!(handle.is_active());
        assert!(!handle.release());
        assert!(handle.checkout().is_none());

        handle.checkin(cam);
        assert_eq!(provider.stats().open_now(), 0);
        assert_eq!(handle.releases(), 1);
        assert!(!handle.is_active());
    }

    #[test]
    fn test_checkout_after_release_is_refused() {
        let provider = MockProvider::new();
        let mut handle = CameraHandle::new();
        handle.install(camera(&provider));
        handle.release();
        assert!(handle.checkout().is_none());
    }
}
