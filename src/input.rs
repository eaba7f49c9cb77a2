// 该文件是 MedLens （药镜） 项目的一部分。
// src/input.rs - 图像采集输入
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};

mod read_image_file;
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "v4l_camera")]
mod v4l_camera;
#[cfg(feature = "v4l_camera")]
pub use self::v4l_camera::{V4lCamera, V4lCameraError, V4lStream};

/// 摄像头获取或抓帧失败
///
/// 打开摄像头失败属于识别前的错误，不会让识别流程进入错误状态。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
  #[error("摄像头访问被拒绝")]
  PermissionDenied,
  #[error("未找到摄像头设备: {0}")]
  NoDevice(String),
  #[error("摄像头设备错误: {0}")]
  Device(String),
  #[error("抓帧失败: {0}")]
  Capture(String),
}

/// 已打开的摄像头流
pub trait CameraStream {
  /// 抓取当前帧
  fn snapshot(&mut self) -> Result<RgbImage, CameraError>;

  /// 仍在运行的底层轨道数量，停止后必须为 0
  fn active_tracks(&self) -> usize;

  /// 停止全部底层轨道，可重复调用
  fn stop(&mut self);
}

/// 摄像头设备
pub trait Camera {
  type Stream: CameraStream;

  fn open(&mut self) -> Result<Self::Stream, CameraError>;
}

/// 没有摄像头时使用，例如只处理上传文件的场景
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCamera;

impl Camera for NoCamera {
  type Stream = std::convert::Infallible;

  fn open(&mut self) -> Result<Self::Stream, CameraError> {
    Err(CameraError::NoDevice("未配置摄像头".to_string()))
  }
}

impl CameraStream for std::convert::Infallible {
  fn snapshot(&mut self) -> Result<RgbImage, CameraError> {
    match *self {}
  }

  fn active_tracks(&self) -> usize {
    match *self {}
  }

  fn stop(&mut self) {
    match *self {}
  }
}

/// 作用域内持有的摄像头流
///
/// 无论是正常抓帧、用户取消、流程重置还是析构，离开作用域时都会停止底层流。
pub struct ScopedStream<S: CameraStream> {
  stream: Option<S>,
}

impl<S: CameraStream> ScopedStream<S> {
  pub fn new(stream: S) -> Self {
    debug!("摄像头流已接管");
    Self {
      stream: Some(stream),
    }
  }

  pub fn snapshot(&mut self) -> Result<RgbImage, CameraError> {
    match self.stream.as_mut() {
      Some(stream) => stream.snapshot(),
      None => Err(CameraError::Capture("摄像头流已停止".to_string())),
    }
  }

  pub fn active_tracks(&self) -> usize {
    self.stream.as_ref().map(|s| s.active_tracks()).unwrap_or(0)
  }

  /// 显式释放
  pub fn release(mut self) {
    self.stop_inner();
  }

  fn stop_inner(&mut self) {
    if let Some(mut stream) = self.stream.take() {
      stream.stop();
      info!("摄像头流已停止");
    }
  }
}

impl<S: CameraStream> Drop for ScopedStream<S> {
  fn drop(&mut self) {
    self.stop_inner();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  };

  struct CountingStream {
    tracks: Arc<AtomicUsize>,
  }

  impl CameraStream for CountingStream {
    fn snapshot(&mut self) -> Result<RgbImage, CameraError> {
      Ok(RgbImage::new(2, 2))
    }

    fn active_tracks(&self) -> usize {
      self.tracks.load(Ordering::SeqCst)
    }

    fn stop(&mut self) {
      self.tracks.store(0, Ordering::SeqCst);
    }
  }

  fn stream() -> (CountingStream, Arc<AtomicUsize>) {
    let tracks = Arc::new(AtomicUsize::new(1));
    (
      CountingStream {
        tracks: tracks.clone(),
      },
      tracks,
    )
  }

  #[test]
  fn drop_stops_stream() {
    let (inner, tracks) = stream();
    {
      let scoped = ScopedStream::new(inner);
      assert_eq!(scoped.active_tracks(), 1);
    }
    assert_eq!(tracks.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn release_stops_stream() {
    let (inner, tracks) = stream();
    let mut scoped = ScopedStream::new(inner);
    assert!(scoped.snapshot().is_ok());
    scoped.release();
    assert_eq!(tracks.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn no_camera_reports_missing_device() {
    assert!(matches!(NoCamera.open(), Err(CameraError::NoDevice(_))));
  }
}
