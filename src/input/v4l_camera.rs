// 该文件是 MedLens （药镜） 项目的一部分。
// src/input/v4l_camera.rs - V4L2 摄像头
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

use std::io;
use std::pin::Pin;

use image::RgbImage;
use thiserror::Error;
use tracing::{error, info};
use url::Url;
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{Camera, CameraError, CameraStream},
};

#[derive(Error, Debug)]
pub enum V4lCameraError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
}

const DEFAULT_DEVICE: &str = "/dev/video0";
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const BUFFER_COUNT: u32 = 4;

/// V4L2 摄像头
///
/// 只记录设备参数，`open` 时才真正占用设备。
pub struct V4lCamera {
  device_path: String,
  width: u32,
  height: u32,
}

impl FromUrlWithScheme for V4lCamera {
  const SCHEME: &'static str = "v4l";
}

impl FromUrl for V4lCamera {
  type Error = V4lCameraError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(V4lCameraError::SchemaMismatch);
    }

    // v4l:///dev/video0?width=1280&height=720
    let device_path = if url.path().is_empty() || url.path() == "/" {
      DEFAULT_DEVICE.to_string()
    } else {
      url.path().to_string()
    };

    let mut camera = V4lCamera {
      device_path,
      width: DEFAULT_WIDTH,
      height: DEFAULT_HEIGHT,
    };
    for (k, v) in url.query_pairs() {
      match (k.as_ref(), v.parse::<u32>()) {
        ("width", Ok(w)) => camera.width = w,
        ("height", Ok(h)) => camera.height = h,
        _ => {}
      }
    }
    Ok(camera)
  }
}

impl V4lCamera {
  pub fn device_path(&self) -> &str {
    &self.device_path
  }
}

fn map_open_error(device_path: &str, err: io::Error) -> CameraError {
  match err.kind() {
    io::ErrorKind::PermissionDenied => CameraError::PermissionDenied,
    io::ErrorKind::NotFound => CameraError::NoDevice(device_path.to_string()),
    _ => CameraError::Device(err.to_string()),
  }
}

impl Camera for V4lCamera {
  type Stream = V4lStream;

  fn open(&mut self) -> Result<Self::Stream, CameraError> {
    info!("打开摄像头: {}", self.device_path);
    let device = Box::pin(
      Device::with_path(&self.device_path).map_err(|e| map_open_error(&self.device_path, e))?,
    );

    let mut format = device
      .format()
      .map_err(|e| CameraError::Device(e.to_string()))?;
    format.width = self.width;
    format.height = self.height;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device
      .set_format(&format)
      .map_err(|e| CameraError::Device(e.to_string()))?;
    if format.fourcc != FourCC::new(b"YUYV") {
      return Err(CameraError::Device(format!(
        "设备不支持 YUYV 格式: {}",
        format.fourcc
      )));
    }

    let mut source = V4lStream {
      stream: None,
      device: Some(device),
      width: format.width,
      height: format.height,
    };

    // SAFETY: device 被 Pin<Box> 固定在堆上，不会移动；
    // stream 与 device 存放在同一结构体中，stop 与 Drop 都先释放 stream 再释放 device。
    let stream = match source.device.as_ref() {
      Some(device) => {
        let device_ref: &Device = device;
        unsafe {
          let device_static: &'static Device = std::mem::transmute(device_ref);
          Stream::with_buffers(device_static, Type::VideoCapture, BUFFER_COUNT)
            .map_err(|e| map_open_error(&self.device_path, e))?
        }
      }
      None => return Err(CameraError::NoDevice(self.device_path.clone())),
    };

    source.stream = Some(stream);
    info!("摄像头已启动: {}x{}", source.width, source.height);
    Ok(source)
  }
}

/// 已打开的 V4L2 捕获流
pub struct V4lStream {
  stream: Option<Stream<'static>>,
  device: Option<Pin<Box<Device>>>,
  width: u32,
  height: u32,
}

impl V4lStream {
  /// 将 YUYV 格式转换为 RGB
  fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Vec<u8> {
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);

    for chunk in yuyv.chunks_exact(4) {
      let y0 = chunk[0] as f32;
      let u = chunk[1] as f32 - 128.0;
      let y1 = chunk[2] as f32;
      let v = chunk[3] as f32 - 128.0;

      for y in [y0, y1] {
        let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
        let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
        let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
        rgb.extend_from_slice(&[r, g, b]);
      }
    }

    rgb
  }
}

impl CameraStream for V4lStream {
  fn snapshot(&mut self) -> Result<RgbImage, CameraError> {
    let stream = self
      .stream
      .as_mut()
      .ok_or_else(|| CameraError::Capture("摄像头流已停止".to_string()))?;

    let (buffer, _meta) = stream
      .next()
      .map_err(|e| CameraError::Capture(e.to_string()))?;
    let rgb = Self::yuyv_to_rgb(buffer, self.width, self.height);

    RgbImage::from_raw(self.width, self.height, rgb)
      .ok_or_else(|| CameraError::Capture("帧数据长度与分辨率不符".to_string()))
  }

  fn active_tracks(&self) -> usize {
    usize::from(self.stream.is_some())
  }

  fn stop(&mut self) {
    // stream 必须先于 device 释放
    self.stream.take();
    self.device.take();
  }
}

impl Drop for V4lStream {
  fn drop(&mut self) {
    self.stop();
  }
}
