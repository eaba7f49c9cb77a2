// 该文件是 MedLens （药镜） 项目的一部分。
// tests/common/mod.rs - 集成测试用的替身实现
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

#![allow(dead_code)]

use std::sync::{
  Arc,
  atomic::{AtomicUsize, Ordering},
};

use image::{Rgb, RgbImage};
use thiserror::Error;
use uuid::Uuid;

use medlens::{
  frame::CapturedImage,
  history::{HistoryStore, NewScanRecord, Page, ScanHistoryEntry},
  input::{Camera, CameraError, CameraStream},
  model::{ClassificationResult, Classifier, Prediction},
};

pub fn frame() -> RgbImage {
  RgbImage::from_pixel(32, 24, Rgb([200, 180, 160]))
}

/// 可直接上传的 JPEG 内容
pub fn jpeg_bytes() -> Vec<u8> {
  CapturedImage::from_rgb(frame()).unwrap().jpeg().to_vec()
}

/// 记录当前仍在运行的轨道数
#[derive(Clone, Default)]
pub struct FakeCamera {
  pub tracks: Arc<AtomicUsize>,
  pub deny: bool,
}

impl FakeCamera {
  pub fn denied() -> Self {
    Self {
      deny: true,
      ..Self::default()
    }
  }

  pub fn active(&self) -> usize {
    self.tracks.load(Ordering::SeqCst)
  }
}

pub struct FakeStream {
  tracks: Arc<AtomicUsize>,
  running: bool,
}

impl Camera for FakeCamera {
  type Stream = FakeStream;

  fn open(&mut self) -> Result<Self::Stream, CameraError> {
    if self.deny {
      return Err(CameraError::PermissionDenied);
    }
    self.tracks.fetch_add(1, Ordering::SeqCst);
    Ok(FakeStream {
      tracks: self.tracks.clone(),
      running: true,
    })
  }
}

impl CameraStream for FakeStream {
  fn snapshot(&mut self) -> Result<RgbImage, CameraError> {
    if self.running {
      Ok(frame())
    } else {
      Err(CameraError::Capture("stopped".to_string()))
    }
  }

  fn active_tracks(&self) -> usize {
    usize::from(self.running)
  }

  fn stop(&mut self) {
    if self.running {
      self.running = false;
      self.tracks.fetch_sub(1, Ordering::SeqCst);
    }
  }
}

#[derive(Error, Debug)]
#[error("classifier unavailable")]
pub struct ClassifierDown;

/// 返回预设结果并统计调用次数
#[derive(Clone)]
pub struct FakeClassifier {
  pub result: Option<ClassificationResult>,
  pub calls: Arc<AtomicUsize>,
}

impl FakeClassifier {
  pub fn returning(items: &[(&str, f32)]) -> Self {
    let predictions: Vec<_> = items.iter().map(|(l, p)| Prediction::new(*l, *p)).collect();
    Self {
      result: Some(predictions.into()),
      calls: Arc::default(),
    }
  }

  pub fn failing() -> Self {
    Self {
      result: None,
      calls: Arc::default(),
    }
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

impl Classifier for FakeClassifier {
  type Error = ClassifierDown;

  fn classify(&self, _image: &CapturedImage) -> Result<ClassificationResult, Self::Error> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.result.clone().ok_or(ClassifierDown)
  }
}

#[derive(Error, Debug)]
#[error("disk full")]
pub struct DiskFull;

/// 所有写入都失败的存储
pub struct FailingStore;

impl HistoryStore for FailingStore {
  type Error = DiskFull;

  fn append(&self, _record: NewScanRecord) -> Result<ScanHistoryEntry, Self::Error> {
    Err(DiskFull)
  }

  fn list(&self, _page: Page) -> Result<Vec<ScanHistoryEntry>, Self::Error> {
    Ok(Vec::new())
  }

  fn delete(&self, _id: Uuid) -> Result<bool, Self::Error> {
    Ok(false)
  }

  fn delete_many(&self, _ids: &[Uuid]) -> Result<usize, Self::Error> {
    Ok(0)
  }

  fn count(&self) -> Result<usize, Self::Error> {
    Ok(0)
  }
}
