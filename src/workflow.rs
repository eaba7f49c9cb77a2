// 该文件是 MedLens （药镜） 项目的一部分。
// src/workflow.rs - 识别流程状态机
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

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  catalog::Catalog,
  frame::CapturedImage,
  history::{HistoryStore, NewScanRecord},
  input::{Camera, CameraError, ScopedStream},
  model::{ClassificationResult, Classifier, Prediction},
  outcome::{IdentifiedMedicine, ScanFailure, ScanOutcome, resolve},
  task::{HistoryRecorder, Notice},
};

/// 识别流程状态
///
/// `Idle -> Capturing -> Classifying -> Result | Error -> Idle`，
/// 上传文件时从 `Idle` 或 `Capturing` 直接进入 `Classifying`。
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowState {
  Idle,
  Capturing,
  Classifying,
  Result(IdentifiedMedicine),
  Error(ScanFailure),
}

impl WorkflowState {
  pub fn name(&self) -> &'static str {
    match self {
      WorkflowState::Idle => "idle",
      WorkflowState::Capturing => "capturing",
      WorkflowState::Classifying => "classifying",
      WorkflowState::Result(_) => "result",
      WorkflowState::Error(_) => "error",
    }
  }
}

#[derive(Error, Debug, PartialEq)]
pub enum WorkflowError {
  #[error("无法在 {from} 状态下执行 {action}")]
  InvalidTransition {
    from: &'static str,
    action: &'static str,
  },
  #[error("已有识别请求正在进行")]
  ClassificationInFlight,
  #[error("摄像头错误: {0}")]
  Camera(#[from] CameraError),
}

/// 采集、分类、门限、查找、记录的识别流程
///
/// 所有状态转换都通过 `&mut self` 串行进行。摄像头流只在 `Capturing`
/// 状态下持有，离开该状态或流程析构时一定会被停止。
pub struct ScanWorkflow<Cam: Camera, C: Classifier> {
  stream: Option<ScopedStream<Cam::Stream>>,
  camera: Cam,
  classifier: C,
  catalog: Arc<Catalog>,
  recorder: HistoryRecorder,
  notices: Receiver<Notice>,
  state: WorkflowState,
  image: Option<CapturedImage>,
  classification: Option<ClassificationResult>,
  permission_denied: bool,
}

impl<Cam: Camera, C: Classifier> ScanWorkflow<Cam, C> {
  pub fn new<S>(camera: Cam, classifier: C, catalog: Arc<Catalog>, store: S) -> Self
  where
    S: HistoryStore + 'static,
  {
    let (recorder, notices) = HistoryRecorder::spawn(store);
    Self {
      stream: None,
      camera,
      classifier,
      catalog,
      recorder,
      notices,
      state: WorkflowState::Idle,
      image: None,
      classification: None,
      permission_denied: false,
    }
  }

  pub fn state(&self) -> &WorkflowState {
    &self.state
  }

  pub fn image(&self) -> Option<&CapturedImage> {
    self.image.as_ref()
  }

  pub fn classification(&self) -> Option<&ClassificationResult> {
    self.classification.as_ref()
  }

  /// 展示用的前三项候选
  pub fn comparison(&self) -> Vec<&Prediction> {
    self
      .classification
      .as_ref()
      .map(|c| c.comparison())
      .unwrap_or_default()
  }

  pub fn permission_denied(&self) -> bool {
    self.permission_denied
  }

  pub fn camera_active(&self) -> bool {
    self
      .stream
      .as_ref()
      .map(|s| s.active_tracks() > 0)
      .unwrap_or(false)
  }

  pub fn catalog(&self) -> &Catalog {
    &self.catalog
  }

  /// 取出当前已到达的历史记录通知
  pub fn try_notices(&self) -> Vec<Notice> {
    self.notices.try_iter().collect()
  }

  pub fn wait_notice(&self, timeout: Duration) -> Option<Notice> {
    self.notices.recv_timeout(timeout).ok()
  }

  fn invalid(&self, action: &'static str) -> WorkflowError {
    warn!("忽略无效操作 {} (当前状态: {})", action, self.state.name());
    WorkflowError::InvalidTransition {
      from: self.state.name(),
      action,
    }
  }

  fn transition(&mut self, next: WorkflowState) {
    info!("状态转换: {} -> {}", self.state.name(), next.name());
    self.state = next;
  }

  fn release_camera(&mut self) {
    if let Some(stream) = self.stream.take() {
      stream.release();
    }
  }

  /// 打开摄像头
  ///
  /// 失败时保持 `Idle` 并标记权限错误，不进入识别错误状态。
  pub fn start_camera(&mut self) -> Result<(), WorkflowError> {
    match self.state {
      WorkflowState::Idle => {}
      WorkflowState::Capturing => return Ok(()),
      _ => return Err(self.invalid("start_camera")),
    }

    match self.camera.open() {
      Ok(stream) => {
        self.stream = Some(ScopedStream::new(stream));
        self.permission_denied = false;
        self.transition(WorkflowState::Capturing);
        Ok(())
      }
      Err(e) => {
        warn!("无法打开摄像头: {}", e);
        self.permission_denied = true;
        Err(WorkflowError::Camera(e))
      }
    }
  }

  /// 用户主动关闭摄像头
  pub fn stop_camera(&mut self) {
    self.release_camera();
    if self.state == WorkflowState::Capturing {
      self.transition(WorkflowState::Idle);
    }
  }

  /// 抓取当前帧并进入 `Classifying`
  pub fn capture(&mut self) -> Result<&WorkflowState, WorkflowError> {
    match self.state {
      WorkflowState::Capturing => {}
      WorkflowState::Classifying => return Err(WorkflowError::ClassificationInFlight),
      _ => return Err(self.invalid("capture")),
    }

    let snapshot = match self.stream.take() {
      Some(mut stream) => {
        let frame = stream.snapshot();
        stream.release();
        frame
      }
      None => Err(CameraError::Capture("摄像头流不存在".to_string())),
    };

    let image = snapshot
      .map_err(|e| e.to_string())
      .and_then(|frame| CapturedImage::from_rgb(frame).map_err(|e| e.to_string()));
    self.begin_classification(image);
    Ok(&self.state)
  }

  /// 使用上传的文件内容进入 `Classifying`
  pub fn upload(&mut self, bytes: &[u8]) -> Result<&WorkflowState, WorkflowError> {
    match self.state {
      WorkflowState::Idle | WorkflowState::Capturing => {}
      WorkflowState::Classifying => return Err(WorkflowError::ClassificationInFlight),
      _ => return Err(self.invalid("upload")),
    }

    self.release_camera();
    let image = CapturedImage::decode(bytes).map_err(|e| e.to_string());
    self.begin_classification(image);
    Ok(&self.state)
  }

  fn begin_classification(&mut self, image: Result<CapturedImage, String>) {
    match image {
      Ok(image) => {
        debug!("已采集图像 {}x{}", image.width(), image.height());
        self.image = Some(image);
        self.classification = None;
        self.transition(WorkflowState::Classifying);
      }
      Err(reason) => {
        error!("图像处理失败: {}", reason);
        self.transition(WorkflowState::Error(ScanFailure::general(format!(
          "Failed to process the image: {}",
          reason
        ))));
      }
    }
  }

  /// 调用分类器并根据 top-1 结果进入 `Result` 或 `Error`
  pub fn classify(&mut self) -> Result<&WorkflowState, WorkflowError> {
    if self.state != WorkflowState::Classifying {
      return Err(self.invalid("classify"));
    }
    let Some(image) = self.image.as_ref() else {
      return Err(self.invalid("classify"));
    };

    info!("开始识别...");
    let now = Instant::now();
    let result = self.classifier.classify(image);
    info!("识别完成，耗时: {:.2?}", now.elapsed());

    let next = match result {
      Ok(result) => {
        if let Some(top) = result.top() {
          info!("最可能结果: {} ({}%)", top.label, top.confidence());
        }
        let outcome = resolve(&result, &self.catalog);
        self.classification = Some(result);
        match outcome {
          ScanOutcome::Identified(found) => {
            self.recorder.record(NewScanRecord {
              medicine_name: found.record.name.clone(),
              confidence: found.confidence,
              image: image.clone(),
            });
            WorkflowState::Result(found)
          }
          ScanOutcome::Failed(failure) => WorkflowState::Error(failure),
        }
      }
      Err(e) => {
        error!("分类器调用失败: {}", e);
        WorkflowState::Error(ScanFailure::general(
          "Failed to classify the image. Please try again.",
        ))
      }
    };

    self.transition(next);
    Ok(&self.state)
  }

  /// `capture` 之后立即识别
  pub fn identify_capture(&mut self) -> Result<&WorkflowState, WorkflowError> {
    if *self.capture()? == WorkflowState::Classifying {
      return self.classify();
    }
    Ok(&self.state)
  }

  /// `upload` 之后立即识别
  pub fn identify_upload(&mut self, bytes: &[u8]) -> Result<&WorkflowState, WorkflowError> {
    if *self.upload(bytes)? == WorkflowState::Classifying {
      return self.classify();
    }
    Ok(&self.state)
  }

  /// 回到 `Idle` 并清空本轮的全部数据
  pub fn reset(&mut self) {
    self.release_camera();
    self.image = None;
    self.classification = None;
    if self.state != WorkflowState::Idle {
      self.transition(WorkflowState::Idle);
    }
  }
}

impl<Cam: Camera, C: Classifier> Drop for ScanWorkflow<Cam, C> {
  fn drop(&mut self) {
    self.release_camera();
    self.recorder.shutdown();
    debug!("识别流程已销毁");
  }
}
