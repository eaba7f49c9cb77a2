// 该文件是 MedLens （药镜） 项目的一部分。
// src/model.rs - 分类模型
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

use serde::{Deserialize, Serialize};

use crate::frame::CapturedImage;

/// 仅用于展示的候选数量
pub const COMPARISON_SIZE: usize = 3;

/// 模型中表示“不是药品”的类别，命中时不展示候选对比
pub const NOT_A_MEDICINE_LABEL: &str = "not a medicine";

pub trait Classifier {
  type Error: std::error::Error + Send + Sync + 'static;

  fn classify(&self, image: &CapturedImage) -> Result<ClassificationResult, Self::Error>;
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
  type Error = C::Error;

  fn classify(&self, image: &CapturedImage) -> Result<ClassificationResult, Self::Error> {
    (**self).classify(image)
  }
}

/// 将概率换算为取整后的百分比
pub fn confidence_percent(probability: f32) -> u8 {
  if probability.is_nan() {
    return 0;
  }
  (probability.clamp(0.0, 1.0) * 100.0).round() as u8
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
  #[serde(rename = "className", alias = "label")]
  pub label: String,
  pub probability: f32,
}

impl Prediction {
  pub fn new(label: impl Into<String>, probability: f32) -> Self {
    Self {
      label: label.into(),
      probability,
    }
  }

  pub fn confidence(&self) -> u8 {
    confidence_percent(self.probability)
  }
}

/// 单张图像的分类结果，保持分类器返回的顺序
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassificationResult {
  predictions: Box<[Prediction]>,
}

impl From<Vec<Prediction>> for ClassificationResult {
  fn from(predictions: Vec<Prediction>) -> Self {
    Self {
      predictions: predictions.into_boxed_slice(),
    }
  }
}

impl ClassificationResult {
  pub fn predictions(&self) -> &[Prediction] {
    &self.predictions
  }

  pub fn is_empty(&self) -> bool {
    self.predictions.is_empty()
  }

  /// 概率最高的预测；并列时取靠后的一项
  pub fn top(&self) -> Option<&Prediction> {
    self
      .predictions
      .iter()
      .max_by(|a, b| a.probability.total_cmp(&b.probability))
  }

  /// 按概率降序的前 k 项；并列时与 `top` 一致，靠后的一项在前
  pub fn top_k(&self, k: usize) -> Vec<&Prediction> {
    let mut sorted: Vec<&Prediction> = self.predictions.iter().rev().collect();
    sorted.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    sorted.truncate(k);
    sorted
  }

  /// 展示用的候选对比，不参与流程判定
  pub fn comparison(&self) -> Vec<&Prediction> {
    let top = self.top_k(COMPARISON_SIZE);
    match top.first() {
      Some(first) if first.label.to_lowercase() == NOT_A_MEDICINE_LABEL => Vec::new(),
      _ => top,
    }
  }
}

mod http_classifier;
pub use self::http_classifier::{HttpClassifier, HttpClassifierBuilder, HttpClassifierError};
