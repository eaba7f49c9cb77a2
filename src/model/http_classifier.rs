// 该文件是 MedLens （药镜） 项目的一部分。
// src/model/http_classifier.rs - 远程图像分类服务
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

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl,
  frame::CapturedImage,
  model::{ClassificationResult, Classifier, Prediction},
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum HttpClassifierError {
  #[error("分类服务地址必须使用 http 或 https 方案: {0}")]
  SchemeMismatch(String),
  #[error("HTTP 请求失败: {0}")]
  RequestError(#[from] reqwest::Error),
  #[error("分类服务返回状态码 {0}")]
  StatusError(u16),
}

pub struct HttpClassifierBuilder {
  endpoint: Url,
  timeout: Duration,
}

impl FromUrl for HttpClassifierBuilder {
  type Error = HttpClassifierError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      "http" | "https" => Ok(HttpClassifierBuilder {
        endpoint: url.clone(),
        timeout: DEFAULT_TIMEOUT,
      }),
      other => Err(HttpClassifierError::SchemeMismatch(other.to_string())),
    }
  }
}

impl HttpClassifierBuilder {
  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn build(self) -> Result<HttpClassifier, HttpClassifierError> {
    info!("分类服务地址: {}", self.endpoint);
    let client = reqwest::blocking::Client::builder()
      .timeout(self.timeout)
      .build()?;
    Ok(HttpClassifier {
      endpoint: self.endpoint,
      client,
    })
  }
}

/// 托管的图像分类服务
///
/// 每张图像只请求一次，不做重试。
pub struct HttpClassifier {
  endpoint: Url,
  client: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
  image: &'a str,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ClassifyResponse {
  Bare(Vec<Prediction>),
  Wrapped { predictions: Vec<Prediction> },
}

impl From<ClassifyResponse> for ClassificationResult {
  fn from(response: ClassifyResponse) -> Self {
    match response {
      ClassifyResponse::Bare(predictions) => predictions.into(),
      ClassifyResponse::Wrapped { predictions } => predictions.into(),
    }
  }
}

impl Classifier for HttpClassifier {
  type Error = HttpClassifierError;

  fn classify(&self, image: &CapturedImage) -> Result<ClassificationResult, Self::Error> {
    let now = Instant::now();
    let response = self
      .client
      .post(self.endpoint.clone())
      .json(&ClassifyRequest {
        image: image.data_uri(),
      })
      .send()?;

    if !response.status().is_success() {
      return Err(HttpClassifierError::StatusError(response.status().as_u16()));
    }

    let body: ClassifyResponse = response.json()?;
    let result = ClassificationResult::from(body);
    debug!(
      "分类完成，耗时: {:.2?}，共 {} 个类别",
      now.elapsed(),
      result.predictions().len()
    );
    Ok(result)
  }
}
