// 该文件是 MedLens （药镜） 项目的一部分。
// src/chat/gemini.rs - Gemini 接口
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

use serde::Deserialize;
use tracing::debug;

use crate::chat::{Assistant, ChatError};

#[derive(Debug, Clone)]
pub struct GeminiConfig {
  pub endpoint: String,
  pub model: String,
  pub api_key: String,
  pub timeout_secs: u64,
}

impl Default for GeminiConfig {
  fn default() -> Self {
    Self {
      endpoint: "https://generativelanguage.googleapis.com".to_string(),
      model: "gemini-2.5-flash".to_string(),
      api_key: String::new(),
      timeout_secs: 30,
    }
  }
}

impl GeminiConfig {
  pub fn with_api_key(api_key: impl Into<String>) -> Self {
    Self {
      api_key: api_key.into(),
      ..Self::default()
    }
  }

  fn url(&self) -> String {
    format!(
      "{}/v1beta/models/{}:generateContent",
      self.endpoint.trim_end_matches('/'),
      self.model
    )
  }
}

#[derive(Deserialize)]
struct GenerateResponse {
  #[serde(default)]
  candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
  content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
  #[serde(default)]
  parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
  #[serde(default)]
  text: String,
}

impl GenerateResponse {
  fn into_text(self) -> Option<String> {
    let text: String = self
      .candidates
      .into_iter()
      .next()?
      .content?
      .parts
      .into_iter()
      .map(|p| p.text)
      .collect();
    if text.trim().is_empty() {
      None
    } else {
      Some(text)
    }
  }
}

pub struct GeminiAssistant {
  config: GeminiConfig,
  client: reqwest::blocking::Client,
}

impl GeminiAssistant {
  pub fn new(config: GeminiConfig) -> Result<Self, ChatError> {
    if config.api_key.trim().is_empty() {
      return Err(ChatError::MissingApiKey);
    }
    let client = reqwest::blocking::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| ChatError::HttpError(format!("无法创建 HTTP 客户端: {}", e)))?;
    Ok(Self { config, client })
  }
}

impl Assistant for GeminiAssistant {
  fn complete(&self, prompt: &str) -> Result<String, ChatError> {
    let now = Instant::now();
    let body = serde_json::json!({
      "contents": [{ "parts": [{ "text": prompt }] }],
    });

    let response = self
      .client
      .post(self.config.url())
      .header("x-goog-api-key", &self.config.api_key)
      .json(&body)
      .send()
      .map_err(|e| {
        if e.is_timeout() {
          ChatError::Timeout(self.config.timeout_secs)
        } else {
          ChatError::HttpError(format!("请求失败: {}", e))
        }
      })?;

    if !response.status().is_success() {
      return Err(ChatError::HttpError(format!(
        "HTTP {} from Gemini",
        response.status()
      )));
    }

    let parsed: GenerateResponse = response
      .json()
      .map_err(|e| ChatError::HttpError(format!("无法解析响应: {}", e)))?;
    debug!("Gemini 响应耗时: {:.2?}", now.elapsed());
    parsed.into_text().ok_or(ChatError::EmptyResponse)
  }
}
