// 该文件是 MedLens （药镜） 项目的一部分。
// src/bin/scan_image.rs - 识别单张图像文件
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

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;
use serde_json::json;
use tracing::{info, warn};
use url::Url;

use medlens::{
  FromUrl,
  catalog::Catalog,
  history::HistoryWrapper,
  input::{ImageFileInput, NoCamera},
  model::HttpClassifierBuilder,
  task::Notice,
  workflow::{ScanWorkflow, WorkflowState},
};

/// MedLens 图像识别参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 待识别的图像，例如 image:///tmp/pill.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 分类服务地址
  #[arg(long, value_name = "CLASSIFIER", env = "MEDLENS_CLASSIFIER")]
  pub classifier: Url,
  /// 药品数据集，默认使用内置数据集
  #[arg(long, value_name = "CATALOG")]
  pub catalog: Option<Url>,
  /// 历史记录存储
  #[arg(long, value_name = "HISTORY", default_value = "memory:")]
  pub history: Url,
  /// 分类请求超时（秒）
  #[arg(long, value_name = "SECONDS", default_value_t = 30)]
  pub timeout: u64,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入来源: {}", args.input);
  info!("分类服务: {}", args.classifier);
  info!("历史记录: {}", args.history);

  let catalog = match &args.catalog {
    Some(url) => Catalog::from_url(url)?,
    None => Catalog::builtin()?,
  };
  info!("药品数据集版本 {}，共 {} 种", catalog.version(), catalog.len());

  let input = ImageFileInput::from_url(&args.input)?;
  let classifier = HttpClassifierBuilder::from_url(&args.classifier)?
    .timeout(Duration::from_secs(args.timeout))
    .build()?;
  let history = HistoryWrapper::from_url(&args.history)?;

  let mut workflow = ScanWorkflow::new(NoCamera, classifier, Arc::new(catalog), history);
  let state = workflow.identify_upload(input.bytes())?.clone();

  let comparison = workflow.comparison();
  let report = match &state {
    WorkflowState::Result(found) => json!({
      "status": "identified",
      "medicine": found,
      "comparison": comparison,
    }),
    WorkflowState::Error(failure) => json!({
      "status": "failed",
      "failure": failure,
      "comparison": comparison,
    }),
    other => json!({ "status": other.name() }),
  };
  println!("{}", serde_json::to_string_pretty(&report)?);

  if let WorkflowState::Result(_) = state {
    match workflow.wait_notice(Duration::from_secs(args.timeout)) {
      Some(Notice::Saved(entry)) => info!("已保存到历史记录: {}", entry.id),
      Some(Notice::SaveFailed { reason, .. }) => warn!("历史记录保存失败: {}", reason),
      None => warn!("等待历史记录保存超时"),
    }
  }

  Ok(())
}
