// 该文件是 MedLens （药镜） 项目的一部分。
// src/bin/scan_camera.rs - 使用摄像头识别药品
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

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread::sleep,
  time::{Duration, Instant},
};

use anyhow::Result;
use clap::Parser;
use serde_json::json;
use tracing::{error, info, warn};
use url::Url;

use medlens::{
  FromUrl,
  catalog::Catalog,
  history::HistoryWrapper,
  input::V4lCamera,
  model::HttpClassifierBuilder,
  task::Notice,
  workflow::{ScanWorkflow, WorkflowError, WorkflowState},
};

/// MedLens 摄像头识别参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 摄像头，例如 v4l:///dev/video0?width=1280&height=720
  #[arg(long, value_name = "CAMERA", default_value = "v4l:///dev/video0")]
  pub camera: Url,
  /// 分类服务地址
  #[arg(long, value_name = "CLASSIFIER", env = "MEDLENS_CLASSIFIER")]
  pub classifier: Url,
  /// 药品数据集，默认使用内置数据集
  #[arg(long, value_name = "CATALOG")]
  pub catalog: Option<Url>,
  /// 历史记录存储
  #[arg(long, value_name = "HISTORY", default_value = "memory:")]
  pub history: Url,
  /// 打开摄像头后等待多久再抓帧（毫秒）
  #[arg(long, value_name = "MILLIS", default_value_t = 1500)]
  pub warmup: u64,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  let running = Arc::new(AtomicBool::new(true));
  let r = running.clone();
  ctrlc::set_handler(move || {
    r.store(false, Ordering::SeqCst);
  })?;

  info!("摄像头: {}", args.camera);
  info!("分类服务: {}", args.classifier);

  let catalog = match &args.catalog {
    Some(url) => Catalog::from_url(url)?,
    None => Catalog::builtin()?,
  };
  let camera = V4lCamera::from_url(&args.camera)?;
  let classifier = HttpClassifierBuilder::from_url(&args.classifier)?.build()?;
  let history = HistoryWrapper::from_url(&args.history)?;

  let mut workflow = ScanWorkflow::new(camera, classifier, Arc::new(catalog), history);

  match workflow.start_camera() {
    Ok(()) => {}
    Err(WorkflowError::Camera(e)) => {
      error!("无法访问摄像头: {}", e);
      if workflow.permission_denied() {
        warn!("请检查摄像头权限，或改用 medlens-scan 识别图像文件");
      }
      return Err(e.into());
    }
    Err(e) => return Err(e.into()),
  }

  let deadline = Instant::now() + Duration::from_millis(args.warmup);
  while Instant::now() < deadline {
    if !running.load(Ordering::SeqCst) {
      warn!("已取消，关闭摄像头");
      workflow.stop_camera();
      return Ok(());
    }
    sleep(Duration::from_millis(50));
  }

  let state = workflow.identify_capture()?.clone();
  info!("摄像头已释放: {}", !workflow.camera_active());

  let report = match &state {
    WorkflowState::Result(found) => json!({
      "status": "identified",
      "medicine": found,
      "comparison": workflow.comparison(),
    }),
    WorkflowState::Error(failure) => json!({
      "status": "failed",
      "failure": failure,
      "comparison": workflow.comparison(),
    }),
    other => json!({ "status": other.name() }),
  };
  println!("{}", serde_json::to_string_pretty(&report)?);

  if let WorkflowState::Result(_) = state {
    match workflow.wait_notice(Duration::from_secs(10)) {
      Some(Notice::Saved(entry)) => info!("已保存到历史记录: {}", entry.image_ref),
      Some(Notice::SaveFailed { reason, .. }) => warn!("历史记录保存失败: {}", reason),
      None => warn!("等待历史记录保存超时"),
    }
  }

  Ok(())
}
