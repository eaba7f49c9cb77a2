// 该文件是 MedLens （药镜） 项目的一部分。
// src/bin/ask.rs - 针对药品提问
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

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use url::Url;

use medlens::{
  FromUrl,
  catalog::Catalog,
  chat::{GeminiAssistant, GeminiConfig, MedicineChat, ask_general},
};

/// MedLens 药品问答参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 已识别的药品名称；省略时作为一般医药问题
  #[arg(long, value_name = "NAME")]
  pub medicine: Option<String>,
  #[arg(long, value_name = "QUESTION")]
  pub question: String,
  /// 药品数据集，默认使用内置数据集
  #[arg(long, value_name = "CATALOG")]
  pub catalog: Option<Url>,
  #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
  pub api_key: String,
  #[arg(long, default_value = "gemini-2.5-flash")]
  pub model: String,
  #[arg(long, value_name = "SECONDS", default_value_t = 30)]
  pub timeout: u64,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  let assistant = GeminiAssistant::new(GeminiConfig {
    model: args.model,
    timeout_secs: args.timeout,
    ..GeminiConfig::with_api_key(args.api_key)
  })?;

  let answer = match &args.medicine {
    Some(name) => {
      let catalog = match &args.catalog {
        Some(url) => Catalog::from_url(url)?,
        None => Catalog::builtin()?,
      };
      let medicine = catalog
        .lookup(name)
        .with_context(|| format!("数据集中没有药品 {}", name))?
        .clone();
      info!("药品: {} ({})", medicine.name, medicine.generic_name);
      let mut chat = MedicineChat::new(assistant, medicine);
      chat.ask(&args.question)?
    }
    None => ask_general(&assistant, &args.question)?,
  };

  println!("{}", answer);
  Ok(())
}
