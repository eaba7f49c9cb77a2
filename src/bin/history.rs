// 该文件是 MedLens （药镜） 项目的一部分。
// src/bin/history.rs - 浏览与删除识别历史
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

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use url::Url;
use uuid::Uuid;

use medlens::{
  FromUrl,
  history::{HistoryStore, HistoryWrapper, Page},
};

/// MedLens 历史记录管理
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 历史记录存储，例如 folder:///var/lib/medlens
  #[arg(long, value_name = "HISTORY")]
  pub history: Url,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// 按时间倒序列出记录
  List {
    /// 页码，从 0 开始
    #[arg(long, default_value_t = 0)]
    page: usize,
    #[arg(long, default_value_t = 20)]
    limit: usize,
  },
  /// 删除一条或多条记录
  Delete {
    #[arg(required = true)]
    ids: Vec<Uuid>,
  },
  /// 记录总数
  Count,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  info!("历史记录: {}", args.history);
  let store = HistoryWrapper::from_url(&args.history)?;

  match args.command {
    Command::List { page, limit } => {
      if limit == 0 {
        bail!("limit 必须大于 0");
      }
      let Some(page) = Page::nth(page, limit) else {
        bail!("页码 {} 超出范围", page);
      };
      let entries = store.list(page)?;
      println!("{}", serde_json::to_string_pretty(&entries)?);
    }
    Command::Delete { ids } => {
      let removed = if ids.len() == 1 {
        usize::from(store.delete(ids[0])?)
      } else {
        store.delete_many(&ids)?
      };
      info!("已删除 {} 条记录", removed);
      println!("{}", removed);
    }
    Command::Count => println!("{}", store.count()?),
  }

  Ok(())
}
