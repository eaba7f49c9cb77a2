// 该文件是 MedLens （药镜） 项目的一部分。
// src/task.rs - 后台历史记录任务
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

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{error, info, warn};

use crate::history::{HistoryStore, NewScanRecord, ScanHistoryEntry};

/// 后台写入的结果通知，不影响识别流程状态
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
  Saved(ScanHistoryEntry),
  SaveFailed {
    medicine_name: String,
    reason: String,
  },
}

/// 识别成功后以“发出即忘”的方式追加历史记录
///
/// 写入在独立线程中进行，调用方不会被阻塞，也不会收到错误；
/// 结果通过 `Notice` 通道报告。析构时会处理完队列中剩余的记录。
pub struct HistoryRecorder {
  sender: Option<Sender<NewScanRecord>>,
  worker: Option<JoinHandle<()>>,
}

impl HistoryRecorder {
  pub fn spawn<S>(store: S) -> (Self, Receiver<Notice>)
  where
    S: HistoryStore + 'static,
  {
    let (tx, rx) = mpsc::channel::<NewScanRecord>();
    let (notice_tx, notice_rx) = mpsc::channel();

    let worker = thread::spawn(move || {
      info!("历史记录任务已启动");
      for record in rx {
        let medicine_name = record.medicine_name.clone();
        let now = Instant::now();
        let notice = match store.append(record) {
          Ok(entry) => {
            info!(
              "历史记录已保存: {} ({}%), 耗时: {:.2?}",
              entry.medicine_name,
              entry.confidence,
              now.elapsed()
            );
            Notice::Saved(entry)
          }
          Err(e) => {
            error!("历史记录保存失败: {}: {}", medicine_name, e);
            Notice::SaveFailed {
              medicine_name,
              reason: e.to_string(),
            }
          }
        };
        // 接收端已丢弃时通知无人关心
        let _ = notice_tx.send(notice);
      }
      info!("历史记录任务退出");
    });

    (
      Self {
        sender: Some(tx),
        worker: Some(worker),
      },
      notice_rx,
    )
  }

  pub fn record(&self, record: NewScanRecord) {
    let Some(sender) = self.sender.as_ref() else {
      warn!("历史记录任务已关闭，丢弃记录: {}", record.medicine_name);
      return;
    };
    if let Err(mpsc::SendError(record)) = sender.send(record) {
      warn!("历史记录任务已退出，丢弃记录: {}", record.medicine_name);
    }
  }

  /// 关闭队列并等待剩余记录写完
  pub fn shutdown(&mut self) {
    self.sender.take();
    if let Some(worker) = self.worker.take() {
      if worker.join().is_err() {
        error!("历史记录任务异常退出");
      }
    }
  }
}

impl Drop for HistoryRecorder {
  fn drop(&mut self) {
    self.shutdown();
  }
}
