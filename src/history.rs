// 该文件是 MedLens （药镜） 项目的一部分。
// src/history.rs - 识别历史记录
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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::{FromUrl, FromUrlWithScheme, frame::CapturedImage};

/// 已持久化的识别记录，创建后只能删除不能修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanHistoryEntry {
  pub id: Uuid,
  pub medicine_name: String,
  pub confidence: u8,
  pub image_ref: String,
  pub timestamp: DateTime<Utc>,
}

/// 待追加的记录，图像引用由存储实现决定
#[derive(Debug, Clone)]
pub struct NewScanRecord {
  pub medicine_name: String,
  pub confidence: u8,
  pub image: CapturedImage,
}

/// 按时间倒序分页
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
  pub offset: usize,
  pub limit: usize,
}

impl Default for Page {
  fn default() -> Self {
    Self::first(20)
  }
}

impl Page {
  pub fn first(limit: usize) -> Self {
    Self { offset: 0, limit }
  }

  /// 第 `index` 页（从 0 开始），偏移溢出时返回 `None`
  pub fn nth(index: usize, limit: usize) -> Option<Self> {
    Some(Self {
      offset: index.checked_mul(limit)?,
      limit,
    })
  }

  pub fn next(self) -> Self {
    Self {
      offset: self.offset + self.limit,
      limit: self.limit,
    }
  }
}

pub trait HistoryStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn append(&self, record: NewScanRecord) -> Result<ScanHistoryEntry, Self::Error>;

  /// 最新的记录在前
  fn list(&self, page: Page) -> Result<Vec<ScanHistoryEntry>, Self::Error>;

  fn delete(&self, id: Uuid) -> Result<bool, Self::Error>;

  /// 返回实际删除的条数
  fn delete_many(&self, ids: &[Uuid]) -> Result<usize, Self::Error>;

  fn count(&self) -> Result<usize, Self::Error>;
}

impl<T: HistoryStore + ?Sized> HistoryStore for Arc<T> {
  type Error = T::Error;

  fn append(&self, record: NewScanRecord) -> Result<ScanHistoryEntry, Self::Error> {
    (**self).append(record)
  }

  fn list(&self, page: Page) -> Result<Vec<ScanHistoryEntry>, Self::Error> {
    (**self).list(page)
  }

  fn delete(&self, id: Uuid) -> Result<bool, Self::Error> {
    (**self).delete(id)
  }

  fn delete_many(&self, ids: &[Uuid]) -> Result<usize, Self::Error> {
    (**self).delete_many(ids)
  }

  fn count(&self) -> Result<usize, Self::Error> {
    (**self).count()
  }
}

/// 按插入顺序保存的记录，取倒序分页
pub(crate) fn page_newest_first(entries: &[ScanHistoryEntry], page: Page) -> Vec<ScanHistoryEntry> {
  entries
    .iter()
    .rev()
    .skip(page.offset)
    .take(page.limit)
    .cloned()
    .collect()
}

mod directory_record;
pub use self::directory_record::{DirectoryHistory, DirectoryHistoryError};

mod memory;
pub use self::memory::{MemoryHistory, MemoryHistoryError};

#[derive(Error, Debug)]
pub enum HistoryError {
  #[error("目录历史记录错误: {0}")]
  DirectoryHistoryError(#[from] DirectoryHistoryError),
  #[error("内存历史记录错误: {0}")]
  MemoryHistoryError(#[from] MemoryHistoryError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 按 URL 方案选择的历史存储
pub enum HistoryWrapper {
  DirectoryHistory(DirectoryHistory),
  MemoryHistory(MemoryHistory),
}

impl FromUrl for HistoryWrapper {
  type Error = HistoryError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      DirectoryHistory::SCHEME => Ok(HistoryWrapper::DirectoryHistory(
        DirectoryHistory::from_url(url)?,
      )),
      MemoryHistory::SCHEME => Ok(HistoryWrapper::MemoryHistory(MemoryHistory::from_url(
        url,
      )?)),
      _ => Err(HistoryError::SchemeMismatch),
    }
  }
}

impl HistoryStore for HistoryWrapper {
  type Error = HistoryError;

  fn append(&self, record: NewScanRecord) -> Result<ScanHistoryEntry, Self::Error> {
    match self {
      HistoryWrapper::DirectoryHistory(store) => store.append(record).map_err(HistoryError::from),
      HistoryWrapper::MemoryHistory(store) => store.append(record).map_err(HistoryError::from),
    }
  }

  fn list(&self, page: Page) -> Result<Vec<ScanHistoryEntry>, Self::Error> {
    match self {
      HistoryWrapper::DirectoryHistory(store) => store.list(page).map_err(HistoryError::from),
      HistoryWrapper::MemoryHistory(store) => store.list(page).map_err(HistoryError::from),
    }
  }

  fn delete(&self, id: Uuid) -> Result<bool, Self::Error> {
    match self {
      HistoryWrapper::DirectoryHistory(store) => store.delete(id).map_err(HistoryError::from),
      HistoryWrapper::MemoryHistory(store) => store.delete(id).map_err(HistoryError::from),
    }
  }

  fn delete_many(&self, ids: &[Uuid]) -> Result<usize, Self::Error> {
    match self {
      HistoryWrapper::DirectoryHistory(store) => {
        store.delete_many(ids).map_err(HistoryError::from)
      }
      HistoryWrapper::MemoryHistory(store) => store.delete_many(ids).map_err(HistoryError::from),
    }
  }

  fn count(&self) -> Result<usize, Self::Error> {
    match self {
      HistoryWrapper::DirectoryHistory(store) => store.count().map_err(HistoryError::from),
      HistoryWrapper::MemoryHistory(store) => store.count().map_err(HistoryError::from),
    }
  }
}
