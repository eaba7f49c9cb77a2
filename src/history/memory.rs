// 该文件是 MedLens （药镜） 项目的一部分。
// src/history/memory.rs - 内存历史记录
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

use std::sync::Mutex;

use chrono::Utc;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::{
  FromUrl, FromUrlWithScheme,
  history::{HistoryStore, NewScanRecord, Page, ScanHistoryEntry, page_newest_first},
};

#[derive(Error, Debug)]
pub enum MemoryHistoryError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("历史记录锁已损坏")]
  Poisoned,
}

/// 进程内的历史记录，图像引用直接使用 data URI
#[derive(Default)]
pub struct MemoryHistory {
  entries: Mutex<Vec<ScanHistoryEntry>>,
}

impl FromUrlWithScheme for MemoryHistory {
  const SCHEME: &'static str = "memory";
}

impl FromUrl for MemoryHistory {
  type Error = MemoryHistoryError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(MemoryHistoryError::SchemeMismatch);
    }
    Ok(Self::default())
  }
}

impl MemoryHistory {
  pub fn new() -> Self {
    Self::default()
  }

  fn entries(&self) -> Result<std::sync::MutexGuard<'_, Vec<ScanHistoryEntry>>, MemoryHistoryError> {
    self.entries.lock().map_err(|_| MemoryHistoryError::Poisoned)
  }
}

impl HistoryStore for MemoryHistory {
  type Error = MemoryHistoryError;

  fn append(&self, record: NewScanRecord) -> Result<ScanHistoryEntry, Self::Error> {
    let entry = ScanHistoryEntry {
      id: Uuid::new_v4(),
      medicine_name: record.medicine_name,
      confidence: record.confidence,
      image_ref: record.image.data_uri().to_string(),
      timestamp: Utc::now(),
    };
    self.entries()?.push(entry.clone());
    Ok(entry)
  }

  fn list(&self, page: Page) -> Result<Vec<ScanHistoryEntry>, Self::Error> {
    Ok(page_newest_first(&self.entries()?, page))
  }

  fn delete(&self, id: Uuid) -> Result<bool, Self::Error> {
    let mut entries = self.entries()?;
    let before = entries.len();
    entries.retain(|e| e.id != id);
    Ok(entries.len() != before)
  }

  fn delete_many(&self, ids: &[Uuid]) -> Result<usize, Self::Error> {
    let mut entries = self.entries()?;
    let before = entries.len();
    entries.retain(|e| !ids.contains(&e.id));
    Ok(before - entries.len())
  }

  fn count(&self) -> Result<usize, Self::Error> {
    Ok(self.entries()?.len())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::CapturedImage;
  use image::RgbImage;

  fn record(name: &str) -> NewScanRecord {
    NewScanRecord {
      medicine_name: name.to_string(),
      confidence: 90,
      image: CapturedImage::from_rgb(RgbImage::new(4, 4)).unwrap(),
    }
  }

  #[test]
  fn newest_first_with_pagination() {
    let store = MemoryHistory::new();
    for name in ["Aspirin", "Ibuprofen", "Paracetamol"] {
      store.append(record(name)).unwrap();
    }

    let first: Vec<_> = store
      .list(Page::first(2))
      .unwrap()
      .into_iter()
      .map(|e| e.medicine_name)
      .collect();
    assert_eq!(first, vec!["Paracetamol", "Ibuprofen"]);

    let second = store.list(Page::first(2).next()).unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].medicine_name, "Aspirin");
  }

  #[test]
  fn image_ref_is_data_uri() {
    let store = MemoryHistory::new();
    let entry = store.append(record("Aspirin")).unwrap();
    assert!(entry.image_ref.starts_with("data:image/jpeg;base64,"));
  }

  #[test]
  fn deletes_single_and_bulk() {
    let store = MemoryHistory::new();
    let a = store.append(record("Aspirin")).unwrap();
    let b = store.append(record("Ibuprofen")).unwrap();
    let c = store.append(record("Paracetamol")).unwrap();

    assert!(store.delete(a.id).unwrap());
    assert!(!store.delete(a.id).unwrap());
    assert_eq!(store.delete_many(&[b.id, c.id, Uuid::new_v4()]).unwrap(), 2);
    assert_eq!(store.count().unwrap(), 0);
  }
}
