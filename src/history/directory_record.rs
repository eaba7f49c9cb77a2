// 该文件是 MedLens （药镜） 项目的一部分。
// src/history/directory_record.rs - 目录历史记录
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

use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Datelike, Utc};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::{
  FromUrl, FromUrlWithScheme,
  history::{HistoryStore, NewScanRecord, Page, ScanHistoryEntry, page_newest_first},
};

const INDEX_FILE: &str = "index.json";
const INDEX_TMP_FILE: &str = "index.json.tmp";

#[derive(Error, Debug)]
pub enum DirectoryHistoryError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("索引格式错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("历史记录锁已损坏")]
  Poisoned,
}

/// 保存在本地目录中的历史记录
///
/// 目录结构:
/// - `index.json`: 按插入顺序保存的全部记录
/// - `YYYY/MM/DD/HH-MM-SS-<id>.jpg`: 每条记录对应的图像，文件名含记录 id
pub struct DirectoryHistory {
  directory: PathBuf,
  index_lock: Mutex<()>,
}

impl FromUrlWithScheme for DirectoryHistory {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryHistory {
  type Error = DirectoryHistoryError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DirectoryHistoryError::SchemeMismatch);
    }
    Self::open(url.path())
  }
}

impl DirectoryHistory {
  pub fn open(directory: impl AsRef<Path>) -> Result<Self, DirectoryHistoryError> {
    let directory = directory.as_ref().to_path_buf();
    std::fs::create_dir_all(&directory)?;
    debug!("历史记录目录: {}", directory.display());
    Ok(Self {
      directory,
      index_lock: Mutex::new(()),
    })
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  /// 持有锁期间完成索引的读改写，保证多线程追加不会丢记录
  fn lock(&self) -> Result<MutexGuard<'_, ()>, DirectoryHistoryError> {
    self
      .index_lock
      .lock()
      .map_err(|_| DirectoryHistoryError::Poisoned)
  }

  fn read_index(&self) -> Result<Vec<ScanHistoryEntry>, DirectoryHistoryError> {
    match std::fs::read(self.directory.join(INDEX_FILE)) {
      Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
      Err(e) => Err(e.into()),
    }
  }

  fn write_index(&self, entries: &[ScanHistoryEntry]) -> Result<(), DirectoryHistoryError> {
    let tmp = self.directory.join(INDEX_TMP_FILE);
    std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
    std::fs::rename(&tmp, self.directory.join(INDEX_FILE))?;
    Ok(())
  }

  fn image_path(&self, now: &DateTime<Utc>, id: &Uuid) -> Result<PathBuf, DirectoryHistoryError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{}.jpg",
      now.format("%H-%M-%S"),
      id.simple()
    )))
  }

  fn remove_images(&self, removed: &[ScanHistoryEntry]) {
    for entry in removed {
      if let Err(e) = std::fs::remove_file(&entry.image_ref) {
        if e.kind() != ErrorKind::NotFound {
          warn!("删除图像文件 {} 失败: {}", entry.image_ref, e);
        }
      }
    }
  }
}

impl HistoryStore for DirectoryHistory {
  type Error = DirectoryHistoryError;

  fn append(&self, record: NewScanRecord) -> Result<ScanHistoryEntry, Self::Error> {
    let _guard = self.lock()?;
    let mut entries = self.read_index()?;

    let id = Uuid::new_v4();
    let now = Utc::now();
    let path = self.image_path(&now, &id)?;
    // 已存在的图像属于其他记录，不能覆盖
    let mut file = File::create_new(&path)?;
    if let Err(e) = file.write_all(record.image.jpeg()) {
      let _ = std::fs::remove_file(&path);
      return Err(e.into());
    }

    let entry = ScanHistoryEntry {
      id,
      medicine_name: record.medicine_name,
      confidence: record.confidence,
      image_ref: path.to_string_lossy().into_owned(),
      timestamp: now,
    };

    entries.push(entry.clone());
    if let Err(e) = self.write_index(&entries) {
      // 索引未更新，图像文件不再被引用
      let _ = std::fs::remove_file(&path);
      return Err(e);
    }
    debug!("历史记录已保存: {} -> {}", entry.id, entry.image_ref);
    Ok(entry)
  }

  fn list(&self, page: Page) -> Result<Vec<ScanHistoryEntry>, Self::Error> {
    let _guard = self.lock()?;
    Ok(page_newest_first(&self.read_index()?, page))
  }

  fn delete(&self, id: Uuid) -> Result<bool, Self::Error> {
    Ok(self.delete_many(&[id])? > 0)
  }

  fn delete_many(&self, ids: &[Uuid]) -> Result<usize, Self::Error> {
    let _guard = self.lock()?;
    let (removed, kept): (Vec<_>, Vec<_>) = self
      .read_index()?
      .into_iter()
      .partition(|e| ids.contains(&e.id));
    if removed.is_empty() {
      return Ok(0);
    }
    self.write_index(&kept)?;
    self.remove_images(&removed);
    Ok(removed.len())
  }

  fn count(&self) -> Result<usize, Self::Error> {
    let _guard = self.lock()?;
    Ok(self.read_index()?.len())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::CapturedImage;
  use image::RgbImage;

  fn record(name: &str, confidence: u8) -> NewScanRecord {
    NewScanRecord {
      medicine_name: name.to_string(),
      confidence,
      image: CapturedImage::from_rgb(RgbImage::new(8, 8)).unwrap(),
    }
  }

  #[test]
  fn append_writes_image_and_index() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirectoryHistory::open(dir.path()).unwrap();

    let entry = store.append(record("Aspirin", 92)).unwrap();
    assert!(Path::new(&entry.image_ref).exists());
    assert!(entry.image_ref.ends_with(".jpg"));
    assert!(dir.path().join(INDEX_FILE).exists());

    let listed = store.list(Page::default()).unwrap();
    assert_eq!(listed, vec![entry]);
  }

  #[test]
  fn index_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
      let store = DirectoryHistory::open(dir.path()).unwrap();
      store.append(record("Aspirin", 92)).unwrap();
      store.append(record("Ibuprofen", 81)).unwrap();
    }

    let store = DirectoryHistory::open(dir.path()).unwrap();
    let listed = store.list(Page::first(10)).unwrap();
    let names: Vec<_> = listed.iter().map(|e| e.medicine_name.as_str()).collect();
    assert_eq!(names, vec!["Ibuprofen", "Aspirin"]);
  }

  #[test]
  fn reopened_store_never_reuses_image_path() {
    let dir = tempfile::tempdir().unwrap();
    let a = DirectoryHistory::open(dir.path())
      .unwrap()
      .append(record("Aspirin", 92))
      .unwrap();
    let store = DirectoryHistory::open(dir.path()).unwrap();
    let b = store.append(record("Ibuprofen", 81)).unwrap();
    assert_ne!(a.image_ref, b.image_ref);

    assert!(store.delete(a.id).unwrap());
    assert!(Path::new(&b.image_ref).exists());
  }

  #[test]
  fn corrupt_index_leaves_no_orphan_image() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirectoryHistory::open(dir.path()).unwrap();
    std::fs::write(dir.path().join(INDEX_FILE), b"not json").unwrap();

    assert!(matches!(
      store.append(record("Aspirin", 92)),
      Err(DirectoryHistoryError::JsonError(_))
    ));
    let leftover: Vec<_> = std::fs::read_dir(dir.path())
      .unwrap()
      .map(|e| e.unwrap().file_name())
      .collect();
    assert_eq!(leftover, vec![std::ffi::OsString::from(INDEX_FILE)]);
  }

  #[test]
  fn delete_removes_entry_and_image() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirectoryHistory::open(dir.path()).unwrap();
    let a = store.append(record("Aspirin", 92)).unwrap();
    let b = store.append(record("Ibuprofen", 81)).unwrap();

    assert!(store.delete(a.id).unwrap());
    assert!(!Path::new(&a.image_ref).exists());
    assert!(Path::new(&b.image_ref).exists());
    assert!(!store.delete(a.id).unwrap());
    assert_eq!(store.count().unwrap(), 1);
  }

  #[test]
  fn bulk_delete_counts_only_existing() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirectoryHistory::open(dir.path()).unwrap();
    let ids: Vec<_> = ["Aspirin", "Ibuprofen", "Paracetamol"]
      .into_iter()
      .map(|n| store.append(record(n, 90)).unwrap().id)
      .collect();

    let removed = store
      .delete_many(&[ids[0], ids[2], Uuid::new_v4()])
      .unwrap();
    assert_eq!(removed, 2);
    let left = store.list(Page::default()).unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, ids[1]);
  }
}
