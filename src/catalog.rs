// 该文件是 MedLens （药镜） 项目的一部分。
// src/catalog.rs - 药品参考数据
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

use std::{collections::HashMap, fmt, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

const BUILTIN_CATALOG: &str = include_str!("../data/medicines.json");

#[derive(Error, Debug)]
pub enum CatalogError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("数据格式错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("重复的药品标签: {0}")]
  DuplicateLabel(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MedicineType {
  Tablet,
  Capsule,
}

impl fmt::Display for MedicineType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      MedicineType::Tablet => f.write_str("tablet"),
      MedicineType::Capsule => f.write_str("capsule"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicineRecord {
  pub name: String,
  pub generic_name: String,
  pub description: String,
  pub medicine_type: MedicineType,
  #[serde(default)]
  pub variants: Vec<String>,
  #[serde(default)]
  pub side_effects: Vec<String>,
  pub storage: String,
  pub category: String,
}

#[derive(Deserialize)]
struct CatalogFile {
  version: u32,
  medicines: Vec<MedicineRecord>,
}

/// 药品参考表
///
/// 启动时整体加载一次，之后只读，可通过 `Arc` 在进程内共享。
/// 查找规则为忽略大小写的完全匹配，不做裁剪或模糊匹配。
#[derive(Debug)]
pub struct Catalog {
  version: u32,
  records: Box<[MedicineRecord]>,
  index: HashMap<String, usize>,
}

impl FromUrlWithScheme for Catalog {
  const SCHEME: &'static str = "catalog";
}

impl FromUrl for Catalog {
  type Error = CatalogError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(CatalogError::SchemeMismatch);
    }
    Self::load(url.path())
  }
}

impl Catalog {
  /// 随程序发布的内置数据集
  pub fn builtin() -> Result<Self, CatalogError> {
    Self::from_json(BUILTIN_CATALOG)
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
    let text = std::fs::read_to_string(path.as_ref())?;
    let catalog = Self::from_json(&text)?;
    info!(
      "已加载药品数据 {} (版本 {}, 共 {} 条)",
      path.as_ref().display(),
      catalog.version,
      catalog.len()
    );
    Ok(catalog)
  }

  pub fn from_json(text: &str) -> Result<Self, CatalogError> {
    let file: CatalogFile = serde_json::from_str(text)?;
    Self::new(file.version, file.medicines)
  }

  pub fn new(version: u32, records: Vec<MedicineRecord>) -> Result<Self, CatalogError> {
    let mut index = HashMap::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
      if index.insert(record.name.to_lowercase(), i).is_some() {
        return Err(CatalogError::DuplicateLabel(record.name.clone()));
      }
    }
    Ok(Self {
      version,
      records: records.into_boxed_slice(),
      index,
    })
  }

  pub fn lookup(&self, label: &str) -> Option<&MedicineRecord> {
    self
      .index
      .get(&label.to_lowercase())
      .map(|&i| &self.records[i])
  }

  pub fn by_type(&self, kind: MedicineType) -> impl Iterator<Item = &MedicineRecord> {
    self.records.iter().filter(move |r| r.medicine_type == kind)
  }

  pub fn records(&self) -> &[MedicineRecord] {
    &self.records
  }

  pub fn version(&self) -> u32 {
    self.version
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builtin_dataset_loads() {
    let catalog = Catalog::builtin().unwrap();
    assert!(catalog.len() >= 10);
    assert_eq!(catalog.version(), 1);
    assert!(catalog.by_type(MedicineType::Capsule).count() > 0);
    assert!(catalog.by_type(MedicineType::Tablet).count() > 0);
  }

  #[test]
  fn lookup_ignores_case_only() {
    let catalog = Catalog::builtin().unwrap();
    assert_eq!(catalog.lookup("aspirin").unwrap().name, "Aspirin");
    assert_eq!(catalog.lookup("ASPIRIN").unwrap().name, "Aspirin");
    assert!(catalog.lookup(" Aspirin").is_none());
    assert!(catalog.lookup("Aspirin 500mg").is_none());
    assert!(catalog.lookup("Aspirn").is_none());
  }

  #[test]
  fn duplicate_labels_are_rejected() {
    let text = r#"{"version": 2, "medicines": [
      {"name":"Aspirin","generic_name":"a","description":"d","medicine_type":"tablet",
       "storage":"s","category":"c"},
      {"name":"aspirin","generic_name":"a","description":"d","medicine_type":"capsule",
       "storage":"s","category":"c"}
    ]}"#;
    assert!(matches!(
      Catalog::from_json(text),
      Err(CatalogError::DuplicateLabel(name)) if name == "aspirin"
    ));
  }

  #[test]
  fn loads_from_catalog_url() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("medicines.json");
    std::fs::write(&path, BUILTIN_CATALOG).unwrap();
    let url = Url::parse(&format!("catalog://{}", path.display())).unwrap();
    let catalog = Catalog::from_url(&url).unwrap();
    assert_eq!(catalog.len(), Catalog::builtin().unwrap().len());
  }

  #[test]
  fn unknown_medicine_type_is_an_error() {
    let text = r#"{"version": 1, "medicines": [
      {"name":"Syrup","generic_name":"s","description":"d","medicine_type":"liquid",
       "storage":"s","category":"c"}
    ]}"#;
    assert!(matches!(
      Catalog::from_json(text),
      Err(CatalogError::JsonError(_))
    ));
  }
}
