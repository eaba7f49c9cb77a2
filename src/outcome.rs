// 该文件是 MedLens （药镜） 项目的一部分。
// src/outcome.rs - 识别结果与置信度判定
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

use serde::Serialize;

use crate::{
  catalog::{Catalog, MedicineRecord},
  model::ClassificationResult,
};

/// 接受识别结果所需的最低置信度（百分比）
pub const ACCEPTANCE_THRESHOLD: u8 = 70;

/// 识别成功：参考记录加上取整后的置信度
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentifiedMedicine {
  #[serde(flatten)]
  pub record: MedicineRecord,
  pub confidence: u8,
}

impl IdentifiedMedicine {
  pub fn name(&self) -> &str {
    &self.record.name
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
  LowConfidence,
  NotFound,
  General,
}

impl FailureKind {
  pub fn title(&self) -> &'static str {
    match self {
      FailureKind::LowConfidence => "Low Confidence Detection",
      FailureKind::NotFound => "Medicine Not Found",
      FailureKind::General => "Scan Error",
    }
  }

  pub fn suggestions(&self) -> &'static [&'static str] {
    match self {
      FailureKind::LowConfidence => &[
        "Improve lighting - avoid shadows and reflections",
        "Scan individual tablets/capsules, not bottles",
        "Keep the camera steady and in focus",
        "Try a cleaner background (white paper works well)",
        "Ensure the medicine fills most of the frame",
      ],
      FailureKind::NotFound => &[
        "Try scanning a different medicine from our supported list",
        "Ensure you're scanning tablets or capsules only",
        "Check if the medicine is commonly available",
        "Send us feedback to add this medicine to our database",
      ],
      FailureKind::General => &[
        "Check your internet connection",
        "Try scanning again",
        "Restart the app if the problem persists",
      ],
    }
  }

  /// 是否提供“请求收录该药品”的反馈入口
  pub fn accepts_feedback(&self) -> bool {
    matches!(self, FailureKind::NotFound)
  }
}

/// 识别失败的描述，直接用于展示
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanFailure {
  #[serde(rename = "type")]
  pub kind: FailureKind,
  pub title: &'static str,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub suggestion: Option<String>,
  pub suggestions: &'static [&'static str],
  #[serde(skip_serializing_if = "Option::is_none")]
  pub confidence: Option<u8>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub label: Option<String>,
}

impl ScanFailure {
  fn with_kind(kind: FailureKind, message: String, suggestion: &str) -> Self {
    Self {
      kind,
      title: kind.title(),
      message,
      suggestion: Some(suggestion.to_string()),
      suggestions: kind.suggestions(),
      confidence: None,
      label: None,
    }
  }

  pub fn low_confidence(label: &str, confidence: u8) -> Self {
    let message = format!(
      "We detected \"{}\" but with low confidence ({}%). We require at least {}% confidence for accurate identification.",
      label, confidence, ACCEPTANCE_THRESHOLD
    );
    Self {
      confidence: Some(confidence),
      label: Some(label.to_string()),
      ..Self::with_kind(
        FailureKind::LowConfidence,
        message,
        "Retake the photo with better lighting and a steady, focused camera.",
      )
    }
  }

  pub fn not_found(label: &str, confidence: u8, catalog_size: usize) -> Self {
    let message = format!(
      "We couldn't find \"{}\" in our current database of {} medicines. This medicine might not be supported yet.",
      label, catalog_size
    );
    Self {
      confidence: Some(confidence),
      label: Some(label.to_string()),
      ..Self::with_kind(
        FailureKind::NotFound,
        message,
        "Scan a medicine from the supported list, or request this one to be added.",
      )
    }
  }

  pub fn general(message: impl Into<String>) -> Self {
    Self::with_kind(
      FailureKind::General,
      message.into(),
      "Check your connection and try scanning again.",
    )
  }
}

/// 一次识别流程的最终结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScanOutcome {
  Identified(IdentifiedMedicine),
  Failed(ScanFailure),
}

/// 按 top-1 预测做置信度门限与参考表查找
///
/// 低置信度优先于未收录：置信度不足时无论标签是否存在都判为 `LowConfidence`。
pub fn resolve(result: &ClassificationResult, catalog: &Catalog) -> ScanOutcome {
  let Some(top) = result.top() else {
    return ScanOutcome::Failed(ScanFailure::general(
      "The classifier returned no predictions for this image.",
    ));
  };

  let confidence = top.confidence();
  if confidence < ACCEPTANCE_THRESHOLD {
    return ScanOutcome::Failed(ScanFailure::low_confidence(&top.label, confidence));
  }

  match catalog.lookup(&top.label) {
    Some(record) => ScanOutcome::Identified(IdentifiedMedicine {
      record: record.clone(),
      confidence,
    }),
    None => ScanOutcome::Failed(ScanFailure::not_found(
      &top.label,
      confidence,
      catalog.len(),
    )),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Prediction;

  fn classify(items: &[(&str, f32)]) -> ClassificationResult {
    items
      .iter()
      .map(|(l, p)| Prediction::new(*l, *p))
      .collect::<Vec<_>>()
      .into()
  }

  fn catalog() -> Catalog {
    Catalog::builtin().unwrap()
  }

  #[test]
  fn high_confidence_known_label_is_identified() {
    match resolve(&classify(&[("Aspirin", 0.92)]), &catalog()) {
      ScanOutcome::Identified(found) => {
        assert_eq!(found.name(), "Aspirin");
        assert_eq!(found.confidence, 92);
      }
      other => panic!("unexpected outcome: {:?}", other),
    }
  }

  #[test]
  fn label_match_ignores_case() {
    let outcome = resolve(&classify(&[("PARACETAMOL", 0.81)]), &catalog());
    assert!(matches!(outcome, ScanOutcome::Identified(ref m) if m.name() == "Paracetamol"));
  }

  #[test]
  fn low_confidence_wins_over_unknown_label() {
    for label in ["Aspirin", "Xanadrine"] {
      match resolve(&classify(&[(label, 0.55)]), &catalog()) {
        ScanOutcome::Failed(f) => {
          assert_eq!(f.kind, FailureKind::LowConfidence);
          assert_eq!(f.confidence, Some(55));
          assert_eq!(f.label.as_deref(), Some(label));
        }
        other => panic!("unexpected outcome: {:?}", other),
      }
    }
  }

  #[test]
  fn unknown_label_is_not_found() {
    match resolve(&classify(&[("Xanadrine", 0.88)]), &catalog()) {
      ScanOutcome::Failed(f) => {
        assert_eq!(f.kind, FailureKind::NotFound);
        assert_eq!(f.confidence, Some(88));
        assert!(f.kind.accepts_feedback());
      }
      other => panic!("unexpected outcome: {:?}", other),
    }
  }

  #[test]
  fn threshold_applies_to_rounded_percentage() {
    assert!(matches!(
      resolve(&classify(&[("Aspirin", 0.696)]), &catalog()),
      ScanOutcome::Identified(ref m) if m.confidence == 70
    ));
    assert!(matches!(
      resolve(&classify(&[("Aspirin", 0.694)]), &catalog()),
      ScanOutcome::Failed(ref f) if f.kind == FailureKind::LowConfidence
    ));
  }

  #[test]
  fn only_top_prediction_routes() {
    let result = classify(&[("Xanadrine", 0.75), ("Aspirin", 0.74)]);
    assert!(matches!(
      resolve(&result, &catalog()),
      ScanOutcome::Failed(ref f) if f.kind == FailureKind::NotFound
    ));
  }

  #[test]
  fn empty_prediction_list_is_general_error() {
    assert!(matches!(
      resolve(&ClassificationResult::default(), &catalog()),
      ScanOutcome::Failed(ref f) if f.kind == FailureKind::General
    ));
  }

  #[test]
  fn success_payload_is_flat() {
    let outcome = resolve(&classify(&[("Aspirin", 0.92)]), &catalog());
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["name"], "Aspirin");
    assert_eq!(json["medicine_type"], "tablet");
    assert_eq!(json["confidence"], 92);
    assert!(json["side_effects"].is_array());
  }

  #[test]
  fn failure_payload_uses_type_tag() {
    let json = serde_json::to_value(ScanFailure::low_confidence("Aspirin", 55)).unwrap();
    assert_eq!(json["type"], "low_confidence");
    assert_eq!(json["confidence"], 55);
    assert_eq!(json["label"], "Aspirin");
    assert!(json["message"].as_str().unwrap().contains("55%"));

    let json = serde_json::to_value(ScanFailure::general("boom")).unwrap();
    assert_eq!(json["type"], "general");
    assert!(json.get("confidence").is_none());
    assert!(json.get("label").is_none());
  }
}
