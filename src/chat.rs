// 该文件是 MedLens （药镜） 项目的一部分。
// src/chat.rs - 药品问答助手
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

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::catalog::MedicineRecord;

mod gemini;
pub use self::gemini::{GeminiAssistant, GeminiConfig};

#[derive(Error, Debug)]
pub enum ChatError {
  #[error("问题不能为空")]
  EmptyQuestion,
  #[error("未配置 API 密钥")]
  MissingApiKey,
  #[error("HTTP 错误: {0}")]
  HttpError(String),
  #[error("请求超时 ({0} 秒)")]
  Timeout(u64),
  #[error("模型返回了空回答")]
  EmptyResponse,
}

/// 大语言模型服务，只需补全一段提示词
pub trait Assistant {
  fn complete(&self, prompt: &str) -> Result<String, ChatError>;
}

impl<A: Assistant + ?Sized> Assistant for Box<A> {
  fn complete(&self, prompt: &str) -> Result<String, ChatError> {
    (**self).complete(prompt)
  }
}

pub const OFF_TOPIC_REPLY: &str = "I'm a medical AI assistant designed to help with questions about medicines and healthcare. Please ask me something related to the scanned medicine, its usage, side effects, dosage, interactions, or general medical topics.";

pub const ERROR_REPLY: &str = "Sorry, I encountered an error while processing your question. Please try again or check if the API key is properly configured.";

pub fn medicine_context(medicine: &MedicineRecord) -> String {
  format!(
    "Medicine Information:\n\
     - Name: {}\n\
     - Generic Name: {}\n\
     - Type: {}\n\
     - Category: {}\n\
     - Description: {}\n\
     - Variants: {}\n\
     - Side Effects: {}\n\
     - Storage: {}",
    medicine.name,
    medicine.generic_name,
    medicine.medicine_type,
    medicine.category,
    medicine.description,
    medicine.variants.join(", "),
    medicine.side_effects.join(", "),
    medicine.storage
  )
}

pub fn relevance_prompt(question: &str, medicine: &MedicineRecord) -> String {
  format!(
    "You are a question classifier. Your job is to determine if a user's question is related to medicine, healthcare, pharmaceuticals, or medical topics.\n\n\
     The user has scanned this medicine: {} ({})\n\n\
     User Question: \"{}\"\n\n\
     Questions about the scanned medicine, medicines in general, healthcare, medical conditions or symptoms, \
     drug interactions, side effects, dosage, health and wellness, and basic greetings or conversational starters are related. \
     Technology, sports, entertainment, politics, non-medical math or science, weather, travel and unrelated personal topics are not.\n\n\
     Respond with ONLY \"YES\" if the question is related or a basic greeting, or \"NO\" if it's not.",
    medicine.name, medicine.generic_name, question
  )
}

pub fn answer_prompt(question: &str, medicine: &MedicineRecord) -> String {
  format!(
    "You are an expert medical AI assistant with comprehensive knowledge about medications, pharmacology, and healthcare.\n\n\
     The user has scanned this medicine:\n{}\n\n\
     User Question: {}\n\n\
     Instructions:\n\
     1. If the user is greeting you, respond naturally and offer to help with questions about the scanned medicine\n\
     2. Answer ONLY what the user specifically asked about\n\
     3. Be concise: around 3-5 sentences or a short bulleted list\n\
     4. Only include a healthcare professional disclaimer when discussing dosage, interactions, contraindications, or serious medical advice",
    medicine_context(medicine),
    question
  )
}

pub fn general_prompt(question: &str) -> String {
  format!(
    "You are an expert medical AI assistant with comprehensive knowledge about medications, pharmacology, and healthcare.\n\n\
     Question: {}\n\n\
     Provide accurate, evidence-based information, mention important safety considerations, use bullet points for lists, \
     and emphasise consulting healthcare professionals for personalised advice.",
    question
  )
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
  pub text: String,
  pub is_user: bool,
  pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
  fn user(text: &str) -> Self {
    Self {
      text: text.to_string(),
      is_user: true,
      timestamp: Utc::now(),
    }
  }

  fn assistant(text: impl Into<String>) -> Self {
    Self {
      text: text.into(),
      is_user: false,
      timestamp: Utc::now(),
    }
  }
}

/// 围绕一种已识别药品的问答会话
pub struct MedicineChat<A: Assistant> {
  assistant: A,
  medicine: MedicineRecord,
  transcript: Vec<ChatMessage>,
}

impl<A: Assistant> MedicineChat<A> {
  pub fn new(assistant: A, medicine: MedicineRecord) -> Self {
    let greeting = format!(
      "Hi! I'm here to help you with questions about {}. Feel free to ask me anything about this medication, its usage, side effects, or general information.",
      medicine.name
    );
    Self {
      assistant,
      medicine,
      transcript: vec![ChatMessage::assistant(greeting)],
    }
  }

  pub fn medicine(&self) -> &MedicineRecord {
    &self.medicine
  }

  pub fn transcript(&self) -> &[ChatMessage] {
    &self.transcript
  }

  /// 判定失败时按相关处理
  fn is_relevant(&self, question: &str) -> bool {
    match self
      .assistant
      .complete(&relevance_prompt(question, &self.medicine))
    {
      Ok(answer) => answer.trim().eq_ignore_ascii_case("YES"),
      Err(e) => {
        warn!("相关性判定失败，按相关处理: {}", e);
        true
      }
    }
  }

  pub fn ask(&mut self, question: &str) -> Result<String, ChatError> {
    let question = question.trim();
    if question.is_empty() {
      return Err(ChatError::EmptyQuestion);
    }
    self.transcript.push(ChatMessage::user(question));

    if !self.is_relevant(question) {
      debug!("问题与药品无关: {}", question);
      self.transcript.push(ChatMessage::assistant(OFF_TOPIC_REPLY));
      return Ok(OFF_TOPIC_REPLY.to_string());
    }

    match self
      .assistant
      .complete(&answer_prompt(question, &self.medicine))
    {
      Ok(answer) => {
        self.transcript.push(ChatMessage::assistant(answer.clone()));
        Ok(answer)
      }
      Err(e) => {
        self.transcript.push(ChatMessage::assistant(ERROR_REPLY));
        Err(e)
      }
    }
  }
}

/// 不依赖已识别药品的一般问答
pub fn ask_general<A: Assistant>(assistant: &A, question: &str) -> Result<String, ChatError> {
  let question = question.trim();
  if question.is_empty() {
    return Err(ChatError::EmptyQuestion);
  }
  assistant.complete(&general_prompt(question))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::catalog::Catalog;
  use std::cell::RefCell;

  /// 按顺序返回预设回答并记录收到的提示词
  struct Scripted {
    replies: RefCell<Vec<Result<String, ChatError>>>,
    prompts: RefCell<Vec<String>>,
  }

  impl Scripted {
    fn new(replies: Vec<Result<String, ChatError>>) -> Self {
      Self {
        replies: RefCell::new(replies.into_iter().rev().collect()),
        prompts: RefCell::new(Vec::new()),
      }
    }
  }

  impl Assistant for Scripted {
    fn complete(&self, prompt: &str) -> Result<String, ChatError> {
      self.prompts.borrow_mut().push(prompt.to_string());
      self
        .replies
        .borrow_mut()
        .pop()
        .unwrap_or(Err(ChatError::EmptyResponse))
    }
  }

  fn aspirin() -> MedicineRecord {
    Catalog::builtin().unwrap().lookup("Aspirin").unwrap().clone()
  }

  #[test]
  fn answers_relevant_question_with_context() {
    let assistant = Scripted::new(vec![Ok("YES".into()), Ok("Take with food.".into())]);
    let mut chat = MedicineChat::new(assistant, aspirin());

    assert_eq!(chat.ask("How should I take it?").unwrap(), "Take with food.");
    let prompts = chat.assistant.prompts.borrow();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("Generic Name: Acetylsalicylic acid"));
    assert!(prompts[1].contains("How should I take it?"));
    assert_eq!(chat.transcript().len(), 3);
  }

  #[test]
  fn off_topic_question_skips_answer_call() {
    let assistant = Scripted::new(vec![Ok(" no \n".into())]);
    let mut chat = MedicineChat::new(assistant, aspirin());

    assert_eq!(chat.ask("Who won the match?").unwrap(), OFF_TOPIC_REPLY);
    assert_eq!(chat.assistant.prompts.borrow().len(), 1);
  }

  #[test]
  fn relevance_failure_counts_as_relevant() {
    let assistant = Scripted::new(vec![
      Err(ChatError::Timeout(30)),
      Ok("It relieves pain.".into()),
    ]);
    let mut chat = MedicineChat::new(assistant, aspirin());
    assert_eq!(chat.ask("What is it for?").unwrap(), "It relieves pain.");
  }

  #[test]
  fn answer_failure_is_reported_and_logged_in_transcript() {
    let assistant = Scripted::new(vec![Ok("YES".into()), Err(ChatError::Timeout(30))]);
    let mut chat = MedicineChat::new(assistant, aspirin());

    assert!(matches!(chat.ask("Dosage?"), Err(ChatError::Timeout(30))));
    let last = chat.transcript().last().unwrap();
    assert!(!last.is_user);
    assert_eq!(last.text, ERROR_REPLY);
  }

  #[test]
  fn blank_question_is_rejected() {
    let mut chat = MedicineChat::new(Scripted::new(vec![]), aspirin());
    assert!(matches!(chat.ask("   "), Err(ChatError::EmptyQuestion)));
    assert_eq!(chat.transcript().len(), 1);
    assert!(chat.transcript()[0].text.contains("Aspirin"));
  }

  #[test]
  fn general_question_uses_general_prompt() {
    let assistant = Scripted::new(vec![Ok("Antibiotics treat bacteria.".into())]);
    let answer = ask_general(&assistant, "What are antibiotics?").unwrap();
    assert_eq!(answer, "Antibiotics treat bacteria.");
    assert!(assistant.prompts.borrow()[0].starts_with("You are an expert medical AI assistant"));
  }
}
