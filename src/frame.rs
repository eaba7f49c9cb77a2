// 该文件是 MedLens （药镜） 项目的一部分。
// src/frame.rs - 采集图像定义
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

use base64::{Engine, engine::general_purpose::STANDARD};
use image::{RgbImage, codecs::jpeg::JpegEncoder};
use thiserror::Error;

/// 分类器输入与历史记录使用的 JPEG 质量
pub const JPEG_QUALITY: u8 = 80;

const JPEG_DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("图像编码错误: {0}")]
  EncodeError(image::ImageError),
  #[error("图像解码错误: {0}")]
  DecodeError(image::ImageError),
  #[error("图像尺寸为空")]
  EmptyImage,
  #[error("Data URI 格式无效")]
  InvalidDataUri,
  #[error("Base64 解码错误: {0}")]
  Base64Error(#[from] base64::DecodeError),
}

/// 一次识别流程中采集到的图像
///
/// 同时保存 RGB 像素与 JPEG 编码，后者以 data URI 形式提供给分类器和历史记录。
/// 创建后不可修改，流程重置时丢弃。
#[derive(Debug, Clone)]
pub struct CapturedImage {
  pixels: RgbImage,
  jpeg: Box<[u8]>,
  data_uri: String,
}

impl CapturedImage {
  /// 由摄像头帧创建
  pub fn from_rgb(pixels: RgbImage) -> Result<Self, FrameError> {
    if pixels.width() == 0 || pixels.height() == 0 {
      return Err(FrameError::EmptyImage);
    }

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
      .encode_image(&pixels)
      .map_err(FrameError::EncodeError)?;

    let data_uri = format!("{}{}", JPEG_DATA_URI_PREFIX, STANDARD.encode(&jpeg));

    Ok(Self {
      pixels,
      jpeg: jpeg.into_boxed_slice(),
      data_uri,
    })
  }

  /// 由上传的文件内容创建，支持 `image` 库能识别的任意格式
  pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
    let pixels = image::load_from_memory(bytes)
      .map_err(FrameError::DecodeError)?
      .to_rgb8();
    Self::from_rgb(pixels)
  }

  /// 由 `data:<mime>;base64,<payload>` 形式的字符串创建
  pub fn from_data_uri(uri: &str) -> Result<Self, FrameError> {
    let rest = uri.strip_prefix("data:").ok_or(FrameError::InvalidDataUri)?;
    let (header, payload) = rest.split_once(',').ok_or(FrameError::InvalidDataUri)?;
    if !header.ends_with(";base64") {
      return Err(FrameError::InvalidDataUri);
    }
    let bytes = STANDARD.decode(payload)?;
    Self::decode(&bytes)
  }

  pub fn pixels(&self) -> &RgbImage {
    &self.pixels
  }

  pub fn jpeg(&self) -> &[u8] {
    &self.jpeg
  }

  pub fn data_uri(&self) -> &str {
    &self.data_uri
  }

  pub fn width(&self) -> u32 {
    self.pixels.width()
  }

  pub fn height(&self) -> u32 {
    self.pixels.height()
  }
}
