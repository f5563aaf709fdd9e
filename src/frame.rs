// 该文件是 Leafcheck （叶检） 项目的一部分。
// src/frame.rs - 图像帧与 NHWC 输入张量定义
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

use std::str::FromStr;

use image::RgbImage;
use thiserror::Error;

pub const RGB_CHANNELS: usize = 3;

/// 分类模型的固定输入宽度
pub const CLASSIFIER_INPUT_W: u32 = 224;
/// 分类模型的固定输入高度
pub const CLASSIFIER_INPUT_H: u32 = 224;

/// 分类模型输入：[1, 224, 224, 3] f32
pub type ClassifierInput = RgbNhwcTensor<CLASSIFIER_INPUT_W, CLASSIFIER_INPUT_H>;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// 一帧输入图像及其来源
#[derive(Debug, Clone)]
pub struct Frame {
  /// 来源（文件路径等）
  pub source: String,
  /// 已解码的 RGB 图像
  pub image: RgbImage,
}

impl Frame {
  pub fn new(source: impl Into<String>, image: RgbImage) -> Self {
    Self {
      source: source.into(),
      image,
    }
  }
}

impl AsRef<RgbImage> for Frame {
  fn as_ref(&self) -> &RgbImage {
    &self.image
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("未知的归一化方式: {0}")]
pub struct UnknownNormalization(pub String);

/// 像素值到模型输入的换算方式，必须与模型训练时的预处理一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Normalization {
  /// 原始像素值 [0, 255]
  #[default]
  Raw,
  /// [0, 1]
  Unit,
  /// [-1, 1]
  Symmetric,
  /// [0, 1] 后按 ImageNet 均值方差标准化
  ImageNet,
}

impl Normalization {
  pub fn apply(self, channel: usize, value: u8) -> f32 {
    let value = value as f32;
    match self {
      Normalization::Raw => value,
      Normalization::Unit => value / 255.0,
      Normalization::Symmetric => (value - 127.5) / 127.5,
      Normalization::ImageNet => (value / 255.0 - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel],
    }
  }
}

impl FromStr for Normalization {
  type Err = UnknownNormalization;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "raw" => Ok(Normalization::Raw),
      "unit" => Ok(Normalization::Unit),
      "symmetric" => Ok(Normalization::Symmetric),
      "imagenet" => Ok(Normalization::ImageNet),
      _ => Err(UnknownNormalization(s.to_string())),
    }
  }
}

/// 形状固定为 [1, H, W, 3] 的 f32 张量，通道顺序 R, G, B
#[derive(Debug, Clone, PartialEq)]
pub struct RgbNhwcTensor<const W: u32, const H: u32> {
  data: Box<[f32]>,
}

impl<const W: u32, const H: u32> Default for RgbNhwcTensor<W, H> {
  fn default() -> Self {
    let size = RGB_CHANNELS * (W as usize) * (H as usize);
    let data = vec![0f32; size].into_boxed_slice();
    Self { data }
  }
}

impl<const W: u32, const H: u32> RgbNhwcTensor<W, H> {
  /// 由已缩放到 W×H 的图像打包，尺寸不符时返回 None
  pub fn from_rgb_image(image: &RgbImage, normalization: Normalization) -> Option<Self> {
    if image.dimensions() != (W, H) {
      return None;
    }

    let mut tensor = Self::default();
    let slice = tensor.as_mut();
    for (i, pixel) in image.pixels().enumerate() {
      let index = i * RGB_CHANNELS;
      for c in 0..RGB_CHANNELS {
        slice[index + c] = normalization.apply(c, pixel[c]);
      }
    }
    Some(tensor)
  }

  pub fn height(&self) -> usize {
    H as usize
  }

  pub fn width(&self) -> usize {
    W as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  /// [N, H, W, C]
  pub fn shape(&self) -> [usize; 4] {
    [1, H as usize, W as usize, RGB_CHANNELS]
  }

  pub fn as_nhwc(&self) -> &[f32] {
    &self.data
  }
}

impl<const W: u32, const H: u32> AsMut<[f32]> for RgbNhwcTensor<W, H> {
  fn as_mut(&mut self) -> &mut [f32] {
    &mut self.data
  }
}
