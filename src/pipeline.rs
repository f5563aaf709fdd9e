// 该文件是 Leafcheck （叶检） 项目的一部分。
// src/pipeline.rs - 图像分类推理流程
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

//! 解码图像 → 224×224 缩放 → [1, 224, 224, 3] f32 → 模型 → argmax → 标签

use std::sync::Arc;

use image::{RgbImage, imageops::FilterType};
use once_cell::sync::OnceCell;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  frame::{CLASSIFIER_INPUT_H, CLASSIFIER_INPUT_W, ClassifierInput, Normalization},
  model::{LabelCatalog, LabelCatalogError, LazyLabelCatalog, Model, ScopedModel},
};

#[derive(Error, Debug)]
pub enum ClassifyError {
  #[error("无效图像: {0}")]
  InvalidImage(String),
  #[error("模型未就绪: {0}")]
  ModelNotReady(String),
  #[error("标签数量与模型输出不匹配: 模型输出 {outputs} 个, 标签 {labels} 个")]
  LabelCatalogMismatch { outputs: usize, labels: usize },
  #[error("标签资源不可用: {0}")]
  ResourceUnavailable(#[from] LabelCatalogError),
}

/// 分类结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
  /// 类别下标
  pub index: usize,
  /// 类别名称
  pub label: String,
  /// 该类别的分数
  pub score: f32,
}

/// 最大值的下标；并列时取最小下标，NaN 不参与比较
pub fn argmax(scores: &[f32]) -> Option<usize> {
  let mut best: Option<(usize, f32)> = None;
  for (i, &score) in scores.iter().enumerate() {
    if score.is_nan() {
      continue;
    }
    match best {
      Some((_, max)) if score <= max => {}
      _ => best = Some((i, score)),
    }
  }
  best.map(|(i, _)| i)
}

/// 拉伸缩放到 224×224 并打包为模型输入
pub fn preprocess(
  image: &RgbImage,
  normalization: Normalization,
) -> Result<ClassifierInput, ClassifyError> {
  let (width, height) = image.dimensions();
  if width == 0 || height == 0 {
    return Err(ClassifyError::InvalidImage(format!(
      "图像尺寸为 {}x{}",
      width, height
    )));
  }

  let resized = image::imageops::resize(
    image,
    CLASSIFIER_INPUT_W,
    CLASSIFIER_INPUT_H,
    FilterType::Triangle,
  );

  ClassifierInput::from_rgb_image(&resized, normalization).ok_or_else(|| {
    ClassifyError::InvalidImage(format!(
      "缩放后尺寸 {}x{} 不符合模型输入",
      resized.width(),
      resized.height()
    ))
  })
}

/// 按模型声明的归一化方式分类一张图像
pub fn classify<M: Model + ?Sized>(
  image: &RgbImage,
  model: &M,
  labels: &LabelCatalog,
) -> Result<Prediction, ClassifyError> {
  classify_with(image, model, labels, model.normalization())
}

pub fn classify_with<M: Model + ?Sized>(
  image: &RgbImage,
  model: &M,
  labels: &LabelCatalog,
  normalization: Normalization,
) -> Result<Prediction, ClassifyError> {
  if !model.is_ready() {
    return Err(ClassifyError::ModelNotReady("模型未加载或已释放".to_string()));
  }

  let input = preprocess(image, normalization)?;

  let now = std::time::Instant::now();
  let output = model
    .forward(&input)
    .map_err(|e| ClassifyError::ModelNotReady(e.to_string()))?;
  debug!("推理完成，耗时: {:.2?}", now.elapsed());

  if output.is_empty() || labels.is_empty() || output.len() != labels.len() {
    return Err(ClassifyError::LabelCatalogMismatch {
      outputs: output.len(),
      labels: labels.len(),
    });
  }

  let index = argmax(&output)
    .ok_or_else(|| ClassifyError::ModelNotReady("模型输出没有有效分数".to_string()))?;
  let label = labels
    .get(index)
    .ok_or(ClassifyError::LabelCatalogMismatch {
      outputs: output.len(),
      labels: labels.len(),
    })?
    .to_string();

  Ok(Prediction {
    index,
    label,
    score: output[index],
  })
}

/// 能把图像分类为标签的对象
pub trait Classifier {
  fn classify(&self, image: &RgbImage) -> Result<Prediction, ClassifyError>;

  /// 分类尚未解码的图像数据
  fn classify_encoded(&self, bytes: &[u8]) -> Result<Prediction, ClassifyError> {
    let image = image::load_from_memory(bytes)
      .map_err(|e| ClassifyError::InvalidImage(e.to_string()))?
      .to_rgb8();
    self.classify(&image)
  }
}

/// 持有模型与标签表的推理流程，模型随流程释放
pub struct InferencePipeline<M: Model> {
  model: ScopedModel<M>,
  labels: Arc<LabelCatalog>,
  normalization: Normalization,
}

impl<M: Model> InferencePipeline<M> {
  pub fn new(model: M, labels: Arc<LabelCatalog>) -> Self {
    let normalization = model.normalization();
    info!(
      "推理流程就绪: {} 个类别, 归一化方式 {:?}",
      labels.len(),
      normalization
    );
    Self {
      model: ScopedModel::new(model),
      labels,
      normalization,
    }
  }

  pub fn with_normalization(mut self, normalization: Normalization) -> Self {
    self.normalization = normalization;
    self
  }

  pub fn labels(&self) -> &LabelCatalog {
    &self.labels
  }

  pub fn normalization(&self) -> Normalization {
    self.normalization
  }

  pub fn model(&self) -> &M {
    &self.model
  }

  /// 立即释放模型
  pub fn release(self) {
    self.model.release();
  }
}

impl<M: Model> Classifier for InferencePipeline<M> {
  fn classify(&self, image: &RgbImage) -> Result<Prediction, ClassifyError> {
    classify_with(image, &*self.model, &self.labels, self.normalization)
  }
}

/// 首次分类时才加载模型与标签表；加载失败不缓存，下次调用重试
pub struct LazyInferencePipeline<M: Model, L> {
  loader: L,
  labels: LazyLabelCatalog,
  pipeline: OnceCell<InferencePipeline<M>>,
}

impl<M, L, E> LazyInferencePipeline<M, L>
where
  M: Model,
  L: Fn() -> Result<M, E>,
  E: std::fmt::Display,
{
  pub fn new(loader: L, labels: LazyLabelCatalog) -> Self {
    Self {
      loader,
      labels,
      pipeline: OnceCell::new(),
    }
  }

  pub fn is_loaded(&self) -> bool {
    self.pipeline.get().is_some()
  }

  fn pipeline(&self) -> Result<&InferencePipeline<M>, ClassifyError> {
    self.pipeline.get_or_try_init(|| {
      let labels = self.labels.get()?;
      info!("首次分类，加载模型");
      let model = (self.loader)().map_err(|e| ClassifyError::ModelNotReady(e.to_string()))?;
      Ok(InferencePipeline::new(model, labels))
    })
  }
}

impl<M, L, E> Classifier for LazyInferencePipeline<M, L>
where
  M: Model,
  L: Fn() -> Result<M, E>,
  E: std::fmt::Display,
{
  fn classify(&self, image: &RgbImage) -> Result<Prediction, ClassifyError> {
    self.pipeline()?.classify(image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug, Error)]
  #[error("fixed model failure")]
  struct FixedError;

  struct Fixed(Vec<f32>);

  impl Model for Fixed {
    type Error = FixedError;

    fn forward(&self, _input: &ClassifierInput) -> Result<Vec<f32>, Self::Error> {
      Ok(self.0.clone())
    }
  }

  fn labels(names: &[&str]) -> LabelCatalog {
    names.iter().copied().collect()
  }

  #[test]
  fn argmax_picks_leftmost_maximum() {
    assert_eq!(argmax(&[0.12, 0.81, 0.07]), Some(1));
    assert_eq!(argmax(&[0.5, 0.5]), Some(0));
    assert_eq!(argmax(&[0.1, 0.9, 0.9, 0.2]), Some(1));
    assert_eq!(argmax(&[-3.0, -1.0, -2.0]), Some(1));
  }

  #[test]
  fn argmax_skips_nan() {
    assert_eq!(argmax(&[f32::NAN, 0.2, 0.1]), Some(1));
    assert_eq!(argmax(&[f32::NAN, f32::NAN]), None);
    assert_eq!(argmax(&[]), None);
  }

  #[test]
  fn preprocess_rejects_empty_image() {
    let err = preprocess(&RgbImage::new(0, 0), Normalization::Raw).unwrap_err();
    assert!(matches!(err, ClassifyError::InvalidImage(_)));
    let err = preprocess(&RgbImage::new(10, 0), Normalization::Raw).unwrap_err();
    assert!(matches!(err, ClassifyError::InvalidImage(_)));
  }

  #[test]
  fn preprocess_stretches_to_fixed_shape() {
    let image = RgbImage::from_pixel(640, 120, image::Rgb([255, 0, 10]));
    let input = preprocess(&image, Normalization::Unit).unwrap();
    assert_eq!(input.shape(), [1, 224, 224, 3]);
    let data = input.as_nhwc();
    assert!((data[0] - 1.0).abs() < 1e-6);
    assert!(data[1].abs() < 1e-6);
    assert!((data[2] - 10.0 / 255.0).abs() < 1e-6);
  }

  #[test]
  fn classify_returns_label_and_score() {
    let image = RgbImage::new(32, 32);
    let result = classify(
      &image,
      &Fixed(vec![0.12, 0.81, 0.07]),
      &labels(&["cat", "dog", "bird"]),
    )
    .unwrap();
    assert_eq!(result.label, "dog");
    assert_eq!(result.index, 1);
    assert!((result.score - 0.81).abs() < 1e-6);
  }

  #[test]
  fn classify_detects_catalog_mismatch() {
    let image = RgbImage::new(8, 8);
    let err = classify(
      &image,
      &Fixed(vec![0.1, 0.2, 0.3, 0.2, 0.2]),
      &labels(&["a", "b", "c", "d"]),
    )
    .unwrap_err();
    assert!(matches!(
      err,
      ClassifyError::LabelCatalogMismatch {
        outputs: 5,
        labels: 4
      }
    ));
  }

  #[test]
  fn classify_empty_output_with_empty_catalog_mismatches() {
    let image = RgbImage::new(4, 4);
    let empty: LabelCatalog = std::iter::empty::<String>().collect();
    let err = classify(&image, &Fixed(vec![]), &empty).unwrap_err();
    assert!(matches!(
      err,
      ClassifyError::LabelCatalogMismatch {
        outputs: 0,
        labels: 0
      }
    ));
  }

  #[test]
  fn classify_all_nan_output_is_not_a_guess() {
    let image = RgbImage::new(8, 8);
    let err = classify(&image, &Fixed(vec![f32::NAN, f32::NAN]), &labels(&["a", "b"])).unwrap_err();
    assert!(matches!(err, ClassifyError::ModelNotReady(_)));
  }

  #[test]
  fn classify_encoded_rejects_garbage() {
    let pipeline = InferencePipeline::new(Fixed(vec![1.0]), Arc::new(labels(&["only"])));
    let err = pipeline.classify_encoded(b"not an image").unwrap_err();
    assert!(matches!(err, ClassifyError::InvalidImage(_)));
  }
}
