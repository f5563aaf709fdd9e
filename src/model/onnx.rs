// 该文件是 Leafcheck （叶检） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 分类模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{path::PathBuf, sync::Mutex};

use ort::{
  logging::LogLevel,
  session::Session,
  value::{TensorRef, ValueType},
};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{CLASSIFIER_INPUT_H, CLASSIFIER_INPUT_W, ClassifierInput, Normalization, RGB_CHANNELS},
  model::Model,
  url_path, url_query,
};

const ONNX_NUM_INPUTS: usize = 1;
const ONNX_NUM_OUTPUTS: usize = 1;

pub struct OnnxClassifier {
  session: Mutex<Option<Session>>,
  input_name: String,
  output_name: String,
  normalization: Normalization,
  model_path: PathBuf,
}

impl std::fmt::Debug for OnnxClassifier {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("OnnxClassifier")
      .field("input_name", &self.input_name)
      .field("output_name", &self.output_name)
      .field("normalization", &self.normalization)
      .field("model_path", &self.model_path)
      .finish()
  }
}

#[derive(Error, Debug)]
pub enum OnnxClassifierError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型资源已释放")]
  Released,
  #[error("推理会话锁获取失败")]
  LockPoisoned,
}

impl OnnxClassifierError {
  fn ort(e: impl std::fmt::Display) -> Self {
    OnnxClassifierError::OrtError(e.to_string())
  }
}

#[derive(Debug, Clone)]
pub struct OnnxClassifierBuilder {
  model_path: String,
  input_name: Option<String>,
  output_name: Option<String>,
  threads: Option<usize>,
  normalization: Normalization,
}

impl FromUrlWithScheme for OnnxClassifierBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxClassifierBuilder {
  type Error = OnnxClassifierError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OnnxClassifierError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let threads = match url_query(url, "threads") {
      Some(v) => Some(v.parse::<usize>().map_err(|_| {
        OnnxClassifierError::ModelPathError(format!("线程数无效: {}", v))
      })?),
      None => None,
    };

    let normalization = match url_query(url, "normalize") {
      Some(v) => v
        .parse()
        .map_err(|e: crate::frame::UnknownNormalization| {
          OnnxClassifierError::ModelPathError(e.to_string())
        })?,
      None => Normalization::default(),
    };

    Ok(OnnxClassifierBuilder {
      model_path: url_path(url),
      input_name: url_query(url, "input"),
      output_name: url_query(url, "output"),
      threads,
      normalization,
    })
  }
}

impl OnnxClassifierBuilder {
  pub fn new(model_path: impl Into<String>) -> Self {
    Self {
      model_path: model_path.into(),
      input_name: None,
      output_name: None,
      threads: None,
      normalization: Normalization::default(),
    }
  }

  pub fn normalization(mut self, normalization: Normalization) -> Self {
    self.normalization = normalization;
    self
  }

  pub fn threads(mut self, threads: usize) -> Self {
    self.threads = Some(threads);
    self
  }

  pub fn build(self) -> Result<OnnxClassifier, OnnxClassifierError> {
    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 ONNX Runtime 推理会话");
    let mut builder = Session::builder()
      .map_err(OnnxClassifierError::ort)?
      .with_log_level(LogLevel::Error)
      .map_err(OnnxClassifierError::ort)?;
    if let Some(threads) = self.threads {
      builder = builder
        .with_intra_threads(threads)
        .map_err(OnnxClassifierError::ort)?;
    }
    let session = builder
      .commit_from_memory(&model_data)
      .map_err(OnnxClassifierError::ort)?;
    info!("模型加载完成");

    if session.inputs.len() != ONNX_NUM_INPUTS {
      error!(
        "预期模型输入数量为 {}, 实际为 {}",
        ONNX_NUM_INPUTS,
        session.inputs.len()
      );
      return Err(OnnxClassifierError::ModelInvalid(format!(
        "预期模型输入数量为 {}, 实际为 {}",
        ONNX_NUM_INPUTS,
        session.inputs.len()
      )));
    }

    if session.outputs.len() != ONNX_NUM_OUTPUTS {
      error!(
        "预期模型输出数量为 {}, 实际为 {}",
        ONNX_NUM_OUTPUTS,
        session.outputs.len()
      );
      return Err(OnnxClassifierError::ModelInvalid(format!(
        "预期模型输出数量为 {}, 实际为 {}",
        ONNX_NUM_OUTPUTS,
        session.outputs.len()
      )));
    }

    let input = &session.inputs[0];
    if let ValueType::Tensor { shape, .. } = &input.input_type {
      let dims: Vec<i64> = shape.iter().copied().collect();
      debug!("模型输入形状: {:?}", dims);
      if !input_shape_matches(&dims) {
        return Err(OnnxClassifierError::ModelInvalid(format!(
          "模型输入形状 {:?} 与 [1, {}, {}, {}] 不符",
          dims, CLASSIFIER_INPUT_H, CLASSIFIER_INPUT_W, RGB_CHANNELS
        )));
      }
    }

    let input_name = self.input_name.unwrap_or_else(|| input.name.clone());
    let output_name = self
      .output_name
      .unwrap_or_else(|| session.outputs[0].name.clone());
    debug!("模型输入: {}, 模型输出: {}", input_name, output_name);

    Ok(OnnxClassifier {
      session: Mutex::new(Some(session)),
      input_name,
      output_name,
      normalization: self.normalization,
      model_path: PathBuf::from(self.model_path),
    })
  }
}

/// 负数维度表示动态维度
fn input_shape_matches(dims: &[i64]) -> bool {
  let expected = [
    1,
    CLASSIFIER_INPUT_H as i64,
    CLASSIFIER_INPUT_W as i64,
    RGB_CHANNELS as i64,
  ];
  dims.len() == expected.len()
    && dims
      .iter()
      .zip(expected.iter())
      .all(|(&d, &e)| d < 0 || d == e)
}

impl OnnxClassifier {
  pub fn model_path(&self) -> &std::path::Path {
    &self.model_path
  }
}

impl Model for OnnxClassifier {
  type Error = OnnxClassifierError;

  fn forward(&self, input: &ClassifierInput) -> Result<Vec<f32>, Self::Error> {
    let mut guard = self
      .session
      .lock()
      .map_err(|_| OnnxClassifierError::LockPoisoned)?;
    let session = guard.as_mut().ok_or(OnnxClassifierError::Released)?;

    debug!("设置模型输入");
    let tensor =
      TensorRef::from_array_view((input.shape(), input.as_nhwc())).map_err(OnnxClassifierError::ort)?;

    debug!("执行模型推理");
    let outputs = session
      .run(ort::inputs![self.input_name.as_str() => tensor])
      .map_err(OnnxClassifierError::ort)?;

    debug!("获取模型输出");
    let (_, data) = outputs[self.output_name.as_str()]
      .try_extract_tensor::<f32>()
      .map_err(OnnxClassifierError::ort)?;
    debug!("模型输出元素数: {}", data.len());

    Ok(data.to_vec())
  }

  fn normalization(&self) -> Normalization {
    self.normalization
  }

  fn is_ready(&self) -> bool {
    self
      .session
      .lock()
      .map(|session| session.is_some())
      .unwrap_or(false)
  }

  fn release(&mut self) {
    let session = match self.session.get_mut() {
      Ok(session) => session,
      Err(poisoned) => poisoned.into_inner(),
    };
    if session.take().is_some() {
      info!("释放 ONNX Runtime 会话: {}", self.model_path.display());
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builder_from_url_reads_query() {
    let url = Url::parse("onnx:///models/leaf%20v2.onnx?normalize=unit&threads=2&input=x").unwrap();
    let builder = OnnxClassifierBuilder::from_url(&url).unwrap();
    assert_eq!(builder.model_path, "/models/leaf v2.onnx");
    assert_eq!(builder.normalization, Normalization::Unit);
    assert_eq!(builder.threads, Some(2));
    assert_eq!(builder.input_name.as_deref(), Some("x"));
    assert_eq!(builder.output_name, None);
  }

  #[test]
  fn builder_rejects_other_scheme() {
    let url = Url::parse("rknn:///models/leaf.rknn").unwrap();
    assert!(matches!(
      OnnxClassifierBuilder::from_url(&url),
      Err(OnnxClassifierError::ModelPathError(_))
    ));
  }

  #[test]
  fn builder_rejects_bad_normalization() {
    let url = Url::parse("onnx:///m.onnx?normalize=zscore").unwrap();
    assert!(OnnxClassifierBuilder::from_url(&url).is_err());
  }

  #[test]
  fn missing_model_file_fails_to_build() {
    let result = OnnxClassifierBuilder::new("/nonexistent/model.onnx").build();
    assert!(matches!(result, Err(OnnxClassifierError::ModelLoadError(_))));
  }

  #[test]
  fn shape_check_allows_dynamic_batch() {
    assert!(input_shape_matches(&[1, 224, 224, 3]));
    assert!(input_shape_matches(&[-1, 224, 224, 3]));
    assert!(!input_shape_matches(&[1, 3, 224, 224]));
    assert!(!input_shape_matches(&[224, 224, 3]));
  }
}
