// 该文件是 Leafcheck （叶检） 项目的一部分。
// src/output.rs - 输出定义
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::FromUrl;
use crate::FromUrlWithScheme;
use crate::frame::Frame;
use crate::pipeline::Prediction;

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

mod log_output;
pub use self::log_output::{LogOutput, LogOutputError};

#[cfg(feature = "json_output")]
mod json_output;
#[cfg(feature = "json_output")]
pub use self::json_output::{JsonFileOutput, JsonFileOutputError};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

/// 写入文件的单条分类记录
#[derive(Debug, Serialize)]
pub struct PredictionRecord<'a> {
  pub source: &'a str,
  pub index: usize,
  pub label: &'a str,
  pub score: f32,
  pub timestamp: String,
}

impl<'a> PredictionRecord<'a> {
  pub fn new(frame: &'a Frame, prediction: &'a Prediction) -> Self {
    Self {
      source: &frame.source,
      index: prediction.index,
      label: &prediction.label,
      score: prediction.score,
      timestamp: chrono::Utc::now().to_rfc3339(),
    }
  }
}

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("日志输出错误: {0}")]
  LogOutputError(#[from] LogOutputError),
  #[cfg(feature = "json_output")]
  #[error("JSON 文件输出错误: {0}")]
  JsonFileOutputError(#[from] JsonFileOutputError),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum OutputWrapper {
  LogOutput(LogOutput),
  #[cfg(feature = "json_output")]
  JsonFileOutput(JsonFileOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecordOutput(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LogOutput::SCHEME => {
        let output = LogOutput::from_url(url)?;
        Ok(OutputWrapper::LogOutput(output))
      }
      #[cfg(feature = "json_output")]
      JsonFileOutput::SCHEME => {
        let output = JsonFileOutput::from_url(url)?;
        Ok(OutputWrapper::JsonFileOutput(output))
      }
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecordOutput(output))
      }
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl Render<Frame, Prediction> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &Frame, result: &Prediction) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::LogOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "json_output")]
      OutputWrapper::JsonFileOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dispatches_on_scheme() {
    let log = Url::parse("log://").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&log),
      Ok(OutputWrapper::LogOutput(_))
    ));

    let unknown = Url::parse("rtsp://localhost/stream").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&unknown),
      Err(OutputError::SchemeMismatch)
    ));
  }

  #[test]
  fn record_serializes_prediction() {
    let frame = Frame::new("leaf.jpg", image::RgbImage::new(1, 1));
    let prediction = Prediction {
      index: 2,
      label: "rust".to_string(),
      score: 0.5,
    };
    let value = serde_json::to_value(PredictionRecord::new(&frame, &prediction)).unwrap();
    assert_eq!(value["source"], "leaf.jpg");
    assert_eq!(value["index"], 2);
    assert_eq!(value["label"], "rust");
    assert_eq!(value["score"], 0.5);
    assert!(value["timestamp"].is_string());
  }
}
