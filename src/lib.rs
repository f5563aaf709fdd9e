// 该文件是 Leafcheck （叶检） 项目的一部分。
// src/lib.rs - 库主文件
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

pub mod frame;
pub mod input;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod task;
pub mod worker;

pub use self::pipeline::{ClassifyError, InferencePipeline, Prediction, argmax, classify};

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}

/// 从 URL 中取出已解码的文件路径
pub(crate) fn url_path(url: &url::Url) -> String {
  let path = url.path();
  match urlencoding::decode(path) {
    Ok(decoded) => decoded.into_owned(),
    Err(_) => path.to_string(),
  }
}

/// 查询 URL 参数
pub(crate) fn url_query(url: &url::Url, key: &str) -> Option<String> {
  url
    .query_pairs()
    .find(|(k, _)| k == key)
    .map(|(_, v)| v.into_owned())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn url_path_is_percent_decoded() {
    let url = url::Url::parse("image:///tmp/my%20leaf.jpg").unwrap();
    assert_eq!(url_path(&url), "/tmp/my leaf.jpg");
  }

  #[test]
  fn url_query_finds_first_value() {
    let url = url::Url::parse("onnx:///m.onnx?normalize=unit&threads=2").unwrap();
    assert_eq!(url_query(&url, "normalize").as_deref(), Some("unit"));
    assert_eq!(url_query(&url, "threads").as_deref(), Some("2"));
    assert_eq!(url_query(&url, "input"), None);
  }
}
