// 该文件是 Leafcheck （叶检） 项目的一部分。
// src/model/labels.rs - 类别标签表
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  sync::{Arc, Mutex, MutexGuard},
};

use once_cell::sync::{Lazy, OnceCell};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum LabelCatalogError {
  #[error("无法读取标签文件 {path}: {source}")]
  IoError {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("标签文件为空")]
  Empty,
}

/// 按模型输出下标排列的类别名称，行序即下标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelCatalog {
  labels: Box<[String]>,
}

static SHARED_CATALOGS: Lazy<Mutex<HashMap<PathBuf, Arc<LabelCatalog>>>> =
  Lazy::new(|| Mutex::new(HashMap::new()));

fn shared_catalogs() -> MutexGuard<'static, HashMap<PathBuf, Arc<LabelCatalog>>> {
  match SHARED_CATALOGS.lock() {
    Ok(guard) => guard,
    Err(poisoned) => {
      warn!("标签缓存锁已中毒，继续使用");
      poisoned.into_inner()
    }
  }
}

impl LabelCatalog {
  /// 每行一个类别，名称按原样保留，忽略末尾空行
  pub fn parse(text: &str) -> Result<Self, LabelCatalogError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut labels: Vec<String> = text.lines().map(str::to_string).collect();
    while labels.last().is_some_and(|l| l.trim().is_empty()) {
      labels.pop();
    }

    if labels.is_empty() {
      return Err(LabelCatalogError::Empty);
    }

    Ok(Self {
      labels: labels.into_boxed_slice(),
    })
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self, LabelCatalogError> {
    let path = path.as_ref();
    info!("加载标签文件: {}", path.display());
    let text = std::fs::read_to_string(path).map_err(|source| LabelCatalogError::IoError {
      path: path.to_path_buf(),
      source,
    })?;
    let catalog = Self::parse(&text)?;
    debug!("标签数量: {}", catalog.len());
    Ok(catalog)
  }

  /// 进程内共享的标签表，同一路径共用一份；加载失败不缓存
  pub fn shared(path: impl AsRef<Path>) -> Result<Arc<Self>, LabelCatalogError> {
    let path = path.as_ref();
    if let Some(catalog) = shared_catalogs().get(path) {
      return Ok(catalog.clone());
    }

    // 加载期间不持锁，并发加载时保留先插入的那份
    let catalog = Arc::new(Self::load(path)?);
    Ok(
      shared_catalogs()
        .entry(path.to_path_buf())
        .or_insert(catalog)
        .clone(),
    )
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&str> {
    self.labels.get(index).map(String::as_str)
  }

  pub fn contains(&self, label: &str) -> bool {
    self.labels.iter().any(|l| l == label)
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.labels.iter().map(String::as_str)
  }
}

impl<S: Into<String>> FromIterator<S> for LabelCatalog {
  fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
    Self {
      labels: iter.into_iter().map(Into::into).collect(),
    }
  }
}

/// 首次使用时加载的标签表
#[derive(Debug)]
pub struct LazyLabelCatalog {
  path: PathBuf,
  catalog: OnceCell<Arc<LabelCatalog>>,
}

impl LazyLabelCatalog {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      catalog: OnceCell::new(),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn get(&self) -> Result<Arc<LabelCatalog>, LabelCatalogError> {
    self
      .catalog
      .get_or_try_init(|| LabelCatalog::shared(&self.path))
      .cloned()
  }
}
