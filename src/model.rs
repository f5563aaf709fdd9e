// 该文件是 Leafcheck （叶检） 项目的一部分。
// src/model.rs - 模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::ops::Deref;

use tracing::debug;

use crate::frame::{ClassifierInput, Normalization};

/// 固定输入形状的分类模型
///
/// 输入为 [1, 224, 224, 3] 的 f32 张量，输出为每个类别一个分数。
pub trait Model {
  type Error: std::error::Error + Send + Sync + 'static;

  fn forward(&self, input: &ClassifierInput) -> Result<Vec<f32>, Self::Error>;

  /// 模型训练时使用的像素归一化方式
  fn normalization(&self) -> Normalization {
    Normalization::Raw
  }

  fn is_ready(&self) -> bool {
    true
  }

  /// 释放底层推理资源，可重复调用
  fn release(&mut self) {}
}

/// 持有模型并在离开作用域时释放它
#[derive(Debug)]
pub struct ScopedModel<M: Model> {
  inner: M,
}

impl<M: Model> ScopedModel<M> {
  pub fn new(model: M) -> Self {
    Self { inner: model }
  }

  /// 提前释放
  pub fn release(self) {
    drop(self);
  }
}

impl<M: Model> Deref for ScopedModel<M> {
  type Target = M;

  fn deref(&self) -> &Self::Target {
    &self.inner
  }
}

impl<M: Model> Drop for ScopedModel<M> {
  fn drop(&mut self) {
    debug!("释放模型资源");
    self.inner.release();
  }
}

mod labels;
pub use self::labels::{LabelCatalog, LabelCatalogError, LazyLabelCatalog};

#[cfg(feature = "model_onnx")]
mod onnx;
#[cfg(feature = "model_onnx")]
pub use self::onnx::{OnnxClassifier, OnnxClassifierBuilder, OnnxClassifierError};

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  };

  #[derive(Debug, thiserror::Error)]
  #[error("never")]
  struct Never;

  struct Counting {
    released: Arc<AtomicUsize>,
  }

  impl Model for Counting {
    type Error = Never;

    fn forward(&self, _input: &ClassifierInput) -> Result<Vec<f32>, Self::Error> {
      Ok(vec![1.0])
    }

    fn release(&mut self) {
      self.released.fetch_add(1, Ordering::SeqCst);
    }
  }

  #[test]
  fn scoped_model_releases_on_drop() {
    let released = Arc::new(AtomicUsize::new(0));
    {
      let model = ScopedModel::new(Counting {
        released: released.clone(),
      });
      assert!(model.is_ready());
    }
    assert_eq!(released.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn scoped_model_releases_on_early_return() {
    fn fails(model: ScopedModel<Counting>) -> Result<(), &'static str> {
      let _output = model.forward(&ClassifierInput::default()).map_err(|_| "forward")?;
      Err("later step failed")
    }

    let released = Arc::new(AtomicUsize::new(0));
    let model = ScopedModel::new(Counting {
      released: released.clone(),
    });
    assert!(fails(model).is_err());
    assert_eq!(released.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn explicit_release_runs_once() {
    let released = Arc::new(AtomicUsize::new(0));
    ScopedModel::new(Counting {
      released: released.clone(),
    })
    .release();
    assert_eq!(released.load(Ordering::SeqCst), 1);
  }
}
