// 该文件是 Leafcheck （叶检） 项目的一部分。
// src/worker.rs - 后台分类线程
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

//! 在后台线程上分类，调用方线程不阻塞。
//!
//! 每次提交都会得到一个递增的代号，只有最新一次提交的结果会交给调用方；
//! 较早的结果到达时直接丢弃，正在进行的推理不会被中断。

use std::{
  sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError},
  thread::{self, JoinHandle},
  time::{Duration, Instant},
};

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::pipeline::{Classifier, ClassifyError, Prediction};

/// 提交凭据
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

struct Request {
  generation: u64,
  image: RgbImage,
}

struct Outcome {
  generation: u64,
  result: Result<Prediction, ClassifyError>,
}

pub struct BackgroundClassifier {
  requests: Option<Sender<Request>>,
  results: Receiver<Outcome>,
  generation: u64,
  handle: Option<JoinHandle<()>>,
}

impl BackgroundClassifier {
  pub fn spawn<C>(classifier: C) -> Self
  where
    C: Classifier + Send + 'static,
  {
    let (request_tx, request_rx) = mpsc::channel::<Request>();
    let (result_tx, result_rx) = mpsc::channel::<Outcome>();

    let handle = thread::spawn(move || {
      info!("后台分类线程启动");
      while let Ok(mut request) = request_rx.recv() {
        // 只处理队列中最新的请求
        loop {
          match request_rx.try_recv() {
            Ok(newer) => {
              debug!("跳过过期请求 {}", request.generation);
              request = newer;
            }
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => break,
          }
        }

        let result = classifier.classify(&request.image);
        let outcome = Outcome {
          generation: request.generation,
          result,
        };
        if result_tx.send(outcome).is_err() {
          break;
        }
      }
      info!("后台分类线程退出");
    });

    Self {
      requests: Some(request_tx),
      results: result_rx,
      generation: 0,
      handle: Some(handle),
    }
  }

  /// 提交新图像，之前提交的结果不再交付
  pub fn submit(&mut self, image: RgbImage) -> Result<Ticket, ClassifyError> {
    self.generation += 1;
    let request = Request {
      generation: self.generation,
      image,
    };
    self
      .requests
      .as_ref()
      .ok_or_else(|| ClassifyError::ModelNotReady("后台分类线程已停止".to_string()))?
      .send(request)
      .map_err(|_| ClassifyError::ModelNotReady("后台分类线程已停止".to_string()))?;
    Ok(Ticket(self.generation))
  }

  pub fn is_current(&self, ticket: Ticket) -> bool {
    ticket.0 == self.generation
  }

  fn accept(&self, outcome: Outcome) -> Option<Result<Prediction, ClassifyError>> {
    if outcome.generation == self.generation {
      Some(outcome.result)
    } else {
      debug!("丢弃过期结果 {}", outcome.generation);
      None
    }
  }

  /// 非阻塞地取最新提交的结果
  pub fn latest(&self) -> Option<Result<Prediction, ClassifyError>> {
    loop {
      match self.results.try_recv() {
        Ok(outcome) => {
          if let Some(result) = self.accept(outcome) {
            return Some(result);
          }
        }
        Err(_) => return None,
      }
    }
  }

  /// 等待最新提交的结果，超时返回 None
  pub fn wait_latest(&self, timeout: Duration) -> Option<Result<Prediction, ClassifyError>> {
    let deadline = Instant::now() + timeout;
    loop {
      let remaining = deadline.saturating_duration_since(Instant::now());
      match self.results.recv_timeout(remaining) {
        Ok(outcome) => {
          if let Some(result) = self.accept(outcome) {
            return Some(result);
          }
        }
        Err(RecvTimeoutError::Timeout) => return None,
        Err(RecvTimeoutError::Disconnected) => {
          warn!("后台分类线程已断开");
          return None;
        }
      }
    }
  }
}

impl Drop for BackgroundClassifier {
  fn drop(&mut self) {
    self.requests.take();
    if let Some(handle) = self.handle.take()
      && handle.join().is_err()
    {
      warn!("后台分类线程异常退出");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::{Arc, Mutex};

  /// 以图像宽度为标签，并可阻塞直到放行
  struct Gate {
    gate: Arc<Mutex<()>>,
  }

  impl Classifier for Gate {
    fn classify(&self, image: &RgbImage) -> Result<Prediction, ClassifyError> {
      let _open = self.gate.lock().map_err(|_| ClassifyError::ModelNotReady("gate".into()))?;
      if image.width() == 0 {
        return Err(ClassifyError::InvalidImage("empty".into()));
      }
      Ok(Prediction {
        index: image.width() as usize,
        label: format!("w{}", image.width()),
        score: 1.0,
      })
    }
  }

  #[test]
  fn delivers_result_of_latest_submission_only() {
    let gate = Arc::new(Mutex::new(()));
    let held = gate.lock().unwrap();
    let mut worker = BackgroundClassifier::spawn(Gate { gate: gate.clone() });

    let first = worker.submit(RgbImage::new(1, 1)).unwrap();
    let second = worker.submit(RgbImage::new(2, 1)).unwrap();
    assert!(!worker.is_current(first));
    assert!(worker.is_current(second));
    drop(held);

    let result = worker.wait_latest(Duration::from_secs(10)).unwrap().unwrap();
    assert_eq!(result.label, "w2");
    assert!(worker.latest().is_none());
  }

  #[test]
  fn errors_are_delivered_not_panicked() {
    let mut worker = BackgroundClassifier::spawn(Gate {
      gate: Arc::new(Mutex::new(())),
    });
    worker.submit(RgbImage::new(0, 0)).unwrap();
    let result = worker.wait_latest(Duration::from_secs(10)).unwrap();
    assert!(matches!(result, Err(ClassifyError::InvalidImage(_))));
  }
}
