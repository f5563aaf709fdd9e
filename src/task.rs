// 该文件是 Leafcheck （叶检） 项目的一部分。
// src/task.rs - 分类任务
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

use std::{thread, time::Duration};
use tracing::{error, info, warn};

use crate::{
  frame::Frame,
  output::Render,
  pipeline::{Classifier, Prediction},
};

const WARMUP_TIMES: usize = 2;

pub trait Task<I, C, O>: Sized {
  type Error;
  fn run_task(self, input: I, classifier: C, output: O) -> Result<(), Self::Error>;
}

pub struct OneShotTask;

impl<
  IE: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<Frame, IE>>,
  C: Classifier,
  O: Render<Frame, Prediction, Error = RE>,
> Task<I, C, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, classifier: C, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))??;
    info!("输入图像获取成功，开始推理...");
    let now = std::time::Instant::now();
    let result = classifier.classify(&frame.image)?;
    let elapsed = now.elapsed();
    info!("推理完成，耗时: {:.2?}", elapsed);
    output.render_result(&frame, &result)?;
    info!("输出完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 对同一张图像重复分类，统计平均耗时
pub struct RepeatShotTask {
  times: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { times: 1000 }
  }
}

impl RepeatShotTask {
  pub fn with_times(mut self, times: usize) -> Self {
    self.times = times.max(1);
    self
  }
}

impl<
  IE: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<Frame, IE>>,
  C: Classifier,
  O: Render<Frame, Prediction, Error = RE>,
> Task<I, C, O> for RepeatShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, classifier: C, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))??;
    info!("输入图像获取成功，开始推理...");
    let mut times = Vec::with_capacity(self.times);
    let mut last = None;
    for i in 0..self.times {
      let now = std::time::Instant::now();
      let result = classifier.classify(&frame.image)?;
      let elapsed = now.elapsed();
      info!("({})推理完成，耗时: {:.2?}", i, elapsed);
      times.push(elapsed);
      last = Some(result);
    }

    if let Some(result) = last {
      output.render_result(&frame, &result)?;
    }

    let measured = if times.len() > WARMUP_TIMES {
      &times[WARMUP_TIMES..]
    } else {
      &times[..]
    };
    warn!(
      "平均推理时间: {:.2?}",
      measured.iter().sum::<Duration>() / measured.len().max(1) as u32
    );

    Ok(())
  }
}

/// 持续处理输入中的每张图像，单张失败只记录日志
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  interruptible: bool,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 安装 Ctrl-C 处理，收到信号后结束循环（每个进程只能安装一次）
  pub fn with_interrupt(mut self, interruptible: bool) -> Self {
    self.interruptible = interruptible;
    self
  }
}

impl<
  IE: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<Frame, IE>>,
  C: Classifier,
  O: Render<Frame, Prediction, Error = RE>,
> Task<I, C, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, classifier: C, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (tx, rx) = std::sync::mpsc::channel();

    if self.interruptible {
      ctrlc::set_handler(move || {
        info!("收到中断信号，准备退出...");
        let _ = tx.send(());
        thread::spawn(|| {
          thread::sleep(Duration::from_secs(30));
          warn!("强制退出程序");
          std::process::exit(1);
        });
      })?;
    }

    let mut frame_index = 0;
    let mut failed = 0;
    for frame in input {
      frame_index += 1;
      info!("处理第 {} 张图像", frame_index);
      match frame {
        Ok(frame) => {
          let now = std::time::Instant::now();
          match classifier.classify(&frame.image) {
            Ok(result) => {
              let elapsed_a = now.elapsed();
              output.render_result(&frame, &result)?;
              let elapsed_b = now.elapsed();
              info!("推理完成，耗时: {:.2?} / {:.2?}", elapsed_a, elapsed_b);
            }
            Err(e) => {
              error!("{}: 分类失败: {}", frame.source, e);
              failed += 1;
            }
          }
        }
        // 读取失败同样计入图像数，之后照常检查退出条件
        Err(e) => {
          error!("读取第 {} 张图像失败: {}", frame_index, e);
          failed += 1;
        }
      }

      if self.frame_number.map(|n| frame_index >= n).unwrap_or(false) {
        info!("达到指定图像数 {}, 退出任务循环", frame_index);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!("任务完成: 共 {} 张图像, 失败 {} 张", frame_index, failed);
    Ok(())
  }
}
