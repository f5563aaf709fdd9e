// 该文件是 Leafcheck （叶检） 项目的一部分。
// src/bin/simple_repeatshot.rs - 重复分类测速
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use url::Url;

use leafcheck::{
  FromUrl, InferencePipeline,
  model::{LabelCatalog, OnnxClassifierBuilder},
  task::{RepeatShotTask, Task},
};
use tracing::info;

/// Leafcheck 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型路径
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 标签文件
  #[arg(long, value_name = "LABELS")]
  pub labels: PathBuf,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT", default_value = "log://")]
  pub output: Url,
  /// 重复次数
  #[arg(long, value_name = "TIMES", default_value = "1000")]
  pub repeat: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("重复次数: {}", args.repeat);

  let input = leafcheck::input::InputWrapper::from_url(&args.input)?;
  let model = OnnxClassifierBuilder::from_url(&args.model)?.build()?;
  let labels = LabelCatalog::shared(&args.labels)?;
  let output = leafcheck::output::OutputWrapper::from_url(&args.output)?;

  RepeatShotTask::default().with_times(args.repeat).run_task(
    input,
    InferencePipeline::new(model, labels),
    output,
  )?;

  Ok(())
}
