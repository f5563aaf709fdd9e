// 该文件是 Leafcheck （叶检） 项目的一部分。
// src/bin/simple_continueshot.rs - 连续分类
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
  FromUrl,
  model::{LazyLabelCatalog, OnnxClassifierBuilder},
  pipeline::LazyInferencePipeline,
  task::{ContinuousTask, Task},
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
  /// 输入来源，如 folder:///path/leaves
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT", default_value = "log://")]
  pub output: Url,

  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("标签文件路径: {}", args.labels.display());
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input = leafcheck::input::InputWrapper::from_url(&args.input)?;
  let builder = OnnxClassifierBuilder::from_url(&args.model)?;
  let classifier = LazyInferencePipeline::new(
    move || builder.clone().build(),
    LazyLabelCatalog::new(args.labels),
  );
  let output = leafcheck::output::OutputWrapper::from_url(&args.output)?;

  ContinuousTask::default()
    .with_frame_number(args.frame_number)
    .with_interrupt(true)
    .run_task(input, classifier, output)?;

  Ok(())
}
