// 该文件是 Chepai （车牌识别） 项目的一部分。
// src/utils.rs - 外部调用辅助函数
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

use std::io::{Cursor, ErrorKind, Read, Write};
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use image::{DynamicImage, ImageFormat};
use thiserror::Error;
use tracing::{debug, error, warn};

/// 在独立线程上执行 `f`，最多等待 `timeout`。
///
/// 超时或执行线程崩溃时返回 `None`。
///
/// 超时的调用无法被取消：执行线程会一直运行到 `f` 返回，结果被丢弃。
/// 调用持续卡住时每次超时都会多留下一个线程，因此只用于进程内的引擎或模型；
/// 外部程序使用 [`run_with_image`] 自带的时限，超时后子进程会被终止。
pub fn call_with_deadline<T, F>(name: &str, timeout: Duration, f: F) -> Option<T>
where
  T: Send + 'static,
  F: FnOnce() -> T + Send + 'static,
{
  let (tx, rx) = crossbeam_channel::bounded(1);
  let spawned = thread::Builder::new()
    .name(format!("{}-call", name))
    .spawn(move || {
      let _ = tx.send(f());
    });

  if let Err(e) = spawned {
    error!("{}: 无法创建调用线程: {}", name, e);
    return None;
  }

  match rx.recv_timeout(timeout) {
    Ok(value) => Some(value),
    Err(RecvTimeoutError::Timeout) => {
      warn!("{}: 调用超时 ({:.2?})，结果不可用", name, timeout);
      None
    }
    Err(RecvTimeoutError::Disconnected) => {
      error!("{}: 调用线程异常退出", name);
      None
    }
  }
}

/// 为进程内的引擎或模型调用加上时限，超时视为“结果不可用”。
/// 时限为 `None` 时直接在当前线程调用。超时的调用不会被取消，见 [`call_with_deadline`]。
pub struct TimeBounded<E> {
  pub(crate) name: String,
  pub(crate) inner: Arc<E>,
  pub(crate) timeout: Option<Duration>,
}

impl<E> TimeBounded<E> {
  pub fn new(name: &str, inner: E, timeout: Duration) -> Self {
    Self::optional(name, inner, Some(timeout))
  }

  pub fn optional(name: &str, inner: E, timeout: Option<Duration>) -> Self {
    Self {
      name: name.to_string(),
      inner: Arc::new(inner),
      timeout,
    }
  }

  pub fn timeout(&self) -> Option<Duration> {
    self.timeout
  }
}

#[derive(Error, Debug)]
pub enum ExternalCommandError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像编码错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("外部程序 {program} 退出异常 ({status}): {stderr}")]
  Status {
    program: String,
    status: std::process::ExitStatus,
    stderr: String,
  },
  #[error("外部程序 {program} 超时 ({timeout:.2?})，已终止")]
  Timeout { program: String, timeout: Duration },
}

/// 以 PNG 格式把图像写入外部程序的标准输入，并收集其标准输出。
///
/// 给定 `timeout` 时，到期仍未退出的程序会被终止并返回
/// [`ExternalCommandError::Timeout`]。
pub fn run_with_image(
  program: &str,
  args: &[String],
  image: &DynamicImage,
  timeout: Option<Duration>,
) -> Result<Output, ExternalCommandError> {
  let mut png = Vec::new();
  image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
  debug!("调用外部程序 {} {:?}, 输入 {} 字节", program, args, png.len());

  let mut child = Command::new(program)
    .args(args)
    .stdin(Stdio::piped())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .spawn()?;

  // 标准输入与输出都在独立线程中处理，避免管道写满后互相阻塞
  let stdin = child.stdin.take();
  let writer = thread::Builder::new()
    .name(format!("{}-stdin", program))
    .spawn(move || match stdin {
      Some(mut stdin) => stdin.write_all(&png),
      None => Ok(()),
    })?;
  let stdout = drain(child.stdout.take())?;
  let stderr = drain(child.stderr.take())?;

  let status = match timeout {
    None => child.wait()?,
    Some(timeout) => match wait_deadline(&mut child, timeout)? {
      Some(status) => status,
      None => {
        warn!("{}: 调用超时 ({:.2?})，终止外部程序", program, timeout);
        if let Err(e) = child.kill() {
          warn!("{}: 无法终止外部程序: {}", program, e);
        }
        child.wait()?;
        return Err(ExternalCommandError::Timeout {
          program: program.to_string(),
          timeout,
        });
      }
    },
  };

  match writer.join() {
    Ok(Err(e)) if e.kind() != ErrorKind::BrokenPipe => return Err(e.into()),
    Ok(_) => {}
    Err(_) => return Err(std::io::Error::other("标准输入写入线程异常退出").into()),
  }
  let stdout = stdout.join().unwrap_or_default();
  let stderr = stderr.join().unwrap_or_default();

  if !status.success() {
    return Err(ExternalCommandError::Status {
      program: program.to_string(),
      status,
      stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
    });
  }

  Ok(Output {
    status,
    stdout,
    stderr,
  })
}

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// 轮询子进程直到退出或超时，超时返回 `None`
fn wait_deadline(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
  let deadline = Instant::now() + timeout;
  loop {
    if let Some(status) = child.try_wait()? {
      return Ok(Some(status));
    }
    let now = Instant::now();
    if now >= deadline {
      return Ok(None);
    }
    thread::sleep(WAIT_POLL_INTERVAL.min(deadline - now));
  }
}

/// 在后台线程中读完管道，管道关闭时线程结束
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> std::io::Result<JoinHandle<Vec<u8>>> {
  thread::Builder::new().spawn(move || {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
      let _ = pipe.read_to_end(&mut buf);
    }
    buf
  })
}

/// 从 URL 查询参数中读取可选的超时设置（毫秒）
pub fn timeout_from_query(url: &url::Url) -> Option<Duration> {
  url
    .query_pairs()
    .find(|(k, _)| k == "timeout_ms")
    .and_then(|(_, v)| v.parse::<u64>().ok())
    .map(Duration::from_millis)
}
