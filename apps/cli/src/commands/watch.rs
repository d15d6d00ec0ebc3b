//! 监视热插拔事件
//!
//! 默认直接输出事件循环交付的每个事件；`--inventory` 模式使用后台监视线程，
//! 维护设备清单并只输出清单变化。Ctrl+C 通过 `unblock()` 唤醒事件循环后退出。

use super::{GlobalOptions, open_session};
use anyhow::{Context, Result};
use clap::Args;
use plugwatch_core::{EventKind, HotplugWatcher, WatchEvent, WatcherConfig};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::warn;

/// 监视命令参数
#[derive(Args, Debug)]
pub struct WatchCommand {
    /// 收到指定数量的设备事件后退出
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// 维护设备清单，只输出清单变化
    #[arg(long)]
    pub inventory: bool,

    /// 事件循环出错后重试前的等待时间（毫秒）
    #[arg(long, default_value_t = 1000)]
    pub error_backoff_ms: u64,
}

impl WatchCommand {
    pub fn execute(&self, options: &GlobalOptions) -> Result<()> {
        if self.inventory {
            self.watch_inventory(options)
        } else {
            self.watch_events(options)
        }
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    fn watch_events(&self, options: &GlobalOptions) -> Result<()> {
        let session = open_session(options)?;
        let running = Arc::new(AtomicBool::new(true));

        let waker = session.waker().context("会话未初始化")?;
        {
            let running = Arc::clone(&running);
            ctrlc::set_handler(move || {
                running.store(false, Ordering::SeqCst);
                waker.wake();
            })
            .context("设置 Ctrl+C 处理器失败")?;
        }

        if !options.json {
            println!("监视热插拔事件（Ctrl+C 退出）...");
        }

        let mut received = 0usize;
        while running.load(Ordering::SeqCst) {
            let event = match session.next_event() {
                Ok(event) => event,
                Err(e) if !e.is_fatal() => {
                    warn!("{}", e);
                    thread::sleep(self.error_backoff());
                    continue;
                },
                Err(e) => return Err(e.into()),
            };

            let Some(path) = event.path() else {
                continue;
            };

            // 移除事件发生后设备已不存在，标识无法解析
            let identity = match event.kind {
                EventKind::Add => session.identity(path),
                _ => None,
            };

            if options.json {
                println!(
                    "{}",
                    json!({
                        "kind": event.kind,
                        "device_type": event.device_type,
                        "path": path,
                        "identity": identity,
                    })
                );
            } else {
                println!(
                    "{:<6} {:<4} {} {}",
                    event.kind,
                    event.device_type,
                    path.display(),
                    identity.as_deref().unwrap_or("")
                );
            }

            received += 1;
            if self.count.is_some_and(|count| received >= count) {
                break;
            }
        }

        Ok(())
    }

    fn watch_inventory(&self, options: &GlobalOptions) -> Result<()> {
        let session = Arc::new(open_session(options)?);
        let config = WatcherConfig {
            error_backoff: self.error_backoff(),
            ..WatcherConfig::default()
        };
        let mut watcher = HotplugWatcher::start(session, config)?;
        let events = watcher.subscribe();

        let running = Arc::new(AtomicBool::new(true));
        {
            let running = Arc::clone(&running);
            ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
                .context("设置 Ctrl+C 处理器失败")?;
        }

        for descriptor in watcher.inventory().descriptors() {
            print_change(options, "present", &descriptor)?;
        }

        let mut received = 0usize;
        while running.load(Ordering::SeqCst) {
            let event = match events.recv_timeout(Duration::from_millis(200)) {
                Ok(event) => event,
                Err(e) if e.is_disconnected() => break,
                Err(_) => continue,
            };

            match &event {
                WatchEvent::Added(descriptor) => print_change(options, "added", descriptor)?,
                WatchEvent::Removed(descriptor) => print_change(options, "removed", descriptor)?,
            }

            received += 1;
            if self.count.is_some_and(|count| received >= count) {
                break;
            }
        }

        watcher.stop();
        Ok(())
    }
}

fn print_change(
    options: &GlobalOptions,
    change: &str,
    descriptor: &plugwatch_core::HardwareDescriptor,
) -> Result<()> {
    if options.json {
        println!(
            "{}",
            serde_json::to_string(&json!({ "change": change, "device": descriptor }))?
        );
    } else {
        println!(
            "{:<8} {:<40} {}",
            change,
            descriptor.identifier,
            descriptor
                .port_node
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        );
    }
    Ok(())
}
