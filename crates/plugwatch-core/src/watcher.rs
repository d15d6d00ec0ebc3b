//! 热插拔监视线程与设备清单
//!
//! [`HotplugWatcher`] 用一次 `scan()` 初始化清单，然后在独立线程中循环调用
//! `next_event()`，维护以设备标识为键的 [`Inventory`]，并把变化分发给
//! [`HardwareListener`] 和 [`HotplugWatcher::subscribe`] 返回的通道。
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(all(target_os = "linux", feature = "udev"))]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use plugwatch_core::{HotplugWatcher, Session, SessionConfig, WatcherConfig};
//! use std::sync::Arc;
//!
//! let session = Arc::new(Session::open_udev(SessionConfig::default())?);
//! let watcher = HotplugWatcher::start(session, WatcherConfig::default())?;
//! let events = watcher.subscribe();
//!
//! for descriptor in watcher.inventory().descriptors_matching("usb:.*")? {
//!     println!("{}", descriptor.identifier);
//! }
//! let _ = events.recv();
//! # Ok(())
//! # }
//! # #[cfg(not(all(target_os = "linux", feature = "udev")))]
//! # fn main() {}
//! ```

use crate::error::SessionError;
use crate::session::Session;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use plugwatch_registry::DeviceRegistry;
use plugwatch_types::{DeviceType, EventKind};
use regex::Regex;
use std::collections::BTreeMap;
use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

/// 监视线程错误
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("{0}")]
    Session(#[from] SessionError),

    #[error("Failed to spawn watcher thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("Invalid identifier pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// 监视线程配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    pub thread_name: String,
    /// `next_event()` 失败后的等待时间
    pub error_backoff: Duration,
    /// `stop()` 等待线程退出的时间
    pub join_timeout: Duration,
    /// 每个订阅通道的容量（满时丢弃事件）
    pub channel_capacity: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            thread_name: "plugwatch-events".to_string(),
            error_backoff: Duration::from_secs(1),
            join_timeout: Duration::from_secs(2),
            channel_capacity: 64,
        }
    }
}

/// 已接入硬件的描述
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HardwareDescriptor {
    /// 设备标识（`usb:...` / `serial:...`）
    pub identifier: String,
    pub syspath: PathBuf,
    pub device_type: DeviceType,
    /// 设备节点（如 `/dev/ttyUSB0`）
    pub port_node: Option<PathBuf>,
}

/// 清单变化
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Added(HardwareDescriptor),
    Removed(HardwareDescriptor),
}

/// 硬件变化监听器
///
/// 回调在监视线程中执行，应尽快返回。回调 panic 会被捕获并记录。
pub trait HardwareListener: Send + Sync {
    fn hardware_added(&self, descriptor: &HardwareDescriptor);

    fn hardware_removed(&self, descriptor: &HardwareDescriptor);
}

/// 以设备标识为键的硬件清单
#[derive(Debug, Default)]
pub struct Inventory {
    devices: RwLock<BTreeMap<String, HardwareDescriptor>>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入描述，返回被替换的旧描述（同一标识）
    pub fn insert(&self, descriptor: HardwareDescriptor) -> Option<HardwareDescriptor> {
        self.devices
            .write()
            .insert(descriptor.identifier.clone(), descriptor)
    }

    /// 按 syspath 移除（设备移除后标识已无法解析）
    pub fn remove_by_syspath(&self, syspath: &Path) -> Option<HardwareDescriptor> {
        let mut devices = self.devices.write();
        let identifier = devices
            .values()
            .find(|descriptor| descriptor.syspath == syspath)
            .map(|descriptor| descriptor.identifier.clone())?;
        devices.remove(&identifier)
    }

    pub fn identifiers(&self) -> Vec<String> {
        self.devices.read().keys().cloned().collect()
    }

    pub fn descriptors(&self) -> Vec<HardwareDescriptor> {
        self.devices.read().values().cloned().collect()
    }

    pub fn descriptor(&self, identifier: &str) -> Option<HardwareDescriptor> {
        self.devices.read().get(identifier).cloned()
    }

    /// 标识完整匹配正则表达式的描述
    pub fn descriptors_matching(&self, pattern: &str) -> Result<Vec<HardwareDescriptor>, WatchError> {
        let regex = Regex::new(&format!("^(?:{})$", pattern))?;
        Ok(self
            .devices
            .read()
            .values()
            .filter(|descriptor| regex.is_match(&descriptor.identifier))
            .cloned()
            .collect())
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }

    pub fn clear(&self) {
        self.devices.write().clear();
    }
}

struct Shared {
    inventory: Inventory,
    listeners: RwLock<Vec<Arc<dyn HardwareListener>>>,
    subscribers: Mutex<Vec<Sender<WatchEvent>>>,
    running: AtomicBool,
    channel_capacity: usize,
}

impl Shared {
    fn dispatch(&self, event: WatchEvent) {
        // 分发前复制监听器列表，回调中可以再注册 / 注销
        let listeners: Vec<_> = self.listeners.read().clone();
        for listener in listeners {
            let result = catch_unwind(AssertUnwindSafe(|| match &event {
                WatchEvent::Added(descriptor) => listener.hardware_added(descriptor),
                WatchEvent::Removed(descriptor) => listener.hardware_removed(descriptor),
            }));
            if result.is_err() {
                error!("hardware listener panicked while handling {:?}", event);
            }
        }

        self.subscribers.lock().retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("watch event channel full, dropping event");
                true
            },
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

fn describe<R: DeviceRegistry>(
    session: &Session<R>,
    syspath: &Path,
    device_type: DeviceType,
) -> Option<HardwareDescriptor> {
    match session.try_identity(syspath) {
        Ok(identity) => Some(HardwareDescriptor {
            identifier: identity.to_string(),
            syspath: syspath.to_path_buf(),
            device_type,
            port_node: session.port_node(syspath),
        }),
        Err(e) => {
            debug!("no identity for {}: {}", syspath.display(), e);
            None
        },
    }
}

/// 热插拔监视线程
pub struct HotplugWatcher<R: DeviceRegistry + 'static> {
    session: Arc<Session<R>>,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
    join_timeout: Duration,
}

impl<R: DeviceRegistry + 'static> HotplugWatcher<R> {
    /// 扫描初始清单并启动监视线程
    pub fn start(session: Arc<Session<R>>, config: WatcherConfig) -> Result<Self, WatchError> {
        let shared = Arc::new(Shared {
            inventory: Inventory::new(),
            listeners: RwLock::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
            running: AtomicBool::new(true),
            channel_capacity: config.channel_capacity,
        });

        for entry in session.scan()? {
            if let Some(descriptor) = describe(&session, &entry.path, entry.device_type) {
                shared.inventory.insert(descriptor);
            }
        }
        info!("initial inventory: {} devices", shared.inventory.len());

        let handle = {
            let session = Arc::clone(&session);
            let shared = Arc::clone(&shared);
            let backoff = config.error_backoff;
            thread::Builder::new()
                .name(config.thread_name.clone())
                .spawn(move || event_thread(&session, &shared, backoff))
                .map_err(WatchError::Spawn)?
        };

        Ok(Self {
            session,
            shared,
            handle: Some(handle),
            join_timeout: config.join_timeout,
        })
    }

    pub fn inventory(&self) -> &Inventory {
        &self.shared.inventory
    }

    pub fn session(&self) -> &Arc<Session<R>> {
        &self.session
    }

    pub fn add_listener(&self, listener: Arc<dyn HardwareListener>) {
        self.shared.listeners.write().push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn HardwareListener>) {
        self.shared
            .listeners
            .write()
            .retain(|existing| !Arc::ptr_eq(existing, listener));
    }

    /// 订阅清单变化（通道满时丢弃事件）
    pub fn subscribe(&self) -> Receiver<WatchEvent> {
        let (tx, rx) = crossbeam_channel::bounded(self.shared.channel_capacity);
        self.shared.subscribers.lock().push(tx);
        rx
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// 停止监视线程
    ///
    /// 线程退出后清空清单、监听器和订阅通道（订阅端随后收到断开）。
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.session.unblock();
        if let Err(_e) = join_timeout(handle, self.join_timeout) {
            error!(
                "watcher thread panicked or failed to shut down within {:?}",
                self.join_timeout
            );
        }

        self.shared.inventory.clear();
        self.shared.listeners.write().clear();
        self.shared.subscribers.lock().clear();
    }
}

impl<R: DeviceRegistry + 'static> Drop for HotplugWatcher<R> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn join_timeout(handle: JoinHandle<()>, timeout: Duration) -> thread::Result<()> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || {
        let _ = tx.send(handle.join());
    });
    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(_) => Err(Box::new(io::Error::new(
            io::ErrorKind::TimedOut,
            "Thread join timeout",
        ))),
    }
}

fn event_thread<R: DeviceRegistry>(session: &Session<R>, shared: &Shared, backoff: Duration) {
    debug!("watcher thread started");
    while shared.running.load(Ordering::Acquire) {
        let event = match session.next_event() {
            Ok(event) => event,
            Err(e) => {
                warn!("next_event failed: {}", e);
                thread::sleep(backoff);
                continue;
            },
        };

        let Some(syspath) = event.path() else {
            trace!("wakeup");
            continue;
        };

        match event.kind {
            EventKind::Add => {
                let Some(descriptor) = describe(session, syspath, event.device_type) else {
                    continue;
                };
                if let Some(old) = shared.inventory.insert(descriptor.clone()) {
                    shared.dispatch(WatchEvent::Removed(old));
                }
                info!("hardware added: {}", descriptor.identifier);
                shared.dispatch(WatchEvent::Added(descriptor));
            },
            EventKind::Remove => {
                if let Some(descriptor) = shared.inventory.remove_by_syspath(syspath) {
                    info!("hardware removed: {}", descriptor.identifier);
                    shared.dispatch(WatchEvent::Removed(descriptor));
                }
            },
            EventKind::None => trace!("ignoring event without action for {}", syspath.display()),
        }
    }
    debug!("watcher thread stopped");
}
