//! 热插拔事件循环
//!
//! 每次调用阻塞在 {监视器描述符, 唤醒读端} 上（无超时），交付恰好一个事件后返回：
//!
//! 1. `poll()` 失败 → [`SessionError::Wait`]
//! 2. 唤醒读端就绪 → 消费一个信号，返回唤醒事件；读取失败 → [`SessionError::Receive`]
//! 3. 监视器就绪 → 接收一条通知；虚拟设备丢弃后重新等待，其余返回设备事件
//!
//! 唤醒优先于设备通知。

use crate::classify::{classify_event, classify_type, is_virtual};
use crate::error::SessionError;
use crate::wakeup::WakeupChannel;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use plugwatch_registry::{DeviceMonitor, DeviceNode, RegistryError};
use plugwatch_types::DeviceEvent;
use std::io;
use tracing::trace;

fn is_ready(fd: &PollFd<'_>) -> bool {
    fd.revents().is_some_and(|revents| {
        revents.intersects(PollFlags::POLLIN | PollFlags::POLLERR | PollFlags::POLLHUP)
    })
}

fn wakeup_error(source: io::Error) -> SessionError {
    SessionError::Receive(RegistryError::backend("recv() on wakeup channel", source))
}

/// 等待下一个事件
///
/// 设备事件的类型按上报策略合并（`UsbTty` → `Usb`）。
pub fn next_event<M: DeviceMonitor>(
    monitor: &M,
    wakeup: &WakeupChannel,
    virtual_marker: &str,
) -> Result<DeviceEvent, SessionError> {
    loop {
        let mut fds = [
            PollFd::new(monitor.as_fd(), PollFlags::POLLIN),
            PollFd::new(wakeup.read_fd(), PollFlags::POLLIN),
        ];

        poll(&mut fds, PollTimeout::NONE).map_err(SessionError::Wait)?;

        // 信号可能已被并发调用消费（返回 false），此时继续检查监视器
        if is_ready(&fds[1]) && wakeup.consume_one().map_err(wakeup_error)? {
            return Ok(DeviceEvent::wakeup());
        }

        if is_ready(&fds[0]) {
            let event = monitor
                .receive(|device| {
                    let path = device.syspath();
                    if is_virtual(path, virtual_marker) {
                        trace!("ignoring virtual device {}", path.display());
                        return None;
                    }
                    Some(DeviceEvent::device(
                        path,
                        classify_type(device).coalesced(),
                        classify_event(device),
                    ))
                })
                .map_err(SessionError::Receive)?;

            if let Some(event) = event {
                return Ok(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugwatch_registry::{DeviceRegistry, MatchRule, MockBus, MockDevice};
    use plugwatch_types::{DeviceType, EventKind};
    use std::path::Path;

    fn usb_tty() -> MockDevice {
        let interface = MockDevice::new("/sys/devices/usb1/1-1/1-1:1.0")
            .subsystem("usb")
            .devtype("usb_interface");
        MockDevice::new("/sys/devices/usb1/1-1/1-1:1.0/ttyUSB0/tty/ttyUSB0")
            .subsystem("tty")
            .parent(interface)
    }

    #[test]
    fn test_device_event_is_classified_and_coalesced() {
        let bus = MockBus::new();
        let registry = bus.connect().unwrap();
        let monitor = registry.monitor(&MatchRule::defaults()).unwrap();
        let wakeup = WakeupChannel::new().unwrap();

        bus.emit(usb_tty().with_action("add"));
        let event = next_event(&monitor, &wakeup, "virtual").unwrap();
        assert_eq!(
            event.path(),
            Some(Path::new("/sys/devices/usb1/1-1/1-1:1.0/ttyUSB0/tty/ttyUSB0"))
        );
        assert_eq!(event.device_type, DeviceType::Usb);
        assert_eq!(event.kind, EventKind::Add);
    }

    #[test]
    fn test_virtual_device_is_skipped() {
        let bus = MockBus::new();
        let registry = bus.connect().unwrap();
        let monitor = registry.monitor(&MatchRule::defaults()).unwrap();
        let wakeup = WakeupChannel::new().unwrap();

        bus.emit(
            MockDevice::new("/sys/devices/virtual/tty/ptmx")
                .subsystem("tty")
                .action("add"),
        );
        bus.emit(
            MockDevice::new("/sys/devices/platform/tty/ttyAMA0")
                .subsystem("tty")
                .action("remove"),
        );

        let event = next_event(&monitor, &wakeup, "virtual").unwrap();
        assert_eq!(event.path(), Some(Path::new("/sys/devices/platform/tty/ttyAMA0")));
        assert_eq!(event.device_type, DeviceType::Tty);
        assert_eq!(event.kind, EventKind::Remove);
    }

    #[test]
    fn test_wakeup_takes_priority() {
        let bus = MockBus::new();
        let registry = bus.connect().unwrap();
        let monitor = registry.monitor(&MatchRule::defaults()).unwrap();
        let wakeup = WakeupChannel::new().unwrap();

        bus.emit(usb_tty().with_action("add"));
        assert!(wakeup.waker().wake());

        assert!(next_event(&monitor, &wakeup, "virtual").unwrap().is_wakeup());
        assert!(!next_event(&monitor, &wakeup, "virtual").unwrap().is_wakeup());
    }

    #[test]
    fn test_receive_failure_is_surfaced() {
        let bus = MockBus::new();
        let registry = bus.connect().unwrap();
        let monitor = registry.monitor(&MatchRule::defaults()).unwrap();
        let wakeup = WakeupChannel::new().unwrap();

        bus.fail_at(plugwatch_registry::FailPoint::Receive);
        bus.emit(usb_tty().with_action("add"));
        let err = next_event(&monitor, &wakeup, "virtual").unwrap_err();
        assert!(matches!(err, SessionError::Receive(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_wakeup_read_failure_is_surfaced() {
        let err = wakeup_error(io::Error::from_raw_os_error(libc::EBADF));
        assert!(matches!(
            &err,
            SessionError::Receive(RegistryError::Backend { op, .. }) if op == "recv() on wakeup channel"
        ));
        assert!(!err.is_fatal());
        assert!(err.to_string().starts_with("recv() on wakeup channel failed. Cause: "));
    }
}
