//! 事件循环测试：唤醒活性、虚拟设备过滤、跨线程使用

use plugwatch_core::{DeviceType, EventKind, Session, SessionConfig};
use plugwatch_registry::{MockBus, MockDevice, MockRegistry};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn open(bus: &MockBus) -> Session<MockRegistry> {
    Session::open(SessionConfig::default(), || bus.connect()).unwrap()
}

fn usb_tty() -> MockDevice {
    let interface = MockDevice::new("/sys/devices/usb1/1-1/1-1:1.0")
        .subsystem("usb")
        .devtype("usb_interface");
    MockDevice::new("/sys/devices/usb1/1-1/1-1:1.0/ttyACM0/tty/ttyACM0")
        .subsystem("tty")
        .parent(interface)
}

#[test]
fn test_unblock_wakes_blocked_thread() {
    let bus = MockBus::new();
    let session = Arc::new(open(&bus));

    let (tx, rx) = crossbeam_channel::bounded(1);
    let blocked = {
        let session = Arc::clone(&session);
        thread::spawn(move || {
            let event = session.next_event();
            let _ = tx.send(Instant::now());
            event
        })
    };

    // 确保线程已经进入等待
    thread::sleep(Duration::from_millis(50));
    assert!(rx.try_recv().is_err(), "next_event returned without an event");

    let unblocked_at = Instant::now();
    session.unblock();

    let returned_at = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("next_event did not return after unblock");
    assert!(returned_at.duration_since(unblocked_at) < Duration::from_secs(1));

    let event = blocked.join().unwrap().unwrap();
    assert!(event.is_wakeup());
    assert_eq!(event.kind, EventKind::None);
    assert_eq!(event.device_type, DeviceType::None);
    assert!(event.path().is_none());
}

#[test]
fn test_waker_from_another_thread() {
    let bus = MockBus::new();
    let session = open(&bus);
    let waker = session.waker().unwrap();

    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        waker.wake()
    });

    assert!(session.next_event().unwrap().is_wakeup());
    assert!(handle.join().unwrap());
}

#[test]
fn test_unblock_before_next_event_is_queued() {
    let bus = MockBus::new();
    let session = open(&bus);

    session.unblock();
    session.unblock();
    assert!(session.next_event().unwrap().is_wakeup());
    assert!(session.next_event().unwrap().is_wakeup());
}

#[test]
fn test_virtual_notification_is_never_returned() {
    let bus = MockBus::new();
    let session = Arc::new(open(&bus));

    bus.emit(
        MockDevice::new("/sys/devices/virtual/tty/ptmx")
            .subsystem("tty")
            .action("add"),
    );

    let handle = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.next_event())
    };

    // 虚拟设备被丢弃后循环继续等待，只有唤醒才能让它返回
    thread::sleep(Duration::from_millis(100));
    assert!(!handle.is_finished());

    session.unblock();
    let event = handle.join().unwrap().unwrap();
    assert!(event.is_wakeup());

    let stats = bus.stats();
    assert_eq!(stats.handles_opened, 1);
    assert_eq!(stats.handles_released, 1);
}

#[test]
fn test_add_and_remove_events() {
    let bus = MockBus::new();
    let session = open(&bus);

    bus.emit(usb_tty().with_action("add"));
    bus.emit(usb_tty().with_action("remove"));
    bus.emit(usb_tty().with_action("change"));

    let add = session.next_event().unwrap();
    assert_eq!(add.kind, EventKind::Add);
    // USB 转串口在事件中上报为 USB
    assert_eq!(add.device_type, DeviceType::Usb);
    assert_eq!(
        add.path(),
        Some(Path::new("/sys/devices/usb1/1-1/1-1:1.0/ttyACM0/tty/ttyACM0"))
    );

    assert_eq!(session.next_event().unwrap().kind, EventKind::Remove);
    assert_eq!(session.next_event().unwrap().kind, EventKind::None);
}

#[test]
fn test_scan_while_event_loop_blocked() {
    let bus = MockBus::new();
    bus.add_device(MockDevice::new("/sys/devices/platform/tty/ttyAMA0").subsystem("tty"));
    let session = Arc::new(open(&bus));

    let handle = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.next_event())
    };

    thread::sleep(Duration::from_millis(20));
    assert_eq!(session.scan().unwrap().len(), 1);

    session.unblock();
    assert!(handle.join().unwrap().unwrap().is_wakeup());
}
