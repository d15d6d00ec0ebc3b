//! 唤醒通道
//!
//! 一对相连的 Unix 数据报 socket：写端由 [`Waker`] 持有，可在任意线程调用；
//! 读端与监视器描述符一起参与事件循环的等待。
//!
//! 每次唤醒发送一个单字节数据报，每次事件循环迭代最多消费一个。
//! 两端都是非阻塞的：socket 缓冲区写满后，多余的唤醒被合并（丢弃）。

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::os::unix::net::UnixDatagram;
use std::sync::Arc;
use tracing::{debug, warn};

/// 唤醒通道（读端 + 写端）
#[derive(Debug)]
pub struct WakeupChannel {
    read: UnixDatagram,
    write: Arc<UnixDatagram>,
}

impl WakeupChannel {
    pub fn new() -> io::Result<Self> {
        let (read, write) = UnixDatagram::pair()?;
        read.set_nonblocking(true)?;
        write.set_nonblocking(true)?;
        Ok(Self {
            read,
            write: Arc::new(write),
        })
    }

    /// 可跨线程使用的唤醒句柄
    pub fn waker(&self) -> Waker {
        Waker {
            write: Arc::clone(&self.write),
        }
    }

    pub fn read_fd(&self) -> BorrowedFd<'_> {
        self.read.as_fd()
    }

    pub fn raw_fds(&self) -> [RawFd; 2] {
        [self.read.as_raw_fd(), self.write.as_raw_fd()]
    }

    /// 消费一个唤醒信号
    ///
    /// 返回 `false` 表示没有待处理的信号（已被其他调用消费）。
    pub fn consume_one(&self) -> io::Result<bool> {
        let mut buf = [0u8; 1];
        match self.read.recv(&mut buf) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// 唤醒句柄
///
/// 克隆开销很小，`Send + Sync`，不借用会话。
#[derive(Debug, Clone)]
pub struct Waker {
    write: Arc<UnixDatagram>,
}

impl Waker {
    /// 发送一个唤醒信号（非阻塞）
    ///
    /// 返回 `false` 表示信号未发送：缓冲区已满时与待处理的信号合并，
    /// 或读端已关闭。
    pub fn wake(&self) -> bool {
        match self.write.send(&[0u8]) {
            Ok(_) => true,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                debug!("wakeup channel full, coalescing unblock");
                false
            },
            Err(e) => {
                warn!("unblock failed: {}", e);
                false
            },
        }
    }
}
