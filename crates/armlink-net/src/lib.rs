//! # Armlink Transport Layer
//!
//! 网络传输抽象：一条可靠的 TCP 请求通道 + 一条不可靠的 UDP 状态/指令通道。
//!
//! - [`Transport`]: 上层（driver）依赖的传输能力
//! - [`NetTransport`]: 基于 `mio` 的 TCP/UDP 实现，两个 socket 在同一个 `Poll` 上多路复用
//! - `MockTransport`（`mock` feature）: 无网络的脚本化实现，用于单元测试

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

pub mod tcp_udp;
pub use tcp_udp::NetTransport;

#[cfg(any(test, feature = "mock"))]
pub mod mock;
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockHandle, MockTransport};

/// 传输层统一错误类型
#[derive(Error, Debug)]
pub enum NetError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Receive timeout")]
    Timeout,
    #[error("Connection closed")]
    Closed,
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Invalid frame size: {0}")]
    InvalidFrame(usize),
    #[error("No datagram peer known yet")]
    NoPeer,
}

impl NetError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// 一次 `receive` 得到的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// TCP 上的一条完整应答帧（含帧头）
    Reply(Bytes),
    /// 一条 UDP 状态报文
    State(Bytes),
    /// 对端关闭了 TCP 连接，且没有更多待处理数据
    Closed,
}

/// 传输能力
///
/// 调用方在同一线程上发送并阻塞接收；`receive` 是唯一的挂起点。
pub trait Transport: Send {
    /// 在可靠通道上发送一条完整请求帧
    fn send_request(&mut self, frame: &[u8]) -> Result<(), NetError>;

    /// 在不可靠通道上发送一条指令报文（发往最近一条状态报文的来源地址）
    fn send_datagram(&mut self, datagram: &[u8]) -> Result<(), NetError>;

    /// 阻塞等待下一个事件，最多 `timeout`
    ///
    /// 超时返回 `NetError::Timeout`，通过 [`ShutdownHandle`] 取消返回 `NetError::Closed`。
    fn receive(&mut self, timeout: Duration) -> Result<Incoming, NetError>;

    /// 本地 UDP 端口（握手时告知控制器）
    fn state_port(&self) -> u16;

    /// 可跨线程使用的关闭句柄
    fn shutdown_handle(&self) -> ShutdownHandle;

    /// 关闭两条通道
    fn close(&mut self);

    /// 非阻塞接收
    fn try_receive(&mut self) -> Result<Option<Incoming>, NetError> {
        match self.receive(Duration::ZERO) {
            Ok(incoming) => Ok(Some(incoming)),
            Err(NetError::Timeout) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// 关闭句柄
///
/// 从任意线程调用 [`shutdown`](Self::shutdown) 后，传输上正在阻塞或之后的
/// `receive` 立即返回 `NetError::Closed`。
#[derive(Clone)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    waker: Option<Arc<mio::Waker>>,
}

impl ShutdownHandle {
    pub fn new(waker: Option<Arc<mio::Waker>>) -> Self {
        Self {
            requested: Arc::new(AtomicBool::new(false)),
            waker,
        }
    }

    pub fn shutdown(&self) {
        self.requested.store(true, Ordering::Release);
        if let Some(waker) = &self.waker {
            if let Err(e) = waker.wake() {
                tracing::warn!("Failed to wake transport poll: {}", e);
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("requested", &self.is_shutdown())
            .finish()
    }
}
