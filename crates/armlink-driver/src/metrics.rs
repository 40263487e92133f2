//! 会话指标
//!
//! 原子计数器，可在任意线程无锁读取。

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct SessionMetrics {
    /// 被接受的状态报文数
    pub states_received: AtomicU64,
    /// 因 `message_id` 不大于上一条而丢弃的状态报文数
    pub states_stale: AtomicU64,
    /// 发出的指令报文数
    pub commands_sent: AtomicU64,
    /// 发出的请求数
    pub requests_sent: AtomicU64,
    /// 收到的应答数
    pub replies_received: AtomicU64,
    /// 等待状态报文超时次数
    pub receive_timeouts: AtomicU64,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            states_received: self.states_received.load(Ordering::Relaxed),
            states_stale: self.states_stale.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            replies_received: self.replies_received.load(Ordering::Relaxed),
            receive_timeouts: self.receive_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub states_received: u64,
    pub states_stale: u64,
    pub commands_sent: u64,
    pub requests_sent: u64,
    pub replies_received: u64,
    pub receive_timeouts: u64,
}

impl MetricsSnapshot {
    /// 指令报文与状态报文之比（百分比），没有状态时为 0
    pub fn command_ratio(&self) -> f64 {
        if self.states_received == 0 {
            return 0.0;
        }
        (self.commands_sent as f64 / self.states_received as f64) * 100.0
    }
}
