//! 运动发生器生命周期状态
//!
//! ```text
//! NotStarted ──start──▶ Starting ──状态确认──▶ Running ──stop──▶ Stopping ──Idle──▶ NotStarted
//!      ▲                    │                      │
//!      └──── 拒绝 / 模式不一致 / 异步拒绝应答 ──────┘
//! ```

use std::sync::atomic::{AtomicU8, Ordering};

/// 运动发生器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum MotionGeneratorStatus {
    #[default]
    NotStarted = 0,
    /// 启动请求已被接受，等待状态报文确认模式
    Starting = 1,
    Running = 2,
    /// 停止请求已发出，等待状态报文报告 Idle
    Stopping = 3,
}

impl MotionGeneratorStatus {
    /// 从 u8 转换，无效值视为 NotStarted
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::NotStarted,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// 对外报告的"运行中"：Running 或 Stopping
    pub fn is_running(self) -> bool {
        matches!(self, Self::Running | Self::Stopping)
    }
}

/// 运动发生器状态（原子版本，供其他线程无锁查询）
#[derive(Debug, Default)]
pub struct AtomicMotionGeneratorStatus {
    inner: AtomicU8,
}

impl AtomicMotionGeneratorStatus {
    pub fn new(status: MotionGeneratorStatus) -> Self {
        Self {
            inner: AtomicU8::new(status.as_u8()),
        }
    }

    pub fn get(&self) -> MotionGeneratorStatus {
        MotionGeneratorStatus::from_u8(self.inner.load(Ordering::Acquire))
    }

    pub fn set(&self, status: MotionGeneratorStatus) {
        self.inner.store(status.as_u8(), Ordering::Release);
    }

    /// 仅当当前值为 `current` 时切换到 `new`
    pub fn compare_exchange(&self, current: MotionGeneratorStatus, new: MotionGeneratorStatus) -> bool {
        self.inner
            .compare_exchange(current.as_u8(), new.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
