//! 日志初始化
//!
//! 安装 `tracing-subscriber` 的 fmt 输出，级别由 `RUST_LOG` 控制（默认 `info`），
//! 并把 `log` crate 的记录桥接到 `tracing`。

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// 安装全局日志订阅者
///
/// 已经安装过（例如被测试框架或应用自己安装）时返回错误。
pub fn try_init_logger() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}

/// 同 [`try_init_logger`]，重复调用时静默忽略
pub fn init_logger() {
    if try_init_logger().is_err() {
        tracing::debug!("Logger already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logger_twice() {
        init_logger();
        // 第二次安装必然失败，但不能 panic
        assert!(try_init_logger().is_err());
        init_logger();
    }
}
