//! 从 TOML 加载会话配置
//!
//! 未出现的字段取默认值：
//!
//! ```toml
//! port = 1337
//! receive_timeout_ms = 100
//! realtime = "enforce"
//!
//! [maximum_path_deviation]
//! translation = 0.1
//! rotation = 0.5
//! elbow = 1.0
//! ```

use std::fs;
use std::path::Path;

use armlink_driver::SessionConfig;
use tracing::debug;

use crate::RobotError;

pub fn load_config(path: impl AsRef<Path>) -> Result<SessionConfig, RobotError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|e| RobotError::Config(format!("failed to read {}: {}", path.display(), e)))?;
    let config = parse_config(&text)?;
    debug!("Loaded session config from {}", path.display());
    Ok(config)
}

pub fn parse_config(text: &str) -> Result<SessionConfig, RobotError> {
    toml::from_str(text).map_err(|e| RobotError::Config(format!("invalid session config: {}", e)))
}
