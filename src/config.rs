//! 定义了连接的可配置参数。
//! Defines configurable parameters for the connection.

use crate::error::{Error, Result};
use std::time::Duration;

/// A structure containing all configurable parameters for a connection.
///
/// 包含所有连接可配置参数的结构体。
#[derive(Debug, Clone)]
pub struct Config {
    /// Upper bound on every connect, close and ping wait.
    /// 每次连接、关闭和ping等待的上限。
    pub realtime_request_timeout: Duration,

    /// Delay before each reconnection attempt after the connection drops to
    /// `disconnected`.
    ///
    /// 连接进入 `disconnected` 后，每次重连尝试之前的延迟。
    pub disconnected_retry_timeout: Duration,

    /// Whether the connection starts connecting as soon as it is created.
    /// When `false` the connection starts `initialized` and waits for an
    /// explicit `connect()`.
    ///
    /// 连接创建后是否立即开始连接。为 `false` 时连接处于 `initialized`，
    /// 等待显式调用 `connect()`。
    pub auto_connect: bool,
}

impl Config {
    /// Checks that the timeouts are usable.
    ///
    /// 检查超时参数是否可用。
    pub fn validate(&self) -> Result<()> {
        if self.realtime_request_timeout.is_zero() {
            return Err(Error::invalid_state(
                "realtime_request_timeout must be greater than zero",
            ));
        }
        if self.disconnected_retry_timeout.is_zero() {
            return Err(Error::invalid_state(
                "disconnected_retry_timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            realtime_request_timeout: Duration::from_secs(10),
            disconnected_retry_timeout: Duration::from_secs(15),
            auto_connect: true,
        }
    }
}
