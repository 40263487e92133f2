//! 会话：可靠通道 + 版本握手
//!
//! `Session` 在握手成功后才存在，持有传输和协商出的控制器版本，
//! 并为每个请求分配递增的 `command_id`。

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use armlink_net::{Incoming, NetError, NetTransport, Transport};
use armlink_protocol::{ConnectRequest, ConnectStatus, PROTOCOL_VERSION, Request, Response};
use tracing::{debug, info, trace, warn};

use crate::{DriverError, SessionConfig, SessionMetrics};

pub struct Session<T: Transport> {
    transport: T,
    server_version: u16,
    command_id: AtomicU32,
    metrics: Arc<SessionMetrics>,
}

impl Session<NetTransport> {
    /// 建立 TCP 连接并完成握手
    pub fn connect(address: &str, config: &SessionConfig) -> Result<Self, DriverError> {
        info!("Connecting to robot at {}:{}", address, config.port);
        let transport = NetTransport::connect(address, config.port, config.connect_timeout())?;
        Self::handshake(transport, config.connect_timeout())
    }
}

impl<T: Transport> Session<T> {
    /// 在已连接的传输上完成版本握手
    ///
    /// # 错误
    ///
    /// - `timeout` 内没有应答：`DriverError::Network(NetError::Timeout)`
    /// - 控制器拒绝本库版本：`DriverError::IncompatibleVersion`
    /// - 其他失败状态：`DriverError::CommandRejected`
    pub fn handshake(transport: T, timeout: Duration) -> Result<Self, DriverError> {
        let mut session = Self {
            transport,
            server_version: 0,
            command_id: AtomicU32::new(0),
            metrics: Arc::new(SessionMetrics::new()),
        };

        let request = Request::Connect(ConnectRequest {
            version: PROTOCOL_VERSION,
            udp_port: session.transport.state_port(),
        });
        let command_id = session.send(&request)?;

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match session.transport.receive(remaining)? {
                Incoming::Reply(frame) => {
                    SessionMetrics::incr(&session.metrics.replies_received);
                    let (header, response) = Response::decode(&frame)?;
                    let Response::Connect(reply) = response else {
                        warn!("Ignoring {:?} reply during handshake", header.command);
                        continue;
                    };
                    if header.command_id != command_id {
                        warn!("Ignoring stale connect reply (id {})", header.command_id);
                        continue;
                    }
                    return match reply.status {
                        ConnectStatus::Success => {
                            session.server_version = reply.version;
                            info!(
                                "Connected, server version {}, state port {}",
                                reply.version,
                                session.transport.state_port()
                            );
                            Ok(session)
                        },
                        ConnectStatus::IncompatibleLibraryVersion => {
                            Err(DriverError::IncompatibleVersion {
                                server_version: reply.version,
                                library_version: PROTOCOL_VERSION,
                            })
                        },
                        status => Err(DriverError::CommandRejected(format!(
                            "connection rejected by robot: {:?}",
                            status
                        ))),
                    };
                },
                Incoming::State(_) => trace!("Ignoring state datagram before handshake completed"),
                Incoming::Closed => return Err(NetError::Closed.into()),
            }
        }
    }

    pub fn server_version(&self) -> u16 {
        self.server_version
    }

    /// 编码并发送请求，返回分配的 `command_id`
    pub fn send(&mut self, request: &Request) -> Result<u32, DriverError> {
        let command_id = self.command_id.fetch_add(1, Ordering::Relaxed);
        let frame = request.encode(command_id);
        self.transport.send_request(&frame)?;
        SessionMetrics::incr(&self.metrics.requests_sent);
        debug!("Sent {:?} request (id {})", request.command(), command_id);
        Ok(command_id)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn metrics(&self) -> &Arc<SessionMetrics> {
        &self.metrics
    }
}
