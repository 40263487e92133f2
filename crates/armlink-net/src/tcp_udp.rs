//! 基于 `mio` 的 TCP + UDP 传输
//!
//! TCP 承载请求/应答帧，UDP 承载每个控制周期的状态/指令报文。
//! 两个 socket 与一个 `Waker` 注册在同一个 `Poll` 上，
//! `receive()` 在一次阻塞中同时等待两条通道和关闭信号。

use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

use armlink_protocol::{CommandHeader, Response};
use bytes::{Bytes, BytesMut};
use mio::net::{TcpStream, UdpSocket};
use mio::{Events, Interest, Poll, Token, Waker};
use tracing::{debug, trace, warn};

use crate::{Incoming, NetError, ShutdownHandle, Transport};

const TCP: Token = Token(0);
const UDP: Token = Token(1);
const WAKER: Token = Token(2);

/// 单条 UDP 报文的接收缓冲区大小
const MAX_DATAGRAM_SIZE: usize = 2048;

/// TCP 发送缓冲区满时的最长等待时间
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// TCP/UDP 传输
pub struct NetTransport {
    poll: Poll,
    events: Events,
    tcp: TcpStream,
    udp: UdpSocket,
    state_port: u16,
    shutdown: ShutdownHandle,
    /// 最近一条状态报文的来源地址，指令发往这里
    peer: Option<SocketAddr>,
    /// TCP 字节流中尚未组成完整帧的部分
    rx: BytesMut,
    datagram_buf: Vec<u8>,
    pending: VecDeque<Incoming>,
    remote_closed: bool,
    locally_closed: bool,
}

impl NetTransport {
    /// 连接 `address:port` 的 TCP 端口，并在同一本地地址上绑定 UDP 端口
    pub fn connect(address: &str, port: u16, timeout: Duration) -> Result<Self, NetError> {
        let addr = resolve(address, port)?;
        // connect_timeout 不接受零时长
        let timeout = timeout.max(Duration::from_millis(1));
        let stream = std::net::TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;

        let local_ip = stream.local_addr()?.ip();
        let udp = std::net::UdpSocket::bind((local_ip, 0))?;
        udp.set_nonblocking(true)?;

        debug!("TCP connected to {}, UDP bound on {}", addr, udp.local_addr()?);
        Self::from_std(stream, udp)
    }

    /// 从已建立的标准库 socket 构建（两者都必须已设为非阻塞）
    pub fn from_std(tcp: std::net::TcpStream, udp: std::net::UdpSocket) -> Result<Self, NetError> {
        let state_port = udp.local_addr()?.port();
        let poll = Poll::new()?;
        let mut tcp = TcpStream::from_std(tcp);
        let mut udp = UdpSocket::from_std(udp);
        poll.registry().register(&mut tcp, TCP, Interest::READABLE)?;
        poll.registry().register(&mut udp, UDP, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);

        Ok(Self {
            poll,
            events: Events::with_capacity(16),
            tcp,
            udp,
            state_port,
            shutdown: ShutdownHandle::new(Some(waker)),
            peer: None,
            rx: BytesMut::with_capacity(1024),
            datagram_buf: vec![0u8; MAX_DATAGRAM_SIZE],
            pending: VecDeque::new(),
            remote_closed: false,
            locally_closed: false,
        })
    }

    /// 最近一条状态报文的来源地址
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    fn poll_once(&mut self, timeout: Duration) -> Result<(), NetError> {
        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {},
            Err(e) if e.kind() == ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        let mut tcp_ready = false;
        let mut udp_ready = false;
        for event in self.events.iter() {
            match event.token() {
                TCP => tcp_ready = true,
                UDP => udp_ready = true,
                _ => {},
            }
        }

        // 应答先于状态入队：同一次唤醒中到达的拒绝应答应在下一条状态之前被处理
        if tcp_ready {
            self.drain_tcp()?;
        }
        if udp_ready {
            self.drain_udp()?;
        }
        Ok(())
    }

    /// 边沿触发：一直读到 WouldBlock
    fn drain_tcp(&mut self) -> Result<(), NetError> {
        if self.remote_closed {
            return Ok(());
        }
        let mut chunk = [0u8; 4096];
        loop {
            match self.tcp.read(&mut chunk) {
                Ok(0) => {
                    debug!("Remote closed the command connection");
                    self.remote_closed = true;
                    if let Err(e) = self.poll.registry().deregister(&mut self.tcp) {
                        trace!("deregister tcp: {}", e);
                    }
                    break;
                },
                Ok(n) => self.rx.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::ConnectionReset => {
                    debug!("Command connection reset by peer");
                    self.remote_closed = true;
                    break;
                },
                Err(e) => return Err(e.into()),
            }
        }

        while let Some(size) = CommandHeader::peek_size(&self.rx) {
            if !(CommandHeader::SIZE..=Response::MAX_SIZE).contains(&size) {
                return Err(NetError::InvalidFrame(size));
            }
            if self.rx.len() < size {
                break;
            }
            let frame = self.rx.split_to(size).freeze();
            self.pending.push_back(Incoming::Reply(frame));
        }
        Ok(())
    }

    fn drain_udp(&mut self) -> Result<(), NetError> {
        loop {
            match self.udp.recv_from(&mut self.datagram_buf[..]) {
                Ok((n, from)) => {
                    self.peer = Some(from);
                    self.pending
                        .push_back(Incoming::State(Bytes::copy_from_slice(&self.datagram_buf[..n])));
                },
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Transport for NetTransport {
    fn send_request(&mut self, frame: &[u8]) -> Result<(), NetError> {
        if self.locally_closed || self.remote_closed {
            return Err(NetError::Closed);
        }
        let deadline = Instant::now() + WRITE_TIMEOUT;
        let mut written = 0;
        while written < frame.len() {
            match self.tcp.write(&frame[written..]) {
                Ok(0) => return Err(NetError::Closed),
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(NetError::Timeout);
                    }
                    spin_sleep::sleep(Duration::from_micros(50));
                },
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn send_datagram(&mut self, datagram: &[u8]) -> Result<(), NetError> {
        let peer = self.peer.ok_or(NetError::NoPeer)?;
        match self.udp.send_to(datagram, peer) {
            Ok(_) => Ok(()),
            // UDP 本身不可靠，发送缓冲区满时直接丢弃
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                warn!("UDP send buffer full, command datagram dropped");
                Ok(())
            },
            Err(e) => Err(e.into()),
        }
    }

    fn receive(&mut self, timeout: Duration) -> Result<Incoming, NetError> {
        let deadline = Instant::now() + timeout;
        let mut polled = false;
        loop {
            if self.locally_closed || self.shutdown.is_shutdown() {
                return Err(NetError::Closed);
            }
            if let Some(incoming) = self.pending.pop_front() {
                return Ok(incoming);
            }
            if self.remote_closed {
                return Ok(Incoming::Closed);
            }
            let now = Instant::now();
            if polled && now >= deadline {
                return Err(NetError::Timeout);
            }
            self.poll_once(deadline.saturating_duration_since(now))?;
            polled = true;
        }
    }

    fn state_port(&self) -> u16 {
        self.state_port
    }

    fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    fn close(&mut self) {
        if self.locally_closed {
            return;
        }
        self.locally_closed = true;
        if let Err(e) = self.tcp.shutdown(Shutdown::Both) {
            trace!("tcp shutdown: {}", e);
        }
    }
}

impl Drop for NetTransport {
    fn drop(&mut self) {
        self.close();
    }
}

fn resolve(address: &str, port: u16) -> Result<SocketAddr, NetError> {
    (address, port)
        .to_socket_addrs()
        .map_err(|e| NetError::InvalidAddress(format!("{}: {}", address, e)))?
        .next()
        .ok_or_else(|| NetError::InvalidAddress(address.to_string()))
}
