//! Mock 传输（无网络）
//!
//! 测试通过 [`MockHandle`] 预置待接收的事件、检查已发送的帧，
//! 也可以注册应答器，在收到请求或指令报文时同步生成后续事件。
//! 队列为空时 `receive` 立即返回 `NetError::Timeout`，不会真正等待。

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::{Incoming, NetError, ShutdownHandle, Transport};

/// 应答器：输入为客户端发出的原始字节，输出为随后要投递给客户端的事件
pub type Responder = Box<dyn FnMut(&[u8]) -> Vec<Incoming> + Send>;

#[derive(Default)]
struct MockState {
    incoming: VecDeque<Incoming>,
    requests: Vec<Bytes>,
    datagrams: Vec<Bytes>,
    request_responder: Option<Responder>,
    datagram_responder: Option<Responder>,
    remote_closed: bool,
}

pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    shutdown: ShutdownHandle,
    locally_closed: bool,
}

/// 测试侧句柄
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub const STATE_PORT: u16 = 40_000;

    pub fn new() -> (Self, MockHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let transport = Self {
            state: state.clone(),
            shutdown: ShutdownHandle::new(None),
            locally_closed: false,
        };
        (transport, MockHandle { state })
    }
}

impl MockHandle {
    pub fn push(&self, incoming: Incoming) {
        self.state.lock().incoming.push_back(incoming);
    }

    pub fn push_reply(&self, frame: Bytes) {
        self.push(Incoming::Reply(frame));
    }

    pub fn push_state(&self, datagram: Bytes) {
        self.push(Incoming::State(datagram));
    }

    /// 模拟对端关闭 TCP 连接
    pub fn close_remote(&self) {
        self.state.lock().remote_closed = true;
    }

    pub fn set_request_responder(&self, responder: impl FnMut(&[u8]) -> Vec<Incoming> + Send + 'static) {
        self.state.lock().request_responder = Some(Box::new(responder));
    }

    pub fn set_datagram_responder(&self, responder: impl FnMut(&[u8]) -> Vec<Incoming> + Send + 'static) {
        self.state.lock().datagram_responder = Some(Box::new(responder));
    }

    /// 已发送的请求帧
    pub fn requests(&self) -> Vec<Bytes> {
        self.state.lock().requests.clone()
    }

    /// 已发送的指令报文
    pub fn datagrams(&self) -> Vec<Bytes> {
        self.state.lock().datagrams.clone()
    }

    pub fn pending(&self) -> usize {
        self.state.lock().incoming.len()
    }
}

impl Transport for MockTransport {
    fn send_request(&mut self, frame: &[u8]) -> Result<(), NetError> {
        if self.locally_closed {
            return Err(NetError::Closed);
        }
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.remote_closed {
            return Err(NetError::Closed);
        }
        state.requests.push(Bytes::copy_from_slice(frame));
        if let Some(responder) = state.request_responder.as_mut() {
            state.incoming.extend(responder(frame));
        }
        Ok(())
    }

    fn send_datagram(&mut self, datagram: &[u8]) -> Result<(), NetError> {
        if self.locally_closed {
            return Err(NetError::Closed);
        }
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.datagrams.push(Bytes::copy_from_slice(datagram));
        if let Some(responder) = state.datagram_responder.as_mut() {
            state.incoming.extend(responder(datagram));
        }
        Ok(())
    }

    fn receive(&mut self, _timeout: Duration) -> Result<Incoming, NetError> {
        if self.locally_closed || self.shutdown.is_shutdown() {
            return Err(NetError::Closed);
        }
        let mut state = self.state.lock();
        match state.incoming.pop_front() {
            Some(incoming) => Ok(incoming),
            None if state.remote_closed => Ok(Incoming::Closed),
            None => Err(NetError::Timeout),
        }
    }

    fn state_port(&self) -> u16 {
        Self::STATE_PORT
    }

    fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    fn close(&mut self) {
        self.locally_closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_empty_queue_times_out() {
        let (mut transport, _handle) = MockTransport::new();
        assert!(matches!(
            transport.receive(Duration::from_secs(1)),
            Err(NetError::Timeout)
        ));
        assert_eq!(transport.try_receive().unwrap(), None);
    }

    #[test]
    fn test_mock_request_responder() {
        let (mut transport, handle) = MockTransport::new();
        handle.set_request_responder(|frame| vec![Incoming::Reply(Bytes::copy_from_slice(frame))]);

        transport.send_request(b"ping").unwrap();
        assert_eq!(handle.requests(), vec![Bytes::from_static(b"ping")]);
        assert_eq!(
            transport.receive(Duration::ZERO).unwrap(),
            Incoming::Reply(Bytes::from_static(b"ping"))
        );
    }

    #[test]
    fn test_mock_remote_close_after_queue() {
        let (mut transport, handle) = MockTransport::new();
        handle.push_state(Bytes::from_static(b"s1"));
        handle.close_remote();

        assert_eq!(
            transport.receive(Duration::ZERO).unwrap(),
            Incoming::State(Bytes::from_static(b"s1"))
        );
        assert_eq!(transport.receive(Duration::ZERO).unwrap(), Incoming::Closed);
    }

    #[test]
    fn test_mock_shutdown() {
        let (mut transport, handle) = MockTransport::new();
        handle.push_state(Bytes::from_static(b"s1"));
        transport.shutdown_handle().shutdown();
        assert!(matches!(
            transport.receive(Duration::ZERO),
            Err(NetError::Closed)
        ));
    }
}
