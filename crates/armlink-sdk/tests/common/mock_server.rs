//! 脚本化的模拟控制器
//!
//! 在回环地址上监听 TCP，接受连接后完成握手，再通过 UDP 向客户端声明的端口发送状态报文。
//! 测试线程按脚本驱动：发送状态、接收指令、接收请求、发送应答。

#![allow(dead_code)]

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::time::Duration;

use armlink_sdk::protocol::{
    CommandHeader, ConnectRequest, ConnectResponse, ConnectStatus, Datagram, Request, Response,
    RobotCommand, RobotState,
};

const IO_TIMEOUT: Duration = Duration::from_secs(5);

pub struct MockServer {
    listener: TcpListener,
}

impl MockServer {
    /// 监听随机端口
    pub fn bind() -> Self {
        Self::bind_port(0)
    }

    pub fn bind_port(port: u16) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", port)).unwrap();
        Self { listener }
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().unwrap().port()
    }

    /// 接受连接并以 `version` 接受握手
    pub fn accept(&self, version: u16) -> MockConnection {
        self.accept_with(ConnectStatus::Success, version)
    }

    pub fn accept_with(&self, status: ConnectStatus, version: u16) -> MockConnection {
        let (tcp, _) = self.listener.accept().unwrap();
        tcp.set_read_timeout(Some(IO_TIMEOUT)).unwrap();
        tcp.set_nodelay(true).unwrap();
        let udp = UdpSocket::bind("127.0.0.1:0").unwrap();
        udp.set_read_timeout(Some(IO_TIMEOUT)).unwrap();

        let mut connection = MockConnection {
            tcp,
            udp,
            client: None,
            next_message_id: 1,
            template: RobotState::default(),
            connect_request: None,
        };
        let (header, request) = connection.receive_request();
        let Request::Connect(connect) = request else {
            panic!("expected Connect, got {:?}", request);
        };
        connection.client = Some(SocketAddr::from(([127, 0, 0, 1], connect.udp_port)));
        connection.connect_request = Some(connect);
        connection.send_response(
            header.command_id,
            Response::Connect(ConnectResponse { status, version }),
        );
        connection
    }
}

pub struct MockConnection {
    tcp: TcpStream,
    udp: UdpSocket,
    client: Option<SocketAddr>,
    next_message_id: u64,
    /// 每条状态报文的基础内容
    pub template: RobotState,
    pub connect_request: Option<ConnectRequest>,
}

impl MockConnection {
    /// 以模板发送下一条状态，返回其 `message_id`
    pub fn send_state(&mut self) -> u64 {
        self.send_state_with(|_| {})
    }

    pub fn send_state_with(&mut self, modify: impl FnOnce(&mut RobotState)) -> u64 {
        let mut state = self.template.clone();
        state.message_id = self.next_message_id;
        modify(&mut state);
        self.next_message_id = state.message_id + 1;
        let client = self.client.unwrap();
        self.udp.send_to(&state.encode(), client).unwrap();
        state.message_id
    }

    /// 阻塞接收一条指令报文
    pub fn receive_command(&self) -> RobotCommand {
        let mut buf = [0u8; 1024];
        let (n, _) = self.udp.recv_from(&mut buf).unwrap();
        RobotCommand::decode(&buf[..n]).unwrap()
    }

    /// 阻塞接收一个完整请求帧
    pub fn receive_request(&mut self) -> (CommandHeader, Request) {
        let mut frame = vec![0u8; CommandHeader::SIZE];
        self.tcp.read_exact(&mut frame).unwrap();
        let size = CommandHeader::peek_size(&frame).unwrap();
        frame.resize(size, 0);
        self.tcp.read_exact(&mut frame[CommandHeader::SIZE..]).unwrap();
        Request::decode(&frame).unwrap()
    }

    pub fn send_response(&mut self, command_id: u32, response: Response) {
        self.tcp.write_all(&response.encode(command_id)).unwrap();
        self.tcp.flush().unwrap();
    }

    /// 客户端关闭连接前没有再发送任何请求
    pub fn assert_closed_without_requests(&mut self) {
        let mut buf = [0u8; 64];
        match self.tcp.read(&mut buf) {
            Ok(0) => {},
            Ok(n) => panic!("unexpected {} bytes of request data", n),
            Err(e) if e.kind() == ErrorKind::ConnectionReset => {},
            Err(e) => panic!("connection still open: {}", e),
        }
    }

    /// 关闭 TCP 连接（客户端据此认为没有更多状态）
    pub fn close(self) {
        drop(self.tcp);
    }
}
