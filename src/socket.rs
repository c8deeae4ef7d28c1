//! Blocking TCP session to one port of the RAPID motion server.
//!
//! Each socket serializes its traffic with an exclusive lock held for the
//! full request/response exchange; responses match the in-flight request
//! positionally.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Mutex;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, TcpKeepalive, Type};
use tracing::debug;

use crate::codec::{RawResponse, RequestPacket};
use crate::error::{Result, YumiError};

pub struct ArmSocket {
    addr: SocketAddr,
    bufsize: usize,
    stream: Mutex<TcpStream>,
    // Lets close() shut the connection down while a request holds the
    // stream lock, so a blocked read returns without waiting out its
    // timeout.
    shutdown_handle: TcpStream,
}

impl ArmSocket {
    pub fn connect(ip: &str, port: u16, comm_timeout: Duration, bufsize: usize) -> Result<Self> {
        let addr: SocketAddr = format!("{ip}:{port}")
            .parse()
            .map_err(|_| YumiError::Comm(format!("Invalid address {ip}:{port}.")))?;

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

        let keepalive = TcpKeepalive::new()
            .with_time(Duration::from_secs(1))
            .with_interval(Duration::from_secs(1));
        #[cfg(not(windows))]
        let keepalive = keepalive.with_retries(2);
        socket.set_tcp_keepalive(&keepalive)?;

        socket
            .connect_timeout(&addr.into(), comm_timeout)
            .map_err(|e| YumiError::Comm(format!("Failed to connect to {addr}: {e}")))?;

        let stream: TcpStream = socket.into();
        stream.set_read_timeout(Some(comm_timeout))?;
        let shutdown_handle = stream.try_clone()?;

        debug!(%addr, "arm socket opened");

        Ok(Self {
            addr,
            bufsize,
            stream: Mutex::new(stream),
            shutdown_handle,
        })
    }

    /// Sends one framed request and reads one response, under the socket
    /// lock, with the packet's timeout as the read deadline.
    pub fn send_request(&self, packet: &RequestPacket) -> Result<RawResponse> {
        let frame = packet.encode();
        debug!(addr = %self.addr, code = ?packet.code, "sending {frame:?}");

        let mut stream = self
            .stream
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        stream.set_read_timeout(Some(packet.timeout))?;

        stream
            .write_all(frame.as_bytes())
            .map_err(|e| YumiError::Comm(format!("Failed to send request to {}: {e}", self.addr)))?;

        if !packet.expect_response {
            return Ok(RawResponse {
                mirror_code: i32::from(packet.code),
                result_code: crate::codec::ResultCode::Success,
                message: String::new(),
            });
        }

        let mut buf = vec![0u8; self.bufsize];
        let n = stream
            .read(&mut buf)
            .map_err(|e| YumiError::Comm(format!("Failed to get response from {}: {e}", self.addr)))?;
        drop(stream);

        if n == 0 {
            return Err(YumiError::Comm(format!("Empty response from {}.", self.addr)));
        }

        let text = std::str::from_utf8(&buf[..n])
            .map_err(|_| YumiError::Comm(format!("Non-UTF8 response from {}.", self.addr)))?;
        debug!(addr = %self.addr, "received {text:?}");

        RawResponse::parse(text)
    }

    pub fn close(&self) {
        debug!(addr = %self.addr, "closing arm socket");
        let _ = self.shutdown_handle.shutdown(Shutdown::Both);
    }
}

impl Drop for ArmSocket {
    fn drop(&mut self) {
        let _ = self.shutdown_handle.shutdown(Shutdown::Both);
    }
}
