use std::io;
use std::net::SocketAddr;

use bytes::BytesMut;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio_util::codec::{Decoder, Encoder};

use crate::core::{Error, Result, MAX_DATAGRAM_SIZE};
use crate::protocol::{Frame, FrameCodec, Inbound};

/// Broadcast-capable UDP socket carrying chat frames
#[derive(Debug)]
pub struct ChatSocket {
    /// The underlying UDP socket
    socket: UdpSocket,
    /// Frame codec
    codec: FrameCodec,
    /// Segment broadcast address
    broadcast_addr: SocketAddr,
    /// Buffer for receiving data
    recv_buffer: Vec<u8>,
    /// Buffer for encoding outgoing frames
    send_buffer: BytesMut,
}

impl ChatSocket {
    /// Binds a socket with broadcast and address reuse enabled.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(bind_addr: SocketAddr, broadcast_addr: SocketAddr) -> Result<Self> {
        let socket = Self::configure(bind_addr)
            .map_err(|e| Error::network(format!("Failed to bind {}: {}", bind_addr, e)))?;
        let socket = UdpSocket::from_std(socket.into())
            .map_err(|e| Error::network(format!("Failed to register socket: {}", e)))?;

        Ok(ChatSocket {
            socket,
            codec: FrameCodec::new(),
            broadcast_addr,
            // one spare byte so oversized datagrams are detectable
            recv_buffer: vec![0u8; MAX_DATAGRAM_SIZE + 1],
            send_buffer: BytesMut::with_capacity(MAX_DATAGRAM_SIZE + 1),
        })
    }

    fn configure(bind_addr: SocketAddr) -> io::Result<Socket> {
        let socket = Socket::new(Domain::for_address(bind_addr), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        if bind_addr.is_ipv4() {
            socket.set_broadcast(true)?;
        }
        socket.set_nonblocking(true)?;
        socket.bind(&bind_addr.into())?;
        Ok(socket)
    }

    /// Returns the local socket address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| Error::network(format!("Failed to get local address: {}", e)))
    }

    pub fn broadcast_addr(&self) -> SocketAddr {
        self.broadcast_addr
    }

    /// Sends a frame to one address
    pub async fn send_frame(&mut self, frame: Frame, to: SocketAddr) -> Result<()> {
        self.send_buffer.clear();
        self.codec.encode(frame, &mut self.send_buffer)?;
        self.socket
            .send_to(&self.send_buffer, to)
            .await
            .map_err(|e| Error::network(format!("Failed to send to {}: {}", to, e)))?;
        Ok(())
    }

    /// Sends a frame to the broadcast address
    pub async fn broadcast_frame(&mut self, frame: Frame) -> Result<()> {
        let to = self.broadcast_addr;
        self.send_frame(frame, to).await
    }

    /// Takes one pending datagram without waiting.
    ///
    /// Returns `Ok(None)` if nothing has arrived. Empty datagrams are
    /// consumed and also yield `Ok(None)`.
    pub fn try_recv(&mut self) -> Result<Option<Inbound>> {
        match self.socket.try_recv_from(&mut self.recv_buffer) {
            Ok((len, from)) => {
                let mut datagram = BytesMut::from(&self.recv_buffer[..len]);
                let inbound = self
                    .codec
                    .decode(&mut datagram)?
                    .map(|(frame, raw)| Inbound { from, frame, raw });
                Ok(inbound)
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(Error::network(format!("Failed to receive: {}", e))),
        }
    }
}
