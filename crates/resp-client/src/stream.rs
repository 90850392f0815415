//! Buffered plain or TLS stream carrying RESP frames.

use crate::resp::{encode_command, read_value, Value};
use crate::tls;
use loadgen_core::{ClientError, Command, ConnectionConfig, NodeAddress};
use rustls::{ClientConfig, ClientConnection, StreamOwned};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

enum Transport {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl Transport {
    fn tcp(&self) -> &TcpStream {
        match self {
            Transport::Plain(s) => s,
            Transport::Tls(s) => s.get_ref(),
        }
    }
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Transport::Plain(s) => s.read(buf),
            Transport::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Transport::Plain(s) => s.write(buf),
            Transport::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Transport::Plain(s) => s.flush(),
            Transport::Tls(s) => s.flush(),
        }
    }
}

/// One open connection with its read buffer.
pub(crate) struct Stream {
    reader: BufReader<Transport>,
    write_buf: Vec<u8>,
}

impl Stream {
    /// Resolve, connect and (optionally) wrap the socket in TLS.
    pub(crate) fn open(
        node: &NodeAddress,
        config: &ConnectionConfig,
        tls_config: Option<&Arc<ClientConfig>>,
    ) -> Result<Self, ClientError> {
        let addrs: Vec<_> = (node.host.as_str(), node.port)
            .to_socket_addrs()
            .map_err(|e| ClientError::Resolve(format!("{node}: {e}")))?
            .collect();
        if addrs.is_empty() {
            return Err(ClientError::Resolve(format!("{node}: no addresses")));
        }

        let mut last_error = None;
        let mut tcp = None;
        for addr in &addrs {
            match TcpStream::connect_timeout(addr, config.connect_timeout) {
                Ok(s) => {
                    tcp = Some(s);
                    break;
                }
                Err(e) => {
                    tracing::debug!("Connect to {addr} failed: {e}");
                    last_error = Some(e);
                }
            }
        }
        let tcp = match tcp {
            Some(s) => s,
            None => {
                return Err(ClientError::Io(last_error.unwrap_or_else(|| {
                    io::Error::new(io::ErrorKind::NotConnected, "no address reachable")
                })))
            }
        };

        tcp.set_nodelay(true)?;
        tcp.set_read_timeout(Some(config.socket_timeout))?;
        tcp.set_write_timeout(Some(config.socket_timeout))?;

        let transport = match tls_config {
            Some(tls_config) => {
                let name = tls::server_name(&config.tls, &node.host)?;
                let conn = ClientConnection::new(tls_config.clone(), name)
                    .map_err(|e| ClientError::Tls(e.to_string()))?;
                Transport::Tls(Box::new(StreamOwned::new(conn, tcp)))
            }
            None => Transport::Plain(tcp),
        };

        Ok(Self {
            reader: BufReader::new(transport),
            write_buf: Vec::with_capacity(256),
        })
    }

    /// Write every command and flush once.
    pub(crate) fn send(&mut self, commands: &[Command]) -> Result<(), ClientError> {
        self.write_buf.clear();
        for command in commands {
            encode_command(command, &mut self.write_buf);
        }
        let transport = self.reader.get_mut();
        transport.write_all(&self.write_buf)?;
        transport.flush()?;
        Ok(())
    }

    pub(crate) fn receive(&mut self) -> Result<Value, ClientError> {
        read_value(&mut self.reader)
    }

    pub(crate) fn request(&mut self, command: &Command) -> Result<Value, ClientError> {
        self.send(std::slice::from_ref(command))?;
        self.receive()
    }

    /// Whether unread bytes are already buffered.
    pub(crate) fn has_buffered(&self) -> bool {
        !self.reader.buffer().is_empty()
    }

    /// Wait up to `timeout` for the next byte without consuming anything.
    ///
    /// Returns `false` on timeout. A timeout here never splits a frame, since
    /// nothing is taken out of the buffer.
    pub(crate) fn wait_readable(&mut self, timeout: Duration) -> Result<bool, ClientError> {
        if self.has_buffered() {
            return Ok(true);
        }
        self.set_read_timeout(timeout)?;
        match self.reader.fill_buf() {
            Ok([]) => Err(ClientError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by server",
            ))),
            Ok(_) => Ok(true),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(false)
            }
            Err(e) => Err(ClientError::Io(e)),
        }
    }

    pub(crate) fn set_read_timeout(&self, timeout: Duration) -> Result<(), ClientError> {
        self.reader.get_ref().tcp().set_read_timeout(Some(timeout))?;
        Ok(())
    }

    pub(crate) fn shutdown(&mut self) {
        if let Transport::Tls(s) = self.reader.get_mut() {
            s.conn.send_close_notify();
            let _ = s.flush();
        }
        let _ = self.reader.get_ref().tcp().shutdown(Shutdown::Both);
    }
}
