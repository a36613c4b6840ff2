//! Blocking probe client.
//!
//! Opens one TCP connection, writes the configured request verbatim, reads
//! until the peer closes the connection and prints what came back. There is
//! no retry and no timeout: every socket failure ends the run.

use crate::config::Config;
use bytes::{Bytes, BytesMut};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use tracing::{debug, info, warn};

/// Starting size of the response accumulator; it grows as chunks arrive
const INITIAL_CAPACITY: usize = 4096;

/// A single request/response exchange against one server.
pub struct Client<'a> {
    address: &'a str,
    request: &'a str,
    read_chunk_size: usize,
}

impl<'a> Client<'a> {
    /// Create a client from the resolved configuration.
    pub fn new(config: &'a Config) -> Self {
        Self {
            address: &config.address,
            request: &config.request,
            read_chunk_size: config.read_chunk_size,
        }
    }

    /// Run the whole exchange, writing the transcript to `output`.
    ///
    /// Returns the decoded response text.
    pub fn run<W: Write>(&self, output: &mut W) -> Result<String, ClientError> {
        let response = self.fetch(output)?;
        let text = decode(&response)?;

        writeln!(output, "Response received from server completely:\n{text}")
            .map_err(ClientError::Output)?;
        info!(bytes = response.len(), "Response received");

        Ok(text.to_owned())
    }

    /// Connect, send the request and collect every byte until the peer closes.
    pub fn fetch<W: Write>(&self, output: &mut W) -> Result<Bytes, ClientError> {
        let mut stream = connect(self.address)?;
        writeln!(output, "Connected to the server").map_err(ClientError::Output)?;

        writeln!(output, "Sending request to server:\n{}", self.request)
            .map_err(ClientError::Output)?;
        send(&mut stream, self.request.as_bytes())?;
        writeln!(output, "Request sent successfully").map_err(ClientError::Output)?;

        writeln!(output, "Now read response from server").map_err(ClientError::Output)?;
        read_until_closed(&mut stream, self.read_chunk_size)
    }
}

/// Resolve `address` and open a connection to the first socket address that
/// accepts. If none does, the last failure is returned.
pub fn connect(address: &str) -> Result<TcpStream, ClientError> {
    let addrs = address
        .to_socket_addrs()
        .map_err(|e| ClientError::Resolve(address.to_string(), e))?;

    let mut last_error = None;
    for addr in addrs {
        info!(%addr, "Connecting");
        match open_stream(addr) {
            Ok(stream) => {
                info!(%addr, "Connected");
                return Ok(stream);
            }
            Err(e) => {
                debug!(%addr, error = %e, "Connect attempt failed");
                last_error = Some(ClientError::Connect(addr.to_string(), e));
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        ClientError::Resolve(
            address.to_string(),
            io::Error::new(io::ErrorKind::NotFound, "no socket addresses"),
        )
    }))
}

/// Create a blocking TCP stream connected to `addr`.
fn open_stream(addr: SocketAddr) -> io::Result<TcpStream> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.connect(&addr.into())?;

    Ok(socket.into())
}

/// Write the whole request, then flush.
pub fn send<W: Write>(stream: &mut W, request: &[u8]) -> Result<(), ClientError> {
    stream.write_all(request).map_err(ClientError::Send)?;
    stream.flush().map_err(ClientError::Send)?;
    debug!(bytes = request.len(), "Request written");
    Ok(())
}

/// Read at most `chunk_size` bytes at a time, appending every chunk to the
/// accumulator, until a read returns no data.
///
/// Never returns while the peer keeps the connection open.
pub fn read_until_closed<R: Read>(stream: &mut R, chunk_size: usize) -> Result<Bytes, ClientError> {
    let mut accumulator = BytesMut::with_capacity(INITIAL_CAPACITY);
    let mut chunk = vec![0u8; chunk_size];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => {
                debug!(total = accumulator.len(), "Connection closed by server");
                break;
            }
            Ok(n) => {
                accumulator.extend_from_slice(&chunk[..n]);
                debug!(chunk = n, total = accumulator.len(), "Received chunk");
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                warn!("Read interrupted, retrying");
            }
            Err(e) => return Err(ClientError::Receive(e)),
        }
    }

    Ok(accumulator.freeze())
}

/// Strict UTF-8 decoding of the accumulated response.
pub fn decode(response: &[u8]) -> Result<&str, ClientError> {
    std::str::from_utf8(response).map_err(ClientError::Decode)
}

/// Errors that end a probe run.
#[derive(Debug)]
pub enum ClientError {
    Resolve(String, io::Error),
    Connect(String, io::Error),
    Send(io::Error),
    Receive(io::Error),
    Decode(std::str::Utf8Error),
    Output(io::Error),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Resolve(address, e) => {
                write!(f, "Failed to resolve address '{address}': {e}")
            }
            ClientError::Connect(address, e) => {
                write!(f, "Failed to connect to '{address}': {e}")
            }
            ClientError::Send(e) => write!(f, "Failed to send request: {e}"),
            ClientError::Receive(e) => write!(f, "Failed to read response: {e}"),
            ClientError::Decode(e) => write!(f, "Response is not valid UTF-8: {e}"),
            ClientError::Output(e) => write!(f, "Failed to write output: {e}"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Resolve(_, e)
            | ClientError::Connect(_, e)
            | ClientError::Send(e)
            | ClientError::Receive(e)
            | ClientError::Output(e) => Some(e),
            ClientError::Decode(e) => Some(e),
        }
    }
}
