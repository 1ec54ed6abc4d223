use std::io;
use std::io::ErrorKind;
use std::io::Read;
use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Error, Result};

pub const PROMPT: u8 = b'>';
pub const LINE_END: &str = "\r\n";

pub const BTX_MAGIC: u8 = 0xB7;
pub const BTX_VERSION: u8 = 1;
pub const BTX_HEADER_LENGTH: usize = 8;

/// Request/reply channel to the controller. One request is in flight at a
/// time, the protocol has no pipelining.
pub trait Transport: Send {
    /// Sends one command line and returns the answer line
    fn request(&mut self, command: &str) -> Result<String>;
    fn send_file(&mut self, name: &str, data: &[u8]) -> Result<()>;
}

/// CRC-16/XMODEM, polynomial 0x1021, initial value 0
pub fn crc16_xmodem(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Header of a BTX transfer: magic, version, length and CRC of the payload,
/// both big endian.
pub fn btx_header(payload: &[u8]) -> [u8; BTX_HEADER_LENGTH] {
    let mut header = [0u8; BTX_HEADER_LENGTH];
    header[0] = BTX_MAGIC;
    header[1] = BTX_VERSION;
    header[2..6].copy_from_slice(&(payload.len() as u32).to_be_bytes());
    header[6..8].copy_from_slice(&crc16_xmodem(payload).to_be_bytes());
    header
}

/// Reads up to the prompt. Line ends before the prompt are dropped.
fn read_reply(inp: &mut dyn Read) -> io::Result<String> {
    let mut reply = Vec::new();
    let mut buf = [0u8; 1];
    loop {
        match inp.read(&mut buf) {
            Ok(0) => {
                return Err(io::Error::new(ErrorKind::UnexpectedEof,
                                          "connection closed before prompt"))
            }
            Ok(_) => {
                if buf[0] == PROMPT {
                    let reply = String::from_utf8_lossy(&reply);
                    return Ok(reply.trim_end_matches(&['\r', '\n'][..]).to_string());
                }
                reply.push(buf[0]);
            }
            Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn connect(address: &str, reply_timeout: Duration) -> Result<TcpTransport> {
        let connection_error = |source| Error::Connection {
            address: address.to_string(),
            source,
        };
        let socket = address
            .to_socket_addrs()
            .map_err(connection_error)?
            .next()
            .ok_or_else(|| connection_error(io::Error::new(ErrorKind::NotFound, "no address")))?;
        let stream = TcpStream::connect_timeout(&socket, reply_timeout).map_err(connection_error)?;
        stream.set_read_timeout(Some(reply_timeout)).map_err(connection_error)?;
        stream.set_nodelay(true).map_err(connection_error)?;
        info!(address, "connected to SmartMove controller");
        let mut transport = TcpTransport { stream };
        // greeting ends with the first prompt
        read_reply(&mut transport.stream)?;
        Ok(transport)
    }
}

impl Transport for TcpTransport {
    fn request(&mut self, command: &str) -> Result<String> {
        self.stream.write_all(command.as_bytes())?;
        self.stream.write_all(LINE_END.as_bytes())?;
        let reply = read_reply(&mut self.stream)?;
        debug!(command, reply = %reply, "request");
        Ok(reply)
    }

    fn send_file(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let announce = format!("S FILE_NAME {}", name);
        let reply = self.request(&announce)?;
        if reply.trim_end() != announce {
            return Err(Error::UnexpectedReply { command: announce, reply });
        }
        self.stream.write_all(&btx_header(data))?;
        self.stream.write_all(data)?;
        let reply = read_reply(&mut self.stream)?;
        if reply.starts_with("ERR") {
            return Err(Error::UnexpectedReply {
                command: format!("BTX {} ({} bytes)", name, data.len()),
                reply,
            });
        }
        debug!(name, bytes = data.len(), "file transferred");
        Ok(())
    }
}

/// Answers writes with their echo and reads with value 0. Keeps all lines
/// and files. For dry runs and tests.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub requests: Vec<String>,
    pub files: Vec<(String, Vec<u8>)>,
}

impl RecordingTransport {
    pub fn new() -> RecordingTransport {
        RecordingTransport::default()
    }
}

impl Transport for RecordingTransport {
    fn request(&mut self, command: &str) -> Result<String> {
        self.requests.push(command.to_string());
        if command.starts_with("G ") {
            Ok(format!("{}0", command))
        } else {
            Ok(command.to_string())
        }
    }

    fn send_file(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.files.push((name.to_string(), data.to_vec()));
        Ok(())
    }
}
