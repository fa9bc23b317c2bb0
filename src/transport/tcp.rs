// Author: Lukas Bower
//! TCP client for the GDB remote serial protocol.

use std::io::{BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::debug;

use crate::proto::{self, Reply, StopReason, WireError};
use crate::transport::{ConnectError, Target, TransportError};

/// Software breakpoint kind for i386 targets (`int3` is one byte).
const SW_BREAKPOINT_KIND: u8 = 1;

/// Blocking TCP connection to a remote debug stub.
///
/// One instance owns the socket for the whole run. Requests are framed by
/// [`crate::proto`], acknowledged per the protocol's plain ack mode, and
/// bounded by the socket timeout supplied at connect time.
#[derive(Debug)]
pub struct GdbRemote {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl GdbRemote {
    /// Connect to a stub and verify it responds to a status probe.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, ConnectError> {
        let endpoint = format!("{host}:{port}");
        let addr = endpoint
            .to_socket_addrs()
            .map_err(|_| ConnectError::Resolve(endpoint.clone()))?
            .next()
            .ok_or_else(|| ConnectError::Resolve(endpoint.clone()))?;
        let stream = TcpStream::connect_timeout(&addr, timeout).map_err(|source| {
            ConnectError::Unreachable {
                endpoint: endpoint.clone(),
                source,
            }
        })?;
        stream
            .set_read_timeout(Some(timeout))
            .and_then(|()| stream.set_write_timeout(Some(timeout)))
            .map_err(|source| ConnectError::Unreachable {
                endpoint: endpoint.clone(),
                source,
            })?;
        let reader_stream = stream.try_clone().map_err(|source| ConnectError::Unreachable {
            endpoint,
            source,
        })?;
        let mut remote = Self {
            stream,
            reader: BufReader::new(reader_stream),
        };
        // `?` asks why the target last stopped; any well-formed reply proves
        // the peer actually speaks the protocol.
        remote.exchange("?")?;
        Ok(remote)
    }

    fn send(&mut self, payload: &str) -> Result<(), TransportError> {
        debug!("-> {payload}");
        self.stream.write_all(&proto::frame(payload))?;
        self.stream.flush()?;
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, TransportError> {
        let mut buf = [0u8; 1];
        match self.reader.read(&mut buf) {
            Ok(0) => Err(TransportError::Closed),
            Ok(_) => Ok(buf[0]),
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    fn read_packet(&mut self) -> Result<String, TransportError> {
        loop {
            if self.read_byte()? == b'$' {
                break;
            }
        }
        let mut raw = Vec::new();
        loop {
            let byte = self.read_byte()?;
            if byte == b'#' {
                break;
            }
            raw.push(byte);
        }
        let trailer = [self.read_byte()?, self.read_byte()?];
        let text = std::str::from_utf8(&trailer).ok().and_then(|text| {
            u8::from_str_radix(text, 16).ok()
        });
        let expected = proto::checksum(&raw);
        match text {
            Some(actual) if actual == expected => {}
            Some(actual) => {
                return Err(WireError::Checksum { expected, actual }.into());
            }
            None => return Err(WireError::NonText.into()),
        }
        self.stream.write_all(b"+")?;
        let payload = String::from_utf8(raw).map_err(|_| WireError::NonText)?;
        Ok(proto::expand_rle(&payload)?)
    }

    /// Issue one request and classify the stub's reply.
    fn exchange(&mut self, payload: &str) -> Result<Reply, TransportError> {
        self.send(payload)?;
        loop {
            match self.read_byte()? {
                b'+' => break,
                b'-' => return Err(TransportError::Nak),
                _ => {}
            }
        }
        let reply = self.read_packet()?;
        debug!("<- {reply}");
        Ok(proto::classify(&reply))
    }
}

impl Target for GdbRemote {
    fn read_mem(&mut self, addr: u64, len: usize) -> Result<Vec<u8>, TransportError> {
        match self.exchange(&format!("m{addr:x},{len:x}"))? {
            Reply::Data(payload) => {
                hex::decode(&payload).map_err(|_| WireError::Hex(payload).into())
            }
            Reply::Error(code) => Err(TransportError::Stub(code)),
            Reply::Empty => Err(TransportError::Unsupported("m".to_owned())),
            other => Err(WireError::Unexpected(format!("{other:?}")).into()),
        }
    }

    fn read_register(&mut self, regno: u8) -> Result<u64, TransportError> {
        match self.exchange(&format!("p{regno:x}"))? {
            Reply::Data(payload) => Ok(proto::decode_hex_le(&payload)?),
            Reply::Error(code) => Err(TransportError::Stub(code)),
            Reply::Empty => Err(TransportError::Unsupported("p".to_owned())),
            other => Err(WireError::Unexpected(format!("{other:?}")).into()),
        }
    }

    fn insert_breakpoint(&mut self, addr: u64) -> Result<(), TransportError> {
        match self.exchange(&format!("Z0,{addr:x},{SW_BREAKPOINT_KIND}"))? {
            Reply::Ok => Ok(()),
            Reply::Error(code) => Err(TransportError::Stub(code)),
            Reply::Empty => Err(TransportError::Unsupported("Z0".to_owned())),
            other => Err(WireError::Unexpected(format!("{other:?}")).into()),
        }
    }

    fn remove_breakpoint(&mut self, addr: u64) -> Result<(), TransportError> {
        match self.exchange(&format!("z0,{addr:x},{SW_BREAKPOINT_KIND}"))? {
            Reply::Ok => Ok(()),
            Reply::Error(code) => Err(TransportError::Stub(code)),
            Reply::Empty => Err(TransportError::Unsupported("z0".to_owned())),
            other => Err(WireError::Unexpected(format!("{other:?}")).into()),
        }
    }

    fn resume(&mut self) -> Result<StopReason, TransportError> {
        match self.exchange("c")? {
            Reply::Stop(reason) => Ok(reason),
            Reply::Error(code) => Err(TransportError::Stub(code)),
            other => Err(WireError::Unexpected(format!("{other:?}")).into()),
        }
    }

    fn kill(&mut self) {
        // The stub may tear the connection down without replying; send and
        // drain one byte so the ack does not linger in the kernel buffer.
        if let Err(err) = self.send("k") {
            debug!("kill request failed: {err}");
            return;
        }
        let _ = self.read_byte();
    }

    fn detach(&mut self) {
        match self.exchange("D") {
            Ok(Reply::Ok) => {}
            Ok(other) => debug!("unexpected detach reply: {other:?}"),
            Err(err) => debug!("detach failed: {err}"),
        }
    }
}
