// Author: Lukas Bower
// Purpose: Scripted debug stub and image fixtures shared by integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use adroscheck::{StopReason, SymbolTable, Target, TransportError};

/// Sparse memory image plus register file served by the scripted stub.
#[derive(Debug, Clone, Default)]
pub struct StubImage {
    pub memory: HashMap<u64, u8>,
    pub registers: HashMap<u8, u64>,
}

impl StubImage {
    pub fn put(&mut self, addr: u64, data: &[u8]) {
        for (index, byte) in data.iter().enumerate() {
            self.memory.insert(addr + index as u64, *byte);
        }
    }

    pub fn put_u32(&mut self, addr: u64, value: u32) {
        self.put(addr, &value.to_le_bytes());
    }

    pub fn put_u64(&mut self, addr: u64, value: u64) {
        self.put(addr, &value.to_le_bytes());
    }

    pub fn clear(&mut self, addr: u64, len: u64) {
        for offset in 0..len {
            self.memory.remove(&(addr + offset));
        }
    }

    fn read(&self, addr: u64, len: usize) -> Option<Vec<u8>> {
        (0..len as u64)
            .map(|offset| self.memory.get(&(addr + offset)).copied())
            .collect()
    }
}

/// Addresses used by the fixture image. Arbitrary but stable: data symbols
/// sit in the kernel's higher-half data segment, the heap block inside the
/// heap window.
pub const HEAD_SYM: u64 = 0xc010_2000;
pub const BITMAP_SYM: u64 = 0xc011_0000;
pub const MAX_FRAMES_SYM: u64 = 0xc011_4000;
pub const TOTAL_MEMORY_SYM: u64 = 0xc011_4008;
pub const CHECKPOINT_ADDR: u64 = 0xc010_0040;
pub const HEAP_BLOCK: u64 = 0xd000_1000;
pub const VGA_WINDOW: u64 = 0xc00b_8000;
pub const STACK_TOP: u64 = 0xc020_0000;
pub const RETURN_ADDR: u64 = 0xc010_0123;

/// Symbol table matching the fixture image.
pub fn stock_symbols() -> SymbolTable {
    SymbolTable::from_entries([
        ("process_init".to_owned(), CHECKPOINT_ADDR),
        ("head".to_owned(), HEAD_SYM),
        ("memory_bitmap".to_owned(), BITMAP_SYM),
        ("max_frames".to_owned(), MAX_FRAMES_SYM),
        ("total_memory".to_owned(), TOTAL_MEMORY_SYM),
    ])
}

/// Image of a correctly booted kernel: every suite check passes against it.
pub fn healthy_image() -> StubImage {
    let mut image = StubImage::default();
    image.put_u32(HEAD_SYM, HEAP_BLOCK as u32);
    image.put_u32(HEAP_BLOCK, 0xcafe_babe);
    image.put(BITMAP_SYM, &[0x01]);
    image.put_u64(MAX_FRAMES_SYM, 4096);
    image.put_u64(TOTAL_MEMORY_SYM, 512 * 1024 * 1024);
    image.put(VGA_WINDOW, &[0x41, 0x07, 0x41, 0x07]);
    // Stack for step-out: the word at [esp] is the checkpoint return address.
    image.put_u32(STACK_TOP, RETURN_ADDR as u32);
    image.registers.insert(4, STACK_TOP);
    image
}

/// Shared view of the control operations a [`MemTarget`] performed, so a
/// test can keep asserting after the target moves into a session.
#[derive(Debug, Default, Clone)]
pub struct ControlLog {
    pub breakpoints: Arc<Mutex<Vec<u64>>>,
    pub resumes: Arc<AtomicUsize>,
    pub killed: Arc<AtomicBool>,
    pub detached: Arc<AtomicBool>,
}

/// In-memory target over a [`StubImage`], for session tests that do not
/// need a socket.
#[derive(Debug, Default)]
pub struct MemTarget {
    pub image: StubImage,
    pub log: ControlLog,
}

impl MemTarget {
    pub fn new(image: StubImage) -> Self {
        Self {
            image,
            log: ControlLog::default(),
        }
    }
}

impl Target for MemTarget {
    fn read_mem(&mut self, addr: u64, len: usize) -> Result<Vec<u8>, TransportError> {
        self.image
            .read(addr, len)
            .ok_or(TransportError::Stub(0x14))
    }

    fn read_register(&mut self, regno: u8) -> Result<u64, TransportError> {
        self.image
            .registers
            .get(&regno)
            .copied()
            .ok_or(TransportError::Stub(0x01))
    }

    fn insert_breakpoint(&mut self, addr: u64) -> Result<(), TransportError> {
        self.log.breakpoints.lock().unwrap().push(addr);
        Ok(())
    }

    fn remove_breakpoint(&mut self, addr: u64) -> Result<(), TransportError> {
        self.log.breakpoints.lock().unwrap().retain(|bp| *bp != addr);
        Ok(())
    }

    fn resume(&mut self) -> Result<StopReason, TransportError> {
        self.log.resumes.fetch_add(1, Ordering::SeqCst);
        Ok(StopReason::Signal(5))
    }

    fn kill(&mut self) {
        self.log.killed.store(true, Ordering::SeqCst);
    }

    fn detach(&mut self) {
        self.log.detached.store(true, Ordering::SeqCst);
    }
}

/// Serve one scripted stub session on an ephemeral port.
///
/// The stub speaks just enough of the remote protocol for the client:
/// `?`, `m`, `p`, `Z0`/`z0`, `c`, `D`, and `k`. It answers every request
/// until the client kills, detaches, or closes the connection.
pub fn spawn_stub(image: StubImage) -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind stub listener");
    let port = listener.local_addr().expect("stub addr").port();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept checker");
        serve(stream, image);
    });
    (port, handle)
}

fn serve(mut stream: TcpStream, image: StubImage) {
    let mut reader = BufReader::new(stream.try_clone().expect("clone stub stream"));
    while let Some(request) = read_packet(&mut reader) {
        match handle(&image, &request) {
            Some(reply) => {
                stream.write_all(b"+").expect("stub ack");
                let framed = format!("${reply}#{:02x}", checksum(reply.as_bytes()));
                stream.write_all(framed.as_bytes()).expect("stub reply");
            }
            None => {
                // Kill: ack and drop the connection like QEMU does.
                let _ = stream.write_all(b"+");
                return;
            }
        }
    }
}

fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |sum, byte| sum.wrapping_add(*byte))
}

fn read_packet(reader: &mut impl Read) -> Option<String> {
    let mut byte = [0u8; 1];
    loop {
        if reader.read(&mut byte).ok()? == 0 {
            return None;
        }
        if byte[0] == b'$' {
            break;
        }
    }
    let mut payload = Vec::new();
    loop {
        if reader.read(&mut byte).ok()? == 0 {
            return None;
        }
        if byte[0] == b'#' {
            break;
        }
        payload.push(byte[0]);
    }
    let mut trailer = [0u8; 2];
    reader.read_exact(&mut trailer).ok()?;
    String::from_utf8(payload).ok()
}

fn handle(image: &StubImage, request: &str) -> Option<String> {
    if request == "?" || request == "c" {
        return Some("S05".to_owned());
    }
    if request == "k" {
        return None;
    }
    if request == "D" {
        return Some("OK".to_owned());
    }
    if request.starts_with("Z0,") || request.starts_with("z0,") {
        return Some("OK".to_owned());
    }
    if let Some(rest) = request.strip_prefix('m') {
        return Some(mem_reply(image, rest).unwrap_or_else(|| "E01".to_owned()));
    }
    if let Some(regno_text) = request.strip_prefix('p') {
        return Some(register_reply(image, regno_text).unwrap_or_else(|| "E01".to_owned()));
    }
    // Anything else is unsupported; the empty packet says so.
    Some(String::new())
}

fn mem_reply(image: &StubImage, args: &str) -> Option<String> {
    let (addr_text, len_text) = args.split_once(',')?;
    let addr = u64::from_str_radix(addr_text, 16).ok()?;
    let len = usize::from_str_radix(len_text, 16).ok()?;
    Some(match image.read(addr, len) {
        Some(bytes) => hex::encode(bytes),
        None => "E14".to_owned(),
    })
}

fn register_reply(image: &StubImage, regno_text: &str) -> Option<String> {
    let regno = u8::from_str_radix(regno_text, 16).ok()?;
    let value = *image.registers.get(&regno)?;
    Some(hex::encode((value as u32).to_le_bytes()))
}
