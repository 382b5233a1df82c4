//! Linear memory layout of string constants.
//!
//! ```text
//! 0        4                                      heap start (8-aligned)
//! | heap   | len | utf-8 bytes | len | bytes | ... | free
//! ```

use rustc_hash::FxHashMap;

use super::emitter::{align_up, encode_bytes};

/// First address used for string constants.
pub const DATA_START: u32 = 4;

#[derive(Debug, Default)]
pub struct DataSegment {
    bytes: Vec<u8>,
    strings: FxHashMap<String, u32>,
}

impl DataSegment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address of a string constant, appending it on first use.
    pub fn string(&mut self, value: &str) -> u32 {
        if let Some(address) = self.strings.get(value) {
            return *address;
        }
        let address = DATA_START + self.bytes.len() as u32;
        self.bytes.extend_from_slice(&(value.len() as u32).to_le_bytes());
        self.bytes.extend_from_slice(value.as_bytes());
        self.strings.insert(value.to_string(), address);
        address
    }

    /// First free address after the constants.
    pub fn heap_start(&self) -> u32 {
        align_up(DATA_START + self.bytes.len() as u32, 8)
    }

    /// The whole segment, starting at address 0.
    pub fn bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(DATA_START as usize + self.bytes.len());
        out.extend_from_slice(&self.heap_start().to_le_bytes());
        out.extend_from_slice(&self.bytes);
        out
    }

    pub fn render(&self) -> String {
        format!("(data (i32.const 0) \"{}\")", encode_bytes(&self.bytes()))
    }
}
