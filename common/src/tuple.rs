//! Order-preserving tuple encoding.
//!
//! Keys in this workspace are packed tuples: sequences of typed elements
//! encoded so that the byte order of the packed form equals the element-wise
//! order of the values. Integers in particular must sort numerically
//! (`-1 < 0 < 1 < 2 …`) at the byte level, since record sub-keys rely on a
//! signed suffix to order version entries before data entries.
//!
//! Supported element types and their type codes:
//!
//! ```text
//! 0x01  byte string   (0x00 escaped as 0x00 0xFF, 0x00 terminated)
//! 0x02  UTF-8 string  (same escaping)
//! 0x0c..0x1c  integer (0x14 = zero; code offset encodes sign and width)
//! 0x33  versionstamp  (12 bytes: 10 transaction bytes + 2 user bytes)
//! ```

use bytes::{BufMut, Bytes, BytesMut};

/// Total length of a versionstamp in bytes.
pub const VERSIONSTAMP_LENGTH: usize = 12;

/// Length of the transaction-assigned portion of a versionstamp.
pub const TRANSACTION_VERSION_LENGTH: usize = 10;

const BYTES_CODE: u8 = 0x01;
const STRING_CODE: u8 = 0x02;
const INT_ZERO_CODE: u8 = 0x14;
const VERSIONSTAMP_CODE: u8 = 0x33;

const ESCAPE: u8 = 0xFF;
const TERMINATOR: u8 = 0x00;

/// Tuple encoding or decoding error with a descriptive message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleError {
    pub message: String,
}

impl std::error::Error for TupleError {}

impl std::fmt::Display for TupleError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

fn tuple_err(message: impl Into<String>) -> TupleError {
    TupleError {
        message: message.into(),
    }
}

/// A 12-byte commit token: 10 transaction bytes assigned by the store at
/// commit time plus 2 caller-supplied user bytes.
///
/// An *incomplete* stamp has placeholder (`0xFF`) transaction bytes and is
/// only meaningful inside the transaction that will resolve it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Versionstamp {
    bytes: [u8; VERSIONSTAMP_LENGTH],
    complete: bool,
}

impl Versionstamp {
    /// Creates a complete stamp from resolved transaction bytes and a user version.
    pub fn complete(transaction_version: [u8; TRANSACTION_VERSION_LENGTH], user_version: u16) -> Self {
        let mut bytes = [0u8; VERSIONSTAMP_LENGTH];
        bytes[..TRANSACTION_VERSION_LENGTH].copy_from_slice(&transaction_version);
        bytes[TRANSACTION_VERSION_LENGTH..].copy_from_slice(&user_version.to_be_bytes());
        Self {
            bytes,
            complete: true,
        }
    }

    /// Creates an incomplete stamp carrying only the user version.
    pub fn incomplete(user_version: u16) -> Self {
        let mut bytes = [0xFFu8; VERSIONSTAMP_LENGTH];
        bytes[TRANSACTION_VERSION_LENGTH..].copy_from_slice(&user_version.to_be_bytes());
        Self {
            bytes,
            complete: false,
        }
    }

    /// Reinterprets 12 raw bytes as a complete stamp (the form read back from
    /// the store after commit).
    pub fn from_bytes(bytes: [u8; VERSIONSTAMP_LENGTH]) -> Self {
        Self {
            bytes,
            complete: true,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn user_version(&self) -> u16 {
        u16::from_be_bytes([
            self.bytes[TRANSACTION_VERSION_LENGTH],
            self.bytes[TRANSACTION_VERSION_LENGTH + 1],
        ])
    }

    pub fn as_bytes(&self) -> &[u8; VERSIONSTAMP_LENGTH] {
        &self.bytes
    }
}

/// A single tuple element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    Bytes(Bytes),
    Str(String),
    Int(i64),
    Versionstamp(Versionstamp),
}

/// An ordered sequence of typed elements with an order-preserving packed form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tuple {
    elements: Vec<Element>,
}

impl Tuple {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_elements(elements: Vec<Element>) -> Self {
        Self { elements }
    }

    pub fn add_bytes(mut self, value: impl Into<Bytes>) -> Self {
        self.elements.push(Element::Bytes(value.into()));
        self
    }

    pub fn add_str(mut self, value: impl Into<String>) -> Self {
        self.elements.push(Element::Str(value.into()));
        self
    }

    pub fn add_int(mut self, value: i64) -> Self {
        self.elements.push(Element::Int(value));
        self
    }

    pub fn add_versionstamp(mut self, value: Versionstamp) -> Self {
        self.elements.push(Element::Versionstamp(value));
        self
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn get(&self, index: usize) -> Option<&Element> {
        self.elements.get(index)
    }

    /// Returns the element at `index` as an integer.
    pub fn get_int(&self, index: usize) -> Result<i64, TupleError> {
        match self.elements.get(index) {
            Some(Element::Int(v)) => Ok(*v),
            Some(other) => Err(tuple_err(format!(
                "element {} is not an integer: {:?}",
                index, other
            ))),
            None => Err(tuple_err(format!("no element at index {}", index))),
        }
    }

    /// Returns the element at `index` as a versionstamp.
    pub fn get_versionstamp(&self, index: usize) -> Result<Versionstamp, TupleError> {
        match self.elements.get(index) {
            Some(Element::Versionstamp(v)) => Ok(*v),
            Some(other) => Err(tuple_err(format!(
                "element {} is not a versionstamp: {:?}",
                index, other
            ))),
            None => Err(tuple_err(format!("no element at index {}", index))),
        }
    }

    /// Splits off the last element, returning the shortened tuple and the element.
    pub fn split_last(mut self) -> Result<(Tuple, Element), TupleError> {
        match self.elements.pop() {
            Some(last) => Ok((self, last)),
            None => Err(tuple_err("cannot split the last element of an empty tuple")),
        }
    }

    /// Packs the tuple into its order-preserving byte form.
    pub fn pack(&self) -> Bytes {
        let mut buf = BytesMut::new();
        for element in &self.elements {
            pack_element(element, &mut buf);
        }
        buf.freeze()
    }

    /// Packs a tuple containing exactly one incomplete versionstamp, appending
    /// the little-endian u32 offset of the stamp's bytes.
    ///
    /// The result is the value submitted with a versionstamped-value mutation:
    /// the store reads the trailing offset, splices the resolved transaction
    /// bytes at that position, and drops the tail.
    pub fn pack_with_versionstamp(&self) -> Result<Bytes, TupleError> {
        let mut buf = BytesMut::new();
        let mut stamp_offset: Option<u32> = None;
        for element in &self.elements {
            if let Element::Versionstamp(v) = element {
                if !v.is_complete() {
                    if stamp_offset.is_some() {
                        return Err(tuple_err(
                            "tuple contains more than one incomplete versionstamp",
                        ));
                    }
                    // Offset of the stamp bytes, just past the type code
                    stamp_offset = Some(buf.len() as u32 + 1);
                }
            }
            pack_element(element, &mut buf);
        }
        match stamp_offset {
            Some(offset) => {
                buf.put_u32_le(offset);
                Ok(buf.freeze())
            }
            None => Err(tuple_err("tuple contains no incomplete versionstamp")),
        }
    }

    /// Decodes a packed tuple, consuming the entire input.
    pub fn unpack(data: &[u8]) -> Result<Tuple, TupleError> {
        let mut elements = Vec::new();
        let mut rest = data;
        while !rest.is_empty() {
            let (element, remainder) = unpack_element(rest)?;
            elements.push(element);
            rest = remainder;
        }
        Ok(Tuple { elements })
    }
}

fn pack_element(element: &Element, buf: &mut BytesMut) {
    match element {
        Element::Bytes(value) => {
            buf.put_u8(BYTES_CODE);
            put_escaped(value, buf);
        }
        Element::Str(value) => {
            buf.put_u8(STRING_CODE);
            put_escaped(value.as_bytes(), buf);
        }
        Element::Int(value) => pack_int(*value, buf),
        Element::Versionstamp(value) => {
            buf.put_u8(VERSIONSTAMP_CODE);
            buf.put_slice(value.as_bytes());
        }
    }
}

fn put_escaped(data: &[u8], buf: &mut BytesMut) {
    for &b in data {
        buf.put_u8(b);
        if b == TERMINATOR {
            buf.put_u8(ESCAPE);
        }
    }
    buf.put_u8(TERMINATOR);
}

/// Number of big-endian bytes needed to represent a non-zero magnitude.
fn magnitude_len(magnitude: u64) -> usize {
    ((64 - magnitude.leading_zeros() as usize) + 7) / 8
}

fn pack_int(value: i64, buf: &mut BytesMut) {
    if value == 0 {
        buf.put_u8(INT_ZERO_CODE);
    } else if value > 0 {
        let len = magnitude_len(value as u64);
        buf.put_u8(INT_ZERO_CODE + len as u8);
        buf.put_slice(&value.to_be_bytes()[8 - len..]);
    } else {
        // Negatives are stored offset by 2^(8*len) - 1, so that byte order
        // matches numeric order within and across widths.
        let magnitude = (value as i128).unsigned_abs() as u64;
        let len = magnitude_len(magnitude);
        let encoded = (value as i128 + (1i128 << (8 * len)) - 1) as u64;
        buf.put_u8(INT_ZERO_CODE - len as u8);
        buf.put_slice(&encoded.to_be_bytes()[8 - len..]);
    }
}

fn unpack_element(data: &[u8]) -> Result<(Element, &[u8]), TupleError> {
    let (&code, rest) = data
        .split_first()
        .ok_or_else(|| tuple_err("empty input for tuple element"))?;
    match code {
        BYTES_CODE => {
            let (value, rest) = take_escaped(rest)?;
            Ok((Element::Bytes(value), rest))
        }
        STRING_CODE => {
            let (value, rest) = take_escaped(rest)?;
            let s = String::from_utf8(value.to_vec())
                .map_err(|e| tuple_err(format!("invalid UTF-8 in tuple string: {}", e)))?;
            Ok((Element::Str(s), rest))
        }
        VERSIONSTAMP_CODE => {
            if rest.len() < VERSIONSTAMP_LENGTH {
                return Err(tuple_err(format!(
                    "truncated versionstamp: need {} bytes, have {}",
                    VERSIONSTAMP_LENGTH,
                    rest.len()
                )));
            }
            let mut bytes = [0u8; VERSIONSTAMP_LENGTH];
            bytes.copy_from_slice(&rest[..VERSIONSTAMP_LENGTH]);
            Ok((
                Element::Versionstamp(Versionstamp::from_bytes(bytes)),
                &rest[VERSIONSTAMP_LENGTH..],
            ))
        }
        code if code == INT_ZERO_CODE => Ok((Element::Int(0), rest)),
        code if code > INT_ZERO_CODE && code <= INT_ZERO_CODE + 8 => {
            let len = (code - INT_ZERO_CODE) as usize;
            let (raw, rest) = take_int_bytes(rest, len)?;
            if raw > i64::MAX as u64 {
                return Err(tuple_err(format!("integer out of range: {}", raw)));
            }
            Ok((Element::Int(raw as i64), rest))
        }
        code if code < INT_ZERO_CODE && code >= INT_ZERO_CODE - 8 => {
            let len = (INT_ZERO_CODE - code) as usize;
            let (raw, rest) = take_int_bytes(rest, len)?;
            let value = raw as i128 - (1i128 << (8 * len)) + 1;
            if value < i64::MIN as i128 {
                return Err(tuple_err(format!("integer out of range: {}", value)));
            }
            Ok((Element::Int(value as i64), rest))
        }
        other => Err(tuple_err(format!(
            "unknown tuple type code: 0x{:02x}",
            other
        ))),
    }
}

fn take_int_bytes(data: &[u8], len: usize) -> Result<(u64, &[u8]), TupleError> {
    if data.len() < len {
        return Err(tuple_err(format!(
            "truncated integer: need {} bytes, have {}",
            len,
            data.len()
        )));
    }
    let mut raw = [0u8; 8];
    raw[8 - len..].copy_from_slice(&data[..len]);
    Ok((u64::from_be_bytes(raw), &data[len..]))
}

fn take_escaped(data: &[u8]) -> Result<(Bytes, &[u8]), TupleError> {
    let mut out = BytesMut::new();
    let mut i = 0;
    while i < data.len() {
        if data[i] == TERMINATOR {
            if data.get(i + 1) == Some(&ESCAPE) {
                out.put_u8(TERMINATOR);
                i += 2;
            } else {
                return Ok((out.freeze(), &data[i + 1..]));
            }
        } else {
            out.put_u8(data[i]);
            i += 1;
        }
    }
    Err(tuple_err("unterminated byte string in tuple"))
}
