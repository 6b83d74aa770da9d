/*!
    frame codecs: how requests and responses are laid out on the wire

    every protocol variant shares the same validation and dispatch pipeline (see [crate::slave]) and only differs by the [Codec] implementation:

    - [Rtu] binary modbus-like frames delimited by silence, protected by a CRC-16
    - [RawAscii] `$`...`\n` frames carrying raw byte values, protected by an additive checksum
    - [HexAscii] `$`...`\n` requests and `:`...`\n` responses carrying hexadecimal digits, protected by an additive checksum
*/

use thiserror::Error;

use crate::registers::{ExceptionCode, RegisterValue};

pub mod rtu;
pub mod ascii;

pub use rtu::Rtu;
pub use ascii::{RawAscii, HexAscii};


/// storage size of any frame, received or sent
pub const MAX_FRAME: usize = 256;
/// one frame, start and end markers included
pub type Frame = heapless::Vec<u8, MAX_FRAME>;
/// most registers a single write request may carry
pub const MAX_WRITE: usize = 123;

/// how a variant delimits its frames in the byte stream
#[derive(Copy, Clone, Debug)]
pub enum Delimiting {
    /// frames start with one of `starts` and end with an `end` byte for which `complete` holds, given the frame so far end included
    Sentinel {starts: &'static [u8], end: u8, complete: fn(&[u8]) -> bool},
    /// frames are separated by a silence on the bus
    Silence,
}

/// reasons for silently dropping a frame, none of them is ever reported on the bus
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum Discard {
    #[error("frame shorter than any request")]
    TooShort,
    #[error("frame does not start or end with the expected marker")]
    Marker,
    #[error("frame layout does not match its command")]
    Malformed,
    #[error("frame addressed to slave {0}")]
    NotAddressed(u8),
    #[error("checksum mismatch")]
    Checksum,
    #[error("response cannot be expressed by this protocol")]
    Unencodable,
}

/// what a master asks for
#[derive(Clone, Debug, PartialEq)]
pub enum Command<V> {
    /// read `count` consecutive registers
    Read {address: u16, count: u16},
    /// write one register
    Write {address: u16, value: V},
    /// write consecutive registers
    WriteMultiple {address: u16, values: heapless::Vec<V, MAX_WRITE>},
    /// well formed request that must be answered with an exception
    Rejected {address: u16, code: ExceptionCode},
}

/// a request whose integrity was already verified
#[derive(Clone, Debug, PartialEq)]
pub struct Request<V> {
    /// slave id the request is addressed to
    pub slave: u8,
    /// raw function code or command character, echoed in exceptions
    pub function: u8,
    pub command: Command<V>,
}

/// what the slave answers
#[derive(Clone, Debug, PartialEq)]
pub enum Response<'a, V> {
    Read {address: u16, values: &'a [V]},
    Write {address: u16, value: V},
    WriteMultiple {address: u16, count: u16},
    Exception {function: u8, address: u16, code: ExceptionCode},
}

/**
    one protocol variant

    The slave calls, in order, [Codec::target], [Codec::verify] and [Codec::decode], stopping silently at the first error, then [Codec::encode] for the answer. Frames passed in are at least [Codec::MIN_LEN] long.
*/
pub trait Codec {
    /// register cell type
    type Value: RegisterValue;
    const DELIMITING: Delimiting;
    /// fewest bytes any request can have
    const MIN_LEN: usize;
    /// most registers a single read may return
    const MAX_READ: u16;

    /// check the frame shape and extract the addressed slave id
    fn target(&self, frame: &[u8]) -> Result<u8, Discard>;
    /// check the frame checksum
    fn verify(&self, frame: &[u8]) -> Result<(), Discard>;
    /// extract the request fields
    fn decode(&self, frame: &[u8]) -> Result<Request<Self::Value>, Discard>;
    /// append the response frame to `out`
    fn encode(&self, slave: u8, response: &Response<'_, Self::Value>, out: &mut Frame) -> Result<(), Discard>;
}

/// append bytes to a frame, failing if it does not fit
pub(crate) fn put(out: &mut Frame, bytes: &[u8]) -> Result<(), Discard> {
    out.extend_from_slice(bytes)
        .map_err(|_| Discard::Unencodable)
}
