/*!
    half-duplex uart register slave

    A bus master reads and writes a small register table on the device, over a shared RS-485 style line. The stack is layered, from the wire up:

    - [transport]: interrupt fed ring buffers, with automatic bus direction switching ([direction])
    - [relay]: bounded queue moving received bytes into the protocol task
    - [framing]: cuts the byte stream into frames, by start/end markers or by bus silence
    - [codec]: protocol variants, modbus-like binary [codec::Rtu] or ascii framed [codec::RawAscii] and [codec::HexAscii]
    - [slave]: validates each frame, executes it against the [registers] table and answers

    With feature `master`, [master] provides the matching RTU client for a computer.
*/
#![no_std]
#[cfg(any(test, feature = "std"))]
extern crate std;

mod mutex;
mod utils;

pub mod config;
pub mod ring;
pub mod direction;
pub mod transport;
pub mod relay;
pub mod framing;
pub mod codec;
pub mod registers;
#[cfg(feature = "slave")]
pub mod slave;
#[cfg(feature = "master")]
pub mod master;

pub use config::Config;
pub use mutex::{BusyMutex, BusyMutexGuard};
