/*!
    cut the received byte stream into candidate frames

    two policies exist, chosen by the codec's [Delimiting]: explicit start and end bytes, or a silence on the bus. In both, a frame growing past the configured maximum is dropped whole, never emitted partially.
*/

use core::{
    mem::take,
    sync::atomic::{AtomicU32, Ordering::Relaxed},
    };
use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::delay::DelayNs;
use log::*;

use crate::{
    codec::{Delimiting, Frame, MAX_FRAME},
    config::Config,
    relay::ByteRelay,
    };


/// frames delimited by start and end bytes
#[derive(Clone, Debug)]
pub struct SentinelAssembler {
    starts: &'static [u8],
    end: u8,
    /// whether a frame that just received its end byte is finished
    complete: fn(&[u8]) -> bool,
    max: usize,
    frame: Frame,
    /// a start byte was seen and no end yet
    receiving: bool,
    overflows: u32,
}
impl SentinelAssembler {
    /// assembler ending frames on the first end byte
    pub fn new(starts: &'static [u8], end: u8, max: usize) -> Self {
        Self {
            starts,
            end,
            complete: |_| true,
            max: max.min(MAX_FRAME),
            frame: Frame::new(),
            receiving: false,
            overflows: 0,
        }
    }
    /// only end frames on end bytes for which `complete` returns true, for protocols where the end byte can also be a value
    pub fn with_completion(mut self, complete: fn(&[u8]) -> bool) -> Self {
        self.complete = complete;
        self
    }
    /// feed one received byte, returns a frame when its end byte arrives
    pub fn feed(&mut self, byte: u8) -> Option<Frame> {
        if self.receiving {
            if self.frame.len() < self.max && self.frame.push(byte).is_ok() {
                if byte == self.end && (self.complete)(&self.frame) {
                    self.receiving = false;
                    return Some(take(&mut self.frame));
                }
                return None;
            }
            // too long, the byte that did not fit may be the start of the next frame
            self.overflows = self.overflows.saturating_add(1);
            self.reset();
        }
        // anything outside of a frame is noise
        if self.starts.contains(&byte) {
            self.frame.clear();
            self.receiving = self.frame.push(byte).is_ok();
        }
        None
    }
    /// drop the frame in progress
    pub fn reset(&mut self) {
        self.frame.clear();
        self.receiving = false;
    }
    pub fn is_idle(&self) -> bool {! self.receiving}
    /// number of frames dropped for being too long
    pub fn overflows(&self) -> u32 {self.overflows}
}


/// frames delimited by bus silence
#[derive(Clone, Debug)]
pub struct SilenceAssembler {
    max: usize,
    frame: Frame,
    /// the current frame grew too long, ignore bytes until the next silence
    overflowed: bool,
    overflows: u32,
}
impl SilenceAssembler {
    pub fn new(max: usize) -> Self {
        Self {
            max: max.min(MAX_FRAME),
            frame: Frame::new(),
            overflowed: false,
            overflows: 0,
        }
    }
    /// feed one byte received before the silence timeout
    pub fn feed(&mut self, byte: u8) {
        if self.overflowed
            {return}
        if self.frame.len() >= self.max || self.frame.push(byte).is_err() {
            self.overflows = self.overflows.saturating_add(1);
            self.frame.clear();
            self.overflowed = true;
        }
    }
    /// the silence timeout elapsed, returns the accumulated frame if any
    pub fn gap(&mut self) -> Option<Frame> {
        if take(&mut self.overflowed) {
            self.frame.clear();
            return None;
        }
        if self.frame.is_empty()
            {return None}
        Some(take(&mut self.frame))
    }
    pub fn is_idle(&self) -> bool {self.frame.is_empty() && ! self.overflowed}
    /// number of frames dropped for being too long
    pub fn overflows(&self) -> u32 {self.overflows}
}


/// one of the framing policies, pulling bytes from a relay
#[derive(Clone, Debug)]
pub enum Assembler {
    Sentinel(SentinelAssembler),
    Silence {assembler: SilenceAssembler, gap_us: u32},
}
impl Assembler {
    pub fn new(delimiting: Delimiting, config: &Config) -> Self {
        match delimiting {
            Delimiting::Sentinel {starts, end, complete} => Self::Sentinel(
                SentinelAssembler::new(starts, end, config.max_frame)
                    .with_completion(complete)),
            Delimiting::Silence => Self::Silence {
                assembler: SilenceAssembler::new(config.max_frame),
                gap_us: config.frame_gap_us(),
                },
        }
    }
    /// wait for the next complete frame, publishing the overflow count to `overflows` as soon as a frame is dropped
    pub async fn next_frame<M: RawMutex, const N: usize>(&mut self, relay: &ByteRelay<M, N>, delay: &mut impl DelayNs, overflows: &AtomicU32) -> Frame {
        match self {
            Self::Sentinel(assembler) => loop {
                let byte = relay.receive_forever().await;
                let frame = assembler.feed(byte);
                overflows.store(assembler.overflows(), Relaxed);
                if let Some(frame) = frame {
                    trace!("received frame of {} bytes", frame.len());
                    return frame;
                }
            },
            Self::Silence {assembler, gap_us} => loop {
                match relay.receive(delay, *gap_us).await {
                    Some(byte) => assembler.feed(byte),
                    None => if let Some(frame) = assembler.gap() {
                        trace!("received frame of {} bytes", frame.len());
                        return frame;
                    },
                }
                overflows.store(assembler.overflows(), Relaxed);
            },
        }
    }
    pub fn overflows(&self) -> u32 {
        match self {
            Self::Sentinel(assembler) => assembler.overflows(),
            Self::Silence {assembler, ..} => assembler.overflows(),
        }
    }
}
