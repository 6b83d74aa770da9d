use crate::codec::MAX_FRAME;


/// address reserved for commands addressed to every slave, never answered
pub const BROADCAST: u8 = 0;

/// bits per character used to compute silence times: start, 8 data, parity or second stop, stop
const CHARACTER_BITS: u32 = 11;
/// above this rate the inter-frame gap is fixed instead of scaling with the bit time
const FIXED_GAP_RATE: u32 = 19_200;
/// inter-frame gap used above [FIXED_GAP_RATE]
const FIXED_GAP_US: u32 = 1_750;

/**
    slave settings

    capacities of the buffers are compile time generics of the respective types, this only holds what a bus master may need to agree on

    ```
    use uartreg::Config;

    let config = Config::new(9600, 1).with_frame_gap_us(5_000);
    assert_eq!(config.frame_gap_us(), 5_000);
    ```
*/
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// uart bit rate, only used to derive timings
    pub baud_rate: u32,
    /// this device's slave id
    pub address: u8,
    /// id answered by nobody but obeyed by everybody
    pub broadcast: u8,
    /// explicit inter-frame gap, derived from the bit rate if not set
    pub frame_gap_us: Option<u32>,
    /// longest accepted frame, start and end markers included
    pub max_frame: usize,
    /// how long the drain task may wait for space in the relay before dropping a byte
    pub relay_timeout_us: u32,
}

impl Config {
    pub const fn new(baud_rate: u32, address: u8) -> Self {
        Self {
            baud_rate,
            address,
            broadcast: BROADCAST,
            frame_gap_us: None,
            max_frame: MAX_FRAME,
            relay_timeout_us: 0,
        }
    }
    pub const fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }
    pub const fn with_broadcast(mut self, broadcast: u8) -> Self {
        self.broadcast = broadcast;
        self
    }
    pub const fn with_frame_gap_us(mut self, gap: u32) -> Self {
        self.frame_gap_us = Some(gap);
        self
    }
    /// the frame limit cannot exceed the frame storage, larger values are clamped
    pub const fn with_max_frame(mut self, max: usize) -> Self {
        self.max_frame = if max < MAX_FRAME {max} else {MAX_FRAME};
        self
    }
    pub const fn with_relay_timeout_us(mut self, timeout: u32) -> Self {
        self.relay_timeout_us = timeout;
        self
    }

    /// duration of one character on the wire
    pub const fn character_us(&self) -> u32 {
        let rate = if self.baud_rate == 0 {1} else {self.baud_rate};
        (CHARACTER_BITS * 1_000_000).div_ceil(rate)
    }
    /**
        silence meaning the end of a frame

        3.5 character times at the configured rate, or 1750 µs above 19200 baud where the character time gets too short for most timers
    */
    pub const fn frame_gap_us(&self) -> u32 {
        match self.frame_gap_us {
            Some(gap) => gap,
            None if self.baud_rate > FIXED_GAP_RATE => FIXED_GAP_US,
            None => (self.character_us() * 7).div_ceil(2),
        }
    }
    /// true if a frame with this target id must be processed
    pub const fn accepts(&self, target: u8) -> bool {
        target == self.address || target == self.broadcast
    }
}
impl Default for Config {
    fn default() -> Self {Self::new(9600, 1)}
}
