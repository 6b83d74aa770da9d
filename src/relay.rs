/*!
    bounded byte queue moving received bytes out of the interrupt fed ring into the protocol task

    the receive timeout is what the silence delimited framing uses to detect the end of a frame
*/

use core::sync::atomic::{AtomicU32, Ordering::Relaxed};
use embassy_futures::select::{select, Either};
use embassy_sync::{
    blocking_mutex::raw::RawMutex,
    channel::Channel,
    };
use embedded_hal_async::delay::DelayNs;

use crate::utils::bump;


/// default relay depth
pub const RELAY_DEPTH: usize = 32;

pub struct ByteRelay<M: RawMutex, const N: usize = RELAY_DEPTH> {
    channel: Channel<M, u8, N>,
    overruns: AtomicU32,
}

impl<M: RawMutex, const N: usize> ByteRelay<M, N> {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            overruns: AtomicU32::new(0),
        }
    }

    /// enqueue without waiting, the byte is dropped and counted as overrun if the relay is full
    pub fn try_send(&self, byte: u8) -> bool {
        let sent = self.channel.try_send(byte).is_ok();
        if ! sent
            {bump(&self.overruns)}
        sent
    }
    /// enqueue, waiting at most `timeout_us` for space. On timeout the byte is dropped and counted as overrun
    pub async fn send(&self, byte: u8, delay: &mut impl DelayNs, timeout_us: u32) -> bool {
        if timeout_us == 0
            {return self.try_send(byte)}
        match select(self.channel.send(byte), delay.delay_us(timeout_us)).await {
            Either::First(()) => true,
            Either::Second(()) => {
                bump(&self.overruns);
                false
            },
        }
    }
    /// dequeue, waiting at most `timeout_us` for a byte
    pub async fn receive(&self, delay: &mut impl DelayNs, timeout_us: u32) -> Option<u8> {
        if let Ok(byte) = self.channel.try_receive()
            {return Some(byte)}
        match select(self.channel.receive(), delay.delay_us(timeout_us)).await {
            Either::First(byte) => Some(byte),
            Either::Second(()) => None,
        }
    }
    /// dequeue, waiting as long as needed
    pub async fn receive_forever(&self) -> u8 {
        self.channel.receive().await
    }
    pub fn try_receive(&self) -> Option<u8> {
        self.channel.try_receive().ok()
    }

    pub fn len(&self) -> usize {self.channel.len()}
    pub fn is_empty(&self) -> bool {self.channel.is_empty()}
    /// number of bytes dropped because the relay stayed full
    pub fn overruns(&self) -> u32 {self.overruns.load(Relaxed)}
}
impl<M: RawMutex, const N: usize> Default for ByteRelay<M, N> {
    fn default() -> Self {Self::new()}
}

impl<M: RawMutex, const N: usize> ByteRelay<M, N> {
    /**
        drain task: forward every byte received by the transport into this relay

        meant to run at a higher priority than the protocol task, so the receive ring is emptied quickly. A byte that cannot be relayed within `timeout_us` is dropped.
    */
    pub async fn forward<U, L, const RX: usize, const TX: usize>(
        &self,
        transport: &crate::transport::Transport<U, L, RX, TX>,
        mut delay: impl DelayNs,
        timeout_us: u32,
    ) -> !
    where
        U: crate::transport::Peripheral,
        L: crate::direction::LineDriver,
    {
        loop {
            let byte = transport.pop_rx().await;
            if ! self.send(byte, &mut delay, timeout_us).await {
                log::warn!("relay overrun, dropped received byte");
            }
        }
    }
}
