/*!
    interrupt driven uart transport for a half-duplex bus

    The [Transport] owns one ring buffer per direction and the bus direction controller. Interrupt handlers call the `*_rx`/`*_tx` peripheral side methods, tasks use the async side, directly or through `embedded_io_async`.

    `Transport::new` sets the bus lines, so it runs at startup and the result is placed in a lock initialized once, readable from the handlers

    ```ignore
    static TRANSPORT: OnceLock<Transport<MyUart, EnablePins<De, Re>, 64, 64>> = OnceLock::new();

    // at startup, before enabling the uart interrupts
    let _ = TRANSPORT.init(Transport::new(uart, EnablePins::new(de, re)));

    #[interrupt]
    fn USART_RX() {
        if let Some(transport) = TRANSPORT.try_get() {
            transport.try_push_rx(read_data_register());
        }
    }
    #[interrupt]
    fn USART_UDRE() {
        match TRANSPORT.try_get().and_then(|transport| transport.next_tx_byte()) {
            Some(byte) => write_data_register(byte),
            None => disable_udre_interrupt(),
        }
    }
    #[interrupt]
    fn USART_TX() {
        if let Some(transport) = TRANSPORT.try_get() {
            transport.transmit_complete();
        }
    }
    ```
*/

use core::{
    future::poll_fn,
    sync::atomic::{AtomicU32, Ordering::Relaxed},
    task::Poll,
    };
use embassy_sync::waitqueue::AtomicWaker;

use crate::{
    ring::RingBuffer,
    direction::{DirectionControl, LineDriver, BusDirection},
    utils::bump,
    };


/// uart peripheral control needed by the task side of the transport
pub trait Peripheral {
    /**
        arm the transmit-ready (data register empty) interrupt

        the interrupt handler is then expected to call [Transport::next_tx_byte] until it returns `None`, and disarm itself at that point
    */
    fn start_transmit(&self);
}


pub struct Transport<U, L, const RX: usize, const TX: usize> {
    uart: U,
    rx: RingBuffer<RX>,
    tx: RingBuffer<TX>,
    direction: DirectionControl<L>,
    /// woken when the line goes back to listen
    idle: AtomicWaker,
    rx_overruns: AtomicU32,
}

impl<U: Peripheral, L: LineDriver, const RX: usize, const TX: usize> Transport<U, L, RX, TX> {
    pub fn new(uart: U, lines: L) -> Self {
        Self {
            uart,
            rx: RingBuffer::new(),
            tx: RingBuffer::new(),
            direction: DirectionControl::new(lines),
            idle: AtomicWaker::new(),
            rx_overruns: AtomicU32::new(0),
        }
    }

    /// receive interrupt side: store a received byte, false if it was dropped because the ring is full
    pub fn try_push_rx(&self, byte: u8) -> bool {
        let pushed = self.rx.push(byte);
        if ! pushed
            {bump(&self.rx_overruns)}
        pushed
    }
    /// transmit-ready interrupt side: next byte to hand to the uart, `None` once the ring is drained
    pub fn next_tx_byte(&self) -> Option<u8> {
        self.tx.pop()
    }
    /**
        transmit complete interrupt side: the last queued byte physically left the pin

        the line goes back to listen only if nothing was queued meanwhile
    */
    pub fn transmit_complete(&self) {
        if self.direction.end_transmit(|| self.tx.is_empty()) {
            self.idle.wake();
        }
    }

    /// task side: wait for the next received byte
    pub async fn pop_rx(&self) -> u8 {
        self.rx.pop_wait().await
    }
    /// task side: received byte if one is already there
    pub fn try_pop_rx(&self) -> Option<u8> {
        self.rx.pop()
    }
    /**
        task side: queue a byte for transmission, waiting for space if the ring is full

        the line is switched to transmit after the byte is queued but before the transmit interrupt is armed, so the byte cannot reach the wire before the driver is enabled
    */
    pub async fn push_tx(&self, byte: u8) {
        self.tx.push_wait(byte).await;
        self.direction.begin_transmit();
        self.uart.start_transmit();
    }
    /// task side: queue all bytes
    pub async fn write_all(&self, data: &[u8]) {
        for &byte in data {
            self.push_tx(byte).await;
        }
    }
    /// task side: wait until everything queued is sent and the bus is released
    pub async fn flush(&self) {
        poll_fn(|context| {
            if self.is_idle()
                {return Poll::Ready(())}
            self.idle.register(context.waker());
            if self.is_idle()
                {Poll::Ready(())}
            else
                {Poll::Pending}
        }).await
    }

    fn is_idle(&self) -> bool {
        self.tx.is_empty() && self.direction.state() == BusDirection::Listen
    }
    pub fn direction(&self) -> BusDirection {self.direction.state()}
    /// number of received bytes dropped because the receive ring was full
    pub fn rx_overruns(&self) -> u32 {self.rx_overruns.load(Relaxed)}
    pub fn uart(&self) -> &U {&self.uart}
    pub fn with_lines<R>(&self, f: impl FnOnce(&mut L) -> R) -> R {self.direction.with_lines(f)}
}


#[cfg(feature = "slave")]
mod io {
    use super::*;
    use core::convert::Infallible;
    use embedded_io_async::{ErrorType, Read, Write};

    impl<U, L, const RX: usize, const TX: usize> ErrorType for &Transport<U, L, RX, TX> {
        type Error = Infallible;
    }
    impl<U: Peripheral, L: LineDriver, const RX: usize, const TX: usize> Read for &Transport<U, L, RX, TX> {
        /// wait for at least one byte, then take everything already received that fits
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Infallible> {
            if buf.is_empty()
                {return Ok(0)}
            buf[0] = self.pop_rx().await;
            let mut count = 1;
            while count < buf.len() {
                match self.try_pop_rx() {
                    Some(byte) => buf[count] = byte,
                    None => break,
                }
                count += 1;
            }
            Ok(count)
        }
    }
    impl<U: Peripheral, L: LineDriver, const RX: usize, const TX: usize> Write for &Transport<U, L, RX, TX> {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
            Transport::write_all(*self, buf).await;
            Ok(buf.len())
        }
        async fn flush(&mut self) -> Result<(), Infallible> {
            Transport::flush(*self).await;
            Ok(())
        }
    }
}
