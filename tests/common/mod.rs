#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    convert::Infallible,
    rc::Rc,
    time::Duration,
    };
use embassy_futures::select::{select4, Either4};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embedded_hal::digital::{ErrorType, OutputPin};
use embedded_hal_async::delay::DelayNs;

use uartreg::{
    codec::Codec,
    direction::EnablePins,
    relay::ByteRelay,
    slave::Slave,
    transport::{Peripheral, Transport},
    };


/// one character at 9600 baud
pub const CHARACTER: Duration = Duration::from_micros(1146);
/// long enough for any reply of these tests to be fully sent
pub const ANSWER: Duration = Duration::from_millis(100);

pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}


/// delay provider backed by the tokio timer
pub struct TokioDelay;
impl DelayNs for TokioDelay {
    async fn delay_ns(&mut self, ns: u32) {
        tokio::time::sleep(Duration::from_nanos(ns.into())).await
    }
}

/// output pin whose level can be observed while the transport owns it
#[derive(Clone, Default)]
pub struct FakePin(Rc<Cell<bool>>);
impl FakePin {
    pub fn is_high(&self) -> bool {self.0.get()}
}
impl ErrorType for FakePin {
    type Error = Infallible;
}
impl OutputPin for FakePin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.0.set(false);
        Ok(())
    }
    fn set_high(&mut self) -> Result<(), Infallible> {
        self.0.set(true);
        Ok(())
    }
}

/// uart whose transmit-ready interrupt is only a flag
#[derive(Default)]
pub struct FakeUart {
    armed: Cell<bool>,
}
impl FakeUart {
    pub fn armed(&self) -> bool {self.armed.get()}
    pub fn disarm(&self) {self.armed.set(false)}
}
impl Peripheral for FakeUart {
    fn start_transmit(&self) {
        self.armed.set(true);
    }
}

pub type Bus = Transport<FakeUart, EnablePins<FakePin, FakePin>, 64, 64>;


/// the other side of the uart: interrupts, shift register and the remote master
#[derive(Default)]
pub struct Wire {
    pub de: FakePin,
    pub re: FakePin,
    sent: RefCell<Vec<u8>>,
    /// bytes seen on the wire while the driver was not enabled
    violations: Cell<u32>,
}

impl Wire {
    pub fn bus(&self) -> Bus {
        Transport::new(FakeUart::default(), EnablePins::new(self.de.clone(), self.re.clone()))
    }

    /// play the uart hardware: hand queued bytes to the shift register and report transmission end
    pub async fn run(&self, bus: &Bus) -> ! {
        let mut shifted = false;
        loop {
            if bus.uart().armed() {
                match bus.next_tx_byte() {
                    Some(byte) => {
                        self.check_driver();
                        tokio::time::sleep(CHARACTER).await;
                        self.check_driver();
                        self.sent.borrow_mut().push(byte);
                        shifted = true;
                        continue;
                    },
                    None => bus.uart().disarm(),
                }
            }
            if shifted {
                shifted = false;
                bus.transmit_complete();
            }
            tokio::time::sleep(Duration::from_micros(200)).await;
        }
    }
    fn check_driver(&self) {
        if ! (self.de.is_high() && self.re.is_high()) {
            self.violations.set(self.violations.get() + 1);
        }
    }

    /// bytes arriving from the master, paced like on a real line
    pub async fn receive(&self, bus: &Bus, bytes: &[u8]) {
        for &byte in bytes {
            tokio::time::sleep(CHARACTER).await;
            bus.try_push_rx(byte);
        }
    }
    /// send a request and collect whatever the slave answered
    pub async fn request(&self, bus: &Bus, bytes: &[u8]) -> Vec<u8> {
        self.receive(bus, bytes).await;
        tokio::time::sleep(ANSWER).await;
        self.take_sent()
    }
    pub fn take_sent(&self) -> Vec<u8> {
        self.sent.take()
    }
    pub fn violations(&self) -> u32 {self.violations.get()}
}


/**
    run the slave on a simulated bus for the duration of `test`

    the drain task, the slave task and the wire simulation are polled alongside the test in the current task
*/
pub async fn with_slave<C: Codec, const REGS: usize, R>(
    slave: &Slave<C, REGS>,
    test: impl AsyncFnOnce(&Bus, &Wire) -> R,
) -> R {
    let wire = Wire::default();
    let bus = wire.bus();
    let relay = ByteRelay::<CriticalSectionRawMutex>::new();
    let outcome = select4(
        relay.forward(&bus, TokioDelay, slave.config().relay_timeout_us),
        slave.run(&relay, &bus, TokioDelay),
        wire.run(&bus),
        test(&bus, &wire),
        ).await;
    match outcome {
        Either4::Fourth(result) => result,
        Either4::Second(()) => panic!("slave task stopped"),
        _ => unreachable!(),
    }
}
