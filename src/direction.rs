/*!
    half-duplex bus direction control

    On an RS-485 bus only one node may drive the line at a time. The transceiver is switched to transmit before the first byte of a burst is handed to the uart, and back to listen only once the uart reports the last stop bit physically left the pin.
*/

use core::{
    cell::RefCell,
    sync::atomic::{AtomicBool, Ordering::*},
    };
use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};
use embedded_hal::digital::OutputPin;
use log::*;


/// current state of the transceiver
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BusDirection {
    /// receiver enabled, driver disabled
    Listen,
    /// driver enabled, receiver disabled
    Transmit,
}

/// something able to switch a transceiver between listening and transmitting
pub trait LineDriver {
    fn listen(&mut self);
    fn transmit(&mut self);
}

/**
    transceiver with separate driver enable (DE, active high) and receiver enable (/RE, active low) pins

    both pins are driven to the same level: high to transmit, low to listen
*/
pub struct EnablePins<DE, RE> {
    de: DE,
    re: RE,
}
impl<DE: OutputPin, RE: OutputPin> EnablePins<DE, RE> {
    pub fn new(de: DE, re: RE) -> Self {
        Self {de, re}
    }
    pub fn release(self) -> (DE, RE) {(self.de, self.re)}
}
impl<DE: OutputPin, RE: OutputPin> LineDriver for EnablePins<DE, RE> {
    fn listen(&mut self) {
        // disable the driver first so that the line is never driven by a node that is also listening to it
        if self.de.set_low().is_err() || self.re.set_low().is_err() {
            warn!("failed to set bus direction pins to listen");
        }
    }
    fn transmit(&mut self) {
        if self.re.set_high().is_err() || self.de.set_high().is_err() {
            warn!("failed to set bus direction pins to transmit");
        }
    }
}

/// transceiver with a single direction pin tied to both DE and /RE
pub struct DirectionPin<P>(pub P);
impl<P: OutputPin> LineDriver for DirectionPin<P> {
    fn listen(&mut self) {
        if self.0.set_low().is_err()
            {warn!("failed to set bus direction pin to listen")}
    }
    fn transmit(&mut self) {
        if self.0.set_high().is_err()
            {warn!("failed to set bus direction pin to transmit")}
    }
}

/// transceiver switching direction by itself, or a point to point uart
pub struct AutoDirection;
impl LineDriver for AutoDirection {
    fn listen(&mut self) {}
    fn transmit(&mut self) {}
}


/**
    two state direction controller

    the committed state is stored in an atomic so it can be observed from any context. The lines are only written inside a critical section, since the transmit complete interrupt may switch them back while a task is enqueuing.
*/
pub struct DirectionControl<L> {
    transmitting: AtomicBool,
    lines: Mutex<CriticalSectionRawMutex, RefCell<L>>,
}
impl<L: LineDriver> DirectionControl<L> {
    /// take control of the lines and set them to listen
    pub fn new(mut lines: L) -> Self {
        lines.listen();
        Self {
            transmitting: AtomicBool::new(false),
            lines: Mutex::new(RefCell::new(lines)),
        }
    }
    pub fn state(&self) -> BusDirection {
        if self.transmitting.load(Acquire)
            {BusDirection::Transmit}
        else
            {BusDirection::Listen}
    }
    /// switch to transmit unless already transmitting, returns true if the lines were switched
    pub fn begin_transmit(&self) -> bool {
        self.lines.lock(|lines| {
            if self.transmitting.load(Relaxed)
                {return false}
            lines.borrow_mut().transmit();
            self.transmitting.store(true, Release);
            true
        })
    }
    /// switch back to listen, `drained` tells whether nothing more is queued for transmission
    pub fn end_transmit(&self, drained: impl FnOnce() -> bool) -> bool {
        self.lines.lock(|lines| {
            // emptiness is checked inside the critical section so an enqueue cannot slip between check and switch
            if ! self.transmitting.load(Relaxed) || ! drained()
                {return false}
            lines.borrow_mut().listen();
            self.transmitting.store(false, Release);
            true
        })
    }
    /// give access to the underlying lines, for instance to check their state
    pub fn with_lines<R>(&self, f: impl FnOnce(&mut L) -> R) -> R {
        self.lines.lock(|lines| f(&mut lines.borrow_mut()))
    }
}
