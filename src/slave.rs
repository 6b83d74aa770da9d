/*!
    slave protocol engine: validate each received frame, execute it against the register table and answer

    the validation pipeline stops silently at the first failure, since on a shared bus a damaged frame cannot be told apart from noise:

    1. length
    2. start/end markers
    3. addressed slave, this device or broadcast
    4. checksum
    5. command layout

    Well formed requests that cannot be executed are answered with an exception. Broadcast requests are executed but never answered.
*/

use core::sync::atomic::{AtomicU32, Ordering::Relaxed};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::delay::DelayNs;
use embedded_io_async::Write;
use log::*;

use crate::{
    mutex::*,
    codec::{Codec, Command, Discard, Frame, Request, Response},
    config::Config,
    framing::Assembler,
    registers::{ExceptionCode, RegisterStore},
    relay::ByteRelay,
    utils::bump,
    };


/// what to do after a frame was processed
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// send the reply frame
    Reply,
    /// the request was executed but must not be answered
    Silent,
}

/// snapshot of the slave counters
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// candidate frames handed to the engine
    pub frames: u32,
    /// frames dropped silently, for any reason
    pub discarded: u32,
    /// frames dropped for checksum mismatch
    pub checksum_errors: u32,
    /// exception responses built
    pub exceptions: u32,
    /// broadcast requests executed
    pub broadcasts: u32,
    /// replies fully written to the bus
    pub replies: u32,
    /// frames dropped by the assembler for being too long
    pub overflows: u32,
}

#[derive(Default)]
struct Counters {
    frames: AtomicU32,
    discarded: AtomicU32,
    checksum_errors: AtomicU32,
    exceptions: AtomicU32,
    broadcasts: AtomicU32,
    replies: AtomicU32,
    overflows: AtomicU32,
}


/**
    register table slave

    the register table can be accessed by the application while the slave runs, through [Slave::lock]
*/
pub struct Slave<C: Codec, const REGS: usize> {
    codec: C,
    config: Config,
    store: BusyMutex<RegisterStore<C::Value, REGS>>,
    /// frame assembly state, owned by the running task
    control: BusyMutex<Assembler>,
    counters: Counters,
}

impl<C: Codec, const REGS: usize> Slave<C, REGS> {
    /// slave with all registers zeroed
    pub fn new(codec: C, config: Config) -> Self {
        Self::with_registers(codec, config, RegisterStore::new())
    }
    pub fn with_registers(codec: C, config: Config, store: RegisterStore<C::Value, REGS>) -> Self {
        Self {
            control: BusyMutex::new(Assembler::new(C::DELIMITING, &config)),
            codec,
            config,
            store: BusyMutex::new(store),
            counters: Counters::default(),
        }
    }
    pub fn config(&self) -> &Config {&self.config}
    pub fn codec(&self) -> &C {&self.codec}

    pub async fn lock(&self) -> BusyMutexGuard<'_, RegisterStore<C::Value, REGS>> {self.store.lock().await}
    pub fn try_lock(&self) -> Option<BusyMutexGuard<'_, RegisterStore<C::Value, REGS>>> {self.store.try_lock()}

    pub fn diagnostics(&self) -> Diagnostics {
        let counters = &self.counters;
        Diagnostics {
            frames: counters.frames.load(Relaxed),
            discarded: counters.discarded.load(Relaxed),
            checksum_errors: counters.checksum_errors.load(Relaxed),
            exceptions: counters.exceptions.load(Relaxed),
            broadcasts: counters.broadcasts.load(Relaxed),
            replies: counters.replies.load(Relaxed),
            overflows: counters.overflows.load(Relaxed),
        }
    }

    /**
        run one candidate frame through the pipeline

        on [Outcome::Reply], `reply` holds the frame to send. An error means the frame was dropped and nothing must be sent.
    */
    pub async fn process(&self, frame: &[u8], reply: &mut Frame) -> Result<Outcome, Discard> {
        bump(&self.counters.frames);
        reply.clear();
        let result = self.execute(frame, reply).await;
        if let Err(discard) = result {
            bump(&self.counters.discarded);
            if discard == Discard::Checksum
                {bump(&self.counters.checksum_errors)}
            debug!("discarded frame: {}", discard);
        }
        result
    }

    async fn execute(&self, frame: &[u8], reply: &mut Frame) -> Result<Outcome, Discard> {
        if frame.len() < C::MIN_LEN
            {return Err(Discard::TooShort)}
        let target = self.codec.target(frame)?;
        if ! self.config.accepts(target)
            {return Err(Discard::NotAddressed(target))}
        self.codec.verify(frame)?;
        let request = self.codec.decode(frame)?;
        let broadcast = target == self.config.broadcast;

        let mut store = self.store.lock().await;
        let response = dispatch::<C, REGS>(&mut store, &request);
        if let Response::Exception {code, ..} = response {
            bump(&self.counters.exceptions);
            debug!("refused request {:#x}: {:?}", request.function, code);
        }
        if broadcast {
            bump(&self.counters.broadcasts);
            return Ok(Outcome::Silent);
        }
        self.codec.encode(self.config.address, &response, reply)?;
        Ok(Outcome::Reply)
    }

    /**
        protocol task: assemble frames from the relay, process them and write replies to the bus

        `bus` is typically a `&Transport`, whose flush waits for the line to be released after the reply. Only one task can run the slave, a second call returns immediately.
    */
    pub async fn run<M: RawMutex, const Q: usize>(&self, relay: &ByteRelay<M, Q>, mut bus: impl Write, mut delay: impl DelayNs) {
        let Some(mut assembler) = self.control.try_lock()
            else {
                warn!("slave is already running");
                return
            };
        let mut reply = Frame::new();
        loop {
            let frame = assembler.next_frame(relay, &mut delay, &self.counters.overflows).await;
            if self.process(&frame, &mut reply).await != Ok(Outcome::Reply)
                {continue}
            if bus.write_all(&reply).await.is_err() || bus.flush().await.is_err() {
                warn!("failed to send reply");
                continue;
            }
            bump(&self.counters.replies);
        }
    }
}

/// execute a verified request against the register table
fn dispatch<'s, C: Codec, const REGS: usize>(store: &'s mut RegisterStore<C::Value, REGS>, request: &Request<C::Value>) -> Response<'s, C::Value> {
    let function = request.function;
    let exception = |address, code| Response::Exception {function, address, code};
    match request.command {
        Command::Read {address, count} => {
            if count == 0 || count > C::MAX_READ
                {return exception(address, ExceptionCode::IllegalValue)}
            let store: &'s RegisterStore<C::Value, REGS> = store;
            match store.read_range(usize::from(address), usize::from(count)) {
                Ok(values) => Response::Read {address, values},
                Err(error) => exception(address, error.into()),
            }
        },
        Command::Write {address, value} => match store.write(usize::from(address), value) {
            Ok(()) => Response::Write {address, value},
            Err(error) => exception(address, error.into()),
        },
        Command::WriteMultiple {address, ref values} => match store.write_range(usize::from(address), values) {
            Ok(()) => Response::WriteMultiple {address, count: values.len() as u16},
            Err(error) => exception(address, error.into()),
        },
        Command::Rejected {address, code} => exception(address, code),
    }
}
