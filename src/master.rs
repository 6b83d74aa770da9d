/*!
    asynchronous RTU master in `std` environment, for a computer driving the bus through a serial adapter

    ```no_run
    # async fn example() -> Result<(), uartreg::master::Error> {
    use uartreg::master::Master;

    let mut master = Master::open("/dev/ttyUSB0", 9600)?;
    master.write_single(1, 5, 0xaa).await?;
    let values = master.read_holding(1, 0, 2).await?;
    # Ok(())
    # }
    ```
*/

use serial2_tokio::{SerialPort, CharSize, StopBits, Parity};
use std::{
    path::Path,
    time::Duration,
    vec::Vec,
    };
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncReadExt, AsyncWriteExt};

use crate::{
    codec::{Command, Frame, Request, Rtu, Discard, MAX_WRITE, rtu},
    config::BROADCAST,
    registers::ExceptionCode,
    };


/// error regarding bus communication
#[derive(Error, Debug)]
pub enum Error {
    #[error("problem with uart bus")]
    Bus(#[from] std::io::Error),
    #[error("slave refused the request: {0:?}")]
    Exception(ExceptionCode),
    #[error("problem detected on master side: {0}")]
    Master(&'static str),
    #[error("no data arrived in expected time")]
    Timeout,
}


/// RTU master, one request at a time
pub struct Master<P> {
    port: P,
    timeout: Duration,
}

impl Master<SerialPort> {
    /// open the given serial port file at the given baud rate, 8 data bits, no parity, 1 stop bit
    pub fn open(path: impl AsRef<Path>, rate: u32) -> Result<Self, Error> {
        let port = SerialPort::open(path, |mut settings: serial2_tokio::Settings| {
                settings.set_raw();
                settings.set_baud_rate(rate)?;
                settings.set_char_size(CharSize::Bits8);
                settings.set_stop_bits(StopBits::One);
                settings.set_parity(Parity::None);
                Ok(settings)
                })?;
        Ok(Self::new(port))
    }
}

impl<P: AsyncRead + AsyncWrite + Unpin> Master<P> {
    /// master over an already configured byte stream
    pub fn new(port: P) -> Self {
        Self {
            port,
            timeout: Duration::from_millis(100),
        }
    }
    /// how long to wait for an answer
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
    pub fn into_inner(self) -> P {self.port}

    /// read `count` consecutive holding registers
    pub async fn read_holding(&mut self, slave: u8, address: u16, count: u16) -> Result<Vec<u16>, Error> {
        if slave == BROADCAST
            {return Err(Error::Master("broadcast requests get no answer"))}
        if count == 0 || count > rtu::MAX_READ
            {return Err(Error::Master("invalid register count"))}
        let answer = self.transact(Request {
            slave,
            function: rtu::READ_HOLDING,
            command: Command::Read {address, count},
            }).await?;
        let data = answer.get(3 .. answer.len() - 2)
            .ok_or(Error::Master("response too short"))?;
        if data.len() != 2*usize::from(count)
            {return Err(Error::Master("unexpected register count in response"))}
        Ok(data.chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect())
    }
    /// write one holding register, slave 0 writes on every slave
    pub async fn write_single(&mut self, slave: u8, address: u16, value: u16) -> Result<(), Error> {
        let request = Request {
            slave,
            function: rtu::WRITE_SINGLE,
            command: Command::Write {address, value},
            };
        let answer = self.transact(request).await?;
        if slave != BROADCAST && answer[2 .. 6] != [address.to_be_bytes(), value.to_be_bytes()].concat()
            {return Err(Error::Master("response does not echo the request"))}
        Ok(())
    }
    /// write consecutive holding registers, slave 0 writes on every slave
    pub async fn write_multiple(&mut self, slave: u8, address: u16, values: &[u16]) -> Result<(), Error> {
        let values = heapless::Vec::<u16, MAX_WRITE>::from_slice(values)
            .map_err(|_| Error::Master("too many registers for one request"))?;
        if values.is_empty()
            {return Err(Error::Master("invalid register count"))}
        let count = values.len() as u16;
        let answer = self.transact(Request {
            slave,
            function: rtu::WRITE_MULTIPLE,
            command: Command::WriteMultiple {address, values},
            }).await?;
        if slave != BROADCAST && answer[2 .. 6] != [address.to_be_bytes(), count.to_be_bytes()].concat()
            {return Err(Error::Master("response does not match the request"))}
        Ok(())
    }

    /// send a request and receive its answer, broadcasts return an empty frame
    async fn transact(&mut self, request: Request<u16>) -> Result<Frame, Error> {
        let mut frame = Frame::new();
        Rtu.encode_request(&request, &mut frame)
            .map_err(|_: Discard| Error::Master("request does not fit in a frame"))?;
        self.port.write_all(&frame).await?;
        self.port.flush().await?;
        if request.slave == BROADCAST
            {return Ok(Frame::new())}

        let answer = tokio::time::timeout(self.timeout, self.receive()).await
            .map_err(|_| Error::Timeout)??;
        if ! rtu::check(&answer)
            {return Err(Error::Master("response checksum mismatch"))}
        if answer[0] != request.slave
            {return Err(Error::Master("response from another slave"))}
        let function = rtu::Function::from(answer[1]);
        if function.code().value() != request.function
            {return Err(Error::Master("response to another function"))}
        if function.exception()
            {return Err(Error::Exception(ExceptionCode::from(answer[2])))}
        Ok(answer)
    }
    /// read exactly one response frame
    async fn receive(&mut self) -> Result<Frame, Error> {
        let mut start = [0; 3];
        self.port.read_exact(&mut start).await?;
        let size = Rtu.response_len(start);
        let mut answer = Frame::new();
        answer.extend_from_slice(&start)
            .map_err(|_| Error::Master("response too long"))?;
        answer.resize(size, 0)
            .map_err(|_| Error::Master("response too long"))?;
        self.port.read_exact(&mut answer[3 ..]).await?;
        Ok(answer)
    }
}
