use bilge::prelude::*;
use packbytes::{FromBytes, ToBytes, ByteArray};

use crate::{
    pack_bits,
    registers::ExceptionCode,
    };
use super::{Codec, Command, Delimiting, Discard, Frame, Request, Response, MAX_WRITE, put};


/// read holding registers
pub const READ_HOLDING: u8 = 0x03;
/// write single register
pub const WRITE_SINGLE: u8 = 0x06;
/// write multiple registers
pub const WRITE_MULTIPLE: u8 = 0x10;
/// most registers a read holding command may ask for
pub const MAX_READ: u16 = 125;

/// function byte of a frame
#[bitsize(8)]
#[derive(Copy, Clone, FromBits, DebugBits, PartialEq, Default)]
pub struct Function {
    /// requested operation
    pub code: u7,
    /// set in responses refusing the request, the exception code follows
    pub exception: bool,
}
pack_bits!(Function);

/// fixed part shared by read and write single requests, and write single responses
#[derive(Copy, Clone, FromBytes, ToBytes, Debug, Default)]
pub struct Header {
    pub slave: u8,
    pub function: Function,
    /// first register
    pub address: u16,
    /// register count for reads and multiple writes, register value for single writes
    pub value: u16,
}
const HEADER: usize = <Header as FromBytes>::Bytes::SIZE;
const CRC: usize = 2;

/**
    CRC-16 as used by modbus: reflected polynomial 0xA001 (0x8005), initial value 0xFFFF

    it is transmitted low byte first
*/
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0xffff_u16;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0 .. 8 {
            if crc & 1 != 0
                {crc = (crc >> 1) ^ 0xa001}
            else
                {crc >>= 1}
        }
    }
    crc
}

/// append the CRC of everything already in the frame
pub fn seal(out: &mut Frame) -> Result<(), Discard> {
    let crc = crc16(out);
    put(out, &crc.to_le_bytes())
}

/// true if the trailing CRC of `frame` matches its content
pub fn check(frame: &[u8]) -> bool {
    if frame.len() < CRC
        {return false}
    let (body, crc) = frame.split_at(frame.len() - CRC);
    crc16(body) == u16::from_le_bytes([crc[0], crc[1]])
}

fn header(frame: &[u8]) -> Result<Header, Discard> {
    let bytes = frame.get(.. HEADER)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(Discard::Malformed)?;
    Ok(Header::from_be_bytes(bytes))
}


/// modbus RTU binary protocol, 16 bit registers
#[derive(Copy, Clone, Debug, Default)]
pub struct Rtu;

impl Codec for Rtu {
    type Value = u16;
    const DELIMITING: Delimiting = Delimiting::Silence;
    /// id, function and CRC
    const MIN_LEN: usize = 4;
    const MAX_READ: u16 = MAX_READ;

    fn target(&self, frame: &[u8]) -> Result<u8, Discard> {
        frame.first().copied().ok_or(Discard::TooShort)
    }
    fn verify(&self, frame: &[u8]) -> Result<(), Discard> {
        if check(frame) {Ok(())} else {Err(Discard::Checksum)}
    }
    fn decode(&self, frame: &[u8]) -> Result<Request<u16>, Discard> {
        let function = *frame.get(1).ok_or(Discard::TooShort)?;
        let body = &frame[.. frame.len() - CRC];
        let command = match function {
            READ_HOLDING | WRITE_SINGLE => {
                if body.len() != HEADER
                    {return Err(Discard::Malformed)}
                let header = header(body)?;
                if function == WRITE_SINGLE {
                    Command::Write {address: header.address, value: header.value}
                }
                else if header.value == 0 || header.value > MAX_READ {
                    Command::Rejected {address: header.address, code: ExceptionCode::IllegalValue}
                }
                else {
                    Command::Read {address: header.address, count: header.value}
                }
            },
            WRITE_MULTIPLE => {
                let header = header(body)?;
                let size = usize::from(*body.get(HEADER).ok_or(Discard::Malformed)?);
                let data = &body[HEADER+1 ..];
                if data.len() != size
                    {return Err(Discard::Malformed)}
                let count = usize::from(header.value);
                if count == 0 || count > MAX_WRITE || size != 2*count {
                    Command::Rejected {address: header.address, code: ExceptionCode::IllegalValue}
                }
                else {
                    let mut values = heapless::Vec::new();
                    for pair in data.chunks_exact(2) {
                        values.push(u16::from_be_bytes([pair[0], pair[1]]))
                            .map_err(|_| Discard::Malformed)?;
                    }
                    Command::WriteMultiple {address: header.address, values}
                }
            },
            _ => {
                // the address may not even be there, it is not echoed in rtu exceptions anyway
                let address = body.get(2 .. 4)
                    .map(|bytes| u16::from_be_bytes([bytes[0], bytes[1]]))
                    .unwrap_or(0);
                Command::Rejected {address, code: ExceptionCode::IllegalFunction}
            },
        };
        Ok(Request {slave: frame[0], function, command})
    }
    fn encode(&self, slave: u8, response: &Response<'_, u16>, out: &mut Frame) -> Result<(), Discard> {
        match *response {
            Response::Read {values, ..} => {
                let size = u8::try_from(2*values.len()).map_err(|_| Discard::Unencodable)?;
                put(out, &[slave, READ_HOLDING, size])?;
                for value in values {
                    put(out, &value.to_be_bytes())?;
                }
            },
            Response::Write {address, value} => {
                put(out, &Header {
                    slave,
                    function: Function::new(u7::new(WRITE_SINGLE), false),
                    address,
                    value,
                    }.to_be_bytes())?;
            },
            Response::WriteMultiple {address, count} => {
                put(out, &Header {
                    slave,
                    function: Function::new(u7::new(WRITE_MULTIPLE), false),
                    address,
                    value: count,
                    }.to_be_bytes())?;
            },
            Response::Exception {function, code, ..} => {
                let function = Function::new(u7::new(function & 0x7f), true);
                put(out, &[slave, u8::from(function), u8::from(code)])?;
            },
        }
        seal(out)
    }
}

impl Rtu {
    /// master side: append the frame for a request
    pub fn encode_request(&self, request: &Request<u16>, out: &mut Frame) -> Result<(), Discard> {
        let function = Function::new(u7::new(request.function & 0x7f), false);
        match request.command {
            Command::Read {address, count} => put(out, &Header {slave: request.slave, function, address, value: count}.to_be_bytes())?,
            Command::Write {address, value} => put(out, &Header {slave: request.slave, function, address, value}.to_be_bytes())?,
            Command::WriteMultiple {address, ref values} => {
                let count = u16::try_from(values.len()).map_err(|_| Discard::Unencodable)?;
                put(out, &Header {slave: request.slave, function, address, value: count}.to_be_bytes())?;
                put(out, &[u8::try_from(2*values.len()).map_err(|_| Discard::Unencodable)?])?;
                for value in values {
                    put(out, &value.to_be_bytes())?;
                }
            },
            Command::Rejected {..} => return Err(Discard::Unencodable),
        }
        seal(out)
    }
    /**
        master side: number of bytes a response frame has in total, given its first 3 bytes

        rtu frames carry no length field in general, so the master needs this to know when the answer ended without waiting for a silence
    */
    pub fn response_len(&self, start: [u8; 3]) -> usize {
        let function = Function::from(start[1]);
        if function.exception()
            {3 + CRC}
        else if function.code().value() == READ_HOLDING
            {3 + usize::from(start[2]) + CRC}
        else
            {HEADER + CRC}
    }
}
