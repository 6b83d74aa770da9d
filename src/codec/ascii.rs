use crate::registers::ExceptionCode;
use super::{Codec, Command, Delimiting, Discard, Frame, Request, Response, put};


/// start of requests
pub const START: u8 = b'$';
/// start of responses in hexadecimal encoding
pub const RESPONSE_START: u8 = b':';
/// end of any frame
pub const END: u8 = b'\n';
/// command writing a register
pub const WRITE: u8 = b'W';
/// command reading a register
pub const READ: u8 = b'R';
/// command marking a refused request in responses
pub const EXCEPTION: u8 = b'E';

/// 8 bit additive sum of the given bytes
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |sum, &byte| sum.wrapping_add(byte))
}

/// request frame shape check shared by both encodings, returns the bytes between the markers
fn body(frame: &[u8]) -> Result<&[u8], Discard> {
    match frame {
        [START, body @ .., END] => Ok(body),
        _ => Err(Discard::Marker),
    }
}

fn request(slave: u8, function: u8, address: u8, data: Option<u8>) -> Result<Request<u8>, Discard> {
    let address = u16::from(address);
    let command = match (function, data) {
        (WRITE, Some(value)) => Command::Write {address, value},
        (READ, None) => Command::Read {address, count: 1},
        (WRITE, None) | (READ, Some(_)) => return Err(Discard::Malformed),
        _ => Command::Rejected {address, code: ExceptionCode::IllegalFunction},
    };
    Ok(Request {slave, function, command})
}

/// fields of a response: command, address and data
fn fields(response: &Response<'_, u8>) -> Result<(u8, u8, Option<u8>), Discard> {
    let narrow = |address: u16| u8::try_from(address).map_err(|_| Discard::Unencodable);
    Ok(match *response {
        Response::Read {address, values: &[value]} => (READ, narrow(address)?, Some(value)),
        Response::Write {address, value} => (WRITE, narrow(address)?, Some(value)),
        Response::Exception {address, code, ..} => (EXCEPTION, narrow(address)?, Some(u8::from(code))),
        Response::Read {..} | Response::WriteMultiple {..} => return Err(Discard::Unencodable),
    })
}


/**
    ascii framed protocol carrying raw byte values

    ```text
    write  '$' id 'W' addr data checksum '\n'
    read   '$' id 'R' addr checksum '\n'
    ```

    responses always carry the data: `'$' id cmd addr data checksum '\n'`, the checksum summing id, cmd, addr and data.

    since values are raw, an address, data or checksum byte can equal `'\n'`. Such a byte only ends the frame once it is long enough to be a write, or is a read with a matching checksum, see [raw_complete]
*/
#[derive(Copy, Clone, Debug, Default)]
pub struct RawAscii;

/// whether a raw frame ending with `END` is finished, or the end byte was a field value
pub fn raw_complete(frame: &[u8]) -> bool {
    match frame.len() {
        // a write, or anything longer that will be dropped anyway
        7 .. => true,
        // a read, a write is missing its data
        6 => frame[2] != WRITE && RawAscii.verify(frame).is_ok(),
        _ => false,
    }
}

impl Codec for RawAscii {
    type Value = u8;
    const DELIMITING: Delimiting = Delimiting::Sentinel {starts: &[START], end: END, complete: raw_complete};
    /// read request
    const MIN_LEN: usize = 6;
    const MAX_READ: u16 = 1;

    fn target(&self, frame: &[u8]) -> Result<u8, Discard> {
        body(frame)?.first().copied().ok_or(Discard::TooShort)
    }
    fn verify(&self, frame: &[u8]) -> Result<(), Discard> {
        match body(frame)? {
            [fields @ .., sum] if checksum(fields) == *sum => Ok(()),
            _ => Err(Discard::Checksum),
        }
    }
    fn decode(&self, frame: &[u8]) -> Result<Request<u8>, Discard> {
        match *body(frame)? {
            [slave, function, address, _] => request(slave, function, address, None),
            [slave, function, address, data, _] => request(slave, function, address, Some(data)),
            _ => Err(Discard::Malformed),
        }
    }
    fn encode(&self, slave: u8, response: &Response<'_, u8>, out: &mut Frame) -> Result<(), Discard> {
        let (command, address, data) = fields(response)?;
        let fields = [slave, command, address, data.unwrap_or(0)];
        put(out, &[START])?;
        put(out, &fields)?;
        put(out, &[checksum(&fields), END])
    }
}


const DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// two uppercase hexadecimal digits
pub fn to_hex(byte: u8) -> [u8; 2] {
    [DIGITS[usize::from(byte >> 4)], DIGITS[usize::from(byte & 0xf)]]
}
/// value of two hexadecimal digits, either case
pub fn from_hex(digits: &[u8]) -> Option<u8> {
    fn digit(c: u8) -> Option<u8> {
        match c {
            b'0' ..= b'9' => Some(c - b'0'),
            b'A' ..= b'F' => Some(c - b'A' + 10),
            b'a' ..= b'f' => Some(c - b'a' + 10),
            _ => None,
        }
    }
    match *digits {
        [high, low] => Some(digit(high)? << 4 | digit(low)?),
        _ => None,
    }
}

/**
    ascii framed protocol carrying hexadecimal digits

    ```text
    write request   '$' ID 'W' AD DA CK '\n'
    read request    '$' ID 'R' AD CK '\n'
    write response  ':' ID 'W' AD CK '\n'
    read response   ':' ID 'R' AD DA CK '\n'
    ```

    each field but the command is two hexadecimal digits, the checksum is the additive sum of the characters between the start marker and the checksum
*/
#[derive(Copy, Clone, Debug, Default)]
pub struct HexAscii;

impl HexAscii {
    fn digits(field: &[u8]) -> Result<u8, Discard> {
        from_hex(field).ok_or(Discard::Malformed)
    }
}

impl Codec for HexAscii {
    type Value = u8;
    const DELIMITING: Delimiting = Delimiting::Sentinel {starts: &[START], end: END, complete: |_| true};
    /// read request
    const MIN_LEN: usize = 9;
    const MAX_READ: u16 = 1;

    fn target(&self, frame: &[u8]) -> Result<u8, Discard> {
        Self::digits(body(frame)?.get(.. 2).ok_or(Discard::TooShort)?)
    }
    fn verify(&self, frame: &[u8]) -> Result<(), Discard> {
        let body = body(frame)?;
        if body.len() < 2
            {return Err(Discard::TooShort)}
        let (fields, sum) = body.split_at(body.len() - 2);
        if checksum(fields) == Self::digits(sum)?
            {Ok(())}
        else
            {Err(Discard::Checksum)}
    }
    fn decode(&self, frame: &[u8]) -> Result<Request<u8>, Discard> {
        let body = body(frame)?;
        match body {
            [s0, s1, function, a0, a1, _, _] => request(
                Self::digits(&[*s0, *s1])?,
                *function,
                Self::digits(&[*a0, *a1])?,
                None),
            [s0, s1, function, a0, a1, d0, d1, _, _] => request(
                Self::digits(&[*s0, *s1])?,
                *function,
                Self::digits(&[*a0, *a1])?,
                Some(Self::digits(&[*d0, *d1])?)),
            _ => Err(Discard::Malformed),
        }
    }
    fn encode(&self, slave: u8, response: &Response<'_, u8>, out: &mut Frame) -> Result<(), Discard> {
        let (command, address, data) = fields(response)?;
        // write acknowledgements carry no data
        let data = if command == WRITE {None} else {data};

        let mut text = heapless::Vec::<u8, 7>::new();
        let mut push = |bytes: &[u8]| text.extend_from_slice(bytes).map_err(|_| Discard::Unencodable);
        push(&to_hex(slave))?;
        push(&[command])?;
        push(&to_hex(address))?;
        if let Some(data) = data {
            push(&to_hex(data))?;
        }
        put(out, &[RESPONSE_START])?;
        put(out, &text)?;
        put(out, &to_hex(checksum(&text)))?;
        put(out, &[END])
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_digits() {
        assert_eq!(to_hex(0xa5), *b"A5");
        assert_eq!(from_hex(b"A5"), Some(0xa5));
        assert_eq!(from_hex(b"a5"), Some(0xa5));
        assert_eq!(from_hex(b"0G"), None);
        assert_eq!(from_hex(b"0"), None);
    }

    #[test]
    fn raw_checksum() {
        // 1 + 'W' + 5 + 0xAA = 0x107
        assert_eq!(checksum(&[0x01, b'W', 0x05, 0xaa]), 0x07);
        // 1 + 'R' + 5 = 0x58
        assert_eq!(checksum(&[0x01, b'R', 0x05]), 0x58);
    }

    #[test]
    fn raw_completion() {
        // address 0x0A
        assert!(! raw_complete(&[START, 0x01, READ, END]));
        assert!(raw_complete(&[START, 0x01, READ, 0x0a, 0x5d, END]));
        // read checksum 0x0A
        assert!(! raw_complete(&[START, 0x01, READ, 0xb7, END]));
        // write with its checksum equal to 0x0A, or a bad read
        assert!(! raw_complete(&[START, 0x01, WRITE, 0x05, 0xad, END]));
        assert!(! raw_complete(&[START, 0x01, READ, 0x05, 0x59, END]));
        assert!(raw_complete(&[START, 0x01, WRITE, 0x05, 0xad, END, END]));
        // unknown commands still get their exception
        assert!(raw_complete(&[START, 0x01, b'X', 0x05, 0x5e, END]));
    }
}
