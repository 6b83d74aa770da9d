use proptest::prelude::*;

use uartreg::{
    codec::{ascii, rtu, Codec, Command, Frame, Request, Rtu},
    framing::{SentinelAssembler, SilenceAssembler},
    registers::{OutOfRange, RegisterStore},
    };


/// bytes allowed inside a sentinel frame
fn payload(max: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>().prop_filter("end marker", |&byte| byte != b'\n'), 0 ..= max)
}
/// bytes that can neither start nor end a sentinel frame
fn plain(max: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>().prop_filter("markers", |&byte| byte != b'\n' && byte != b'$'), 0 ..= max)
}

proptest! {
    #[test]
    fn sentinel_frames_survive_noise(
        noise in prop::collection::vec(any::<u8>().prop_filter("start marker", |&byte| byte != b'$'), 0 .. 32),
        body in payload(30),
    ) {
        let mut assembler = SentinelAssembler::new(b"$", b'\n', 32);
        let mut input = noise.clone();
        input.push(b'$');
        input.extend(&body);
        input.push(b'\n');

        let frames = input.iter()
            .filter_map(|&byte| assembler.feed(byte))
            .collect::<Vec<_>>();
        prop_assert_eq!(frames.len(), 1);
        prop_assert_eq!(&frames[0][1 .. frames[0].len()-1], &body[..]);
        prop_assert!(assembler.is_idle());
    }

    #[test]
    fn sentinel_overflow_recovers(body in plain(100), terminated in any::<bool>(), next in payload(10)) {
        let max = 16;
        prop_assume!(body.len() + 1 >= max);
        let mut assembler = SentinelAssembler::new(b"$", b'\n', max);
        // the next frame may follow the overlong one right away, without any end marker
        let mut input = vec![b'$'];
        input.extend(&body);
        if terminated {
            input.push(b'\n');
        }
        let mut frame = vec![b'$'];
        frame.extend(&next);
        frame.push(b'\n');
        input.extend(&frame);

        let frames = input.iter()
            .filter_map(|&byte| assembler.feed(byte))
            .collect::<Vec<_>>();
        prop_assert_eq!(frames.len(), 1);
        prop_assert_eq!(&frames[0][..], &frame[..]);
        prop_assert_eq!(assembler.overflows(), 1);
        prop_assert!(assembler.is_idle());
    }

    #[test]
    fn silence_frames_are_whole_or_nothing(chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 1 .. 40), 1 .. 8)) {
        let max = 24;
        let mut assembler = SilenceAssembler::new(max);
        for chunk in &chunks {
            for &byte in chunk {
                assembler.feed(byte);
            }
            match assembler.gap() {
                Some(frame) => prop_assert_eq!(&frame[..], &chunk[..]),
                None => prop_assert!(chunk.len() > max),
            }
            prop_assert!(assembler.is_idle());
        }
    }

    #[test]
    fn store_ranges_are_atomic(address in 0usize .. 24, values in prop::collection::vec(any::<u16>(), 1 .. 12)) {
        let mut store = RegisterStore::<u16, 16>::from_array(core::array::from_fn(|i| i as u16));
        let before = store.clone();
        match store.write_range(address, &values) {
            Ok(()) => {
                prop_assert!(address + values.len() <= 16);
                prop_assert_eq!(store.read_range(address, values.len()), Ok(&values[..]));
            },
            Err(OutOfRange {address: missing}) => {
                prop_assert!(address + values.len() > 16);
                prop_assert_eq!(missing, address.max(16));
                prop_assert_eq!(*store, *before);
            },
        }
    }

    #[test]
    fn crc_catches_bit_flips(body in prop::collection::vec(any::<u8>(), 1 .. 64), bit in any::<prop::sample::Index>()) {
        let mut frame = body.clone();
        frame.extend(rtu::crc16(&body).to_le_bytes());
        prop_assert!(rtu::check(&frame));
        let bit = bit.index(8 * frame.len());
        frame[bit / 8] ^= 1 << (bit % 8);
        prop_assert!(! rtu::check(&frame));
    }

    #[test]
    fn hex_digits(byte in any::<u8>()) {
        let digits = ascii::to_hex(byte);
        prop_assert_eq!(ascii::from_hex(&digits), Some(byte));
        prop_assert_eq!(ascii::from_hex(&digits.to_ascii_lowercase()), Some(byte));
    }

    #[test]
    fn rtu_requests_decode_as_encoded(slave in 1u8 ..= 255, address in any::<u16>(), value in any::<u16>(), count in 1u16 ..= 125) {
        let requests = [
            Request {slave, function: rtu::READ_HOLDING, command: Command::Read {address, count}},
            Request {slave, function: rtu::WRITE_SINGLE, command: Command::Write {address, value}},
            ];
        for request in requests {
            let mut frame = Frame::new();
            Rtu.encode_request(&request, &mut frame).unwrap();
            prop_assert_eq!(Rtu.target(&frame), Ok(slave));
            prop_assert_eq!(Rtu.verify(&frame), Ok(()));
            prop_assert_eq!(Rtu.decode(&frame), Ok(request));
        }
    }
}
