/*!
    the register table exposed to the bus master, and the standard exception codes refusing access to it
*/

use core::ops::{Deref, DerefMut, Range};
use bilge::prelude::*;
use thiserror::Error;


/// value stored in a register cell, 8 bit for the ascii protocols and 16 bit for rtu
pub trait RegisterValue: Copy + Default + PartialEq + core::fmt::Debug {}
impl RegisterValue for u8 {}
impl RegisterValue for u16 {}

/// an address past the end of the table was requested
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[error("register address {address} out of range")]
pub struct OutOfRange {
    pub address: usize,
}

/// error code returned in an exception response
#[bitsize(8)]
#[derive(Copy, Clone, FromBits, Debug, PartialEq)]
pub enum ExceptionCode {
    /// function code or command not supported
    IllegalFunction = 1,
    /// address or address range outside the register table
    IllegalAddress = 2,
    /// value or register count not acceptable
    IllegalValue = 3,
    /// any code this crate does not know of, only met when decoding responses
    #[fallback]
    Unknown = 255,
}

impl From<OutOfRange> for ExceptionCode {
    fn from(_: OutOfRange) -> Self {ExceptionCode::IllegalAddress}
}


/**
    fixed size table of registers, indexed from 0

    it is only mutated by validated write commands or by the application, and is never persisted
*/
#[derive(Clone, Debug)]
pub struct RegisterStore<V, const N: usize> {
    cells: [V; N],
}

impl<V: RegisterValue, const N: usize> RegisterStore<V, N> {
    /// table with every register at its default value (zero)
    pub fn new() -> Self {
        Self {cells: [V::default(); N]}
    }
    pub fn from_array(cells: [V; N]) -> Self {
        Self {cells}
    }
    pub const fn len(&self) -> usize {N}
    pub const fn is_empty(&self) -> bool {N == 0}

    pub fn read(&self, address: usize) -> Result<V, OutOfRange> {
        self.cells.get(address).copied()
            .ok_or(OutOfRange {address})
    }
    pub fn write(&mut self, address: usize, value: V) -> Result<(), OutOfRange> {
        let cell = self.cells.get_mut(address)
            .ok_or(OutOfRange {address})?;
        *cell = value;
        Ok(())
    }
    /// consecutive registers starting at `address`, all of them must exist
    pub fn read_range(&self, address: usize, count: usize) -> Result<&[V], OutOfRange> {
        let range = self.range(address, count)?;
        Ok(&self.cells[range])
    }
    /// set consecutive registers starting at `address`, nothing is written unless all of them exist
    pub fn write_range(&mut self, address: usize, values: &[V]) -> Result<(), OutOfRange> {
        let range = self.range(address, values.len())?;
        self.cells[range].copy_from_slice(values);
        Ok(())
    }
    fn range(&self, address: usize, count: usize) -> Result<Range<usize>, OutOfRange> {
        match address.checked_add(count) {
            Some(end) if end <= N => Ok(address .. end),
            // report the first missing register
            _ => Err(OutOfRange {address: address.max(N)}),
        }
    }
}
impl<V: RegisterValue, const N: usize> Default for RegisterStore<V, N> {
    fn default() -> Self {Self::new()}
}
impl<V, const N: usize> Deref for RegisterStore<V, N> {
    type Target = [V; N];
    fn deref(&self) -> &Self::Target {
        &self.cells
    }
}
impl<V, const N: usize> DerefMut for RegisterStore<V, N> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.cells
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds() {
        let mut store = RegisterStore::<u16, 4>::new();
        assert_eq!(store.write(3, 0xbeef), Ok(()));
        assert_eq!(store.read(3), Ok(0xbeef));
        assert_eq!(store.read(4), Err(OutOfRange {address: 4}));
        assert_eq!(store.write(4, 1), Err(OutOfRange {address: 4}));
        assert_eq!(store.read_range(2, 2), Ok(&[0, 0xbeef][..]));
        assert_eq!(store.read_range(3, 2), Err(OutOfRange {address: 4}));
        assert_eq!(store.write_range(3, &[1, 2]), Err(OutOfRange {address: 4}));
        // refused range writes leave the table untouched
        assert_eq!(store[3], 0xbeef);
        assert_eq!(store.read_range(usize::MAX, 2), Err(OutOfRange {address: usize::MAX}));
    }

    #[test]
    fn exception_codes() {
        assert_eq!(u8::from(ExceptionCode::IllegalFunction), 1);
        assert_eq!(u8::from(ExceptionCode::IllegalAddress), 2);
        assert_eq!(u8::from(ExceptionCode::IllegalValue), 3);
        assert_eq!(ExceptionCode::from(3u8), ExceptionCode::IllegalValue);
        assert_eq!(ExceptionCode::from(0x42u8), ExceptionCode::Unknown);
        assert_eq!(ExceptionCode::from(OutOfRange {address: 9}), ExceptionCode::IllegalAddress);
    }
}
