/*!
    lock-free single producer single consumer byte ring, shared between an interrupt handler and a task

    the read index `head` is only ever written by the consumer, the write index `tail` is only ever written by the producer, so no lock is needed as long as each side sticks to its own methods.
*/

use core::{
    cell::UnsafeCell,
    future::poll_fn,
    sync::atomic::{AtomicUsize, Ordering::*},
    task::Poll,
    };
use embassy_sync::waitqueue::AtomicWaker;


/**
    fixed capacity circular byte buffer

    `head == tail` means empty, so at most `N - 1` bytes can be stored. A full buffer never overwrites, pushing into it is refused.
*/
pub struct RingBuffer<const N: usize> {
    data: [UnsafeCell<u8>; N],
    /// next byte to read, consumer owned
    head: AtomicUsize,
    /// next slot to write, producer owned
    tail: AtomicUsize,
    /// consumer waiting for data
    readable: AtomicWaker,
    /// producer waiting for space
    writable: AtomicWaker,
}
// SAFETY: a slot is only written by the producer before publishing it with `tail`, and only read by the consumer before releasing it with `head`
unsafe impl<const N: usize> Sync for RingBuffer<N> {}

impl<const N: usize> RingBuffer<N> {
    pub const fn new() -> Self {
        const { assert!(N > 1, "a ring buffer needs at least 2 slots") };
        Self {
            data: [const { UnsafeCell::new(0) }; N],
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            readable: AtomicWaker::new(),
            writable: AtomicWaker::new(),
        }
    }
    /// maximum number of bytes the buffer can hold at once
    pub const fn capacity(&self) -> usize {N - 1}

    pub fn len(&self) -> usize {
        let head = self.head.load(Acquire);
        let tail = self.tail.load(Acquire);
        (tail + N - head) % N
    }
    pub fn is_empty(&self) -> bool {
        self.head.load(Acquire) == self.tail.load(Acquire)
    }

    /// producer side: append a byte, returns false without touching the buffer if it is full
    pub fn push(&self, byte: u8) -> bool {
        let tail = self.tail.load(Relaxed);
        let next = (tail + 1) % N;
        if next == self.head.load(Acquire)
            {return false}
        // SAFETY: slot `tail` is not visible to the consumer until `tail` is advanced
        unsafe {*self.data[tail].get() = byte};
        self.tail.store(next, Release);
        self.readable.wake();
        true
    }
    /// consumer side: take the oldest byte if any
    pub fn pop(&self) -> Option<u8> {
        let head = self.head.load(Relaxed);
        if head == self.tail.load(Acquire)
            {return None}
        // SAFETY: slot `head` was published by the producer and is not reused until `head` is advanced
        let byte = unsafe {*self.data[head].get()};
        self.head.store((head + 1) % N, Release);
        self.writable.wake();
        Some(byte)
    }

    /// consumer side: wait until a byte is available and take it
    pub async fn pop_wait(&self) -> u8 {
        poll_fn(|context| {
            if let Some(byte) = self.pop()
                {return Poll::Ready(byte)}
            self.readable.register(context.waker());
            // a push may have happened before registration
            match self.pop() {
                Some(byte) => Poll::Ready(byte),
                None => Poll::Pending,
            }
        }).await
    }
    /// producer side: wait until there is space for the byte and append it
    pub async fn push_wait(&self, byte: u8) {
        poll_fn(|context| {
            if self.push(byte)
                {return Poll::Ready(())}
            self.writable.register(context.waker());
            if self.push(byte)
                {Poll::Ready(())}
            else
                {Poll::Pending}
        }).await
    }
}
impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {Self::new()}
}


#[cfg(test)]
mod tests {
    use super::RingBuffer;

    #[test]
    fn refuses_when_full() {
        let ring = RingBuffer::<4>::new();
        assert_eq!(ring.capacity(), 3);
        assert!(ring.push(1));
        assert!(ring.push(2));
        assert!(ring.push(3));
        assert!(! ring.push(4));
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.pop(), Some(1));
        assert!(ring.push(4));
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), Some(3));
        assert_eq!(ring.pop(), Some(4));
        assert_eq!(ring.pop(), None);
        assert!(ring.is_empty());
    }

    #[test]
    fn indices_wrap_around() {
        let ring = RingBuffer::<3>::new();
        for byte in 0 .. 20u8 {
            assert!(ring.push(byte));
            assert_eq!(ring.len(), 1);
            assert_eq!(ring.pop(), Some(byte));
        }
        assert!(ring.is_empty());
    }
}
