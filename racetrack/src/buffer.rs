use std::cell::UnsafeCell;

/////////////////////////////////////////////// Slot ///////////////////////////////////////////////

/// One thread's corner of the buffer.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Slot {
    pub last: u8,
    pub writes: u64,
}

///////////////////////////////////////////// RaceBuffer ///////////////////////////////////////////

/// The shared state every contender races to write.
///
/// Nothing in here is synchronized.  Slot `i` belongs to thread `i`; the write total belongs to
/// whoever holds the primitive under test.  A primitive that fails to exclude shows up as a total
/// that comes up short.
pub struct RaceBuffer {
    slots: Vec<UnsafeCell<Slot>>,
    total: UnsafeCell<u64>,
}

unsafe impl Sync for RaceBuffer {}

impl RaceBuffer {
    pub fn new(threads: usize) -> Self {
        Self {
            slots: (0..threads).map(|_| UnsafeCell::new(Slot::default())).collect(),
            total: UnsafeCell::new(0),
        }
    }

    pub fn threads(&self) -> usize {
        self.slots.len()
    }

    /// Record `byte` in `thread_id`'s slot and count it toward the total.
    ///
    /// # Safety
    ///
    /// The caller must be thread `thread_id` and must exclude every other caller of [write] and
    /// [count] for the duration of the call.
    ///
    /// [write]: RaceBuffer::write
    /// [count]: RaceBuffer::count
    pub unsafe fn write(&self, thread_id: usize, byte: u8) {
        self.write_slot(thread_id, byte);
        *self.total.get() += 1;
    }

    /// Record `byte` in `thread_id`'s slot without touching the total.
    ///
    /// # Safety
    ///
    /// The caller must be thread `thread_id`.
    pub unsafe fn write_slot(&self, thread_id: usize, byte: u8) {
        let slot = &mut *self.slots[thread_id].get();
        slot.last = byte;
        slot.writes += 1;
    }

    /// Add `writes` to the total.
    ///
    /// # Safety
    ///
    /// The caller must exclude every other caller of [write] and [count].
    ///
    /// [write]: RaceBuffer::write
    /// [count]: RaceBuffer::count
    pub unsafe fn count(&self, writes: u64) {
        *self.total.get() += writes;
    }

    /// Every slot as it stands.
    pub fn snapshot(&mut self) -> Vec<Slot> {
        self.slots.iter_mut().map(|s| *s.get_mut()).collect()
    }

    /// The writes counted toward the total.
    pub fn total_writes(&mut self) -> u64 {
        *self.total.get_mut()
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_independent() {
        let mut buffer = RaceBuffer::new(3);
        unsafe {
            buffer.write(0, b'a');
            buffer.write(0, b'b');
            buffer.write_slot(2, b'z');
            buffer.count(1);
        }
        assert_eq!(
            vec![
                Slot {
                    last: b'b',
                    writes: 2
                },
                Slot::default(),
                Slot {
                    last: b'z',
                    writes: 1
                },
            ],
            buffer.snapshot()
        );
        assert_eq!(3, buffer.total_writes());
        assert_eq!(3, buffer.threads());
    }
}
