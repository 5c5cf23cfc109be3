//! Fixed-capacity circular buffer

use std::ops::Index;

/// Circular FIFO buffer with a capacity fixed at construction
///
/// Never grows. Pushing into a full buffer or popping an empty one is a
/// precondition violation and panics, like out-of-range slice indexing.
#[derive(Clone, Debug)]
pub struct RingBuffer<T> {
    slots: Box<[Option<T>]>,
    head: usize,
    count: usize,
}

impl<T> RingBuffer<T> {
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "RingBuffer capacity must be positive");
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            count: 0,
        }
    }

    /// Append `value` at the back and return mutable access to its slot
    ///
    /// # Panics
    ///
    /// Panics if the buffer is full.
    pub fn push_back(&mut self, value: T) -> &mut T {
        assert!(!self.is_full(), "RingBuffer overflow");
        let slot = self.physical(self.count);
        self.count += 1;
        self.slots[slot].insert(value)
    }

    /// Remove and return the oldest element
    ///
    /// # Panics
    ///
    /// Panics if the buffer is empty.
    pub fn pop_front(&mut self) -> T {
        assert!(!self.is_empty(), "RingBuffer underflow");
        let value = self.slots[self.head]
            .take()
            .expect("occupied ring slot");
        self.head = (self.head + 1) % self.slots.len();
        self.count -= 1;
        value
    }

    /// Empty the buffer, dropping the held elements
    ///
    /// Only occupied slots are touched, so the cost is proportional to
    /// `len()` rather than to the capacity.
    pub fn reset(&mut self) {
        for i in 0..self.count {
            let slot = self.physical(i);
            self.slots[slot] = None;
        }
        self.head = 0;
        self.count = 0;
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == self.slots.len()
    }

    /// The `index`-th element in FIFO order
    pub fn get(&self, index: usize) -> Option<&T> {
        if index < self.count {
            self.slots[self.physical(index)].as_ref()
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.count).filter_map(move |i| self.get(i))
    }

    fn physical(&self, index: usize) -> usize {
        (self.head + index) % self.slots.len()
    }
}

impl<T> Index<usize> for RingBuffer<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        match self.get(index) {
            Some(value) => value,
            None => panic!(
                "RingBuffer index {} out of range for length {}",
                index, self.count
            ),
        }
    }
}
