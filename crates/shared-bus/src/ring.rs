//! Fixed-capacity ring buffer with overwrite-oldest semantics.

/// Circular buffer that keeps the most recent `capacity` items.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: Vec<T>,
    /// Index the next push writes to once the buffer is full.
    head: usize,
    capacity: usize,
}

impl<T: Clone> RingBuffer<T> {
    /// Create an empty buffer. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    /// Push an item, evicting the oldest one when full.
    pub fn push(&mut self, item: T) {
        if self.items.len() < self.capacity {
            self.items.push(item);
        } else {
            self.items[self.head] = item;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    /// Copy out the contents, oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.items.len());
        out.extend_from_slice(&self.items[self.head..]);
        out.extend_from_slice(&self.items[..self.head]);
        out
    }

    /// The most recently pushed item.
    pub fn newest(&self) -> Option<&T> {
        if self.items.len() < self.capacity {
            self.items.last()
        } else {
            self.items.get((self.head + self.capacity - 1) % self.capacity)
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
