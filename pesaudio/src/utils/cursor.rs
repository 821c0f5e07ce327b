//! Byte-window bookkeeping shared by the synchronizers.

/// Non-owning view over the bytes of one delivery that are still to be consumed.
///
/// Every consumer advances the cursor through these methods; nothing indexes the
/// underlying slice directly, so a cursor can never outlive the bytes it points into.
#[derive(Debug, Clone, Copy)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Bytes consumed since the cursor was created.
    #[inline]
    pub fn consumed(&self) -> usize {
        self.pos
    }

    /// The unconsumed bytes, without advancing.
    #[inline]
    pub fn peek(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    #[inline]
    pub fn first(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Consumes up to `n` bytes and returns them.
    #[inline]
    pub fn take(&mut self, n: usize) -> &'a [u8] {
        let n = n.min(self.remaining());
        let taken = &self.data[self.pos..self.pos + n];
        self.pos += n;
        taken
    }

    #[inline]
    pub fn take_all(&mut self) -> &'a [u8] {
        self.take(self.remaining())
    }

    #[inline]
    pub fn advance(&mut self, n: usize) {
        self.pos += n.min(self.remaining());
    }
}

/// The newest `capacity` bytes seen while no sync word was found.
///
/// Kept across payload spans so a sync word split over two deliveries can still be
/// reported, as a negative offset, once the rest of it arrives.
#[derive(Debug, Clone, Default)]
pub struct PotentialHeaderTail {
    bytes: Vec<u8>,
    capacity: usize,
}

impl PotentialHeaderTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity * 2),
            capacity,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Appends `data`, keeping only the newest `capacity` bytes.
    pub fn push(&mut self, data: &[u8]) {
        if data.len() >= self.capacity {
            self.bytes.clear();
            self.bytes
                .extend_from_slice(&data[data.len() - self.capacity..]);
            return;
        }

        self.bytes.extend_from_slice(data);
        if self.bytes.len() > self.capacity {
            let excess = self.bytes.len() - self.capacity;
            self.bytes.drain(..excess);
        }
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }
}

#[test]
fn cursor_take_clamps() {
    let data = [1u8, 2, 3, 4, 5];
    let mut cursor = ByteCursor::new(&data);

    assert_eq!(cursor.take(2), &[1, 2]);
    assert_eq!(cursor.consumed(), 2);
    assert_eq!(cursor.first(), Some(3));

    assert_eq!(cursor.take(10), &[3, 4, 5]);
    assert!(cursor.is_empty());
    assert_eq!(cursor.take(1), &[] as &[u8]);
    assert_eq!(cursor.first(), None);
}

#[test]
fn tail_keeps_newest_bytes() {
    let mut tail = PotentialHeaderTail::new(3);

    tail.push(&[1, 2]);
    assert_eq!(tail.as_slice(), &[1, 2]);

    tail.push(&[3, 4]);
    assert_eq!(tail.as_slice(), &[2, 3, 4]);

    tail.push(&[5, 6, 7, 8, 9]);
    assert_eq!(tail.as_slice(), &[7, 8, 9]);

    tail.clear();
    assert!(tail.is_empty());
}
