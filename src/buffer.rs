//! An amortized-growth receive buffer with a read cursor, so a partially
//! consumed frame doesn't force an O(n) shift on every `consume` call
//! (spec.md §9, Design Note 2).

/// Bytes accumulated from the serial line across one or more reads, plus a
/// cursor marking how much of the front has already been consumed.
#[derive(Debug, Default)]
pub struct ReceiveBuffer {
    data: Vec<u8>,
    cursor: usize,
}

impl ReceiveBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly read bytes to the buffer.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.data.extend_from_slice(chunk);
    }

    /// The unconsumed bytes available for classification/validation.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.cursor..]
    }

    /// Advances the cursor past `n` consumed bytes, compacting the backing
    /// vector once the cursor has passed the halfway point so memory stays
    /// bounded across a long-lived transport.
    pub fn consume(&mut self, n: usize) {
        self.cursor = (self.cursor + n).min(self.data.len());
        if self.cursor > self.data.len() / 2 {
            self.compact();
        }
    }

    fn compact(&mut self) {
        self.data.drain(..self.cursor);
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_then_remaining() {
        let mut buf = ReceiveBuffer::new();
        buf.extend(&[1, 2, 3]);
        assert_eq!(buf.remaining(), &[1, 2, 3]);
    }

    #[test]
    fn consume_advances_cursor_without_discarding_trailing_bytes() {
        let mut buf = ReceiveBuffer::new();
        buf.extend(&[1, 2, 3, 4, 5]);
        buf.consume(2);
        assert_eq!(buf.remaining(), &[3, 4, 5]);
    }

    #[test]
    fn compaction_keeps_remaining_bytes_intact() {
        let mut buf = ReceiveBuffer::new();
        buf.extend(&[1, 2, 3, 4]);
        buf.consume(3); // cursor 3 > len/2 (2) -> compacts
        assert_eq!(buf.remaining(), &[4]);
        buf.extend(&[5, 6]);
        assert_eq!(buf.remaining(), &[4, 5, 6]);
    }

    #[test]
    fn consume_past_end_is_clamped() {
        let mut buf = ReceiveBuffer::new();
        buf.extend(&[1, 2]);
        buf.consume(100);
        assert_eq!(buf.remaining(), &[] as &[u8]);
    }
}
