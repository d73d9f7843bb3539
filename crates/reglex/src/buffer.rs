use std::io::{ErrorKind, Read};

/// Sliding window over an input stream. The bytes in `start..end` are read
/// but not yet consumed.
pub struct ReadBuffer {
    data: Vec<u8>,
    start: usize,
    end: usize,
    nominal: usize,
    exhausted: bool,
}

impl ReadBuffer {
    pub fn new(nominal: usize) -> ReadBuffer {
        let nominal = nominal.max(1);
        ReadBuffer {
            data: vec![0; nominal],
            start: 0,
            end: 0,
            nominal,
            exhausted: false,
        }
    }

    pub fn filled(&self) -> &[u8] {
        &self.data[self.start..self.end]
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The stream has returned end of file, no more data will come.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn consume(&mut self, count: usize) {
        debug_assert!(count <= self.end - self.start);
        self.start = usize::min(self.start + count, self.end);
        if self.start == self.end {
            self.start = 0;
            self.end = 0;
        }
    }

    fn growth(&self) -> usize {
        usize::max(self.nominal / 2, 1)
    }

    /// Moves the unconsumed bytes to the front, then reads once from `reader`.
    /// The storage grows whenever less than half of the nominal size is free.
    pub fn fill(&mut self, reader: &mut dyn Read) -> std::io::Result<usize> {
        if self.start > 0 {
            self.data.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }

        let growth = self.growth();
        if self.data.len() > self.nominal && self.end + growth <= self.nominal {
            // the long token is gone
            self.data.truncate(self.nominal);
            self.data.shrink_to_fit();
            log::trace!("read buffer shrunk to {}", self.nominal);
        }
        if self.data.len() - self.end < growth {
            self.data.resize(self.data.len() + growth, 0);
            log::trace!("read buffer grown to {}", self.data.len());
        }

        loop {
            match reader.read(&mut self.data[self.end..]) {
                Ok(0) => {
                    self.exhausted = true;
                    return Ok(0);
                }
                Ok(read) => {
                    self.end += read;
                    return Ok(read);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }
}

/// Length of `bytes` without a trailing incomplete UTF-8 sequence.
pub fn complete_utf8_len(bytes: &[u8]) -> usize {
    let tail_start = bytes.len().saturating_sub(3);
    for i in (tail_start..bytes.len()).rev() {
        // skip continuation bytes until the lead byte of the last sequence
        if bytes[i] & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        return match std::str::from_utf8(&bytes[i..]) {
            Err(err) if err.error_len().is_none() => i,
            _ => bytes.len(),
        };
    }
    bytes.len()
}
