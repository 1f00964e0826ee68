/// Byte order used by `Buffer::append_int`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

/// A growable byte buffer used to assemble sector images field by field.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Buffer {
    data: Vec<u8>,
}

impl Buffer {
    pub fn new() -> Buffer {
        Buffer { data: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Buffer {
        Buffer {
            data: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn append_byte(&mut self, byte: u8) -> &mut Buffer {
        self.data.push(byte);
        self
    }

    pub fn append_bytes(&mut self, bytes: &[u8]) -> &mut Buffer {
        self.data.extend_from_slice(bytes);
        self
    }

    /// Append exactly `width` bytes: `bytes` truncated or filled out with
    /// `pad`.
    pub fn append_padded(&mut self, bytes: &[u8], width: usize, pad: u8) -> &mut Buffer {
        let used = bytes.len().min(width);
        self.data.extend_from_slice(&bytes[..used]);
        self.data.resize(self.data.len() + width - used, pad);
        self
    }

    /// Append the low `size` bytes of `value`.
    pub fn append_int(&mut self, value: u64, size: usize, order: ByteOrder) -> &mut Buffer {
        let bytes = value.to_le_bytes();
        let size = size.min(bytes.len());
        match order {
            ByteOrder::LittleEndian => self.data.extend_from_slice(&bytes[..size]),
            ByteOrder::BigEndian => self.data.extend(bytes[..size].iter().rev()),
        }
        self
    }

    /// Append a little-endian 16-bit word.
    pub fn append_word(&mut self, value: u16) -> &mut Buffer {
        self.append_int(value as u64, 2, ByteOrder::LittleEndian)
    }

    pub fn append_zeros(&mut self, count: usize) -> &mut Buffer {
        self.data.resize(self.data.len() + count, 0);
        self
    }

    /// Fill with `byte` until the buffer is `length` bytes long.  A buffer
    /// that is already long enough is left alone.
    pub fn pad_to(&mut self, length: usize, byte: u8) -> &mut Buffer {
        if self.data.len() < length {
            self.data.resize(length, byte);
        }
        self
    }
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
