use crate::error::ReadError;

/// A fixed-width little-endian value that can be stored inline in a buffer.
///
/// Implemented for every scalar the wire format knows about. Reads and writes
/// are endian-independent: the in-memory representation is always produced
/// with `to_le_bytes`/`from_le_bytes`.
pub trait Scalar: Copy + PartialEq + std::fmt::Debug {
    /// Number of bytes this scalar occupies on the wire.
    const SIZE: usize;

    /// Writes the scalar into the first `SIZE` bytes of `out`.
    fn write_le(self, out: &mut [u8]);

    /// Reads the scalar from the first `SIZE` bytes of `bytes`.
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_scalar {
    ($($ty:ty),*) => {
        $(
            impl Scalar for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn write_le(self, out: &mut [u8]) {
                    out[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_scalar!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl Scalar for bool {
    const SIZE: usize = 1;

    #[inline]
    fn write_le(self, out: &mut [u8]) {
        out[0] = self as u8;
    }

    #[inline]
    fn read_le(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

/// A read-only view over a finished (or in-progress) buffer.
///
/// Unlike a stream reader there is no cursor: every read is positional and
/// bounds-checked, so a view can be copied freely and handed to tables,
/// vectors and structs that all alias the same memory.
///
/// ```
/// let bb = brine_flat_schema::ByteBuffer::new(&[1, 0, 0, 0, 0xff, 0xff]);
/// assert_eq!(bb.read_scalar::<u32>(0), Ok(1));
/// assert_eq!(bb.read_scalar::<i16>(4), Ok(-1));
/// assert!(bb.read_scalar::<u32>(4).is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ByteBuffer<'a> {
    data: &'a [u8],
}

impl<'a> ByteBuffer<'a> {
    /// Create a new ByteBuffer that wraps the provided byte slice.
    pub fn new(data: &'a [u8]) -> ByteBuffer<'a> {
        ByteBuffer { data }
    }

    /// Retrieves the underlying byte slice.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Try to borrow `len` bytes starting at `position`.
    pub fn read_bytes(&self, position: usize, len: usize) -> Result<&'a [u8], ReadError> {
        match position.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(&self.data[position..end]),
            _ => Err(ReadError::OutOfBounds {
                position,
                size: len,
                len:  self.data.len(),
            }),
        }
    }

    /// Try to read a little-endian scalar starting at `position`.
    pub fn read_scalar<T: Scalar>(&self, position: usize) -> Result<T, ReadError> {
        Ok(T::read_le(self.read_bytes(position, T::SIZE)?))
    }

    /// Follow the unsigned 32-bit offset stored at `position`. The result is
    /// the absolute position of the referenced object.
    pub fn read_uoffset(&self, position: usize) -> Result<usize, ReadError> {
        let offset = self.read_scalar::<u32>(position)? as usize;
        match position.checked_add(offset) {
            Some(target) if target < self.data.len() => Ok(target),
            _ => Err(ReadError::OutOfBounds {
                position,
                size: offset,
                len:  self.data.len(),
            }),
        }
    }

    /// Try to read a length-prefixed UTF-8 string whose length field starts
    /// at `position`. The string aliases the underlying memory.
    pub fn read_str(&self, position: usize) -> Result<&'a str, ReadError> {
        let bytes = self.read_byte_string(position)?;
        std::str::from_utf8(bytes).map_err(|_| ReadError::InvalidUtf8 { position })
    }

    /// Like [read_str](#method.read_str) but without UTF-8 validation.
    pub fn read_byte_string(&self, position: usize) -> Result<&'a [u8], ReadError> {
        let len = self.read_scalar::<u32>(position)? as usize;
        self.read_bytes(position + 4, len)
    }
}

#[test]
fn read_scalars() {
    let bb = ByteBuffer::new(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
    assert_eq!(bb.read_scalar::<u8>(0), Ok(0x01));
    assert_eq!(bb.read_scalar::<u16>(0), Ok(0x0201));
    assert_eq!(bb.read_scalar::<u32>(0), Ok(0x0403_0201));
    assert_eq!(bb.read_scalar::<u64>(0), Ok(0x0807_0605_0403_0201));
    assert_eq!(bb.read_scalar::<u32>(4), Ok(0x0807_0605));
    assert!(bb.read_scalar::<u32>(5).is_err());
    assert!(bb.read_scalar::<u8>(8).is_err());
}

#[test]
fn read_bool() {
    let read = |bytes: &[u8]| ByteBuffer::new(bytes).read_scalar::<bool>(0);
    assert!(read(&[]).is_err());
    assert_eq!(read(&[0]), Ok(false));
    assert_eq!(read(&[1]), Ok(true));
}

#[test]
fn read_floats() {
    let bb = ByteBuffer::new(&[0, 0, 0, 63, 0, 0, 0, 0, 0, 0, 224, 191]);
    assert_eq!(bb.read_scalar::<f32>(0), Ok(0.5));
    assert_eq!(bb.read_scalar::<f64>(4), Ok(-0.5));
}

#[test]
fn read_bytes() {
    let bb = ByteBuffer::new(&[1, 2, 3, 4, 5]);
    assert_eq!(bb.read_bytes(0, 0), Ok(&[][..]));
    assert_eq!(bb.read_bytes(1, 3), Ok(&[2, 3, 4][..]));
    assert_eq!(bb.read_bytes(5, 0), Ok(&[][..]));
    assert!(bb.read_bytes(4, 2).is_err());
    assert!(bb.read_bytes(usize::MAX, 2).is_err());
}

#[test]
fn read_uoffset() {
    let bb = ByteBuffer::new(&[4, 0, 0, 0, 9, 0, 0, 0, 0xff]);
    assert_eq!(bb.read_uoffset(0), Ok(4));
    assert_eq!(bb.read_uoffset(4), Err(ReadError::OutOfBounds { position: 4, size: 9, len: 9 }));
}

#[test]
fn read_str() {
    let bb = ByteBuffer::new(&[3, 0, 0, 0, 97, 98, 99, 0, 2, 0, 0, 0, 0xc3, 0x28, 0]);
    assert_eq!(bb.read_str(0), Ok("abc"));
    assert_eq!(bb.read_str(8), Err(ReadError::InvalidUtf8 { position: 8 }));
    assert_eq!(bb.read_byte_string(8), Ok(&[0xc3, 0x28][..]));
    assert!(bb.read_str(4).is_err());
}

/// A byte buffer meant for writing back-to-front.
///
/// Data is prepended: the head moves toward the start of the backing store
/// and the store doubles (copying the used tail to the end) when it runs out.
/// Positions handed out by the builder are measured from the *end* of the
/// buffer, which stays stable while the buffer grows.
///
/// ```
/// let mut bb = brine_flat_schema::ByteBufferMut::new();
/// bb.write_scalar(0x0201u16);
/// bb.write_bytes(&[7, 8]);
/// assert_eq!(bb.data(), [7, 8, 1, 2]);
/// ```
#[derive(Debug, Clone)]
pub struct ByteBufferMut {
    data: Vec<u8>,
    head: usize,
}

impl Default for ByteBufferMut {
    fn default() -> Self {
        ByteBufferMut::new()
    }
}

impl ByteBufferMut {
    /// Creates an empty ByteBufferMut ready for writing.
    pub fn new() -> ByteBufferMut {
        ByteBufferMut::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> ByteBufferMut {
        ByteBufferMut {
            data: vec![0; capacity],
            head: capacity,
        }
    }

    /// The bytes written so far, in final memory order.
    pub fn data(&self) -> &[u8] {
        &self.data[self.head..]
    }

    /// Consumes this buffer and returns the written bytes.
    pub fn into_data(mut self) -> Vec<u8> {
        self.data.drain(..self.head);
        self.data
    }

    /// Returns the number of bytes written so far.
    pub fn len(&self) -> usize {
        self.data.len() - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops everything written so far but keeps the allocation.
    pub fn clear(&mut self) {
        self.data.iter_mut().for_each(|b| *b = 0);
        self.head = self.data.len();
    }

    fn reserve(&mut self, additional: usize) {
        if additional <= self.head {
            return;
        }
        let used = self.len();
        let old_len = self.data.len();
        let new_len = (old_len * 2).max(used + additional).max(16);
        let mut grown = vec![0; new_len];
        grown[new_len - used..].copy_from_slice(&self.data[self.head..]);
        self.data = grown;
        self.head = new_len - used;
    }

    /// Prepend `count` zero bytes.
    pub fn pad(&mut self, count: usize) {
        self.reserve(count);
        self.head -= count;
        self.data[self.head..self.head + count].iter_mut().for_each(|b| *b = 0);
    }

    /// Prepend a raw byte slice, preserving its order.
    pub fn write_bytes(&mut self, value: &[u8]) {
        self.reserve(value.len());
        self.head -= value.len();
        self.data[self.head..self.head + value.len()].copy_from_slice(value);
    }

    /// Prepend a little-endian scalar.
    pub fn write_scalar<T: Scalar>(&mut self, value: T) {
        self.reserve(T::SIZE);
        self.head -= T::SIZE;
        value.write_le(&mut self.data[self.head..]);
    }

    /// Drops the bytes written after the buffer held `len` bytes.
    pub fn truncate(&mut self, len: usize) {
        if len < self.len() {
            let head = self.data.len() - len;
            self.data[self.head..head].iter_mut().for_each(|b| *b = 0);
            self.head = head;
        }
    }

    /// Overwrite a scalar that was written earlier. `offset` is the value of
    /// [len](#method.len) right after the scalar was written.
    pub fn patch_scalar<T: Scalar>(&mut self, offset: usize, value: T) {
        let position = self.data.len() - offset;
        value.write_le(&mut self.data[position..]);
    }
}

#[cfg(test)]
fn write_once(cb: fn(&mut ByteBufferMut)) -> Vec<u8> {
    let mut bb = ByteBufferMut::with_capacity(2);
    cb(&mut bb);
    bb.into_data()
}

#[test]
fn write_scalars() {
    assert_eq!(write_once(|bb| bb.write_scalar(true)), [1]);
    assert_eq!(write_once(|bb| bb.write_scalar(-1i8)), [255]);
    assert_eq!(write_once(|bb| bb.write_scalar(0x0201u16)), [1, 2]);
    assert_eq!(write_once(|bb| bb.write_scalar(-2i32)), [254, 255, 255, 255]);
    assert_eq!(write_once(|bb| bb.write_scalar(0.5f32)), [0, 0, 0, 63]);
    assert_eq!(
        write_once(|bb| bb.write_scalar(0x0807_0605_0403_0201u64)),
        [1, 2, 3, 4, 5, 6, 7, 8]
    );
}

#[test]
fn write_prepends() {
    assert_eq!(
        write_once(|bb| {
            bb.write_bytes(&[4, 5]);
            bb.write_bytes(&[]);
            bb.write_bytes(&[1, 2, 3]);
        }),
        [1, 2, 3, 4, 5]
    );
}

#[test]
fn write_grows_and_keeps_tail() {
    let mut bb = ByteBufferMut::with_capacity(1);
    for i in 0..100u8 {
        bb.write_scalar(i);
    }
    assert_eq!(bb.len(), 100);
    assert_eq!(bb.data()[0], 99);
    assert_eq!(bb.data()[99], 0);
}

#[test]
fn write_pad_and_patch() {
    let mut bb = ByteBufferMut::with_capacity(4);
    bb.write_scalar(0u32);
    let at = bb.len();
    bb.pad(3);
    bb.patch_scalar(at, 0x0a0b_0c0du32);
    assert_eq!(bb.data(), [0, 0, 0, 0x0d, 0x0c, 0x0b, 0x0a]);

    bb.clear();
    assert!(bb.is_empty());
}
