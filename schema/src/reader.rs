//! Zero-copy views over a finished buffer.
//!
//! Nothing is parsed up front: each accessor follows exactly the offsets it
//! needs and bounds-checks every read, so touching one field of a large
//! buffer costs a handful of loads.

use crate::bb::{ByteBuffer, Scalar};
use crate::error::ReadError;
use crate::layout::VTABLE_HEADER_SIZE;

use std::cmp::Ordering;

/// A finished buffer: a root offset, an optional file identifier, then data.
#[derive(Clone, Copy, Debug)]
pub struct Buffer<'a> {
    bb: ByteBuffer<'a>,
}

impl<'a> Buffer<'a> {
    pub fn new(data: &'a [u8]) -> Buffer<'a> {
        Buffer {
            bb: ByteBuffer::new(data),
        }
    }

    pub fn data(&self) -> &'a [u8] {
        self.bb.data()
    }

    /// The root table.
    pub fn root(&self) -> Result<Table<'a>, ReadError> {
        let loc = self.bb.read_uoffset(0)?;
        Ok(Table { bb: self.bb, loc })
    }

    /// The 4 bytes following the root offset, if the buffer is long enough
    /// to carry an identifier.
    pub fn identifier(&self) -> Option<&'a [u8]> {
        self.bb.read_bytes(4, 4).ok()
    }

    pub fn has_identifier(&self, identifier: &[u8; 4]) -> bool {
        self.identifier() == Some(&identifier[..])
    }
}

/// A table: an `soffset` to its vtable followed by its inline fields.
#[derive(Clone, Copy, Debug)]
pub struct Table<'a> {
    bb:  ByteBuffer<'a>,
    loc: usize,
}

impl<'a> Table<'a> {
    /// A table starting at `loc` inside `data`. Nothing is checked until a
    /// field is read.
    pub fn new(data: &'a [u8], loc: usize) -> Table<'a> {
        Table {
            bb: ByteBuffer::new(data),
            loc,
        }
    }

    pub fn data(&self) -> &'a [u8] {
        self.bb.data()
    }

    pub fn location(&self) -> usize {
        self.loc
    }

    /// Position and byte size of this table's vtable.
    fn vtable(&self) -> Result<(usize, usize), ReadError> {
        let invalid = ReadError::InvalidVTable { position: self.loc };
        let soffset = self.bb.read_scalar::<i32>(self.loc)? as i64;
        let position = self.loc as i64 - soffset;
        if position < 0 || position as usize >= self.bb.len() {
            return Err(invalid);
        }
        let position = position as usize;
        let size = self.bb.read_scalar::<u16>(position)? as usize;
        if size < VTABLE_HEADER_SIZE || size % 2 != 0 {
            return Err(invalid);
        }
        self.bb.read_bytes(position, size)?;
        Ok((position, size))
    }

    /// Number of slots in this table's vtable.
    pub fn vtable_len(&self) -> Result<usize, ReadError> {
        let (_, size) = self.vtable()?;
        Ok((size - VTABLE_HEADER_SIZE) / 2)
    }

    /// Number of vtable slots that point at a stored field.
    pub fn live_fields(&self) -> Result<usize, ReadError> {
        let (position, size) = self.vtable()?;
        let mut live = 0;
        for slot in (position + VTABLE_HEADER_SIZE..position + size).step_by(2) {
            if self.bb.read_scalar::<u16>(slot)? != 0 {
                live += 1;
            }
        }
        Ok(live)
    }

    /// Absolute position of field `id`, or `None` when the field was not
    /// written. Ids past the end of the vtable are absent too: the table
    /// was written by an older schema.
    pub fn field_offset(&self, id: u16) -> Result<Option<usize>, ReadError> {
        let (position, size) = self.vtable()?;
        let slot = VTABLE_HEADER_SIZE + 2 * id as usize;
        if slot + 2 > size {
            return Ok(None);
        }
        match self.bb.read_scalar::<u16>(position + slot)? {
            0 => Ok(None),
            voffset => Ok(Some(self.loc + voffset as usize)),
        }
    }

    /// The `size` raw bytes of field `id`.
    pub fn get_raw(&self, id: u16, size: usize) -> Result<Option<&'a [u8]>, ReadError> {
        match self.field_offset(id)? {
            Some(position) => Ok(Some(self.bb.read_bytes(position, size)?)),
            None => Ok(None),
        }
    }

    pub fn get_scalar<T: Scalar>(&self, id: u16, default: T) -> Result<T, ReadError> {
        match self.field_offset(id)? {
            Some(position) => self.bb.read_scalar(position),
            None => Ok(default),
        }
    }

    pub fn get_scalar_opt<T: Scalar>(&self, id: u16) -> Result<Option<T>, ReadError> {
        match self.field_offset(id)? {
            Some(position) => Ok(Some(self.bb.read_scalar(position)?)),
            None => Ok(None),
        }
    }

    pub fn get_string(&self, id: u16) -> Result<Option<&'a str>, ReadError> {
        match self.field_offset(id)? {
            Some(position) => Ok(Some(self.bb.read_str(self.bb.read_uoffset(position)?)?)),
            None => Ok(None),
        }
    }

    pub fn get_byte_string(&self, id: u16) -> Result<Option<&'a [u8]>, ReadError> {
        match self.field_offset(id)? {
            Some(position) => Ok(Some(self.bb.read_byte_string(self.bb.read_uoffset(position)?)?)),
            None => Ok(None),
        }
    }

    pub fn get_table(&self, id: u16) -> Result<Option<Table<'a>>, ReadError> {
        match self.field_offset(id)? {
            Some(position) => Ok(Some(Table {
                bb:  self.bb,
                loc: self.bb.read_uoffset(position)?,
            })),
            None => Ok(None),
        }
    }

    pub fn get_vector(&self, id: u16) -> Result<Option<Vector<'a>>, ReadError> {
        match self.field_offset(id)? {
            Some(position) => Ok(Some(Vector::at(self.bb, self.bb.read_uoffset(position)?)?)),
            None => Ok(None),
        }
    }

    /// A fixed struct stored inline in field `id`.
    pub fn get_struct(&self, id: u16) -> Result<Option<Struct<'a>>, ReadError> {
        Ok(self.field_offset(id)?.map(|loc| Struct { bb: self.bb, loc }))
    }

    /// A union stored as a `u8` discriminant in `type_id` and a table in
    /// `value_id`. The `NONE` discriminant and a missing value both read as
    /// `None`.
    pub fn get_union(&self, type_id: u16, value_id: u16) -> Result<Option<(u8, Table<'a>)>, ReadError> {
        let tag = self.get_scalar::<u8>(type_id, 0)?;
        if tag == 0 {
            return Ok(None);
        }
        Ok(self.get_table(value_id)?.map(|table| (tag, table)))
    }
}

/// A length-prefixed vector. `loc` points at the 32-bit length.
#[derive(Clone, Copy, Debug)]
pub struct Vector<'a> {
    bb:  ByteBuffer<'a>,
    loc: usize,
    len: usize,
}

impl<'a> Vector<'a> {
    fn at(bb: ByteBuffer<'a>, loc: usize) -> Result<Vector<'a>, ReadError> {
        let len = bb.read_scalar::<u32>(loc)? as usize;
        Ok(Vector { bb, loc, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Position of element `index` for elements of `stride` bytes.
    fn element(&self, index: usize, stride: usize) -> Result<usize, ReadError> {
        if index >= self.len {
            return Err(ReadError::IndexOutOfRange { index, len: self.len });
        }
        Ok(self.loc + 4 + index * stride)
    }

    /// The `size` raw bytes of element `index`.
    pub fn get_raw(&self, index: usize, size: usize) -> Result<&'a [u8], ReadError> {
        self.bb.read_bytes(self.element(index, size)?, size)
    }

    pub fn get_scalar<T: Scalar>(&self, index: usize) -> Result<T, ReadError> {
        self.bb.read_scalar(self.element(index, T::SIZE)?)
    }

    pub fn get_string(&self, index: usize) -> Result<&'a str, ReadError> {
        self.bb.read_str(self.bb.read_uoffset(self.element(index, 4)?)?)
    }

    pub fn get_table(&self, index: usize) -> Result<Table<'a>, ReadError> {
        Ok(Table {
            bb:  self.bb,
            loc: self.bb.read_uoffset(self.element(index, 4)?)?,
        })
    }

    pub fn get_vector(&self, index: usize) -> Result<Vector<'a>, ReadError> {
        Vector::at(self.bb, self.bb.read_uoffset(self.element(index, 4)?)?)
    }

    /// Element `index` of a vector of `size`-byte fixed structs.
    pub fn get_struct(&self, index: usize, size: usize) -> Result<Struct<'a>, ReadError> {
        let loc = self.element(index, size)?;
        self.bb.read_bytes(loc, size)?;
        Ok(Struct { bb: self.bb, loc })
    }

    /// Binary search of a vector of tables sorted by key.
    pub fn lookup_table_by_key<F>(&self, key: &Key<'_>, key_of: F) -> Result<Option<Table<'a>>, ReadError>
    where
        F: Fn(&Table<'a>) -> Result<Key<'a>, ReadError>,
    {
        self.binary_search(key, |index| {
            let table = self.get_table(index)?;
            Ok((key_of(&table)?, table))
        })
    }

    /// Binary search of a vector of `size`-byte structs sorted by key.
    pub fn lookup_struct_by_key<F>(
        &self,
        key: &Key<'_>,
        size: usize,
        key_of: F,
    ) -> Result<Option<Struct<'a>>, ReadError>
    where
        F: Fn(&Struct<'a>) -> Result<Key<'a>, ReadError>,
    {
        self.binary_search(key, |index| {
            let value = self.get_struct(index, size)?;
            Ok((key_of(&value)?, value))
        })
    }

    fn binary_search<T, F>(&self, key: &Key<'_>, probe: F) -> Result<Option<T>, ReadError>
    where
        F: Fn(usize) -> Result<(Key<'a>, T), ReadError>,
    {
        let mut low = 0;
        let mut high = self.len;
        while low < high {
            let middle = low + (high - low) / 2;
            let (found, element) = probe(middle)?;
            match found.cmp_with(key) {
                Ordering::Less => low = middle + 1,
                Ordering::Greater => high = middle,
                Ordering::Equal => return Ok(Some(element)),
            }
        }
        Ok(None)
    }
}

/// A fixed struct stored inline. Fields are read by static byte offset.
#[derive(Clone, Copy, Debug)]
pub struct Struct<'a> {
    bb:  ByteBuffer<'a>,
    loc: usize,
}

impl<'a> Struct<'a> {
    /// A struct starting at `loc` inside `data`.
    pub fn new(data: &'a [u8], loc: usize) -> Struct<'a> {
        Struct {
            bb: ByteBuffer::new(data),
            loc,
        }
    }

    pub fn data(&self) -> &'a [u8] {
        self.bb.data()
    }

    pub fn location(&self) -> usize {
        self.loc
    }

    pub fn get<T: Scalar>(&self, offset: usize) -> Result<T, ReadError> {
        self.bb.read_scalar(self.loc + offset)
    }

    pub fn get_raw(&self, offset: usize, size: usize) -> Result<&'a [u8], ReadError> {
        self.bb.read_bytes(self.loc + offset, size)
    }

    /// A nested struct stored at `offset`.
    pub fn get_struct(&self, offset: usize) -> Struct<'a> {
        Struct {
            bb:  self.bb,
            loc: self.loc + offset,
        }
    }
}

/// The value of a key field, ordered the way sorted vectors are sorted:
/// numerically for scalars and byte-wise for strings.
#[derive(Clone, Copy, Debug)]
pub enum Key<'a> {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bytes(&'a [u8]),
}

impl<'a> Key<'a> {
    fn rank(&self) -> u8 {
        match self {
            Key::Int(_) => 0,
            Key::UInt(_) => 1,
            Key::Float(_) => 2,
            Key::Bytes(_) => 3,
        }
    }

    /// Compares keys of possibly different lifetimes.
    pub fn cmp_with(&self, other: &Key<'_>) -> Ordering {
        match (self, other) {
            (Key::Int(a), Key::Int(b)) => a.cmp(b),
            (Key::UInt(a), Key::UInt(b)) => a.cmp(b),
            (Key::Float(a), Key::Float(b)) => a.total_cmp(b),
            (Key::Bytes(a), Key::Bytes(b)) => a.cmp(b),
            (Key::Int(a), Key::UInt(b)) => (*a as i128).cmp(&(*b as i128)),
            (Key::UInt(a), Key::Int(b)) => (*a as i128).cmp(&(*b as i128)),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl<'a> PartialEq for Key<'a> {
    fn eq(&self, other: &Key<'a>) -> bool {
        self.cmp_with(other) == Ordering::Equal
    }
}

impl<'a> Eq for Key<'a> {}

impl<'a> PartialOrd for Key<'a> {
    fn partial_cmp(&self, other: &Key<'a>) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<'a> Ord for Key<'a> {
    fn cmp(&self, other: &Key<'a>) -> Ordering {
        self.cmp_with(other)
    }
}

macro_rules! key_from {
    ($variant:ident, $wide:ty, $($ty:ty),*) => {
        $(
            impl<'a> From<$ty> for Key<'a> {
                fn from(value: $ty) -> Key<'a> {
                    Key::$variant(value as $wide)
                }
            }
        )*
    };
}

key_from!(Int, i64, i8, i16, i32, i64);
key_from!(UInt, u64, u8, u16, u32, u64);
key_from!(Float, f64, f32, f64);

impl<'a> From<&'a str> for Key<'a> {
    fn from(value: &'a str) -> Key<'a> {
        Key::Bytes(value.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: [u8; 20] = [
        12, 0, 0, 0, // root
        8, 0, 8, 0, 4, 0, 0, 0, // vtable: field 0 at +4, field 1 absent
        8, 0, 0, 0, // soffset to the vtable
        42, 0, 0, 0, // field 0
    ];

    #[test]
    fn key_order() {
        let mut keys = vec![Key::from("b"), Key::from(3u32), Key::from(-1i32), Key::from("a"), Key::from(0.5f64)];
        keys.sort();
        assert_eq!(keys, [Key::Int(-1), Key::UInt(3), Key::Float(0.5), Key::from("a"), Key::from("b")]);
        assert_eq!(Key::Int(3), Key::UInt(3));
        assert!(Key::from("ab") < Key::from("b"));
        assert!(Key::Float(f64::NAN) > Key::Float(f64::INFINITY));
    }

    #[test]
    fn table_reads() {
        let table = Buffer::new(&SMALL).root().unwrap();
        assert_eq!(table.location(), 12);
        assert_eq!(table.vtable_len(), Ok(2));
        assert_eq!(table.live_fields(), Ok(1));
        assert_eq!(table.field_offset(0), Ok(Some(16)));
        assert_eq!(table.field_offset(1), Ok(None));
        assert_eq!(table.field_offset(100), Ok(None));
        assert_eq!(table.get_scalar::<i32>(0, 7), Ok(42));
        assert_eq!(table.get_scalar::<i32>(1, 7), Ok(7));
        assert_eq!(table.get_scalar_opt::<i32>(1), Ok(None));
    }

    #[test]
    fn table_rejects_bad_vtables() {
        let mut data = SMALL;
        data[12..16].copy_from_slice(&100i32.to_le_bytes());
        let table = Buffer::new(&data).root().unwrap();
        assert_eq!(table.field_offset(0), Err(ReadError::InvalidVTable { position: 12 }));

        data[12..16].copy_from_slice(&8i32.to_le_bytes());
        data[4] = 3;
        let table = Buffer::new(&data).root().unwrap();
        assert_eq!(table.field_offset(0), Err(ReadError::InvalidVTable { position: 12 }));
    }

    #[test]
    fn root_out_of_bounds() {
        assert!(Buffer::new(&[]).root().is_err());
        assert!(Buffer::new(&[200, 0, 0, 0]).root().is_err());
    }

    #[test]
    fn identifier() {
        let data = [8, 0, 0, 0, b'M', b'O', b'N', b'S', 0, 0, 0, 0];
        let buffer = Buffer::new(&data);
        assert!(buffer.has_identifier(b"MONS"));
        assert!(!buffer.has_identifier(b"BFBS"));
        assert!(!Buffer::new(&data[..6]).has_identifier(b"MONS"));
    }

    #[test]
    fn vector_reads() {
        // length 3, then three u16
        let data = [3, 0, 0, 0, 1, 0, 2, 0, 3, 0];
        let vector = Vector::at(ByteBuffer::new(&data), 0).unwrap();
        assert_eq!(vector.len(), 3);
        assert_eq!(vector.get_scalar::<u16>(2), Ok(3));
        assert_eq!(vector.get_scalar::<u16>(3), Err(ReadError::IndexOutOfRange { index: 3, len: 3 }));

        let found = vector
            .lookup_struct_by_key(&Key::UInt(2), 2, |s| Ok(Key::UInt(s.get::<u16>(0)? as u64)))
            .unwrap();
        assert_eq!(found.map(|s| s.location()), Some(6));
        let missing = vector
            .lookup_struct_by_key(&Key::UInt(4), 2, |s| Ok(Key::UInt(s.get::<u16>(0)? as u64)))
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn lookup_is_logarithmic() {
        // length 1024, then the u32 keys 0..1024
        let mut data = 1024u32.to_le_bytes().to_vec();
        for key in 0..1024u32 {
            data.extend_from_slice(&key.to_le_bytes());
        }
        let vector = Vector::at(ByteBuffer::new(&data), 0).unwrap();
        let calls = std::cell::Cell::new(0);
        let key_of = |s: &Struct<'_>| {
            calls.set(calls.get() + 1);
            Ok(Key::UInt(s.get::<u32>(0)? as u64))
        };

        let found = vector.lookup_struct_by_key(&Key::UInt(777), 4, key_of).unwrap();
        assert_eq!(found.map(|s| s.get::<u32>(0)), Some(Ok(777)));
        assert!(calls.get() <= 11, "{} key comparisons", calls.get());

        calls.set(0);
        assert!(vector.lookup_struct_by_key(&Key::UInt(5000), 4, key_of).unwrap().is_none());
        assert!(calls.get() <= 11, "{} key comparisons", calls.get());
    }
}
