//! Back-to-front construction of a single buffer.
//!
//! Children are always written before their parents, so every offset a
//! parent stores already points at finished data. Offsets handed out by the
//! builder are measured from the end of the buffer and stay valid while it
//! grows.
//!
//! ```
//! use brine_flat_schema::{Buffer, Builder};
//!
//! let mut builder = Builder::new();
//! let name = builder.create_string("Orc").unwrap();
//! builder.start_table().unwrap();
//! builder.add_offset(0, name).unwrap();
//! builder.add_field_default(1, 100i32, 100).unwrap();
//! let monster = builder.end_table().unwrap();
//! builder.finish(monster).unwrap();
//!
//! let root = Buffer::new(builder.finished_data().unwrap()).root().unwrap();
//! assert_eq!(root.get_string(0).unwrap(), Some("Orc"));
//! assert_eq!(root.get_scalar::<i32>(1, 100).unwrap(), 100);
//! ```

use crate::bb::{ByteBufferMut, Scalar};
use crate::error::{BuilderError, ReadError};
use crate::layout::{field_voffset, vtable_size};
use crate::reader::{Key, Struct, Table};

use std::collections::HashMap;
use tracing::trace;

pub const SIZE_UOFFSET: usize = 4;
pub const FILE_IDENTIFIER_LENGTH: usize = 4;

/// Location of an object written by a [Builder], counted from the end of
/// the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Offset(u32);

impl Offset {
    pub fn value(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
struct FieldLoc {
    off: u32,
    id:  u16,
}

#[derive(Debug, Clone)]
pub struct Builder {
    bb:          ByteBufferMut,
    min_align:   usize,
    table_start: Option<u32>,
    fields:      Vec<FieldLoc>,
    /// Highest id added to the open table, written or skipped as default.
    last_id:     Option<u16>,
    vtables:     HashMap<Vec<u8>, u32>,
    strings:     HashMap<Vec<u8>, Offset>,
    finished:    bool,
}

impl Default for Builder {
    fn default() -> Self {
        Builder::new()
    }
}

impl Builder {
    pub fn new() -> Builder {
        Builder::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Builder {
        Builder {
            bb:          ByteBufferMut::with_capacity(capacity),
            min_align:   1,
            table_start: None,
            fields:      Vec::new(),
            last_id:     None,
            vtables:     HashMap::new(),
            strings:     HashMap::new(),
            finished:    false,
        }
    }

    /// Clears the builder so it can produce another buffer. The allocation
    /// is kept.
    pub fn reset(&mut self) {
        self.bb.clear();
        self.min_align = 1;
        self.close_table();
        self.vtables.clear();
        self.strings.clear();
        self.finished = false;
    }

    /// Bytes written so far.
    pub fn used(&self) -> usize {
        self.bb.len()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn check_writable(&self) -> Result<(), BuilderError> {
        if self.finished {
            return Err(BuilderError::Finished);
        }
        Ok(())
    }

    fn check_not_nested(&self) -> Result<(), BuilderError> {
        self.check_writable()?;
        if self.table_start.is_some() {
            return Err(BuilderError::Nested);
        }
        Ok(())
    }

    fn check_offset(&self, off: Offset) -> Result<(), BuilderError> {
        if off.0 == 0 || off.0 as usize > self.used() {
            return Err(BuilderError::InvalidOffset(off.0));
        }
        Ok(())
    }

    fn len_u32(len: usize) -> Result<u32, BuilderError> {
        u32::try_from(len).map_err(|_| BuilderError::TooLarge(len))
    }

    /// Pads so that after writing `additional` bytes, a value of `size`
    /// bytes is naturally aligned.
    fn prep(&mut self, size: usize, additional: usize) {
        self.min_align = self.min_align.max(size);
        let pad = (!(self.used().wrapping_add(additional))).wrapping_add(1) & (size - 1);
        self.bb.pad(pad);
    }

    fn push<T: Scalar>(&mut self, value: T) -> u32 {
        self.prep(T::SIZE, 0);
        self.bb.write_scalar(value);
        self.used() as u32
    }

    /// Writes `off` as a forward offset relative to where it is stored.
    fn push_uoffset(&mut self, off: Offset) -> Result<u32, BuilderError> {
        self.check_offset(off)?;
        self.prep(SIZE_UOFFSET, 0);
        let relative = self.used() as u32 + SIZE_UOFFSET as u32 - off.0;
        self.bb.write_scalar(relative);
        Ok(self.used() as u32)
    }

    /// Writes a bare scalar, aligned to its size.
    pub fn push_scalar<T: Scalar>(&mut self, value: T) -> Result<Offset, BuilderError> {
        self.check_writable()?;
        Ok(Offset(self.push(value)))
    }

    pub fn create_string(&mut self, value: &str) -> Result<Offset, BuilderError> {
        self.create_byte_string(value.as_bytes())
    }

    /// Writes `value` as `[len: u32][bytes][0]`.
    pub fn create_byte_string(&mut self, value: &[u8]) -> Result<Offset, BuilderError> {
        self.check_not_nested()?;
        let len = Builder::len_u32(value.len())?;
        self.prep(SIZE_UOFFSET, value.len() + 1);
        self.bb.pad(1);
        self.bb.write_bytes(value);
        Ok(Offset(self.push(len)))
    }

    /// Like [create_string](#method.create_string), but identical strings
    /// are stored once.
    pub fn create_shared_string(&mut self, value: &str) -> Result<Offset, BuilderError> {
        self.check_not_nested()?;
        if let Some(&off) = self.strings.get(value.as_bytes()) {
            return Ok(off);
        }
        let off = self.create_string(value)?;
        self.strings.insert(value.as_bytes().to_vec(), off);
        Ok(off)
    }

    /// Writes a vector of scalars.
    pub fn create_vector<T: Scalar>(&mut self, items: &[T]) -> Result<Offset, BuilderError> {
        self.check_not_nested()?;
        let len = Builder::len_u32(items.len())?;
        let bytes = T::SIZE * items.len();
        self.prep(SIZE_UOFFSET, bytes);
        self.prep(T::SIZE, bytes);
        for item in items.iter().rev() {
            self.bb.write_scalar(*item);
        }
        Ok(Offset(self.push(len)))
    }

    /// Writes a vector of inline elements that are already encoded. `size`
    /// is the byte size of one element, `align` its alignment.
    pub fn create_vector_of_structs(
        &mut self,
        data: &[u8],
        size: usize,
        align: usize,
    ) -> Result<Offset, BuilderError> {
        self.check_not_nested()?;
        if size == 0 || data.len() % size != 0 {
            return Err(BuilderError::StructSize { len: data.len(), size });
        }
        let len = Builder::len_u32(data.len() / size)?;
        self.prep(SIZE_UOFFSET, data.len());
        self.prep(align.max(1), data.len());
        self.bb.write_bytes(data);
        Ok(Offset(self.push(len)))
    }

    /// Writes a vector of offsets to strings, tables or vectors.
    pub fn create_vector_of_offsets(&mut self, items: &[Offset]) -> Result<Offset, BuilderError> {
        self.check_not_nested()?;
        let len = Builder::len_u32(items.len())?;
        self.prep(SIZE_UOFFSET, SIZE_UOFFSET * items.len());
        for item in items.iter().rev() {
            self.push_uoffset(*item)?;
        }
        Ok(Offset(self.push(len)))
    }

    /// Writes a vector of tables sorted by the key `key_of` reads from each
    /// table. Tables with equal keys keep their relative order.
    pub fn create_sorted_vector_of_tables<F>(&mut self, items: &[Offset], key_of: F) -> Result<Offset, BuilderError>
    where
        F: for<'b> Fn(&Table<'b>) -> Result<Key<'b>, ReadError>,
    {
        self.check_not_nested()?;
        let sorted = {
            let data = self.bb.data();
            let mut keyed = Vec::with_capacity(items.len());
            for &item in items {
                self.check_offset(item)?;
                let table = Table::new(data, data.len() - item.0 as usize);
                keyed.push((key_of(&table)?, item));
            }
            keyed.sort_by(|a, b| a.0.cmp(&b.0));
            keyed.into_iter().map(|(_, item)| item).collect::<Vec<_>>()
        };
        self.create_vector_of_offsets(&sorted)
    }

    /// Writes a vector of `size`-byte structs sorted by the key `key_of`
    /// reads from each struct. Structs with equal keys keep their relative
    /// order.
    pub fn create_sorted_vector_of_structs<F>(
        &mut self,
        data: &[u8],
        size: usize,
        align: usize,
        key_of: F,
    ) -> Result<Offset, BuilderError>
    where
        F: for<'b> Fn(&Struct<'b>) -> Result<Key<'b>, ReadError>,
    {
        self.check_not_nested()?;
        if size == 0 || data.len() % size != 0 {
            return Err(BuilderError::StructSize { len: data.len(), size });
        }
        let mut keyed = Vec::with_capacity(data.len() / size);
        for start in (0..data.len()).step_by(size) {
            keyed.push((key_of(&Struct::new(data, start))?, start));
        }
        keyed.sort_by(|a, b| a.0.cmp(&b.0));

        let mut sorted = Vec::with_capacity(data.len());
        for (_, start) in keyed {
            sorted.extend_from_slice(&data[start..start + size]);
        }
        self.create_vector_of_structs(&sorted, size, align)
    }

    pub fn start_table(&mut self) -> Result<(), BuilderError> {
        self.check_not_nested()?;
        self.table_start = Some(self.used() as u32);
        self.fields.clear();
        self.last_id = None;
        Ok(())
    }

    fn close_table(&mut self) {
        self.table_start = None;
        self.fields.clear();
        self.last_id = None;
    }

    fn check_slot(&self, id: u16) -> Result<(), BuilderError> {
        self.check_writable()?;
        if self.table_start.is_none() {
            return Err(BuilderError::NotInTable);
        }
        if let Some(previous) = self.last_id {
            if id <= previous {
                return Err(BuilderError::FieldOutOfOrder { previous, id });
            }
        }
        Ok(())
    }

    /// Writes scalar field `id`, even when it equals the field's default.
    pub fn add_field<T: Scalar>(&mut self, id: u16, value: T) -> Result<(), BuilderError> {
        self.check_slot(id)?;
        let off = self.push(value);
        self.fields.push(FieldLoc { off, id });
        self.last_id = Some(id);
        Ok(())
    }

    /// Writes scalar field `id` unless it equals `default`, in which case
    /// readers see the default through an absent vtable entry.
    pub fn add_field_default<T: Scalar>(&mut self, id: u16, value: T, default: T) -> Result<(), BuilderError> {
        self.check_slot(id)?;
        if value == default {
            self.last_id = Some(id);
            return Ok(());
        }
        self.add_field(id, value)
    }

    /// Writes field `id` as an offset to a string, vector or table.
    pub fn add_offset(&mut self, id: u16, off: Offset) -> Result<(), BuilderError> {
        self.check_slot(id)?;
        let off = self.push_uoffset(off)?;
        self.fields.push(FieldLoc { off, id });
        self.last_id = Some(id);
        Ok(())
    }

    /// Writes field `id` as an inline fixed struct.
    pub fn add_struct(&mut self, id: u16, bytes: &[u8], align: usize) -> Result<(), BuilderError> {
        self.check_slot(id)?;
        self.prep(align.max(1), bytes.len());
        self.bb.write_bytes(bytes);
        let off = self.used() as u32;
        self.fields.push(FieldLoc { off, id });
        self.last_id = Some(id);
        Ok(())
    }

    /// Closes the current table and writes its vtable, reusing an
    /// identical vtable written earlier when there is one.
    pub fn end_table(&mut self) -> Result<Offset, BuilderError> {
        self.check_writable()?;
        let start = self.table_start.ok_or(BuilderError::NotInTable)?;

        let object = self.push::<i32>(0);
        let table_size = (object - start) as usize;
        let max_id = self.fields.iter().map(|field| field.id).max();
        let vt_size = vtable_size(max_id);
        if table_size > u16::MAX as usize || vt_size > u16::MAX as usize {
            // Drop the half-written table so the builder can go on.
            self.bb.truncate(start as usize);
            self.close_table();
            return Err(BuilderError::TableTooLarge(table_size.max(vt_size)));
        }

        let mut vtable = vec![0u8; vt_size];
        (vt_size as u16).write_le(&mut vtable[0..]);
        (table_size as u16).write_le(&mut vtable[2..]);
        for field in &self.fields {
            let slot = field_voffset(field.id) as usize;
            ((object - field.off) as u16).write_le(&mut vtable[slot..]);
        }

        let vt_used = match self.vtables.get(&vtable) {
            Some(&existing) => {
                trace!(vt_size, existing, "reusing vtable");
                existing
            }
            None => {
                self.bb.write_bytes(&vtable);
                let used = self.used() as u32;
                self.vtables.insert(vtable, used);
                used
            }
        };

        self.bb.patch_scalar(object as usize, vt_used as i32 - object as i32);
        self.close_table();
        Ok(Offset(object))
    }

    /// Fails with [BuilderError::MissingRequired] when any of `ids` is
    /// absent from the finished table at `table`.
    pub fn check_required(&self, table: Offset, ids: &[u16]) -> Result<(), BuilderError> {
        self.check_offset(table)?;
        let data = self.bb.data();
        let view = Table::new(data, data.len() - table.0 as usize);
        for &id in ids {
            if view.field_offset(id)?.is_none() {
                return Err(BuilderError::MissingRequired(id));
            }
        }
        Ok(())
    }

    /// Writes the root offset and freezes the buffer.
    pub fn finish(&mut self, root: Offset) -> Result<(), BuilderError> {
        self.finish_with(root, None)
    }

    /// Like [finish](#method.finish), with a 4-byte file identifier right
    /// after the root offset.
    pub fn finish_with_identifier(&mut self, root: Offset, identifier: &[u8; 4]) -> Result<(), BuilderError> {
        self.finish_with(root, Some(identifier))
    }

    fn finish_with(&mut self, root: Offset, identifier: Option<&[u8; 4]>) -> Result<(), BuilderError> {
        self.check_not_nested()?;
        if self.check_offset(root).is_err() {
            return Err(BuilderError::MissingRoot);
        }
        let extra = identifier.map_or(0, |_| FILE_IDENTIFIER_LENGTH);
        let min_align = self.min_align.max(SIZE_UOFFSET);
        self.prep(min_align, SIZE_UOFFSET + extra);
        if let Some(identifier) = identifier {
            self.bb.write_bytes(identifier);
        }
        self.push_uoffset(root)?;
        self.finished = true;
        Ok(())
    }

    /// The finished buffer.
    pub fn finished_data(&self) -> Result<&[u8], BuilderError> {
        if !self.finished {
            return Err(BuilderError::NotFinished);
        }
        Ok(self.bb.data())
    }

    /// Consumes the builder and returns the finished buffer.
    pub fn into_finished_data(self) -> Result<Vec<u8>, BuilderError> {
        if !self.finished {
            return Err(BuilderError::NotFinished);
        }
        Ok(self.bb.into_data())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Buffer;

    fn monster(builder: &mut Builder, name: &str, hp: Option<i32>) -> Offset {
        let name = builder.create_string(name).unwrap();
        builder.start_table().unwrap();
        builder.add_offset(0, name).unwrap();
        if let Some(hp) = hp {
            builder.add_field_default(1, hp, 100).unwrap();
        }
        builder.end_table().unwrap()
    }

    #[test]
    fn string_layout() {
        let mut builder = Builder::new();
        let name = builder.create_string("Orc").unwrap();
        assert_eq!(builder.used(), 8);
        assert_eq!(name.value(), 8);
    }

    #[test]
    fn absent_field_reads_default() {
        let mut builder = Builder::new();
        let root = monster(&mut builder, "Orc", None);
        builder.finish(root).unwrap();

        let table = Buffer::new(builder.finished_data().unwrap()).root().unwrap();
        assert_eq!(table.get_string(0), Ok(Some("Orc")));
        assert_eq!(table.get_scalar::<i32>(1, 100), Ok(100));
        assert_eq!(table.live_fields(), Ok(1));
    }

    #[test]
    fn default_valued_fields_are_skipped() {
        let mut builder = Builder::new();
        builder.start_table().unwrap();
        builder.add_field_default(0, 5u8, 5).unwrap();
        builder.add_field(1, 5u8).unwrap();
        builder.add_field_default(3, 7i64, 0).unwrap();
        let root = builder.end_table().unwrap();
        builder.finish(root).unwrap();

        let table = Buffer::new(builder.finished_data().unwrap()).root().unwrap();
        assert_eq!(table.vtable_len(), Ok(4));
        assert_eq!(table.live_fields(), Ok(2));
        assert_eq!(table.field_offset(0), Ok(None));
        assert_eq!(table.get_scalar::<u8>(1, 0), Ok(5));
        assert_eq!(table.get_scalar::<i64>(3, 0), Ok(7));
        assert_eq!(table.field_offset(3).unwrap().map(|at| at % 8), Some(0));
    }

    #[test]
    fn vtables_are_shared() {
        let mut builder = Builder::new();
        let a = monster(&mut builder, "a", Some(1));
        let after_first = builder.used();
        let b = monster(&mut builder, "b", Some(2));
        // Second table reuses the first vtable: string (4 + 2 bytes, padded
        // to 8) plus the table (soffset, offset, int).
        assert_eq!(builder.used() - after_first, 8 + 12);
        let c = monster(&mut builder, "c", None);
        let list = builder.create_vector_of_offsets(&[a, b, c]).unwrap();
        builder.start_table().unwrap();
        builder.add_offset(0, list).unwrap();
        let root = builder.end_table().unwrap();
        builder.finish(root).unwrap();

        let data = builder.finished_data().unwrap();
        let monsters = Buffer::new(data).root().unwrap().get_vector(0).unwrap().unwrap();
        assert_eq!(monsters.len(), 3);
        let vtable_of = |index| {
            let table = monsters.get_table(index).unwrap();
            table.location() as i64 - i32::from_le_bytes(data[table.location()..table.location() + 4].try_into().unwrap()) as i64
        };
        assert_eq!(vtable_of(0), vtable_of(1));
        assert_ne!(vtable_of(0), vtable_of(2));
        assert_eq!(monsters.get_table(2).unwrap().get_scalar::<i32>(1, 100), Ok(100));
        assert_eq!(monsters.get_table(1).unwrap().get_string(0), Ok(Some("b")));
    }

    #[test]
    fn field_ids_must_increase() {
        let mut builder = Builder::new();
        builder.start_table().unwrap();
        builder.add_field(2, 1u8).unwrap();
        assert_eq!(builder.add_field(1, 1u8), Err(BuilderError::FieldOutOfOrder { previous: 2, id: 1 }));
        assert_eq!(builder.add_field(2, 1u8), Err(BuilderError::FieldOutOfOrder { previous: 2, id: 2 }));
        assert_eq!(
            builder.add_field_default(0, 0u8, 0),
            Err(BuilderError::FieldOutOfOrder { previous: 2, id: 0 })
        );
    }

    #[test]
    fn skipped_defaults_still_order_fields() {
        let mut builder = Builder::new();
        builder.start_table().unwrap();
        builder.add_field_default(3, 100i32, 100).unwrap();
        assert_eq!(builder.add_field(2, 7i32), Err(BuilderError::FieldOutOfOrder { previous: 3, id: 2 }));
        assert_eq!(builder.add_field_default(3, 1i32, 0), Err(BuilderError::FieldOutOfOrder { previous: 3, id: 3 }));
        builder.add_field(4, 7i32).unwrap();
        builder.end_table().unwrap();

        // A new table starts with no previous id.
        builder.start_table().unwrap();
        builder.add_field_default(5, 0u8, 0).unwrap();
        builder.end_table().unwrap();
        builder.start_table().unwrap();
        builder.add_field(0, 1u8).unwrap();
        builder.end_table().unwrap();
    }

    #[test]
    fn oversized_table_is_dropped() {
        let mut builder = Builder::new();
        let name = builder.create_string("Orc").unwrap();
        let before = builder.used();

        builder.start_table().unwrap();
        builder.add_offset(0, name).unwrap();
        builder.add_field(40000, 1u8).unwrap();
        assert_eq!(builder.end_table(), Err(BuilderError::TableTooLarge(4 + 2 * 40001)));
        assert_eq!(builder.used(), before);
        assert_eq!(builder.end_table(), Err(BuilderError::NotInTable));

        builder.start_table().unwrap();
        builder.add_offset(0, name).unwrap();
        let root = builder.end_table().unwrap();
        builder.finish(root).unwrap();
        let table = Buffer::new(builder.finished_data().unwrap()).root().unwrap();
        assert_eq!(table.get_string(0), Ok(Some("Orc")));
    }

    #[test]
    fn table_state_errors() {
        let mut builder = Builder::new();
        assert_eq!(builder.add_field(0, 1u8), Err(BuilderError::NotInTable));
        assert_eq!(builder.end_table(), Err(BuilderError::NotInTable));
        builder.start_table().unwrap();
        assert_eq!(builder.start_table(), Err(BuilderError::Nested));
        assert_eq!(builder.create_string("x"), Err(BuilderError::Nested));
        assert_eq!(builder.create_vector(&[1u8]), Err(BuilderError::Nested));
        let table = builder.end_table().unwrap();
        assert_eq!(builder.finished_data(), Err(BuilderError::NotFinished));
        assert_eq!(builder.finish(Offset(9999)), Err(BuilderError::MissingRoot));
        builder.finish(table).unwrap();
    }

    #[test]
    fn mutation_after_finish_fails() {
        let mut builder = Builder::new();
        let root = monster(&mut builder, "Orc", Some(3));
        builder.finish(root).unwrap();
        let data = builder.finished_data().unwrap().to_vec();

        assert_eq!(builder.push_scalar(1u32), Err(BuilderError::Finished));
        assert_eq!(builder.create_string("x"), Err(BuilderError::Finished));
        assert_eq!(builder.create_vector(&[1u16]), Err(BuilderError::Finished));
        assert_eq!(builder.create_vector_of_offsets(&[root]), Err(BuilderError::Finished));
        assert_eq!(builder.start_table(), Err(BuilderError::Finished));
        assert_eq!(builder.add_field(0, 1u8), Err(BuilderError::Finished));
        assert_eq!(builder.end_table(), Err(BuilderError::Finished));
        assert_eq!(builder.finish(root), Err(BuilderError::Finished));
        assert_eq!(builder.finished_data(), Ok(&data[..]));

        builder.reset();
        assert!(builder.create_string("x").is_ok());
    }

    #[test]
    fn identifier_and_alignment() {
        let mut builder = Builder::new();
        builder.start_table().unwrap();
        builder.add_field(0, 1.5f64).unwrap();
        let root = builder.end_table().unwrap();
        builder.finish_with_identifier(root, b"MONS").unwrap();

        let data = builder.finished_data().unwrap();
        assert_eq!(data.len() % 8, 0);
        let buffer = Buffer::new(data);
        assert!(buffer.has_identifier(b"MONS"));
        let table = buffer.root().unwrap();
        assert_eq!(table.get_scalar::<f64>(0, 0.0), Ok(1.5));
        assert_eq!(table.field_offset(0).unwrap().map(|at| at % 8), Some(0));
    }

    #[test]
    fn sorted_vector_of_structs() {
        // struct Stat { id: ushort (key); value: ushort; }
        let mut data = Vec::new();
        for (id, value) in [(30u16, 0u16), (10, 1), (20, 2)] {
            data.extend_from_slice(&id.to_le_bytes());
            data.extend_from_slice(&value.to_le_bytes());
        }

        let mut builder = Builder::new();
        let stats = builder
            .create_sorted_vector_of_structs(&data, 4, 2, |s| Ok(Key::UInt(s.get::<u16>(0)? as u64)))
            .unwrap();
        builder.start_table().unwrap();
        builder.add_offset(0, stats).unwrap();
        let root = builder.end_table().unwrap();
        builder.finish(root).unwrap();

        let vector = Buffer::new(builder.finished_data().unwrap()).root().unwrap().get_vector(0).unwrap().unwrap();
        let ids: Vec<u16> = (0..3).map(|i| vector.get_struct(i, 4).unwrap().get::<u16>(0).unwrap()).collect();
        assert_eq!(ids, [10, 20, 30]);

        let found = vector.lookup_struct_by_key(&Key::UInt(20), 4, |s| Ok(Key::UInt(s.get::<u16>(0)? as u64))).unwrap();
        assert_eq!(found.map(|s| s.get::<u16>(2).unwrap()), Some(2));
        let missing = vector.lookup_struct_by_key(&Key::UInt(25), 4, |s| Ok(Key::UInt(s.get::<u16>(0)? as u64))).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn sorted_vector_of_tables() {
        let mut builder = Builder::new();
        let names = ["dragon", "orc", "bat", "orc"];
        let monsters: Vec<_> = names
            .iter()
            .enumerate()
            .map(|(i, name)| monster(&mut builder, name, Some(i as i32)))
            .collect();
        let list = builder
            .create_sorted_vector_of_tables(&monsters, |t| Ok(Key::Bytes(t.get_byte_string(0)?.unwrap_or(&[]))))
            .unwrap();
        builder.start_table().unwrap();
        builder.add_offset(0, list).unwrap();
        let root = builder.end_table().unwrap();
        builder.finish(root).unwrap();

        let vector = Buffer::new(builder.finished_data().unwrap()).root().unwrap().get_vector(0).unwrap().unwrap();
        let order: Vec<(&str, i32)> = (0..4)
            .map(|i| {
                let table = vector.get_table(i).unwrap();
                (table.get_string(0).unwrap().unwrap(), table.get_scalar::<i32>(1, 100).unwrap())
            })
            .collect();
        assert_eq!(order, [("bat", 2), ("dragon", 0), ("orc", 1), ("orc", 3)]);

        let found = vector.lookup_table_by_key(&Key::from("dragon"), |t| Ok(Key::Bytes(t.get_byte_string(0)?.unwrap_or(&[])))).unwrap();
        assert_eq!(found.map(|t| t.get_scalar::<i32>(1, 100).unwrap()), Some(0));
    }

    #[test]
    fn required_fields() {
        let mut builder = Builder::new();
        let root = monster(&mut builder, "Orc", None);
        assert_eq!(builder.check_required(root, &[0]), Ok(()));
        assert_eq!(builder.check_required(root, &[0, 1]), Err(BuilderError::MissingRequired(1)));
    }

    #[test]
    fn shared_strings() {
        let mut builder = Builder::new();
        let a = builder.create_shared_string("same").unwrap();
        let b = builder.create_shared_string("same").unwrap();
        let c = builder.create_shared_string("other").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn nested_vectors() {
        let mut builder = Builder::new();
        let inner_a = builder.create_vector(&[1i16, 2, 3]).unwrap();
        let inner_b = builder.create_vector::<i16>(&[]).unwrap();
        let outer = builder.create_vector_of_offsets(&[inner_a, inner_b]).unwrap();
        builder.start_table().unwrap();
        builder.add_offset(0, outer).unwrap();
        let root = builder.end_table().unwrap();
        builder.finish(root).unwrap();

        let outer = Buffer::new(builder.finished_data().unwrap()).root().unwrap().get_vector(0).unwrap().unwrap();
        assert_eq!(outer.len(), 2);
        let first = outer.get_vector(0).unwrap();
        assert_eq!((first.len(), first.get_scalar::<i16>(2)), (3, Ok(3)));
        assert!(outer.get_vector(1).unwrap().is_empty());
    }
}
