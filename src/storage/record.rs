//! Record and search-tuple encoding.
//!
//! A record is a varint field count followed by varint-length-prefixed
//! fields. Fields compare as raw bytes, so callers store order-preserving
//! encodings (see [`ord_u64`]). Node-pointer records additionally carry the
//! child page they point to.

use std::cmp::Ordering;
use std::fmt;

use smallvec::SmallVec;

use crate::types::{PageId, PcursorError, Result};

/// Big-endian encoding of `v`; byte order matches numeric order.
pub fn ord_u64(v: u64) -> [u8; 8] {
    v.to_be_bytes()
}

fn put_var_u64(dst: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        dst.push((v as u8) | 0x80);
        v >>= 7;
    }
    dst.push(v as u8);
}

/// Walks an encoded record without allocating.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn read_var(&mut self) -> Result<u64> {
        let mut result = 0u64;
        let mut shift = 0u32;
        for _ in 0..10 {
            let byte = *self
                .buf
                .get(self.pos)
                .ok_or(PcursorError::Corruption("record varint truncated"))?;
            self.pos += 1;
            result |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
        Err(PcursorError::Corruption("record varint too long"))
    }

    /// Reads the leading field count. Must be called first.
    pub(crate) fn field_count(&mut self) -> Result<usize> {
        Ok(self.read_var()? as usize)
    }

    /// Reads the next field.
    pub(crate) fn next_field(&mut self) -> Result<&'a [u8]> {
        let len = self.read_var()? as usize;
        let end = self
            .pos
            .checked_add(len)
            .ok_or(PcursorError::Corruption("record field length overflow"))?;
        let field = self
            .buf
            .get(self.pos..end)
            .ok_or(PcursorError::Corruption("record field truncated"))?;
        self.pos = end;
        Ok(field)
    }

    /// Byte offset just past the last field read.
    pub(crate) fn position(&self) -> usize {
        self.pos
    }
}

/// An index record.
#[derive(Clone, PartialEq, Eq)]
pub struct Record {
    data: Vec<u8>,
    child: Option<PageId>,
}

impl Record {
    /// Encodes a leaf record from its fields.
    pub fn from_fields<I, F>(fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: AsRef<[u8]>,
    {
        let fields: SmallVec<[F; 4]> = fields.into_iter().collect();
        let mut data = Vec::new();
        put_var_u64(&mut data, fields.len() as u64);
        for field in &fields {
            let field = field.as_ref();
            put_var_u64(&mut data, field.len() as u64);
            data.extend_from_slice(field);
        }
        Self { data, child: None }
    }

    /// Encodes a leaf record whose fields are order-preserving `u64`s.
    pub fn from_u64s(values: &[u64]) -> Self {
        Self::from_fields(values.iter().map(|v| ord_u64(*v)))
    }

    /// Builds a node pointer holding the first `n_fields` fields of `first`
    /// and pointing at `child`.
    pub(crate) fn node_ptr(first: &Record, n_fields: usize, child: PageId) -> Result<Self> {
        let mut data = Vec::new();
        copy_key_prefix(first, n_fields, &mut data)?;
        Ok(Self {
            data,
            child: Some(child),
        })
    }

    /// Raw encoding.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Child page for node pointers, `None` for leaf records.
    pub fn child(&self) -> Option<PageId> {
        self.child
    }

    /// Number of encoded fields.
    pub fn n_fields(&self) -> Result<usize> {
        FieldReader::new(&self.data).field_count()
    }

    /// Returns field `idx`.
    pub fn field(&self, idx: usize) -> Result<&[u8]> {
        let mut reader = FieldReader::new(&self.data);
        let count = reader.field_count()?;
        if idx >= count {
            return Err(PcursorError::Invalid("record field index out of range"));
        }
        for _ in 0..idx {
            reader.next_field()?;
        }
        reader.next_field()
    }

    /// Decodes field `idx` as an order-preserving `u64`.
    pub fn u64_field(&self, idx: usize) -> Result<u64> {
        let bytes: [u8; 8] = self
            .field(idx)?
            .try_into()
            .map_err(|_| PcursorError::Corruption("u64 field is not 8 bytes"))?;
        Ok(u64::from_be_bytes(bytes))
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        let mut reader = FieldReader::new(&self.data);
        match reader.field_count() {
            Ok(count) => {
                for _ in 0..count {
                    match reader.next_field() {
                        Ok(field) => list.entry(&hex::encode(field)),
                        Err(_) => list.entry(&"<truncated>"),
                    };
                }
            }
            Err(_) => {
                list.entry(&"<corrupt>");
            }
        }
        if let Some(child) = self.child {
            list.entry(&format_args!("-> {child}"));
        }
        list.finish()
    }
}

/// Search key: the leading fields of an index record.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Tuple {
    fields: SmallVec<[Vec<u8>; 4]>,
}

impl Tuple {
    /// Builds a tuple from raw fields.
    pub fn from_fields<I, F>(fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: AsRef<[u8]>,
    {
        Self {
            fields: fields.into_iter().map(|f| f.as_ref().to_vec()).collect(),
        }
    }

    /// Builds a tuple of order-preserving `u64` fields.
    pub fn from_u64s(values: &[u64]) -> Self {
        Self::from_fields(values.iter().map(|v| ord_u64(*v)))
    }

    /// Number of fields.
    pub fn n_fields(&self) -> usize {
        self.fields.len()
    }

    /// Iterates over the fields.
    pub fn fields(&self) -> impl Iterator<Item = &[u8]> {
        self.fields.iter().map(Vec::as_slice)
    }
}

/// Compares `tuple` against the leading `tuple.n_fields()` fields of `rec`.
pub fn compare_tuple_rec(tuple: &Tuple, rec: &Record) -> Result<Ordering> {
    let mut reader = FieldReader::new(rec.as_bytes());
    let count = reader.field_count()?;
    if count < tuple.n_fields() {
        return Err(PcursorError::Corruption(
            "record has fewer fields than the search tuple",
        ));
    }
    for field in tuple.fields() {
        match field.cmp(reader.next_field()?) {
            Ordering::Equal => {}
            other => return Ok(other),
        }
    }
    Ok(Ordering::Equal)
}

/// Compares the first `n_fields` fields of two encoded records.
pub fn compare_prefix(a: &[u8], b: &[u8], n_fields: usize) -> Result<Ordering> {
    let mut left = FieldReader::new(a);
    let mut right = FieldReader::new(b);
    if left.field_count()? < n_fields || right.field_count()? < n_fields {
        return Err(PcursorError::Corruption("record shorter than compared prefix"));
    }
    for _ in 0..n_fields {
        match left.next_field()?.cmp(right.next_field()?) {
            Ordering::Equal => {}
            other => return Ok(other),
        }
    }
    Ok(Ordering::Equal)
}

/// Writes the encoding of the first `n_fields` fields of `rec` into `dst`,
/// replacing its contents but keeping its allocation.
pub fn copy_key_prefix(rec: &Record, n_fields: usize, dst: &mut Vec<u8>) -> Result<()> {
    if n_fields == 0 {
        return Err(PcursorError::Invalid("key prefix needs at least one field"));
    }
    let mut reader = FieldReader::new(rec.as_bytes());
    let count = reader.field_count()?;
    if count < n_fields {
        return Err(PcursorError::Corruption(
            "record has fewer fields than the index key",
        ));
    }
    let body_start = reader.position();
    for _ in 0..n_fields {
        reader.next_field()?;
    }
    let body_end = reader.position();
    dst.clear();
    put_var_u64(dst, n_fields as u64);
    dst.extend_from_slice(&rec.as_bytes()[body_start..body_end]);
    Ok(())
}

/// Rebuilds a search tuple from bytes produced by [`copy_key_prefix`].
pub fn build_search_tuple(key_bytes: &[u8], n_fields: usize) -> Result<Tuple> {
    let mut reader = FieldReader::new(key_bytes);
    if reader.field_count()? != n_fields {
        return Err(PcursorError::Corruption("key prefix field count mismatch"));
    }
    let mut fields = SmallVec::with_capacity(n_fields);
    for _ in 0..n_fields {
        fields.push(reader.next_field()?.to_vec());
    }
    Ok(Tuple { fields })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_roundtrip_through_encoding() -> Result<()> {
        let rec = Record::from_fields([b"alpha".as_slice(), b"", b"z"]);
        assert_eq!(rec.n_fields()?, 3);
        assert_eq!(rec.field(0)?, b"alpha");
        assert_eq!(rec.field(1)?, b"");
        assert_eq!(rec.field(2)?, b"z");
        assert!(matches!(rec.field(3), Err(PcursorError::Invalid(_))));
        Ok(())
    }

    #[test]
    fn long_fields_use_multi_byte_lengths() -> Result<()> {
        let big = vec![7u8; 300];
        let rec = Record::from_fields([big.as_slice()]);
        assert_eq!(rec.field(0)?.len(), 300);
        Ok(())
    }

    #[test]
    fn tuple_compares_only_its_own_fields() -> Result<()> {
        let rec = Record::from_u64s(&[5, 9, 100]);
        assert_eq!(
            compare_tuple_rec(&Tuple::from_u64s(&[5]), &rec)?,
            Ordering::Equal
        );
        assert_eq!(
            compare_tuple_rec(&Tuple::from_u64s(&[5, 8]), &rec)?,
            Ordering::Less
        );
        assert_eq!(
            compare_tuple_rec(&Tuple::from_u64s(&[6]), &rec)?,
            Ordering::Greater
        );
        Ok(())
    }

    #[test]
    fn tuple_longer_than_record_is_corruption() {
        let rec = Record::from_u64s(&[1]);
        let err = compare_tuple_rec(&Tuple::from_u64s(&[1, 2]), &rec).unwrap_err();
        assert!(matches!(err, PcursorError::Corruption(_)));
    }

    #[test]
    fn key_prefix_copy_reuses_buffer_and_rebuilds_tuple() -> Result<()> {
        let rec = Record::from_u64s(&[3, 4, 5]);
        let mut buf = Vec::with_capacity(128);
        let cap = buf.capacity();
        copy_key_prefix(&rec, 2, &mut buf)?;
        assert_eq!(buf.capacity(), cap);
        let tuple = build_search_tuple(&buf, 2)?;
        assert_eq!(tuple, Tuple::from_u64s(&[3, 4]));
        assert_eq!(compare_prefix(&buf, rec.as_bytes(), 2)?, Ordering::Equal);
        assert!(build_search_tuple(&buf, 3).is_err());
        Ok(())
    }

    #[test]
    fn truncated_record_bytes_are_rejected() {
        let mut reader = FieldReader::new(&[0x02, 0x05, b'a']);
        assert_eq!(reader.field_count().unwrap(), 2);
        assert!(matches!(
            reader.next_field(),
            Err(PcursorError::Corruption(_))
        ));
    }

    #[test]
    fn node_pointer_keeps_prefix_and_child() -> Result<()> {
        let rec = Record::from_u64s(&[10, 20]);
        let ptr = Record::node_ptr(&rec, 1, PageId(9))?;
        assert_eq!(ptr.child(), Some(PageId(9)));
        assert_eq!(ptr.n_fields()?, 1);
        assert_eq!(ptr.u64_field(0)?, 10);
        Ok(())
    }
}
