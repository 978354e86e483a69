//! Fixed-size homogeneous arrays and their mirrored copies.

use std::collections::BTreeSet;

use log::debug;

use crate::codec::{Codec, Value};
use crate::error::{EngineError, Result};
use crate::image::{Image, WriteBatch};
use crate::schema::{FieldDescriptor, MirrorLayout, TableSpec};

/// One mirror region: `len` bytes at `addr` that must equal the primary
/// table bytes starting at `primary_offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorSlice {
    pub addr: u32,
    pub primary_offset: usize,
    pub len: usize,
}

pub fn table_spec(field: &FieldDescriptor) -> Result<&TableSpec> {
    field
        .table
        .as_ref()
        .ok_or_else(|| EngineError::Range(format!("field {} is not a table", field.id)))
}

pub fn element_codec(table: &TableSpec) -> Codec {
    Codec::new(table.value_type, table.element_width())
}

/// Break the `TABLE_COPY` list into regions according to the table layout
pub fn mirror_slices(table: &TableSpec) -> Vec<MirrorSlice> {
    let width = table.element_width();
    match table.layout {
        MirrorLayout::Bytes => table
            .mirror_addresses
            .iter()
            .take(table.byte_len())
            .enumerate()
            .map(|(i, &addr)| MirrorSlice {
                addr,
                primary_offset: i,
                len: 1,
            })
            .collect(),
        MirrorLayout::Elements => table
            .mirror_addresses
            .iter()
            .take(table.size)
            .enumerate()
            .map(|(i, &addr)| MirrorSlice {
                addr,
                primary_offset: i * width,
                len: width,
            })
            .collect(),
        MirrorLayout::Copies => table
            .mirror_addresses
            .iter()
            .map(|&addr| MirrorSlice {
                addr,
                primary_offset: 0,
                len: table.byte_len(),
            })
            .collect(),
    }
}

/// Read `size` elements in index order starting at `base`.
pub fn read_table(image: &Image, field: &FieldDescriptor, base: u32) -> Result<Vec<Value>> {
    let table = table_spec(field)?;
    let codec = element_codec(table);
    let bytes = image.read(base, table.byte_len())?;
    bytes
        .chunks_exact(table.element_width())
        .map(|chunk| codec.decode(chunk))
        .collect()
}

/// Encode `values` as the primary table bytes
pub fn encode_table(table: &TableSpec, values: &[Value]) -> Result<Vec<u8>> {
    if values.len() != table.size {
        return Err(EngineError::Range(format!(
            "table holds {} values, {} given",
            table.size,
            values.len()
        )));
    }
    let codec = element_codec(table);
    let mut bytes = Vec::with_capacity(table.byte_len());
    for value in values {
        bytes.extend(codec.encode(value, &[])?);
    }
    Ok(bytes)
}

/// Stage the table at every primary base and every declared mirror.
/// Nothing is staged unless all of it encodes and fits.
pub fn stage_table(
    image: &Image,
    field: &FieldDescriptor,
    bases: &[u32],
    values: &[Value],
    batch: &mut WriteBatch,
) -> Result<()> {
    let table = table_spec(field)?;
    let bytes = encode_table(table, values)?;

    let mut staged = WriteBatch::new();
    for &base in bases {
        staged.stage(image, base, &bytes)?;
    }
    for slice in mirror_slices(table) {
        let end = slice.primary_offset + slice.len;
        staged.stage(image, slice.addr, &bytes[slice.primary_offset..end])?;
    }
    debug!(
        "table {}: staged {} byte(s) over {} primary and {} mirror region(s)",
        field.id,
        staged.len(),
        bases.len(),
        table.mirror_addresses.len()
    );
    batch.append(staged);
    Ok(())
}

/// Write a whole table, primary and mirrors, all or nothing.
pub fn write_table(image: &mut Image, field: &FieldDescriptor, bases: &[u32], values: &[Value]) -> Result<()> {
    let mut batch = WriteBatch::new();
    stage_table(image, field, bases, values, &mut batch)?;
    batch.commit(image)?;
    Ok(())
}

/// Element indices whose bytes differ between the primary table at `base`
/// and any mirror region. Each diverging element is reported once.
pub fn diverging_elements(image: &Image, table: &TableSpec, base: u32) -> Result<BTreeSet<usize>> {
    let width = table.element_width().max(1);
    let primary = image.read(base, table.byte_len())?;
    let mut diverging = BTreeSet::new();
    for slice in mirror_slices(table) {
        let mirror = image.read(slice.addr, slice.len)?;
        let expected = &primary[slice.primary_offset..slice.primary_offset + slice.len];
        for (i, (a, b)) in expected.iter().zip(mirror).enumerate() {
            if a != b {
                diverging.insert((slice.primary_offset + i) / width);
            }
        }
    }
    Ok(diverging)
}
