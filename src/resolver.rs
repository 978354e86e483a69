//! Field offsets to absolute addresses, and the read/write paths built on them.
//!
//! Addresses are recomputed on every access: an edit to a pointer changes
//! where its dependent fields live, so nothing here is cached.

use log::{debug, trace};

use crate::codec::{read_le, Codec, Value};
use crate::error::{EngineError, Result};
use crate::image::{Image, WriteBatch};
use crate::registry::RecordRegistry;
use crate::schema::{FieldDescriptor, RecordDescriptor, RecordId, TypeTag};
use crate::table;
use crate::text::DEFAULT_TERMINATOR;

const POINTER_WIDTH: usize = 2;

/// A field bound to its current addresses and value
#[derive(Debug, Clone, PartialEq)]
pub struct ValueBinding<'a> {
    pub record: RecordId,
    pub field: &'a FieldDescriptor,
    /// One per mirror offset, already past pointer indirection
    pub resolved_addresses: Vec<u32>,
    pub decoded_value: Value,
}

pub struct Resolver<'a> {
    registry: &'a RecordRegistry,
    image: &'a Image,
    terminator: u8,
}

fn add(base: u32, offset: u32) -> Result<u32> {
    base.checked_add(offset)
        .ok_or_else(|| EngineError::Address(format!("{:#x} + {:#x} overflows", base, offset)))
}

/// Addresses of `field` for a record based at `base`.
pub fn resolve_from(image: &Image, base: u32, field: &FieldDescriptor) -> Result<Vec<u32>> {
    let start = match field.pointer_base {
        None => base,
        Some(pointer_base) => {
            let pointer_addr = add(base, pointer_base)?;
            let raw = read_le(image.read(pointer_addr, POINTER_WIDTH)?, POINTER_WIDTH)?;
            let target = image.rebase(pointer_addr, raw);
            debug!(
                "field {}: pointer at {:#06x} -> {:#06x}",
                field.id, pointer_addr, target
            );
            target
        }
    };

    let span = field.byte_len().unwrap_or(1);
    let mut addresses = Vec::with_capacity(field.offsets.len());
    for &offset in &field.offsets {
        let addr = add(start, offset)?;
        image.physical(addr, span)?;
        addresses.push(addr);
    }
    if addresses.is_empty() {
        return Err(EngineError::Address(format!("field {} has no offsets", field.id)));
    }
    Ok(addresses)
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a RecordRegistry, image: &'a Image) -> Self {
        Resolver {
            registry,
            image,
            terminator: DEFAULT_TERMINATOR,
        }
    }

    pub fn with_terminator(mut self, terminator: u8) -> Self {
        self.terminator = terminator;
        self
    }

    /// One address per offset of `field`. Aliases resolve against the base
    /// address of the record they share code with.
    pub fn resolve(&self, record: &RecordDescriptor, field: &FieldDescriptor) -> Result<Vec<u32>> {
        let effective = self.registry.effective(record)?;
        resolve_from(self.image, effective.base_address.unwrap_or(0), field)
    }

    /// Decode the value of `field` stored at `addr`.
    pub fn decode_at(&self, field: &FieldDescriptor, addr: u32) -> Result<Value> {
        if field.table.is_some() {
            return table::read_table(self.image, field, addr).map(Value::Table);
        }
        let codec = Codec::for_field(field, self.terminator);
        match codec.byte_len() {
            Some(len) => codec.decode(self.image.read(addr, len)?),
            None => codec
                .decode(self.image.tail(addr)?)
                .map_err(|e| match e {
                    EngineError::Truncation { .. } => EngineError::Truncation { addr },
                    other => other,
                }),
        }
    }

    pub fn bind<'f>(&self, record: &RecordDescriptor, field: &'f FieldDescriptor) -> Result<ValueBinding<'f>> {
        let resolved_addresses = self.resolve(record, field)?;
        let decoded_value = self.decode_at(field, resolved_addresses[0])?;
        trace!(
            "{}.{} @ {:x?} = {}",
            record.id,
            field.id,
            resolved_addresses,
            decoded_value
        );
        Ok(ValueBinding {
            record: record.id,
            field,
            resolved_addresses,
            decoded_value,
        })
    }

    /// Encode `value` for every mirror of `field` and add it to `batch`.
    /// On error nothing is added.
    pub fn stage_write(
        &self,
        record: &RecordDescriptor,
        field: &FieldDescriptor,
        value: &Value,
        batch: &mut WriteBatch,
    ) -> Result<()> {
        let addresses = self.resolve(record, field)?;

        if field.table.is_some() {
            return match value {
                Value::Table(values) => {
                    table::stage_table(self.image, field, &addresses, values, batch)
                }
                other => Err(EngineError::Range(format!(
                    "table {} needs a list of values, got {}",
                    field.id, other
                ))),
            };
        }

        let codec = Codec::for_field(field, self.terminator);
        let mut staged = WriteBatch::new();
        for &addr in &addresses {
            let current: &[u8] = match codec.byte_len() {
                Some(len) => self.image.read(addr, len)?,
                None => &[],
            };
            let bytes = codec.encode(value, current)?;
            if field.tag == TypeTag::String {
                self.check_string_room(record, field, addr, bytes.len())?;
            }
            staged.stage(self.image, addr, &bytes)?;
        }
        batch.append(staged);
        Ok(())
    }

    /// Best-effort: the encoded string must end before the next field of
    /// the same record that starts after it.
    fn check_string_room(
        &self,
        record: &RecordDescriptor,
        field: &FieldDescriptor,
        addr: u32,
        len: usize,
    ) -> Result<()> {
        let effective = self.registry.effective(record)?;
        let limit = effective
            .all_fields()
            .filter(|other| other.id != field.id)
            .filter_map(|other| self.resolve(record, other).ok())
            .flatten()
            .filter(|&other_addr| other_addr > addr)
            .min();
        match limit {
            Some(limit) if addr as u64 + len as u64 > limit as u64 => {
                Err(EngineError::Overflow { addr, len, limit })
            }
            _ => Ok(()),
        }
    }
}
