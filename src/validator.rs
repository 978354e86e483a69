//! Full-image consistency scan, run before every save.

use std::collections::BTreeSet;
use std::fmt::{Display, Error, Formatter};

use log::{debug, warn};

use crate::error::{EngineError, Result};
use crate::image::Image;
use crate::registry::RecordRegistry;
use crate::resolver::Resolver;
use crate::schema::{FieldDescriptor, RecordDescriptor, RecordId};
use crate::table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// Offsets of a mirrored field decode to different values
    MirrorMismatch,
    /// One table element differs between the primary table and a mirror
    TableMirrorMismatch { index: usize },
    /// A field, pointer target or table mirror falls outside the image
    OutOfBounds,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub record: RecordId,
    pub field: String,
    pub kind: ViolationKind,
    pub reason: String,
}

impl Violation {
    pub fn to_error(&self) -> EngineError {
        match self.kind {
            ViolationKind::MirrorMismatch => EngineError::MirrorMismatch {
                record: self.record.to_string(),
                field: self.field.clone(),
            },
            ViolationKind::TableMirrorMismatch { index } => EngineError::TableMirrorMismatch {
                record: self.record.to_string(),
                field: self.field.clone(),
                index,
            },
            ViolationKind::OutOfBounds => {
                EngineError::Address(format!("{}.{} cannot be resolved", self.record, self.field))
            }
        }
    }
}

impl Display for Violation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::result::Result<(), Error> {
        write!(f, "{} ({})", self.to_error(), self.reason)
    }
}

/// Check every mirrored field and every mirrored table in the registry.
///
/// Alias records are skipped since they share their target's bytes. A field
/// or table mirror that does not fit in the image is reported as
/// [`ViolationKind::OutOfBounds`].
pub fn verify(image: &Image, registry: &RecordRegistry, terminator: u8) -> Vec<Violation> {
    let resolver = Resolver::new(registry, image).with_terminator(terminator);
    let mut violations = vec![];

    for record in registry.iter().filter(|r| !r.is_alias()) {
        for field in record.all_fields() {
            let addresses = match resolver.resolve(record, field) {
                Ok(addresses) => addresses,
                Err(e) => {
                    warn!("{}.{}: {}", record.id, field.id, e);
                    violations.push(out_of_bounds(record, field, e));
                    continue;
                }
            };
            if addresses.len() > 1 {
                if let Some(v) = check_mirrors(&resolver, record, field, &addresses) {
                    violations.push(v);
                }
            }
            if field.table.is_some() {
                match check_table(image, record, field, &addresses) {
                    Ok(found) => violations.extend(found),
                    Err(e) => {
                        warn!("{}.{} table: {}", record.id, field.id, e);
                        violations.push(out_of_bounds(record, field, e));
                    }
                }
            }
        }
    }

    debug!("Verification found {} violation(s)", violations.len());
    violations
}

fn out_of_bounds(record: &RecordDescriptor, field: &FieldDescriptor, error: EngineError) -> Violation {
    Violation {
        record: record.id,
        field: field.id.clone(),
        kind: ViolationKind::OutOfBounds,
        reason: error.to_string(),
    }
}

fn check_mirrors(
    resolver: &Resolver,
    record: &RecordDescriptor,
    field: &FieldDescriptor,
    addresses: &[u32],
) -> Option<Violation> {
    let decoded: Vec<Option<_>> = addresses
        .iter()
        .map(|&addr| resolver.decode_at(field, addr).ok())
        .collect();
    let first = &decoded[0];
    let bad = decoded.iter().position(|v| v != first)?;
    let show = |v: &Option<crate::codec::Value>| match v {
        Some(v) => v.display_as(field.tag),
        None => "<unreadable>".to_string(),
    };
    Some(Violation {
        record: record.id,
        field: field.id.clone(),
        kind: ViolationKind::MirrorMismatch,
        reason: format!(
            "{:#06x} holds {} but {:#06x} holds {}",
            addresses[0],
            show(first),
            addresses[bad],
            show(&decoded[bad])
        ),
    })
}

fn check_table(
    image: &Image,
    record: &RecordDescriptor,
    field: &FieldDescriptor,
    bases: &[u32],
) -> Result<Vec<Violation>> {
    let spec = table::table_spec(field)?;
    if spec.mirror_addresses.is_empty() {
        return Ok(vec![]);
    }
    let mut diverging = BTreeSet::new();
    for &base in bases {
        diverging.extend(table::diverging_elements(image, spec, base)?);
    }
    Ok(diverging
        .into_iter()
        .map(|index| Violation {
            record: record.id,
            field: field.id.clone(),
            kind: ViolationKind::TableMirrorMismatch { index },
            reason: format!("element {} differs from its mirror copy", index),
        })
        .collect())
}
