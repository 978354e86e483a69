use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt::{Display, Error, Formatter};

use indexmap::IndexMap;
use log::trace;

use crate::error::{EngineError, Result};
use crate::schema::{Category, RecordDescriptor, RecordId};

/// All records of a schema, keyed by `(category, index)`.
///
/// Iteration follows declaration order, which is also the order records are
/// shown to the user.
#[derive(Debug, Default, Clone)]
pub struct RecordRegistry {
    records: IndexMap<RecordId, RecordDescriptor>,
}

impl RecordRegistry {
    /// Build from records in declaration order. Only duplicate ids are
    /// rejected here, see [`RecordRegistry::check_references`].
    pub fn from_records(records: Vec<RecordDescriptor>) -> Result<Self> {
        let mut map = IndexMap::with_capacity(records.len());
        for record in records {
            let id = record.id;
            if map.insert(id, record).is_some() {
                return Err(EngineError::schema(id.to_string(), "duplicate record"));
            }
        }
        Ok(RecordRegistry { records: map })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecordDescriptor> {
        self.records.values()
    }

    pub fn get(&self, id: RecordId) -> Result<&RecordDescriptor> {
        self.records
            .get(&id)
            .ok_or_else(|| EngineError::NotFound(format!("record {}", id)))
    }

    pub fn lookup(&self, category: Category, index: u32) -> Result<&RecordDescriptor> {
        self.get(RecordId::new(category, index))
    }

    pub fn list(&self, category: Category) -> Vec<&RecordDescriptor> {
        self.records
            .values()
            .filter(|r| r.category() == category)
            .collect()
    }

    /// Categories that have at least one record
    pub fn categories(&self) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|c| self.records.keys().any(|id| id.category == *c))
            .collect()
    }

    /// Follow the alias chain of `record` to the record that owns the code.
    pub fn alias_target<'a>(&'a self, record: &'a RecordDescriptor) -> Result<&'a RecordDescriptor> {
        let mut seen = HashSet::new();
        let mut current = record;
        while let Some(next) = current.alias_of {
            if !seen.insert(current.id) {
                return Err(EngineError::schema(
                    record.id.to_string(),
                    format!("alias chain loops back to {}", current.id),
                ));
            }
            trace!("{} aliases {}", current.id, next);
            current = self.records.get(&next).ok_or_else(|| {
                EngineError::schema(
                    current.id.to_string(),
                    format!("alias refers to missing record {}", next),
                )
            })?;
        }
        Ok(current)
    }

    /// The record as seen by address resolution: an alias keeps its own
    /// identity but takes base address and fields from the aliased record.
    pub fn effective<'a>(&'a self, record: &'a RecordDescriptor) -> Result<Cow<'a, RecordDescriptor>> {
        if !record.is_alias() {
            return Ok(Cow::Borrowed(record));
        }
        let target = self.alias_target(record)?;
        let mut effective = record.clone();
        effective.base_address = target.base_address;
        effective.fields = target.fields.clone();
        effective.mp_field = target.mp_field.clone();
        Ok(Cow::Owned(effective))
    }

    /// Cross-record checks: alias targets exist and terminate, aliases carry
    /// no fields or address of their own, MP links point at real records.
    pub fn check_references(&self) -> Result<()> {
        for record in self.records.values() {
            if record.is_alias() {
                if !record.fields.is_empty() || record.mp_field.is_some() {
                    return Err(EngineError::schema(
                        record.id.to_string(),
                        "an alias record cannot declare fields",
                    ));
                }
                if record.base_address.is_some() {
                    return Err(EngineError::schema(
                        record.id.to_string(),
                        "an alias record cannot declare an ADDRESS",
                    ));
                }
                self.alias_target(record)?;
            }
            if let Some(linked) = record.shares_mp_with {
                if !self.records.contains_key(&linked) {
                    return Err(EngineError::schema(
                        record.id.to_string(),
                        format!("SHARES_MP refers to missing record {}", linked),
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Display for RecordRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::result::Result<(), Error> {
        for category in self.categories() {
            writeln!(f, "***** {} *****", category)?;
            for record in self.list(category) {
                match (record.alias_of, record.base_address) {
                    (Some(target), _) => writeln!(
                        f,
                        "[{}] {} -> shares code with {}",
                        record.id,
                        record.display_name(),
                        target
                    )?,
                    (None, Some(addr)) => writeln!(
                        f,
                        "[{}] {} @ {:#06x}, {} field(s)",
                        record.id,
                        record.display_name(),
                        addr,
                        record.all_fields().count()
                    )?,
                    (None, None) => writeln!(
                        f,
                        "[{}] {}, {} field(s)",
                        record.id,
                        record.display_name(),
                        record.all_fields().count()
                    )?,
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDescriptor, TypeTag};

    fn spell(index: u32) -> RecordDescriptor {
        let mut r = RecordDescriptor::new(RecordId::new(Category::Spell, index));
        r.base_address = Some(0xD000 + index * 0x10);
        r.fields
            .push(FieldDescriptor::new("0", "Damage", TypeTag::Decimal, vec![3]));
        r
    }

    fn alias(index: u32, target: u32) -> RecordDescriptor {
        let mut r = RecordDescriptor::new(RecordId::new(Category::Spell, index));
        r.alias_of = Some(RecordId::new(Category::Spell, target));
        r
    }

    #[test]
    fn test_declaration_order_is_kept() {
        let registry = RecordRegistry::from_records(vec![spell(5), spell(1), spell(3)]).unwrap();
        let order: Vec<u32> = registry.list(Category::Spell).iter().map(|r| r.index()).collect();
        assert_eq!(order, vec![5, 1, 3]);
        assert_eq!(registry.categories(), vec![Category::Spell]);
    }

    #[test]
    fn test_lookup_missing() {
        let registry = RecordRegistry::from_records(vec![spell(0)]).unwrap();
        assert!(registry.lookup(Category::Spell, 0).is_ok());
        assert!(matches!(
            registry.lookup(Category::Tool, 0),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_rejected() {
        let err = RecordRegistry::from_records(vec![spell(2), spell(2)]).unwrap_err();
        assert!(err.is_schema());
    }

    #[test]
    fn test_effective_alias() {
        let registry = RecordRegistry::from_records(vec![spell(0), alias(1, 0)]).unwrap();
        let rise = registry.lookup(Category::Spell, 1).unwrap();
        let effective = registry.effective(rise).unwrap();
        assert_eq!(effective.id, rise.id);
        assert_eq!(effective.base_address, Some(0xD000));
        assert_eq!(effective.fields.len(), 1);
        registry.check_references().unwrap();
    }

    #[test]
    fn test_alias_cycle_detected() {
        let registry =
            RecordRegistry::from_records(vec![alias(0, 1), alias(1, 2), alias(2, 0)]).unwrap();
        let record = registry.lookup(Category::Spell, 0).unwrap();
        assert!(registry.effective(record).unwrap_err().is_schema());
        assert!(registry.check_references().unwrap_err().is_schema());
    }

    #[test]
    fn test_alias_with_fields_rejected() {
        let mut bad = alias(1, 0);
        bad.fields
            .push(FieldDescriptor::new("0", "x", TypeTag::Hex, vec![0]));
        let registry = RecordRegistry::from_records(vec![spell(0), bad]).unwrap();
        assert!(registry.check_references().unwrap_err().is_schema());
    }
}
