//! Schema text parser.
//!
//! The schema is an INI-style file with one `[CATEGORY_index]` section per
//! record and `KEY=value` lines. Field keys end in `_x` where `x` is the field
//! id; a field exists once its `DESCRIPTION_x` is given.
//!
//! ```text
//! [SPELL_0]
//! NAME=REPEL
//! ADDRESS=0xD569
//! MP=0x1
//! DESCRIPTION_0=Damage
//! OFFSET_0=0x3
//! TYPE_0=DECIMAL
//! ```
//!
//! Loading is all or nothing: any error aborts and no registry is returned.

use std::fs;
use std::num::ParseIntError;
use std::path::Path;

use indexmap::IndexMap;
use log::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::registry::RecordRegistry;
use crate::schema::{FieldDescriptor, MirrorLayout, RecordDescriptor, RecordId, TableSpec, TypeTag};

/// `0x` prefixed literals are hexadecimal, bare ones decimal.
pub fn parse_int(text: &str) -> std::result::Result<u32, ParseIntError> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse::<u32>(),
    }
}

/// Comma separated list of integer literals
pub fn parse_int_list(text: &str) -> std::result::Result<Vec<u32>, ParseIntError> {
    text.split(',').map(parse_int).collect()
}

pub fn load_file(path: &Path) -> Result<RecordRegistry> {
    debug!("Loading schema: {:?}", path);
    let text = fs::read_to_string(path)?;
    parse(&text)
}

pub fn parse(schema_text: &str) -> Result<RecordRegistry> {
    let mut sections: Vec<Section> = vec![];

    for (i, raw) in schema_text.lines().enumerate() {
        let line_no = i + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let id: RecordId = name.parse().map_err(|message| EngineError::Schema {
                section: name.to_string(),
                line: line_no,
                message,
            })?;
            sections.push(Section {
                name: name.trim().to_string(),
                id,
                entries: IndexMap::new(),
            });
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| EngineError::Schema {
            section: sections.last().map(|s| s.name.clone()).unwrap_or_default(),
            line: line_no,
            message: format!("expected KEY=value, found '{}'", line),
        })?;
        let section = sections.last_mut().ok_or_else(|| EngineError::Schema {
            section: String::new(),
            line: line_no,
            message: "key outside of any section".to_string(),
        })?;
        let key = normalize_key(key.trim());
        if section
            .entries
            .insert(key.clone(), (value.trim().to_string(), line_no))
            .is_some()
        {
            return Err(EngineError::Schema {
                section: section.name.clone(),
                line: line_no,
                message: format!("duplicate key {}", key),
            });
        }
    }

    let mut records = Vec::with_capacity(sections.len());
    for section in &sections {
        records.push(section.build()?);
    }

    let registry = RecordRegistry::from_records(records)?;
    registry.check_references()?;
    info!(
        "Schema loaded: {} record(s) in {} categor(ies)",
        registry.len(),
        registry.categories().len()
    );
    Ok(registry)
}

struct Section {
    name: String,
    id: RecordId,
    entries: IndexMap<String, (String, usize)>,
}

/// Keys collected for one field before validation
#[derive(Default)]
struct FieldDraft {
    description: Option<String>,
    tooltip: Option<String>,
    pointer: Option<(String, usize)>,
    offset: Option<(String, usize)>,
    tag: Option<(String, usize)>,
    index_type: Option<(String, usize)>,
    value_type: Option<(String, usize)>,
    size: Option<(String, usize)>,
    table_copy: Option<(String, usize)>,
    table_layout: Option<(String, usize)>,
    scale: Option<(String, usize)>,
    width: Option<(String, usize)>,
    bit: Option<(String, usize)>,
    line: usize,
}

// Longer prefixes first so INDEX_TYPE_ never reads as TYPE_
const FIELD_PREFIXES: [&str; 13] = [
    "DESCRIPTION_",
    "INDEX_TYPE_",
    "VALUE_TYPE_",
    "TABLE_COPY_",
    "TABLE_LAYOUT_",
    "TOOLTIP_",
    "POINTER_",
    "OFFSET_",
    "SCALE_",
    "WIDTH_",
    "TYPE_",
    "SIZE_",
    "BIT_",
];

/// Upper-case a key, keeping the field id after a field prefix as written.
fn normalize_key(key: &str) -> String {
    let upper = key.to_ascii_uppercase();
    match FIELD_PREFIXES
        .iter()
        .find(|p| upper.starts_with(**p) && upper.len() > p.len())
    {
        Some(prefix) => format!("{}{}", prefix, &key[prefix.len()..]),
        None => upper,
    }
}

/// Free text may carry `\n` escapes
fn unescape(text: &str) -> String {
    text.replace("\\n", "\n")
}

impl Section {
    fn error(&self, line: usize, message: impl Into<String>) -> EngineError {
        EngineError::Schema {
            section: self.name.clone(),
            line,
            message: message.into(),
        }
    }

    fn int(&self, (text, line): &(String, usize), what: &str) -> Result<u32> {
        parse_int(text).map_err(|_| self.error(*line, format!("{} '{}' is not an integer", what, text)))
    }

    fn byte(&self, entry: &(String, usize), what: &str) -> Result<u8> {
        let v = self.int(entry, what)?;
        u8::try_from(v).map_err(|_| self.error(entry.1, format!("{} {} does not fit in a byte", what, v)))
    }

    fn tag(&self, (text, line): &(String, usize)) -> Result<TypeTag> {
        TypeTag::parse(text).ok_or_else(|| self.error(*line, format!("unknown type '{}'", text)))
    }

    fn record_ref(&self, (text, line): &(String, usize)) -> Result<RecordId> {
        text.parse()
            .map_err(|e: String| self.error(*line, e))
    }

    fn build(&self) -> Result<RecordDescriptor> {
        let mut record = RecordDescriptor::new(self.id);
        let mut drafts: IndexMap<String, FieldDraft> = IndexMap::new();

        for (key, entry) in &self.entries {
            let (value, line) = entry;
            match key.as_str() {
                "NAME" => record.name = Some(value.clone()),
                "NOTES" => record.notes = Some(unescape(value)),
                "TOOLTIP" => record.tooltip = Some(unescape(value)),
                "ADDRESS" => record.base_address = Some(self.int(entry, "ADDRESS")?),
                "MP" => {
                    let offset = self.int(entry, "MP")?;
                    record.mp_field = Some(FieldDescriptor::new(
                        "MP",
                        "MP cost",
                        TypeTag::Decimal,
                        vec![offset],
                    ));
                }
                "ALIAS" => record.alias_of = Some(self.record_ref(entry)?),
                "SHARES_MP" => record.shares_mp_with = Some(self.record_ref(entry)?),
                "FLAGS" => record.flags = Some(self.byte(entry, "FLAGS")?),
                "FINE_FLAGS" => record.fine_flags = Some(self.byte(entry, "FINE_FLAGS")?),
                "MP_DISPLAY" => record.mp_display = Some(self.byte(entry, "MP_DISPLAY")?),
                _ => {
                    let Some((prefix, field_id)) = FIELD_PREFIXES
                        .iter()
                        .find_map(|p| key.strip_prefix(p).map(|id| (*p, id)))
                        .filter(|(_, id)| !id.is_empty())
                    else {
                        warn!("[{}] line {}: ignoring unknown key {}", self.name, line, key);
                        continue;
                    };
                    let draft = drafts.entry(field_id.to_string()).or_insert_with(|| FieldDraft {
                        line: *line,
                        ..Default::default()
                    });
                    let slot = match prefix {
                        "DESCRIPTION_" => {
                            draft.description = Some(value.clone());
                            continue;
                        }
                        "TOOLTIP_" => {
                            draft.tooltip = Some(unescape(value));
                            continue;
                        }
                        "INDEX_TYPE_" => &mut draft.index_type,
                        "VALUE_TYPE_" => &mut draft.value_type,
                        "TABLE_COPY_" => &mut draft.table_copy,
                        "TABLE_LAYOUT_" => &mut draft.table_layout,
                        "POINTER_" => &mut draft.pointer,
                        "OFFSET_" => &mut draft.offset,
                        "SCALE_" => &mut draft.scale,
                        "WIDTH_" => &mut draft.width,
                        "TYPE_" => &mut draft.tag,
                        "SIZE_" => &mut draft.size,
                        _ => &mut draft.bit,
                    };
                    *slot = Some(entry.clone());
                }
            }
        }

        for (id, draft) in drafts {
            record.fields.push(self.build_field(&id, draft)?);
        }

        debug!(
            "[{}] {} field(s), base {:?}",
            self.name,
            record.all_fields().count(),
            record.base_address
        );
        Ok(record)
    }

    fn build_field(&self, id: &str, draft: FieldDraft) -> Result<FieldDescriptor> {
        let label = draft
            .description
            .clone()
            .ok_or_else(|| self.error(draft.line, format!("field {} has no DESCRIPTION_{}", id, id)))?;

        let tag = match &draft.tag {
            Some(entry) => self.tag(entry)?,
            None => TypeTag::Hex,
        };

        let (offset_text, offset_line) = draft
            .offset
            .as_ref()
            .ok_or_else(|| self.error(draft.line, format!("field {} has no OFFSET_{}", id, id)))?;
        let offsets = parse_int_list(offset_text).map_err(|_| {
            self.error(
                *offset_line,
                format!("OFFSET_{} '{}' is not a comma separated integer list", id, offset_text),
            )
        })?;

        let mut field = FieldDescriptor::new(id, label, tag, offsets);
        field.tooltip = draft.tooltip.clone();
        if let Some(entry) = &draft.pointer {
            field.pointer_base = Some(self.int(entry, "POINTER")?);
        }

        if let Some(entry) = &draft.width {
            let width = self.int(entry, "WIDTH")? as usize;
            if !tag.is_integer() || matches!(tag, TypeTag::Word | TypeTag::Pointer) || !(1..=4).contains(&width) {
                return Err(self.error(entry.1, format!("WIDTH_{} {} is not valid for {}", id, width, tag)));
            }
            field.width = width;
        }

        if let Some(entry) = &draft.bit {
            let bit = self.int(entry, "BIT")?;
            if !matches!(tag, TypeTag::Bool | TypeTag::Check) || bit > 7 {
                return Err(self.error(entry.1, format!("BIT_{} {} is not valid for {}", id, bit, tag)));
            }
            field.bit = Some(bit as u8);
        }

        if let Some(entry) = &draft.scale {
            let scale = self.int(entry, "SCALE")?;
            if tag != TypeTag::Attribute || scale == 0 {
                return Err(self.error(entry.1, format!("SCALE_{} {} is not valid for {}", id, scale, tag)));
            }
            field.scale = scale;
        }

        if tag == TypeTag::Table {
            field.table = Some(self.build_table(id, &draft)?);
        } else if draft.size.is_some() || draft.value_type.is_some() || draft.table_copy.is_some() {
            warn!("[{}] field {} is {} but carries table keys", self.name, id, tag);
        }

        Ok(field)
    }

    fn build_table(&self, id: &str, draft: &FieldDraft) -> Result<TableSpec> {
        let size_entry = draft
            .size
            .as_ref()
            .ok_or_else(|| self.error(draft.line, format!("table {} has no SIZE_{}", id, id)))?;
        let size = self.int(size_entry, "SIZE")? as usize;
        if size == 0 {
            return Err(self.error(size_entry.1, format!("table {} has SIZE 0", id)));
        }

        let value_entry = draft
            .value_type
            .as_ref()
            .ok_or_else(|| self.error(draft.line, format!("table {} has no VALUE_TYPE_{}", id, id)))?;
        let value_type = self.tag(value_entry)?;
        if !value_type.is_integer() {
            return Err(self.error(
                value_entry.1,
                format!("table {} cannot hold {} values", id, value_type),
            ));
        }

        let index_type = match &draft.index_type {
            Some(entry) => self.tag(entry)?,
            None => TypeTag::Decimal,
        };

        let mirror_addresses = match &draft.table_copy {
            Some((text, line)) => parse_int_list(text).map_err(|_| {
                self.error(*line, format!("TABLE_COPY_{} '{}' is not an integer list", id, text))
            })?,
            None => vec![],
        };

        let layout = match &draft.table_layout {
            Some((text, line)) => MirrorLayout::parse(text)
                .ok_or_else(|| self.error(*line, format!("unknown table layout '{}'", text)))?,
            None => MirrorLayout::infer(mirror_addresses.len(), size, value_type.default_width()),
        };

        Ok(TableSpec {
            index_type,
            value_type,
            size,
            mirror_addresses,
            layout,
        })
    }
}
