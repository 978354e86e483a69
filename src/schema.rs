//! Immutable descriptors produced by the schema loader.
//!
//! A record is one game routine (spell, tool, command, special dialogue or a
//! shared routine) and its fields are the editable operands inside it.

use std::fmt::{Display, Error, Formatter};
use std::str::FromStr;

/// Closed set of field types known to the codec registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Decimal,
    Hex,
    Pointer,
    String,
    Attribute,
    Bool,
    Check,
    Location,
    Mark,
    Npc,
    Table,
    Word,
}

impl TypeTag {
    pub const ALL: [TypeTag; 12] = [
        TypeTag::Decimal,
        TypeTag::Hex,
        TypeTag::Pointer,
        TypeTag::String,
        TypeTag::Attribute,
        TypeTag::Bool,
        TypeTag::Check,
        TypeTag::Location,
        TypeTag::Mark,
        TypeTag::Npc,
        TypeTag::Table,
        TypeTag::Word,
    ];

    /// Accepts the long name or the one-letter short code, in any case.
    pub fn parse(text: &str) -> Option<TypeTag> {
        let tag = match text.trim().to_ascii_uppercase().as_str() {
            "DECIMAL" | "D" => TypeTag::Decimal,
            "HEX" | "H" => TypeTag::Hex,
            "POINTER" | "P" => TypeTag::Pointer,
            "STRING" | "S" => TypeTag::String,
            "ATTRIBUTE" | "A" => TypeTag::Attribute,
            "BOOL" | "B" => TypeTag::Bool,
            "CHECK" | "C" => TypeTag::Check,
            "LOCATION" | "L" => TypeTag::Location,
            "MARK" | "M" => TypeTag::Mark,
            "NPC" | "N" => TypeTag::Npc,
            "TABLE" => TypeTag::Table,
            "WORD" => TypeTag::Word,
            _ => return None,
        };
        Some(tag)
    }

    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Decimal => "DECIMAL",
            TypeTag::Hex => "HEX",
            TypeTag::Pointer => "POINTER",
            TypeTag::String => "STRING",
            TypeTag::Attribute => "ATTRIBUTE",
            TypeTag::Bool => "BOOL",
            TypeTag::Check => "CHECK",
            TypeTag::Location => "LOCATION",
            TypeTag::Mark => "MARK",
            TypeTag::Npc => "NPC",
            TypeTag::Table => "TABLE",
            TypeTag::Word => "WORD",
        }
    }

    /// Bytes occupied by one value. Strings are terminator delimited and
    /// tables are sized by their element type, both report 0 here.
    pub fn default_width(self) -> usize {
        match self {
            TypeTag::Word | TypeTag::Pointer => 2,
            TypeTag::String | TypeTag::Table => 0,
            _ => 1,
        }
    }

    /// Tags whose value is a plain little-endian unsigned integer
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            TypeTag::Decimal
                | TypeTag::Hex
                | TypeTag::Pointer
                | TypeTag::Attribute
                | TypeTag::Location
                | TypeTag::Mark
                | TypeTag::Npc
                | TypeTag::Word
        )
    }
}

impl Display for TypeTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Spell,
    Tool,
    Command,
    Special,
    Common,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Spell,
        Category::Tool,
        Category::Command,
        Category::Special,
        Category::Common,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            Category::Spell => "SPELL",
            Category::Tool => "TOOL",
            Category::Command => "COMMAND",
            Category::Special => "SPECIAL",
            Category::Common => "COMMON",
        }
    }

    pub fn from_prefix(text: &str) -> Option<Category> {
        Category::ALL
            .into_iter()
            .find(|c| c.prefix().eq_ignore_ascii_case(text.trim()))
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}", self.prefix())
    }
}

/// `(category, index)` key of a record, written `SPELL_3` in schema text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub category: Category,
    pub index: u32,
}

impl RecordId {
    pub fn new(category: Category, index: u32) -> Self {
        RecordId { category, index }
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}_{}", self.category, self.index)
    }
}

impl FromStr for RecordId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, index) = s
            .trim()
            .rsplit_once('_')
            .ok_or_else(|| format!("'{}' is not CATEGORY_index", s))?;
        let category =
            Category::from_prefix(prefix).ok_or_else(|| format!("unknown category '{}'", prefix))?;
        let index = crate::loader::parse_int(index)
            .map_err(|_| format!("bad record index in '{}'", s))?;
        Ok(RecordId { category, index })
    }
}

/// How `TABLE_COPY` addresses relate to the primary table bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorLayout {
    /// One address per primary byte
    Bytes,
    /// One address per element, each holding a whole element
    Elements,
    /// Each address starts a full copy of the table
    Copies,
}

impl MirrorLayout {
    pub fn parse(text: &str) -> Option<MirrorLayout> {
        match text.trim().to_ascii_uppercase().as_str() {
            "BYTES" => Some(MirrorLayout::Bytes),
            "ELEMENTS" => Some(MirrorLayout::Elements),
            "COPIES" => Some(MirrorLayout::Copies),
            _ => None,
        }
    }

    /// Guess the layout from how many mirror addresses a table lists.
    pub fn infer(mirror_count: usize, size: usize, element_width: usize) -> MirrorLayout {
        if mirror_count == size * element_width {
            MirrorLayout::Bytes
        } else if mirror_count == size {
            MirrorLayout::Elements
        } else {
            MirrorLayout::Copies
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSpec {
    /// Labelling only, never changes the byte layout
    pub index_type: TypeTag,
    pub value_type: TypeTag,
    pub size: usize,
    pub mirror_addresses: Vec<u32>,
    pub layout: MirrorLayout,
}

impl TableSpec {
    pub fn element_width(&self) -> usize {
        self.value_type.default_width()
    }

    pub fn byte_len(&self) -> usize {
        self.size * self.element_width()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub id: String,
    pub label: String,
    pub tooltip: Option<String>,
    pub tag: TypeTag,
    /// Mirror set: every entry holds the same logical value
    pub offsets: Vec<u32>,
    pub pointer_base: Option<u32>,
    pub width: usize,
    /// Bit position for `Bool`/`Check` fields sharing a byte with other flags
    pub bit: Option<u8>,
    /// Attribute scale: effective value = stored byte * scale
    pub scale: u32,
    pub table: Option<TableSpec>,
}

impl FieldDescriptor {
    /// A plain single-offset field with the tag's default width.
    pub fn new(id: impl Into<String>, label: impl Into<String>, tag: TypeTag, offsets: Vec<u32>) -> Self {
        FieldDescriptor {
            id: id.into(),
            label: label.into(),
            tooltip: None,
            tag,
            offsets,
            pointer_base: None,
            width: tag.default_width(),
            bit: None,
            scale: 1,
            table: None,
        }
    }

    pub fn is_mirrored(&self) -> bool {
        self.offsets.len() > 1
    }

    /// Bytes covered at each resolved address, `None` for strings
    pub fn byte_len(&self) -> Option<usize> {
        match (&self.table, self.tag) {
            (Some(table), _) => Some(table.byte_len()),
            (None, TypeTag::String) => None,
            (None, _) => Some(self.width),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordDescriptor {
    pub id: RecordId,
    pub name: Option<String>,
    pub notes: Option<String>,
    pub tooltip: Option<String>,
    pub base_address: Option<u32>,
    /// Record whose code this one reuses
    pub alias_of: Option<RecordId>,
    /// MP cost is added to this record's cost when cast
    pub shares_mp_with: Option<RecordId>,
    pub mp_field: Option<FieldDescriptor>,
    pub fields: Vec<FieldDescriptor>,
    /// Where/when the routine may be used
    pub flags: Option<u8>,
    pub fine_flags: Option<u8>,
    /// MP needed for the spell to show up in the caster's list
    pub mp_display: Option<u8>,
}

impl RecordDescriptor {
    pub fn new(id: RecordId) -> Self {
        RecordDescriptor {
            id,
            name: None,
            notes: None,
            tooltip: None,
            base_address: None,
            alias_of: None,
            shares_mp_with: None,
            mp_field: None,
            fields: vec![],
            flags: None,
            fine_flags: None,
            mp_display: None,
        }
    }

    pub fn category(&self) -> Category {
        self.id.category
    }

    pub fn index(&self) -> u32 {
        self.id.index
    }

    pub fn is_alias(&self) -> bool {
        self.alias_of.is_some()
    }

    /// Name shown to the user, falling back to the record id
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.id.to_string())
    }

    /// MP field first (when declared), then the declared fields in order.
    pub fn all_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.mp_field.iter().chain(self.fields.iter())
    }

    pub fn field(&self, id: &str) -> Option<&FieldDescriptor> {
        self.all_fields().find(|f| f.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_codes_match_long_names() {
        let pairs = [
            ("H", "HEX"),
            ("D", "DECIMAL"),
            ("P", "POINTER"),
            ("S", "STRING"),
            ("A", "ATTRIBUTE"),
            ("B", "BOOL"),
            ("C", "CHECK"),
            ("L", "LOCATION"),
            ("M", "MARK"),
            ("N", "NPC"),
        ];
        for (short, long) in pairs {
            assert_eq!(TypeTag::parse(short), TypeTag::parse(long));
            assert!(TypeTag::parse(short).is_some());
        }
        assert_eq!(TypeTag::parse("word"), Some(TypeTag::Word));
        assert_eq!(TypeTag::parse("FLOAT"), None);
    }

    #[test]
    fn test_tag_names_parse_back() {
        for tag in TypeTag::ALL {
            assert_eq!(TypeTag::parse(tag.name()), Some(tag));
        }
    }

    #[test]
    fn test_record_id_text() {
        let id: RecordId = "SPELL_12".parse().unwrap();
        assert_eq!(id, RecordId::new(Category::Spell, 12));
        assert_eq!(id.to_string(), "SPELL_12");
        assert!("WEAPON_1".parse::<RecordId>().is_err());
        assert!("SPELL".parse::<RecordId>().is_err());
    }

    #[test]
    fn test_mirror_layout_inference() {
        assert_eq!(MirrorLayout::infer(8, 4, 2), MirrorLayout::Bytes);
        assert_eq!(MirrorLayout::infer(4, 4, 2), MirrorLayout::Elements);
        assert_eq!(MirrorLayout::infer(2, 4, 2), MirrorLayout::Copies);
    }
}
