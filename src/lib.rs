//! Schema-driven field access for cartridge images.
//!
//! A text schema describes records (spells, tools, commands, dialogue and
//! shared routines) and the typed fields inside them. The engine resolves
//! those fields to addresses in a loaded image, decodes and encodes them,
//! keeps mirrored copies in step and refuses to save an inconsistent image.

#[macro_use]
extern crate lazy_static;

pub mod codec;
pub mod error;
pub mod header;
pub mod image;
pub mod loader;
pub mod registry;
pub mod resolver;
pub mod schema;
pub mod session;
pub mod settings;
pub mod table;
pub mod text;
pub mod translate;
pub mod validator;

#[cfg(test)]
mod test_utils;

pub use codec::Value;
pub use error::{EngineError, Result};
pub use image::{Image, WriteBatch};
pub use registry::RecordRegistry;
pub use resolver::{Resolver, ValueBinding};
pub use schema::{Category, FieldDescriptor, RecordDescriptor, RecordId, TypeTag};
pub use session::{EditSession, FieldView};
pub use settings::{AddressMode, EditorSettings};
pub use validator::{Violation, ViolationKind};
