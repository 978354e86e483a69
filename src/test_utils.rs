//! Fixtures shared by unit tests.

use crate::image::Image;
use crate::settings::AddressMode;

/// Small schema over a 0x100-byte flat image.
pub const SAMPLE_SCHEMA: &str = "
; spells
[SPELL_0]
NAME=REPEL
ADDRESS=0x20
MP=0x1
DESCRIPTION_0=Damage
OFFSET_0=0x3
TYPE_0=DECIMAL

[SPELL_1]
NAME=RISE
ALIAS=SPELL_0

[SPELL_2]
NAME=ASCEND
ADDRESS=0x40
MP=0x1
SHARES_MP=SPELL_0
DESCRIPTION_0=Outdoors only
OFFSET_0=0x2
TYPE_0=B
BIT_0=3

# shared routines
[COMMON_2]
ADDRESS=0x80
DESCRIPTION_0=Message
OFFSET_0=0x0
TYPE_0=STRING
DESCRIPTION_1=Count
OFFSET_1=0x10
TYPE_1=D
";

pub fn flat_image(bytes: Vec<u8>) -> Image {
    Image::from_bytes(bytes, AddressMode::Flat).unwrap()
}
