//! Product records and their fixed-size slot encoding
//!
//! Every record occupies exactly [`SLOT_SIZE`] bytes on disk:
//!
//! ```text
//! [0]        flags (tombstone)
//! [1..5]     id        (i32, big-endian)
//! [5..9]     quantity  (i32, big-endian)
//! [9..17]    price     (f64, big-endian)
//! [17..117]  name      (50 UTF-16 code units, zero padded)
//! [117..217] supplier  (50 UTF-16 code units, zero padded)
//! ```

use byteorder::{BigEndian, ReadBytesExt};
use bytes::{BufMut, BytesMut};
use std::io::{self, Cursor};

/// Capacity of each text field, in UTF-16 code units
pub const TEXT_CAPACITY: usize = 50;

/// Width of each text field in bytes
const TEXT_WIDTH: usize = TEXT_CAPACITY * 2;

/// Size of one encoded slot in bytes
pub const SLOT_SIZE: usize = 1 + 4 + 4 + 8 + TEXT_WIDTH + TEXT_WIDTH;

bitflags::bitflags! {
    /// Flags stored in the first byte of every slot
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SlotFlags: u8 {
        /// Slot is logically deleted (tombstone)
        const DELETED = 0x01;
    }
}

impl SlotFlags {
    /// Interpret a raw flag byte. Any non-zero byte marks a tombstone.
    pub fn from_raw(raw: u8) -> Self {
        if raw == 0 {
            SlotFlags::empty()
        } else {
            SlotFlags::from_bits_retain(raw) | SlotFlags::DELETED
        }
    }

    /// Check if the slot is a tombstone
    pub fn is_deleted(&self) -> bool {
        self.contains(SlotFlags::DELETED)
    }
}

/// A single product in the inventory
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Unique among live records
    pub id: i32,
    pub name: String,
    /// Stock count
    pub quantity: i32,
    pub price: f64,
    pub supplier: String,
}

impl Record {
    /// Create a new record
    pub fn new(
        id: i32,
        name: impl Into<String>,
        quantity: i32,
        price: f64,
        supplier: impl Into<String>,
    ) -> Self {
        Record {
            id,
            name: name.into(),
            quantity,
            price,
            supplier: supplier.into(),
        }
    }

    /// A record needs a non-blank name to be stored
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty()
    }

    /// Truncate text fields to what a slot can hold.
    ///
    /// The result is exactly what decoding the encoded slot yields, so it is
    /// the form that indexes must be keyed on.
    pub fn normalized(mut self) -> Self {
        self.name = fit_text(&self.name);
        self.supplier = fit_text(&self.supplier);
        self
    }

    /// Stock value of this record (quantity x price)
    pub fn stock_value(&self) -> f64 {
        self.quantity as f64 * self.price
    }

    /// Encode into a slot with the given flags
    pub fn encode(&self, flags: SlotFlags) -> BytesMut {
        let mut buf = BytesMut::with_capacity(SLOT_SIZE);
        buf.put_u8(flags.bits());
        buf.put_i32(self.id);
        buf.put_i32(self.quantity);
        buf.put_f64(self.price);
        put_text(&mut buf, &self.name);
        put_text(&mut buf, &self.supplier);
        debug_assert_eq!(buf.len(), SLOT_SIZE);
        buf
    }

    /// Decode a slot.
    ///
    /// Returns `Ok(None)` for a tombstoned slot: that is "no record here",
    /// not a parse failure.
    pub fn decode(data: &[u8]) -> io::Result<Option<Self>> {
        if data.len() < SLOT_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Slot too short",
            ));
        }

        let mut cursor = Cursor::new(data);
        let flags = SlotFlags::from_raw(cursor.read_u8()?);
        if flags.is_deleted() {
            return Ok(None);
        }

        let id = cursor.read_i32::<BigEndian>()?;
        let quantity = cursor.read_i32::<BigEndian>()?;
        let price = cursor.read_f64::<BigEndian>()?;
        let name = read_text(&mut cursor)?;
        let supplier = read_text(&mut cursor)?;

        Ok(Some(Record {
            id,
            name,
            quantity,
            price,
            supplier,
        }))
    }
}

/// Truncate to [`TEXT_CAPACITY`] UTF-16 units without splitting a character,
/// dropping trailing NULs that would not survive a round trip.
pub(crate) fn fit_text(text: &str) -> String {
    let mut units = 0;
    let mut end = 0;
    for (i, c) in text.char_indices() {
        if units + c.len_utf16() > TEXT_CAPACITY {
            break;
        }
        units += c.len_utf16();
        end = i + c.len_utf8();
    }
    text[..end].trim_end_matches('\0').to_string()
}

fn put_text(buf: &mut BytesMut, text: &str) {
    let fitted = fit_text(text);
    let mut written = 0;
    for unit in fitted.encode_utf16() {
        buf.put_u16(unit);
        written += 1;
    }
    buf.put_bytes(0, (TEXT_CAPACITY - written) * 2);
}

fn read_text(cursor: &mut Cursor<&[u8]>) -> io::Result<String> {
    let mut units = Vec::with_capacity(TEXT_CAPACITY);
    for _ in 0..TEXT_CAPACITY {
        units.push(cursor.read_u16::<BigEndian>()?);
    }
    while units.last() == Some(&0) {
        units.pop();
    }
    Ok(String::from_utf16_lossy(&units))
}
