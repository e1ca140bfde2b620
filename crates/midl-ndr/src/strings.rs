//! NDR text types
//!
//! Two UTF-16 representations are in common use on DCOM interfaces.
//!
//! `BSTR` travels as a `[unique]` pointer to a `FLAGGED_WORD_BLOB`:
//! ```text
//! max_count: u32    # conformance, equals clSize
//! cBytes: u32       # length in bytes
//! clSize: u32       # length in 16-bit units
//! asData[clSize]    # UTF-16 units, no terminator
//! padding to 4-byte alignment
//! ```
//!
//! `[string] wchar_t*` is a conformant varying array with a terminator:
//! ```text
//! max_count: u32
//! offset: u32       # always 0
//! actual_count: u32 # units including the terminator
//! chars[actual_count]
//! padding to 4-byte alignment
//! ```
//!
//! Absent text is a null enclosing pointer; empty text is a present value
//! with zero units. The two never collapse into each other.

use crate::{NdrDecode, NdrEncode, NdrError, NdrReader, NdrWriter, Result, UniquePtr};

/// `BSTR` as it appears in interface signatures
pub type Bstr = UniquePtr<BString>;

/// Body of a `BSTR` (`FLAGGED_WORD_BLOB`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BString {
    units: Vec<u16>,
}

impl BString {
    pub fn new(s: &str) -> Self {
        Self {
            units: s.encode_utf16().collect(),
        }
    }

    pub fn from_units(units: Vec<u16>) -> Self {
        Self { units }
    }

    pub fn units(&self) -> &[u16] {
        &self.units
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Strict conversion; unpaired surrogates are an error
    pub fn to_string_checked(&self) -> Result<String> {
        String::from_utf16(&self.units).map_err(|_| NdrError::Utf16)
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(&self.units)
    }
}

impl From<&str> for BString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for BString {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

impl std::fmt::Display for BString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

fn write_units(w: &mut NdrWriter, units: &[u16]) {
    for &unit in units {
        w.write_u16(unit);
    }
}

fn read_units(r: &mut NdrReader, count: usize) -> Result<Vec<u16>> {
    // Check the whole run up front so a short buffer fails before allocating.
    let needed = count.checked_mul(2).ok_or(NdrError::IntegerOverflow)?;
    if r.remaining() < needed {
        return Err(NdrError::TruncatedInput {
            needed,
            have: r.remaining(),
        });
    }
    (0..count).map(|_| r.read_u16()).collect()
}

impl NdrEncode for BString {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        let units = self.units.len();
        let bytes = units.checked_mul(2).ok_or(NdrError::IntegerOverflow)?;
        w.write_count(units)?;
        w.write_count(bytes)?;
        w.write_count(units)?;
        write_units(w, &self.units);
        w.align(4);
        Ok(())
    }
}

impl NdrDecode for BString {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
        let max_count = r.read_u32()? as usize;
        let byte_len = r.read_u32()? as usize;
        let units = r.read_u32()? as usize;

        if byte_len % 2 != 0 {
            return Err(NdrError::MalformedLength("BSTR byte length is odd"));
        }
        if byte_len / 2 != units {
            return Err(NdrError::MalformedLength("BSTR byte length disagrees with unit count"));
        }
        if max_count != units {
            return Err(NdrError::MalformedLength("BSTR conformance disagrees with unit count"));
        }
        r.check_elements(units)?;

        let units = read_units(r, units)?;
        r.align(4)?;
        Ok(Self { units })
    }
}

/// Unicode string (`[string] wchar_t*` body), NUL terminated on the wire
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NdrWString(pub String);

impl NdrWString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<&str> for NdrWString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl NdrEncode for NdrWString {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        let mut units: Vec<u16> = self.0.encode_utf16().collect();
        units.push(0);
        w.write_count(units.len())?;
        w.write_u32(0);
        w.write_count(units.len())?;
        write_units(w, &units);
        w.align(4);
        Ok(())
    }
}

impl NdrDecode for NdrWString {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
        let max_count = r.read_u32()? as usize;
        let offset = r.read_u32()?;
        let actual = r.read_u32()? as usize;

        if offset != 0 {
            return Err(NdrError::MalformedLength("string offset is not zero"));
        }
        if actual > max_count {
            return Err(NdrError::MalformedLength("string actual count exceeds maximum"));
        }
        r.check_elements(actual)?;

        let mut units = read_units(r, actual)?;
        r.align(4)?;
        if units.pop() != Some(0) {
            return Err(NdrError::MalformedLength("string is not NUL terminated"));
        }
        String::from_utf16(&units)
            .map(Self)
            .map_err(|_| NdrError::Utf16)
    }
}
