//! Typed representation of foreign function signatures.
//!
//! Everything here mirrors the fixed-width wire shape: names live in
//! fixed-size buffers, argument and return lists are capped at 255 entries
//! so their counts fit in a single byte.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::{Result, SignatureError};

/// Width of the name field of a function signature, terminator included.
pub const NAME_FIELD_LEN: usize = 128;

/// Maximum number of entries in an argument or return list.
pub const MAX_SIGNATURE_ENTRIES: usize = 255;

/// Scalar types that can cross a language boundary.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    U8 = 0,
    U16 = 1,
    U32 = 2,
    U64 = 3,
    I8 = 4,
    I16 = 5,
    I32 = 6,
    I64 = 7,
    F32 = 8,
    F64 = 9,
    Bool = 10,
    Str = 11,
}

impl PrimitiveType {
    pub const COUNT: usize = 12;

    /// All types in wire order.
    pub const ALL: [PrimitiveType; Self::COUNT] = [
        Self::U8,
        Self::U16,
        Self::U32,
        Self::U64,
        Self::I8,
        Self::I16,
        Self::I32,
        Self::I64,
        Self::F32,
        Self::F64,
        Self::Bool,
        Self::Str,
    ];

    /// Canonical source-level spelling.
    pub fn name(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Bool => "bool",
            Self::Str => "str",
        }
    }

    /// Exact, case-sensitive lookup by canonical name.
    pub fn from_name(name: &[u8]) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|ty| ty.name().as_bytes() == name)
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn from_u8(v: u8) -> Option<Self> {
        Self::ALL.get(v as usize).copied()
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One argument or return value: a scalar type plus its mutability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TypeSignature {
    pub mutable: bool,
    #[serde(rename = "type")]
    pub ty: PrimitiveType,
}

impl TypeSignature {
    pub fn new(ty: PrimitiveType) -> Self {
        Self { mutable: false, ty }
    }

    pub fn mutable(ty: PrimitiveType) -> Self {
        Self { mutable: true, ty }
    }
}

impl From<PrimitiveType> for TypeSignature {
    fn from(ty: PrimitiveType) -> Self {
        Self::new(ty)
    }
}

/// Mutable entries render as `mut T`. That prefix is for display only; the
/// signature parser accepts bare type names.
impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mutable {
            write!(f, "mut {}", self.ty)
        } else {
            write!(f, "{}", self.ty)
        }
    }
}

/// Ordered list of type signatures that never grows past
/// [`MAX_SIGNATURE_ENTRIES`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SignatureList(Vec<TypeSignature>);

impl SignatureList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity.min(MAX_SIGNATURE_ENTRIES)))
    }

    /// Append one entry, refusing once the list is full.
    pub fn push(&mut self, entry: TypeSignature) -> Result<()> {
        if self.0.len() >= MAX_SIGNATURE_ENTRIES {
            return Err(SignatureError::TooManyEntries {
                max: MAX_SIGNATURE_ENTRIES,
            });
        }
        self.0.push(entry);
        Ok(())
    }

    /// Entry count as carried in the one-byte wire field.
    pub fn count(&self) -> u8 {
        // push() keeps len <= 255
        self.0.len() as u8
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TypeSignature> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[TypeSignature] {
        &self.0
    }
}

impl TryFrom<Vec<TypeSignature>> for SignatureList {
    type Error = SignatureError;

    fn try_from(entries: Vec<TypeSignature>) -> Result<Self> {
        if entries.len() > MAX_SIGNATURE_ENTRIES {
            return Err(SignatureError::TooManyEntries {
                max: MAX_SIGNATURE_ENTRIES,
            });
        }
        Ok(Self(entries))
    }
}

impl<'a> IntoIterator for &'a SignatureList {
    type Item = &'a TypeSignature;
    type IntoIter = std::slice::Iter<'a, TypeSignature>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// UTF-8 string stored in a fixed `N`-byte buffer with an explicit length.
///
/// Holds at most `N - 1` bytes so the wire field always ends in a NUL.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedStr<const N: usize> {
    bytes: [u8; N],
    len: usize,
}

impl<const N: usize> FixedStr<N> {
    pub const CAPACITY: usize = N - 1;

    pub fn new(s: &str) -> Result<Self> {
        if s.len() > Self::CAPACITY {
            return Err(SignatureError::StringTooLong {
                len: s.len(),
                max: Self::CAPACITY,
            });
        }
        if s.as_bytes().contains(&0) {
            return Err(SignatureError::InteriorNul);
        }
        let mut bytes = [0u8; N];
        bytes[..s.len()].copy_from_slice(s.as_bytes());
        Ok(Self { bytes, len: s.len() })
    }

    /// Read a NUL-padded wire field. Content stops at the first NUL and never
    /// exceeds the capacity.
    pub fn from_field(field: &[u8]) -> Result<Self> {
        let window = &field[..field.len().min(Self::CAPACITY)];
        let len = window.iter().position(|&b| b == 0).unwrap_or(window.len());
        std::str::from_utf8(&window[..len]).map_err(|_| SignatureError::InvalidUtf8)?;
        let mut bytes = [0u8; N];
        bytes[..len].copy_from_slice(&window[..len]);
        Ok(Self { bytes, len })
    }

    pub fn as_str(&self) -> &str {
        // Both constructors validate UTF-8.
        std::str::from_utf8(&self.bytes[..self.len]).unwrap_or_default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// The whole NUL-padded buffer, as written on the wire.
    pub fn padded(&self) -> &[u8; N] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<const N: usize> Default for FixedStr<N> {
    fn default() -> Self {
        Self {
            bytes: [0u8; N],
            len: 0,
        }
    }
}

impl<const N: usize> fmt::Debug for FixedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl<const N: usize> fmt::Display for FixedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<const N: usize> Serialize for FixedStr<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<const N: usize> TryFrom<&str> for FixedStr<N> {
    type Error = SignatureError;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

pub type SymbolName = FixedStr<NAME_FIELD_LEN>;

/// A named function with typed arguments and return values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct FunctionSignature {
    pub name: SymbolName,
    pub arguments: SignatureList,
    pub returns: SignatureList,
}

impl FunctionSignature {
    pub fn new(name: &str) -> Result<Self> {
        Ok(Self {
            name: SymbolName::new(name)?,
            arguments: SignatureList::new(),
            returns: SignatureList::new(),
        })
    }

    pub fn with_argument(mut self, ty: impl Into<TypeSignature>) -> Result<Self> {
        self.arguments.push(ty.into())?;
        Ok(self)
    }

    pub fn with_return(mut self, ty: impl Into<TypeSignature>) -> Result<Self> {
        self.returns.push(ty.into())?;
        Ok(self)
    }

    /// Bytes taken by the fixed-width encoding: name, arg count, args,
    /// return count, returns.
    pub fn encoded_len(&self) -> usize {
        NAME_FIELD_LEN + 1 + 2 * self.arguments.len() + 1 + 2 * self.returns.len()
    }
}

/// Renders `name(a,b)->c`. The text reads back through the parser only when
/// no entry is mutable.
impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        write_list(f, &self.arguments)?;
        f.write_str(")")?;
        if !self.returns.is_empty() {
            f.write_str("->")?;
            write_list(f, &self.returns)?;
        }
        Ok(())
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, list: &SignatureList) -> fmt::Result {
    for (i, entry) in list.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{entry}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_wire_values_follow_declaration_order() {
        for (i, ty) in PrimitiveType::ALL.iter().enumerate() {
            assert_eq!(ty.as_u8() as usize, i);
            assert_eq!(PrimitiveType::from_u8(i as u8), Some(*ty));
        }
        assert_eq!(PrimitiveType::from_u8(12), None);
        assert_eq!(PrimitiveType::from_u8(255), None);
    }

    #[test]
    fn signature_list_refuses_entry_256() {
        let mut list = SignatureList::new();
        for _ in 0..MAX_SIGNATURE_ENTRIES {
            list.push(TypeSignature::new(PrimitiveType::U8)).unwrap();
        }
        assert_eq!(list.count(), 255);

        let err = list.push(TypeSignature::new(PrimitiveType::U8)).unwrap_err();
        assert_eq!(err, SignatureError::TooManyEntries { max: 255 });
        assert_eq!(list.len(), 255);
    }

    #[test]
    fn signature_list_try_from_checks_capacity() {
        let entries = vec![TypeSignature::new(PrimitiveType::Bool); 256];
        assert!(SignatureList::try_from(entries).is_err());
    }

    #[test]
    fn fixed_str_tracks_length_and_pads() {
        let s = FixedStr::<16>::new("clang").unwrap();
        assert_eq!(s.len(), 5);
        assert_eq!(s.as_str(), "clang");
        assert_eq!(&s.padded()[..6], b"clang\0");
        assert!(s.padded()[5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn fixed_str_rejects_overlong_and_nul() {
        assert_eq!(
            FixedStr::<16>::new("sixteen-bytes-xx").unwrap_err(),
            SignatureError::StringTooLong { len: 16, max: 15 }
        );
        assert!(FixedStr::<16>::new("fifteen-bytes-x").is_ok());
        assert_eq!(
            FixedStr::<16>::new("a\0b").unwrap_err(),
            SignatureError::InteriorNul
        );
    }

    #[test]
    fn fixed_str_from_field_stops_at_nul_and_capacity() {
        let mut field = [0u8; 16];
        field[..3].copy_from_slice(b"abc");
        field[4] = b'z';
        assert_eq!(FixedStr::<16>::from_field(&field).unwrap().as_str(), "abc");

        let full = [b'x'; 16];
        assert_eq!(FixedStr::<16>::from_field(&full).unwrap().len(), 15);

        let bad = [0xff, 0xfe, 0, 0];
        assert_eq!(
            FixedStr::<4>::from_field(&bad).unwrap_err(),
            SignatureError::InvalidUtf8
        );
    }

    #[test]
    fn encoded_len_counts_entries() {
        let sig = FunctionSignature::new("f")
            .unwrap()
            .with_argument(PrimitiveType::U8)
            .unwrap()
            .with_argument(PrimitiveType::F64)
            .unwrap()
            .with_return(PrimitiveType::Str)
            .unwrap();
        assert_eq!(sig.encoded_len(), 128 + 1 + 4 + 1 + 2);
    }

    #[test]
    fn display_renders_canonical_text() {
        let sig = FunctionSignature::new("bar")
            .unwrap()
            .with_argument(PrimitiveType::U64)
            .unwrap()
            .with_argument(TypeSignature::mutable(PrimitiveType::F32))
            .unwrap();
        insta::assert_snapshot!(sig.to_string(), @"bar(u64,mut f32)");
    }
}
