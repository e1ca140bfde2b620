//! NDR pointer types
//!
//! NDR supports three pointer semantics:
//!
//! - Reference (`[ref]`): never null, nothing inline, body deferred
//! - Unique (`[unique]`): nullable, 4-byte referent id, no aliasing
//! - Full (`[ptr]`): nullable, 4-byte referent id, aliasing allowed
//!
//! Bodies are never written inline. The fixed pass writes the marker and
//! enqueues the pointer; the deferred pass writes the body once every fixed
//! field of the enclosing value is out.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::deferred::PointerKind;
use crate::reader::FullCell;
use crate::{NdrDecode, NdrEncode, NdrError, NdrReader, NdrWriter, Result};

/// Trait for NDR pointer types
pub trait NdrPtr {
    type Target;

    const KIND: PointerKind;

    /// Check if the pointer is null
    fn is_null(&self) -> bool;

    /// Get the inner value, if any
    fn get(&self) -> Option<&Self::Target>;
}

/// Owned pointer target. `Pending` only exists between the fixed and
/// deferred decode passes.
#[derive(Clone)]
enum Slot<T> {
    Null,
    Pending(u32),
    Present(Box<T>),
}

impl<T> Slot<T> {
    fn get(&self) -> Option<&T> {
        match self {
            Slot::Present(value) => Some(value),
            _ => None,
        }
    }

    fn into_inner(self) -> Option<T> {
        match self {
            Slot::Present(value) => Some(*value),
            _ => None,
        }
    }
}

/// Reference pointer - non-null, no inline representation
///
/// The default value is absent, which can be decoded into but not encoded.
#[derive(Clone)]
pub struct RefPtr<T>(Slot<T>);

impl<T> RefPtr<T> {
    pub fn new(value: T) -> Self {
        Self(Slot::Present(Box::new(value)))
    }

    pub fn into_inner(self) -> Option<T> {
        self.0.into_inner()
    }
}

impl<T> Default for RefPtr<T> {
    fn default() -> Self {
        Self(Slot::Null)
    }
}

impl<T> NdrPtr for RefPtr<T> {
    type Target = T;

    const KIND: PointerKind = PointerKind::Ref;

    fn is_null(&self) -> bool {
        self.get().is_none()
    }

    fn get(&self) -> Option<&T> {
        self.0.get()
    }
}

impl<T: NdrEncode> NdrEncode for RefPtr<T> {
    fn ndr_align() -> usize {
        1
    }

    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        if self.0.get().is_none() {
            return Err(NdrError::RefPointerRequired);
        }
        w.defer(0, PointerKind::Ref)
    }

    fn ndr_encode_deferred(&self, w: &mut NdrWriter) -> Result<()> {
        let value = self.0.get().ok_or(NdrError::RefPointerRequired)?;
        w.take_deferred(PointerKind::Ref)?;
        w.write(value)
    }
}

impl<T: NdrDecode> NdrDecode for RefPtr<T> {
    fn ndr_align() -> usize {
        1
    }

    fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
        r.defer(0, PointerKind::Ref)?;
        Ok(Self(Slot::Pending(0)))
    }

    fn ndr_decode_deferred(&mut self, r: &mut NdrReader) -> Result<()> {
        if !matches!(self.0, Slot::Pending(_)) {
            return Err(NdrError::UnexpectedNullRef);
        }
        r.take_deferred(0, PointerKind::Ref)?;
        self.0 = Slot::Present(Box::new(r.read()?));
        Ok(())
    }
}

/// Unique pointer - nullable, no aliasing
#[derive(Clone)]
pub struct UniquePtr<T>(Slot<T>);

impl<T> UniquePtr<T> {
    pub fn new(value: T) -> Self {
        Self(Slot::Present(Box::new(value)))
    }

    pub fn null() -> Self {
        Self(Slot::Null)
    }

    pub fn into_inner(self) -> Option<T> {
        self.0.into_inner()
    }
}

impl<T> Default for UniquePtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> From<Option<T>> for UniquePtr<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or_else(Self::null, Self::new)
    }
}

impl<T> NdrPtr for UniquePtr<T> {
    type Target = T;

    const KIND: PointerKind = PointerKind::Unique;

    fn is_null(&self) -> bool {
        matches!(self.0, Slot::Null)
    }

    fn get(&self) -> Option<&T> {
        self.0.get()
    }
}

impl<T: NdrEncode> NdrEncode for UniquePtr<T> {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        if self.0.get().is_none() {
            w.write_u32(0);
            return Ok(());
        }
        let id = w.next_referent_id()?;
        w.write_u32(id);
        w.defer(id, PointerKind::Unique)
    }

    fn ndr_encode_deferred(&self, w: &mut NdrWriter) -> Result<()> {
        if let Some(value) = self.0.get() {
            w.take_deferred(PointerKind::Unique)?;
            w.write(value)?;
        }
        Ok(())
    }
}

impl<T: NdrDecode> NdrDecode for UniquePtr<T> {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
        match r.read_u32()? {
            0 => Ok(Self::null()),
            id => {
                r.defer(id, PointerKind::Unique)?;
                Ok(Self(Slot::Pending(id)))
            }
        }
    }

    fn ndr_decode_deferred(&mut self, r: &mut NdrReader) -> Result<()> {
        if let Slot::Pending(id) = self.0 {
            r.take_deferred(id, PointerKind::Unique)?;
            self.0 = Slot::Present(Box::new(r.read()?));
        }
        Ok(())
    }
}

/// Full pointer - nullable, aliasing allowed
///
/// Targets are shared: [`FullPtr::alias`] (and `Clone`) hand out another
/// pointer to the same target. Within one payload every pointer to the same
/// target gets the same referent id and the body is written once, behind the
/// first occurrence. Decoding gives back pointers that share a target in the
/// same way, observable through [`FullPtr::ptr_eq`].
pub struct FullPtr<T> {
    cell: Option<FullCell<T>>,
    referent_id: u32,
    owner: bool,
}

impl<T> FullPtr<T> {
    pub fn new(value: T) -> Self {
        Self {
            cell: Some(Arc::new(OnceLock::from(value))),
            referent_id: 0,
            owner: false,
        }
    }

    pub fn null() -> Self {
        Self {
            cell: None,
            referent_id: 0,
            owner: false,
        }
    }

    /// Another pointer to the same target
    pub fn alias(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            referent_id: self.referent_id,
            owner: false,
        }
    }

    /// Whether both pointers refer to the same target (two nulls do not)
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        match (&a.cell, &b.cell) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Wire referent id this pointer was decoded from; `None` for null or
    /// locally constructed pointers.
    pub fn referent_id(&self) -> Option<u32> {
        (self.referent_id != 0).then_some(self.referent_id)
    }

    fn identity(cell: &FullCell<T>) -> usize {
        Arc::as_ptr(cell) as *const () as usize
    }
}

impl<T> Default for FullPtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> Clone for FullPtr<T> {
    fn clone(&self) -> Self {
        self.alias()
    }
}

impl<T> NdrPtr for FullPtr<T> {
    type Target = T;

    const KIND: PointerKind = PointerKind::Full;

    fn is_null(&self) -> bool {
        self.cell.is_none()
    }

    fn get(&self) -> Option<&T> {
        self.cell.as_ref().and_then(|cell| cell.get())
    }
}

impl<T: NdrEncode> NdrEncode for FullPtr<T> {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        let Some(cell) = &self.cell else {
            w.write_u32(0);
            return Ok(());
        };
        let (id, first) = w.full_referent(Self::identity(cell))?;
        w.write_u32(id);
        if first {
            w.defer(id, PointerKind::Full)?;
        }
        Ok(())
    }

    fn ndr_encode_deferred(&self, w: &mut NdrWriter) -> Result<()> {
        let Some(cell) = &self.cell else {
            return Ok(());
        };
        let id = w
            .known_full_referent(Self::identity(cell))
            .ok_or(NdrError::InvalidState("full pointer body before its marker"))?;
        // Only the occurrence that introduced the id owns the queue entry.
        if w.take_deferred_if(id, PointerKind::Full)? {
            let value = cell.get().ok_or(NdrError::DanglingReferent(id))?;
            w.write(value)?;
        }
        Ok(())
    }
}

impl<T> NdrDecode for FullPtr<T>
where
    T: NdrDecode + Send + Sync + 'static,
{
    fn ndr_align() -> usize {
        4
    }

    fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
        let id = r.read_u32()?;
        if id == 0 {
            return Ok(Self::null());
        }
        if let Some(cell) = r.full_cell::<T>(id)? {
            return Ok(Self {
                cell: Some(cell),
                referent_id: id,
                owner: false,
            });
        }
        let cell: FullCell<T> = Arc::new(OnceLock::new());
        r.introduce_full(id, cell.clone());
        r.defer(id, PointerKind::Full)?;
        Ok(Self {
            cell: Some(cell),
            referent_id: id,
            owner: true,
        })
    }

    fn ndr_decode_deferred(&mut self, r: &mut NdrReader) -> Result<()> {
        let Some(cell) = &self.cell else {
            return Ok(());
        };
        if !self.owner {
            return Ok(());
        }
        let id = self.referent_id;
        r.take_deferred(id, PointerKind::Full)?;
        let value = r.read::<T>()?;
        cell.set(value)
            .map_err(|_| NdrError::InvalidState("full pointer body decoded twice"))?;
        r.mark_filled(id);
        self.owner = false;
        Ok(())
    }
}

macro_rules! impl_ptr_traits {
    ($ptr:ident) => {
        impl<T: fmt::Debug> fmt::Debug for $ptr<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.get() {
                    Some(value) => f.debug_tuple(stringify!($ptr)).field(value).finish(),
                    None if self.is_null() => write!(f, "{}(null)", stringify!($ptr)),
                    None => write!(f, "{}(pending)", stringify!($ptr)),
                }
            }
        }

        impl<T: PartialEq> PartialEq for $ptr<T> {
            fn eq(&self, other: &Self) -> bool {
                self.is_null() == other.is_null() && self.get() == other.get()
            }
        }
    };
}

impl_ptr_traits!(RefPtr);
impl_ptr_traits!(UniquePtr);
impl_ptr_traits!(FullPtr);
