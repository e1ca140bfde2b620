//! NDR array types
//!
//! - Conformant arrays: `[size_is(n)] T arr[]`, element count precedes the data
//! - Conformant varying arrays: maximum, offset and actual count precede the data
//! - Multi-dimensional conformant arrays: one count per dimension, then the
//!   elements in row-major order
//! - SAFEARRAY-style arrays: a dimension header with a {count, lower bound}
//!   pair per dimension, then the conformance and the elements
//!
//! Elements keep their in-memory order on the wire. Pointer elements write
//! all their markers first and their bodies afterwards, in element order.

use crate::writer::wire_count;
use crate::{NdrDecode, NdrEncode, NdrError, NdrReader, NdrWriter, Result};

fn encode_elements<T: NdrEncode>(w: &mut NdrWriter, elements: &[T]) -> Result<()> {
    elements.iter().try_for_each(|e| e.ndr_encode(w))
}

fn encode_elements_deferred<T: NdrEncode>(w: &mut NdrWriter, elements: &[T]) -> Result<()> {
    elements.iter().try_for_each(|e| e.ndr_encode_deferred(w))
}

fn decode_elements<T: NdrDecode>(r: &mut NdrReader, count: usize) -> Result<Vec<T>> {
    // Elements may be zero-sized inline (ref pointers), so the remaining
    // length only bounds the initial allocation.
    let mut elements = Vec::with_capacity(count.min(r.remaining()));
    for _ in 0..count {
        elements.push(T::ndr_decode(r)?);
    }
    Ok(elements)
}

fn decode_elements_deferred<T: NdrDecode>(r: &mut NdrReader, elements: &mut [T]) -> Result<()> {
    elements.iter_mut().try_for_each(|e| e.ndr_decode_deferred(r))
}

/// Conformant array - size determined at runtime
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ConformantArray<T>(pub Vec<T>);

impl<T> ConformantArray<T> {
    pub fn new(elements: Vec<T>) -> Self {
        Self(elements)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<T> {
        self.0
    }
}

impl<T> From<Vec<T>> for ConformantArray<T> {
    fn from(elements: Vec<T>) -> Self {
        Self(elements)
    }
}

impl<T: NdrEncode> NdrEncode for ConformantArray<T> {
    fn ndr_align() -> usize {
        T::ndr_align().max(4)
    }

    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        w.write_count(self.0.len())?;
        w.align(T::ndr_align());
        encode_elements(w, &self.0)
    }

    fn ndr_encode_deferred(&self, w: &mut NdrWriter) -> Result<()> {
        encode_elements_deferred(w, &self.0)
    }
}

impl<T: NdrDecode> NdrDecode for ConformantArray<T> {
    fn ndr_align() -> usize {
        T::ndr_align().max(4)
    }

    fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
        let count = r.read_count()?;
        r.align(T::ndr_align())?;
        decode_elements(r, count).map(Self)
    }

    fn ndr_decode_deferred(&mut self, r: &mut NdrReader) -> Result<()> {
        decode_elements_deferred(r, &mut self.0)
    }
}

/// Conformant varying array, always transmitted with offset zero
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ConformantVaryingArray<T> {
    /// Declared capacity (`max_count`)
    pub max_count: u32,
    pub elements: Vec<T>,
}

impl<T> ConformantVaryingArray<T> {
    /// Capacity equal to the element count
    pub fn new(elements: Vec<T>) -> Result<Self> {
        let max_count = wire_count(elements.len())?;
        Ok(Self { max_count, elements })
    }
}

impl<T: NdrEncode> NdrEncode for ConformantVaryingArray<T> {
    fn ndr_align() -> usize {
        T::ndr_align().max(4)
    }

    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        if self.elements.len() > self.max_count as usize {
            return Err(NdrError::MalformedLength("varying array exceeds its capacity"));
        }
        w.write_u32(self.max_count);
        w.write_u32(0);
        w.write_count(self.elements.len())?;
        w.align(T::ndr_align());
        encode_elements(w, &self.elements)
    }

    fn ndr_encode_deferred(&self, w: &mut NdrWriter) -> Result<()> {
        encode_elements_deferred(w, &self.elements)
    }
}

impl<T: NdrDecode> NdrDecode for ConformantVaryingArray<T> {
    fn ndr_align() -> usize {
        T::ndr_align().max(4)
    }

    fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
        let max_count = r.read_u32()?;
        let offset = r.read_u32()?;
        let actual = r.read_count()?;
        if offset != 0 {
            return Err(NdrError::MalformedLength("varying array offset is not zero"));
        }
        if actual > max_count as usize {
            return Err(NdrError::MalformedLength("varying array exceeds its capacity"));
        }
        r.align(T::ndr_align())?;
        let elements = decode_elements(r, actual)?;
        Ok(Self { max_count, elements })
    }

    fn ndr_decode_deferred(&mut self, r: &mut NdrReader) -> Result<()> {
        decode_elements_deferred(r, &mut self.elements)
    }
}

/// `D`-dimensional conformant array, elements in row-major order
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MultiDimArray<T, const D: usize> {
    dims: [u32; D],
    elements: Vec<T>,
}

fn element_count(dims: &[u32]) -> Result<usize> {
    dims.iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d as usize))
        .ok_or(NdrError::IntegerOverflow)
}

impl<T, const D: usize> MultiDimArray<T, D> {
    /// Fails if the dimensions do not describe exactly `elements.len()` items
    pub fn new(dims: [u32; D], elements: Vec<T>) -> Result<Self> {
        if element_count(&dims)? != elements.len() {
            return Err(NdrError::MalformedLength("dimensions disagree with element count"));
        }
        Ok(Self { dims, elements })
    }

    pub fn dims(&self) -> [u32; D] {
        self.dims
    }

    pub fn elements(&self) -> &[T] {
        &self.elements
    }

    /// Element at a row-major index tuple
    pub fn get(&self, index: [u32; D]) -> Option<&T> {
        let mut flat = 0usize;
        for (i, d) in index.iter().zip(self.dims.iter()) {
            if i >= d {
                return None;
            }
            flat = flat * (*d as usize) + *i as usize;
        }
        self.elements.get(flat)
    }
}

impl<T, const D: usize> Default for MultiDimArray<T, D> {
    fn default() -> Self {
        Self {
            dims: [0; D],
            elements: Vec::new(),
        }
    }
}

impl<T: NdrEncode, const D: usize> NdrEncode for MultiDimArray<T, D> {
    fn ndr_align() -> usize {
        T::ndr_align().max(4)
    }

    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        for dim in self.dims {
            w.write_u32(dim);
        }
        w.align(T::ndr_align());
        encode_elements(w, &self.elements)
    }

    fn ndr_encode_deferred(&self, w: &mut NdrWriter) -> Result<()> {
        encode_elements_deferred(w, &self.elements)
    }
}

impl<T: NdrDecode, const D: usize> NdrDecode for MultiDimArray<T, D> {
    fn ndr_align() -> usize {
        T::ndr_align().max(4)
    }

    fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
        let mut dims = [0u32; D];
        for dim in dims.iter_mut() {
            *dim = r.read_u32()?;
        }
        let count = element_count(&dims)?;
        r.check_elements(count)?;
        r.align(T::ndr_align())?;
        let elements = decode_elements(r, count)?;
        Ok(Self { dims, elements })
    }

    fn ndr_decode_deferred(&mut self, r: &mut NdrReader) -> Result<()> {
        decode_elements_deferred(r, &mut self.elements)
    }
}

/// SAFEARRAYBOUND: element count and lower bound of one dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SafeArrayBound {
    pub elements: u32,
    pub lower_bound: i32,
}

impl SafeArrayBound {
    pub const fn new(elements: u32, lower_bound: i32) -> Self {
        Self { elements, lower_bound }
    }

    /// Highest valid index; `None` for an empty dimension or one whose
    /// last index does not fit in an `i32`
    pub fn upper_bound(&self) -> Option<i32> {
        if self.elements == 0 {
            return None;
        }
        i32::try_from(i64::from(self.lower_bound) + i64::from(self.elements) - 1).ok()
    }

    fn validate(&self) -> Result<()> {
        if self.elements != 0 && self.upper_bound().is_none() {
            return Err(NdrError::MalformedLength("array bound runs past the index range"));
        }
        Ok(())
    }

    /// Zero-based position of `index` within this dimension
    fn offset(&self, index: i32) -> Option<usize> {
        let relative = i64::from(index) - i64::from(self.lower_bound);
        if relative < 0 || relative >= i64::from(self.elements) {
            return None;
        }
        usize::try_from(relative).ok()
    }
}

impl NdrEncode for SafeArrayBound {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        w.write_u32(self.elements);
        w.write_u32(self.lower_bound as u32);
        Ok(())
    }
}

impl NdrDecode for SafeArrayBound {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
        let bound = Self {
            elements: r.read_u32()?,
            lower_bound: r.read_u32()? as i32,
        };
        bound.validate()?;
        Ok(bound)
    }
}

/// `D`-dimensional array with per-dimension bounds, elements in row-major
/// order.
///
/// Wire layout: `u16` dimension count, `u16` feature flags, one
/// [`SafeArrayBound`] per dimension, then the element conformance and the
/// elements. The decoder rejects a header whose dimension count differs from
/// `D` or whose bounds disagree with the conformance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SafeArray<T, const D: usize> {
    features: u16,
    bounds: [SafeArrayBound; D],
    elements: Vec<T>,
}

impl<T, const D: usize> SafeArray<T, D> {
    /// Fails if a bound overflows the index range or the bounds do not
    /// describe exactly `elements.len()` items
    pub fn new(bounds: [SafeArrayBound; D], elements: Vec<T>) -> Result<Self> {
        bounds.iter().try_for_each(SafeArrayBound::validate)?;
        if element_count(&bounds.map(|b| b.elements))? != elements.len() {
            return Err(NdrError::MalformedLength("bounds disagree with element count"));
        }
        Ok(Self {
            features: 0,
            bounds,
            elements,
        })
    }

    pub fn with_features(mut self, features: u16) -> Self {
        self.features = features;
        self
    }

    pub fn features(&self) -> u16 {
        self.features
    }

    pub fn bounds(&self) -> &[SafeArrayBound; D] {
        &self.bounds
    }

    pub fn elements(&self) -> &[T] {
        &self.elements
    }

    pub fn into_elements(self) -> Vec<T> {
        self.elements
    }

    /// Element at an index tuple expressed in each dimension's own bounds
    pub fn get(&self, index: [i32; D]) -> Option<&T> {
        let mut flat = 0usize;
        for (i, bound) in index.iter().zip(self.bounds.iter()) {
            flat = flat * bound.elements as usize + bound.offset(*i)?;
        }
        self.elements.get(flat)
    }
}

impl<T, const D: usize> Default for SafeArray<T, D> {
    fn default() -> Self {
        Self {
            features: 0,
            bounds: [SafeArrayBound::default(); D],
            elements: Vec::new(),
        }
    }
}

impl<T: NdrEncode, const D: usize> NdrEncode for SafeArray<T, D> {
    fn ndr_align() -> usize {
        T::ndr_align().max(4)
    }

    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        let dims = u16::try_from(D).map_err(|_| NdrError::IntegerOverflow)?;
        w.write_u16(dims);
        w.write_u16(self.features);
        for bound in &self.bounds {
            bound.ndr_encode(w)?;
        }
        w.write_count(self.elements.len())?;
        w.align(T::ndr_align());
        encode_elements(w, &self.elements)
    }

    fn ndr_encode_deferred(&self, w: &mut NdrWriter) -> Result<()> {
        encode_elements_deferred(w, &self.elements)
    }
}

impl<T: NdrDecode, const D: usize> NdrDecode for SafeArray<T, D> {
    fn ndr_align() -> usize {
        T::ndr_align().max(4)
    }

    fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
        let dims = r.read_u16()?;
        if usize::from(dims) != D {
            return Err(NdrError::MalformedLength("dimension count disagrees with the array type"));
        }
        let features = r.read_u16()?;
        let mut bounds = [SafeArrayBound::default(); D];
        for bound in bounds.iter_mut() {
            *bound = SafeArrayBound::ndr_decode(r)?;
        }
        let expected = element_count(&bounds.map(|b| b.elements))?;
        let count = r.read_count()?;
        if count != expected {
            return Err(NdrError::MalformedLength("conformance disagrees with array bounds"));
        }
        r.align(T::ndr_align())?;
        let elements = decode_elements(r, count)?;
        Ok(Self {
            features,
            bounds,
            elements,
        })
    }

    fn ndr_decode_deferred(&mut self, r: &mut NdrReader) -> Result<()> {
        decode_elements_deferred(r, &mut self.elements)
    }
}
