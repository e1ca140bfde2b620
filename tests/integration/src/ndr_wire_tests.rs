//! NDR Wire Tests - Round Trips and Malformed Input
//!
//! These tests exercise the codec across crate boundaries:
//! - Round trips for every scalar kind in both byte orders
//! - Structs mixing inline fields with deferred pointer bodies
//! - Truncated payloads failing cleanly at every cut point
//! - Full pointers shared across parameters of one payload

mod common;

use bytes::Bytes;
use proptest::prelude::*;

use common::*;
use midl_ndr::{
    decode, decode_scalar, encode, encode_scalar, BString, Bstr, ConformantArray,
    ConformantVaryingArray, FullPtr, MultiDimArray, NdrContext, NdrDecode, NdrEncode, NdrError,
    NdrPtr, NdrReader, NdrUuid, NdrWString, NdrWriter, RefPtr, SafeArray, SafeArrayBound, Scalar,
    UniquePtr, VariantBool,
};

/// Inline scalars followed by three deferred bodies
#[derive(Debug, Clone, PartialEq, Default)]
struct Record {
    flag: u8,
    id: u32,
    stamp: u64,
    label: Bstr,
    values: UniquePtr<ConformantArray<i16>>,
    owner: UniquePtr<NdrWString>,
}

impl NdrEncode for Record {
    fn ndr_align() -> usize {
        8
    }

    fn ndr_encode(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
        w.align(8);
        self.flag.ndr_encode(w)?;
        self.id.ndr_encode(w)?;
        self.stamp.ndr_encode(w)?;
        self.label.ndr_encode(w)?;
        self.values.ndr_encode(w)?;
        self.owner.ndr_encode(w)
    }

    fn ndr_encode_deferred(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
        self.label.ndr_encode_deferred(w)?;
        self.values.ndr_encode_deferred(w)?;
        self.owner.ndr_encode_deferred(w)
    }
}

impl NdrDecode for Record {
    fn ndr_align() -> usize {
        8
    }

    fn ndr_decode(r: &mut NdrReader) -> midl_ndr::Result<Self> {
        r.align(8)?;
        Ok(Self {
            flag: u8::ndr_decode(r)?,
            id: u32::ndr_decode(r)?,
            stamp: u64::ndr_decode(r)?,
            label: Bstr::ndr_decode(r)?,
            values: UniquePtr::ndr_decode(r)?,
            owner: UniquePtr::ndr_decode(r)?,
        })
    }

    fn ndr_decode_deferred(&mut self, r: &mut NdrReader) -> midl_ndr::Result<()> {
        self.label.ndr_decode_deferred(r)?;
        self.values.ndr_decode_deferred(r)?;
        self.owner.ndr_decode_deferred(r)
    }
}

fn record_strategy() -> impl Strategy<Value = Record> {
    (
        any::<u8>(),
        any::<u32>(),
        any::<u64>(),
        proptest::option::of(".{0,12}"),
        proptest::option::of(proptest::collection::vec(any::<i16>(), 0..16)),
        proptest::option::of("[a-z]{0,8}"),
    )
        .prop_map(|(flag, id, stamp, label, values, owner)| Record {
            flag,
            id,
            stamp,
            label: label.map(|s| BString::new(&s)).into(),
            values: values.map(ConformantArray::new).into(),
            owner: owner.map(NdrWString::new).into(),
        })
}

fn scalar_strategy() -> impl Strategy<Value = Scalar> {
    prop_oneof![
        any::<u8>().prop_map(Scalar::U8),
        any::<i8>().prop_map(Scalar::I8),
        any::<u16>().prop_map(Scalar::U16),
        any::<i16>().prop_map(Scalar::I16),
        any::<u32>().prop_map(Scalar::U32),
        any::<i32>().prop_map(Scalar::I32),
        any::<u64>().prop_map(Scalar::U64),
        any::<i64>().prop_map(Scalar::I64),
        proptest::num::f32::NORMAL.prop_map(Scalar::F32),
        proptest::num::f64::NORMAL.prop_map(Scalar::F64),
        any::<u16>().prop_map(Scalar::Enum16),
        any::<u32>().prop_map(Scalar::Enum32),
        any::<bool>().prop_map(|b| Scalar::VariantBool(VariantBool::from(b))),
    ]
}

proptest! {
    #[test]
    fn prop_scalar_roundtrip(value in scalar_strategy(), big_endian in any::<bool>()) {
        let ctx = NdrContext::new().with_byte_order(!big_endian);
        let bytes = encode_scalar(value, ctx).unwrap();
        prop_assert_eq!(bytes.len(), value.kind().size());
        prop_assert_eq!(decode_scalar(bytes, value.kind(), ctx).unwrap(), value);
    }

    #[test]
    fn prop_record_roundtrip(record in record_strategy(), big_endian in any::<bool>()) {
        let ctx = NdrContext::new().with_byte_order(!big_endian);
        let bytes = encode(&record, ctx).unwrap();
        prop_assert_eq!(decode::<Record>(bytes, ctx).unwrap(), record);
    }

    #[test]
    fn prop_truncation_always_detected(record in record_strategy()) {
        let ctx = NdrContext::new();
        let bytes = encode(&record, ctx).unwrap();
        for cut in 1..=bytes.len() {
            let err = decode::<Record>(bytes.slice(..bytes.len() - cut), ctx).unwrap_err();
            let truncated = matches!(err, NdrError::TruncatedInput { .. });
            prop_assert!(truncated, "cut {}: {:?}", cut, err);
        }
    }
}

#[test]
fn test_alignment_padding_is_exact() {
    init_logging();

    let mut w = NdrWriter::new(NdrContext::new());
    w.write(&0xABu8).unwrap();
    w.write(&0x0102_0304u32).unwrap();
    let bytes = w.into_bytes().unwrap();
    assert_eq!(&bytes[..], &[0xAB, 0, 0, 0, 0x04, 0x03, 0x02, 0x01]);

    let mut r = NdrReader::new(bytes, NdrContext::new());
    assert_eq!(r.read::<u8>().unwrap(), 0xAB);
    assert_eq!(r.read::<u32>().unwrap(), 0x0102_0304);
    assert_eq!(r.finish().unwrap(), 0);
}

#[test]
fn test_deferred_bodies_follow_all_markers() {
    init_logging();

    let record = Record {
        label: Bstr::new(BString::new("A")),
        values: UniquePtr::new(ConformantArray::new(vec![7i16])),
        ..Default::default()
    };
    let bytes = encode(&record, NdrContext::new()).unwrap();

    // u8, pad, u32, u64, then three 4-byte markers
    let markers = &bytes[16..28];
    assert_eq!(&markers[..4], &0x0002_0000u32.to_le_bytes());
    assert_eq!(&markers[4..8], &0x0002_0004u32.to_le_bytes());
    assert_eq!(&markers[8..], &[0, 0, 0, 0]);

    // BSTR body (3 counts, one unit, pad) precedes the array body.
    assert_eq!(&bytes[28..40], &[1, 0, 0, 0, 2, 0, 0, 0, 1, 0, 0, 0]);
    assert_eq!(&bytes[40..44], &[b'A', 0, 0, 0]);
    assert_eq!(&bytes[44..], &[1, 0, 0, 0, 7, 0]);
}

#[test]
fn test_absent_empty_and_present_text() {
    let ctx = NdrContext::new();
    for text in [None, Some(""), Some("queue"), Some("\u{1F980} crab")] {
        let value: Bstr = text.map(BString::new).into();
        let bytes = encode(&value, ctx).unwrap();
        let decoded: Bstr = decode(bytes, ctx).unwrap();
        assert_eq!(decoded, value, "{text:?}");
    }
    assert_eq!(encode(&Bstr::null(), ctx).unwrap().len(), 4);
}

#[test]
fn test_arrays() {
    let ctx = NdrContext::new();

    let empty = ConformantArray::<u32>::new(Vec::new());
    assert_eq!(decode::<ConformantArray<u32>>(encode(&empty, ctx).unwrap(), ctx).unwrap(), empty);

    let varying = ConformantVaryingArray {
        max_count: 8,
        elements: vec![1u16, 2, 3],
    };
    let bytes = encode(&varying, ctx).unwrap();
    assert_eq!(decode::<ConformantVaryingArray<u16>>(bytes, ctx).unwrap(), varying);

    let grid = MultiDimArray::new([2, 3], vec![1u8, 2, 3, 4, 5, 6]).unwrap();
    let decoded: MultiDimArray<u8, 2> = decode(encode(&grid, ctx).unwrap(), ctx).unwrap();
    assert_eq!(decoded.get([1, 2]), Some(&6));
    assert_eq!(decoded, grid);
}

#[test]
fn test_safe_array_bounds_survive_both_byte_orders() {
    // VB-style rows indexed 1..=2, columns -3..=-1, pointer elements
    let bounds = [SafeArrayBound::new(2, 1), SafeArrayBound::new(3, -3)];
    let cells: Vec<Bstr> = ["a", "b", "", "d", "e", "f"]
        .iter()
        .map(|s| Bstr::new(BString::new(s)))
        .collect();
    let sheet = SafeArray::new(bounds, cells).unwrap();

    for ctx in [NdrContext::new(), NdrContext::big_endian()] {
        let bytes = encode(&sheet, ctx).unwrap();
        let decoded: SafeArray<Bstr, 2> = decode(bytes, ctx).unwrap();
        assert_eq!(decoded.bounds(), &bounds);
        assert_eq!(decoded.get([2, -1]).and_then(|b| b.get()).map(|b| b.to_string()), Some("f".into()));
        assert_eq!(decoded.get([1, -3]).and_then(|b| b.get()).map(|b| b.to_string()), Some("a".into()));
        assert!(decoded.get([0, -3]).is_none());
        assert_eq!(decoded, sheet);
    }
}

#[test]
fn test_full_pointer_shared_across_params() {
    init_logging();

    let shared = FullPtr::new(NdrUuid::new(1, 2, 3, [4; 8]));
    let mut w = NdrWriter::new(NdrContext::new());
    w.write(&shared).unwrap();
    w.write(&shared.alias()).unwrap();
    let bytes = w.into_bytes().unwrap();
    // id + body, then only the repeated id
    assert_eq!(bytes.len(), 4 + 16 + 4);
    assert_eq!(&bytes[..4], &bytes[20..]);

    let mut r = NdrReader::new(bytes, NdrContext::new());
    let first: FullPtr<NdrUuid> = r.read().unwrap();
    let second: FullPtr<NdrUuid> = r.read().unwrap();
    r.finish().unwrap();
    assert!(FullPtr::ptr_eq(&first, &second));
    assert_eq!(first, shared);
}

#[test]
fn test_malformed_inputs() {
    let ctx = NdrContext::new();

    // Ref pointers must be present.
    assert_eq!(
        encode(&RefPtr::<u32>::default(), ctx).unwrap_err(),
        NdrError::RefPointerRequired
    );

    // BSTR with an odd byte count
    let odd = Bytes::from_static(&[0, 0, 2, 0, 1, 0, 0, 0, 3, 0, 0, 0, 1, 0, 0, 0, 0x41, 0, 0, 0]);
    assert!(matches!(decode::<Bstr>(odd, ctx), Err(NdrError::MalformedLength(_))));

    // Full pointer marker with its body cut off: the owning occurrence
    // reads the body, so the payload ends before any referent is left open.
    let cut_body = Bytes::from_static(&[0, 0, 2, 0]);
    assert!(matches!(
        decode::<FullPtr<u32>>(cut_body, ctx),
        Err(NdrError::TruncatedInput { needed: 4, have: 0 })
    ));

    // Conformance past the allocation limit
    let huge = Bytes::from_static(&[0xFF, 0xFF, 0xFF, 0x7F]);
    assert!(matches!(
        decode::<ConformantArray<u8>>(huge, ctx),
        Err(NdrError::AllocationLimitExceeded { .. })
    ));
}
