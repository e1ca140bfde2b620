//! Object exporter
//!
//! Owns the IPID table that maps exported interface pointers to live objects.

mod tables;

pub use tables::*;
