//! Network-free parsers for EDINET artifacts.
//!
//! - [`xbrl`] locates the XBRL instance inside a submission bundle and flattens its facts
//!   into a [`RawFactMap`](xbrl::RawFactMap).
//! - [`utils`] holds small text helpers shared by the normalizers.

pub mod utils;
pub mod xbrl;
