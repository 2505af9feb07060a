//! Register access, value conversion and status reporting for regtool.
//!
//! Everything here is written against the [`RegisterBackend`] trait; the
//! in-memory [`MemoryBackend`] is the reference implementation used by the
//! command-line tool and the tests.

/// Error taxonomy shared by every register operation.
pub mod error;
pub use error::{Access, ErrorKind, RegisterError};

/// Register access abstraction and the in-memory backend.
pub mod backend;
pub use backend::{
    mask_shift, MemoryBackend, RegisterBackend, RegisterDescriptor, RegisterNameCase,
};

/// Stateless decoders for the `Format` parameter language.
pub mod codecs;
pub use codecs::{decode_fp16, decode_linear11, format_hex, format_ip, EnumTable, LinearTransform};

/// `_LO`/`_HI` merging, sign extension and format-driven conversion.
pub mod convert;
pub use convert::{
    compute_merged_value, contiguous_bit_count, convert_type, read_convert, resolve_pair,
    sign_extend, split_pair_name, ConvertType, ConvertedValue, PairHalf, ValueFormat,
    FORMAT_PARAMETER,
};

/// Status tables and report rendering.
pub mod status;
pub use status::{
    DisplayRule, ErrorSummary, MarkupStyle, ReportConfig, ReportError, StatusCell, StatusMatrix,
    StatusMode, StatusReport,
};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
