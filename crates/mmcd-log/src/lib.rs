//! mmcd-log - log file codecs for the MMCD datalogger
//!
//! - [`native`]: the compact `.mmcd` binary log, written while sampling
//!   and read back for display or export
//! - [`legacy`]: read-only import of logs recorded by the original PalmOS
//!   application (`.pdb`)
//! - [`import`]: legacy to native conversion
//!
//! Both codecs produce and consume [`mmcd_core::Sample`], the same type the
//! sampling engine emits.

pub mod error;
pub mod import;
pub mod legacy;
pub mod native;

pub use error::{CodecError, CodecResult};
pub use import::{import_legacy, logged_indices, write_native, ImportSummary};
pub use legacy::{ImportPolicy, LegacyLog, PdbHeader};
pub use native::{NativeHeader, NativeLog, NativeReader, NativeWriter};
