//! Upload intake and row normalization

mod format;
mod normalizer;
mod profile;
mod reader;
mod receiver;

pub use format::detect_format;
pub use normalizer::{NormalizedRow, RowNormalizer, RowRejected};
pub use profile::{normalize_hub, ColumnKind, ColumnRule, DatasetProfile};
pub use reader::{RawCell, RawRow, ReadError, RowReader};
pub use receiver::{UploadReceipt, UploadReceiver, UploadRequest};
