pub mod annotation;
pub mod batch;
pub mod config;
pub mod error;
pub mod index;
pub mod intervals;
pub mod io;
pub mod leads;
pub mod projection;
pub mod units;
pub mod waveform;

pub use annotation::*;
pub use batch::{index_batch, BatchReport, JobOutcome};
pub use config::*;
pub use error::{AecgError, Result};
pub use index::{index_document, AecgDocument, AecgMetadata, IndexRecord, WaveformKind};
pub use intervals::*;
pub use projection::*;
pub use units::*;
pub use waveform::{LeadSamples, Waveform};
