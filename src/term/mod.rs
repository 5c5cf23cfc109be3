//! Terms and the document frequency table used to classify them

mod frequency;
#[allow(clippy::module_inception)]
mod term;

pub use frequency::DocumentFrequencyTable;
pub use term::{IdfX10, StreamId, Term};
