pub mod annotations;
pub mod document;

pub use annotations::read_annotation_csv;
pub use document::read_document;
