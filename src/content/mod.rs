pub mod markdown;
pub mod title;

pub use markdown::{ConversionError, HtmdConverter, MarkdownConverter};
pub use title::extract_title;
