pub(crate) mod duplicates;
pub(crate) mod ranker;
mod similarity;
pub(crate) mod subclip;

pub use duplicates::{BestFlags, DuplicateItem, ItemMetrics};
pub use subclip::SubClipMatch;
