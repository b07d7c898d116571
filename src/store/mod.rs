pub mod batch;
pub mod cache;

pub use batch::BatchWriter;
pub use cache::{ResultCache, VendorArticleIndex};
