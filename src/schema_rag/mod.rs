pub mod embedder;
pub mod index;
pub mod retriever;

pub use embedder::*;
pub use index::*;
pub use retriever::*;
