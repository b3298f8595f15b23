pub mod author;
pub mod paper;

pub use author::Author;
pub use paper::{Paper, PaperFields, PaperId};
