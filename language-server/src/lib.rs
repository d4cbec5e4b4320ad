pub mod analysis;
pub mod backend;
pub mod completion;
pub mod config;
pub mod error;
pub mod graph;
pub mod hover;
pub mod language;
pub mod locator;
pub mod queries;
pub mod schema;
pub mod select;
pub mod session;
pub mod symbols;
pub mod text;

pub use backend::Backend;
pub use error::{Error, Result};
