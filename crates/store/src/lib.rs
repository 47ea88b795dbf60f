pub mod images;
pub mod rest;

pub use images::ImageResolver;
pub use rest::{RequestRow, RestError, RestRequestStore};
