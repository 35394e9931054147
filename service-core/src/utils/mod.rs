pub mod sanitize;

pub use sanitize::strip_markup;
