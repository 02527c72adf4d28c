pub mod annotate;
pub mod core;
pub mod diagnostics;
pub mod inspect;
