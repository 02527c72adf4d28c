pub mod header;
pub mod info;
pub mod record;
pub mod utils;
