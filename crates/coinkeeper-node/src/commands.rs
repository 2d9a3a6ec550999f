pub mod import_blocks;
pub mod info;
pub mod rewind;
