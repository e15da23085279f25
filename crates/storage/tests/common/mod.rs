pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{read_file, seeded_bytes, staging_files, store_file};
