pub mod data_file;
pub mod header;

pub use data_file::DataFile;
pub use header::FileHeader;
