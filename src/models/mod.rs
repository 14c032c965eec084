pub mod changes;
pub mod indexed_file;
pub mod operation;
