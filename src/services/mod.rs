pub mod analysis_service;
pub mod execution_service;
pub mod file_service;
pub mod ignore_service;
pub mod index_service;
pub mod organize_service;
pub mod scan_service;
pub mod stream_parser;
pub mod structure_service;
pub mod undo_service;
pub mod worker;
