pub mod agreement;
pub mod config;
pub mod consolidate;
pub mod export;
pub mod preannotate;
