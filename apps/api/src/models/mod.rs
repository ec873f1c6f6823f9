pub mod insights;
pub mod job;
