pub mod batch_processor;
pub mod daily;
pub mod jobs;
pub mod weekly;
