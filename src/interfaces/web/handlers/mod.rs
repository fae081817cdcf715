pub mod jobs;
pub mod paths;
pub mod worker;
