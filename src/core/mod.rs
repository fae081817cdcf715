pub mod generator;
pub mod poller;
pub mod store;
pub mod submit;
pub mod worker;
