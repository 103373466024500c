pub mod classifier;
pub mod compressor;
pub mod pipeline;
pub mod remote_store;
pub mod repository;
pub mod stage;
pub mod worker;
