pub mod collector;
pub mod dispatcher;
pub mod export;
pub mod fetcher;
pub mod pipeline;
pub mod queue;
pub mod scheduler;
pub mod summary;

#[cfg(test)]
pub(crate) mod testing;
