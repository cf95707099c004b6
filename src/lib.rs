pub mod api;
pub mod config;
pub mod error;
pub mod evidence;
pub mod pipeline;
pub mod scheduler;
pub mod server;
pub mod shutdown;
pub mod synthesis;

#[cfg(test)]
mod test_support;
