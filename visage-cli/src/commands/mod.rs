pub mod fetch;
pub mod train;
