pub mod api;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;
