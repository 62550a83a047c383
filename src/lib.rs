pub mod broker;
pub mod command;
pub mod config;
pub mod context;
pub mod media;
pub mod patrol;
pub mod util;
pub mod vehicle;
pub mod web;

#[cfg(test)]
mod test_support;
