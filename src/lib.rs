pub mod agent;
pub mod config;
pub mod error;
pub mod fib;
pub mod perf;
pub mod route;
