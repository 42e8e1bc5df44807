//! Sentinel httpd - static file server core
//!
//! An epoll-driven HTTP/1.1 server with two interchangeable concurrency
//! architectures: a worker-thread pool sharing one reactor, and a pre-forked
//! pool of single-threaded worker processes.

pub mod config;
pub mod http;
pub mod pool;
pub mod process;
pub mod reactor;
pub mod server;
pub mod sync;
