//! Distributed data structure proxies.

mod map;

pub use map::IMap;
