//! Utilities used by the engines: the object reference type, options, logging, the SATB buffer
//! queues and statistics.

pub mod address;
pub mod logger;
pub mod options;
pub mod satb;
pub mod statistics;

#[cfg(any(test, feature = "mock_test"))]
pub mod test_util;

pub use self::address::ObjectReference;
