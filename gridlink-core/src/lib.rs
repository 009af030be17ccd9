//! Core types and protocols for the gridlink data-grid client.

#![warn(missing_docs)]

pub mod error;
pub mod protocol;
pub mod serialization;

pub use error::{ErrorKind, GridError, Result, ServerError};
pub use serialization::{
    Data, DataInput, DataOutput, Deserializable, ObjectDataInput, ObjectDataOutput, Serializable,
};
