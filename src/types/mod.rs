//! Core domain types for result delivery.
//!
//! Identifiers are newtypes; the result structs double as the protobuf and
//! JSON wire representation.

pub mod ids;
pub mod result;

pub use ids::{KeyId, RequestId};
pub use result::{
    Categorization, DataSet, DataSetType, Echo, Malicious, NamedEnum, QueryResult, QueryStatus,
    Status, Verdict,
};
