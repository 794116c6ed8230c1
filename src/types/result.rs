//! Canonical query result delivered by webhook or poll.
//!
//! The same structs serve both wire encodings: prost attributes give the
//! compact binary form, serde attributes give the JSON form. Dataset types
//! and verdicts travel as names in JSON and as integers in protobuf.

use prost::{Enumeration, Message};
use serde::{Deserialize, Serialize};

use super::ids::RequestId;

/// A dataset the scoring service can attach to a result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum DataSetType {
    Categorization = 0,
    Malicious = 1,
    Echo = 2,
}

/// Verdict carried by the malicious dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Enumeration)]
#[repr(i32)]
pub enum Verdict {
    Unknown = 0,
    Clean = 1,
    Malicious = 2,
}

/// An enum that has a stable textual name in JSON payloads.
pub trait NamedEnum: Sized + Copy + Into<i32> + TryFrom<i32> {
    fn as_str_name(&self) -> &'static str;
    fn from_str_name(name: &str) -> Option<Self>;
}

impl NamedEnum for DataSetType {
    fn as_str_name(&self) -> &'static str {
        match self {
            DataSetType::Categorization => "CATEGORIZATION",
            DataSetType::Malicious => "MALICIOUS",
            DataSetType::Echo => "ECHO",
        }
    }

    fn from_str_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "CATEGORIZATION" => Some(DataSetType::Categorization),
            "MALICIOUS" => Some(DataSetType::Malicious),
            "ECHO" => Some(DataSetType::Echo),
            _ => None,
        }
    }
}

impl NamedEnum for Verdict {
    fn as_str_name(&self) -> &'static str {
        match self {
            Verdict::Unknown => "UNKNOWN",
            Verdict::Clean => "CLEAN",
            Verdict::Malicious => "MALICIOUS",
        }
    }

    fn from_str_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "UNKNOWN" => Some(Verdict::Unknown),
            "CLEAN" => Some(Verdict::Clean),
            "MALICIOUS" => Some(Verdict::Malicious),
            _ => None,
        }
    }
}

/// Error or status code with a human-readable message.
#[derive(Clone, PartialEq, Eq, Message, Serialize, Deserialize)]
pub struct Status {
    #[prost(int32, tag = "1")]
    #[serde(default, skip_serializing_if = "is_zero")]
    pub code: i32,
    #[prost(string, tag = "2")]
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Processing state of a query.
#[derive(Clone, PartialEq, Eq, Message, Serialize, Deserialize)]
pub struct QueryStatus {
    /// True once every requested dataset that will ever be produced is present.
    #[prost(bool, tag = "1")]
    #[serde(default)]
    pub complete: bool,
    /// HTTP status the service observed when fetching the queried URL.
    #[prost(int32, tag = "2")]
    #[serde(default, skip_serializing_if = "is_zero")]
    pub fetch_code: i32,
    /// Redirect target, when the fetch was redirected.
    #[prost(string, tag = "3")]
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,
    #[prost(message, optional, tag = "4")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Status>,
}

#[derive(Clone, PartialEq, Eq, Message, Serialize, Deserialize)]
pub struct Categorization {
    /// Category identifiers, most relevant first.
    #[prost(uint32, repeated, tag = "1")]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub value: Vec<u32>,
}

#[derive(Clone, PartialEq, Eq, Message, Serialize, Deserialize)]
pub struct Malicious {
    #[prost(enumeration = "Verdict", tag = "1")]
    #[serde(
        default,
        serialize_with = "named::serialize_one::<Verdict, _>",
        deserialize_with = "named::deserialize_one::<Verdict, _>"
    )]
    pub verdict: i32,
    #[prost(uint32, tag = "2")]
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub category: u32,
}

#[derive(Clone, PartialEq, Eq, Message, Serialize, Deserialize)]
pub struct Echo {
    #[prost(string, tag = "1")]
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
}

/// The datasets attached to a result. Sparse: only populated entries are set.
#[derive(Clone, PartialEq, Eq, Message, Serialize, Deserialize)]
pub struct DataSet {
    #[prost(message, optional, tag = "1")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categorization: Option<Categorization>,
    #[prost(message, optional, tag = "2")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub malicious: Option<Malicious>,
    #[prost(message, optional, tag = "3")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<Echo>,
}

impl DataSet {
    /// Returns true if the dataset of the given type is populated.
    pub fn contains(&self, kind: DataSetType) -> bool {
        match kind {
            DataSetType::Categorization => self.categorization.is_some(),
            DataSetType::Malicious => self.malicious.is_some(),
            DataSetType::Echo => self.echo.is_some(),
        }
    }
}

/// A decoded query result.
///
/// Produced by the payload codec and handed to callers unchanged.
#[derive(Clone, PartialEq, Eq, Message, Serialize, Deserialize)]
pub struct QueryResult {
    #[prost(string, tag = "1")]
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_id: String,
    /// The URL that was queried.
    #[prost(string, tag = "2")]
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[prost(string, tag = "3")]
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tracking_id: String,
    /// Dataset types the caller asked for.
    #[prost(enumeration = "DataSetType", repeated, tag = "4")]
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "named::serialize_many::<DataSetType, _>",
        deserialize_with = "named::deserialize_many::<DataSetType, _>"
    )]
    pub request_dataset: Vec<i32>,
    #[prost(message, optional, tag = "5")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_dataset: Option<DataSet>,
    #[prost(message, optional, tag = "6")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_status: Option<QueryStatus>,
}

impl QueryResult {
    /// The request this result belongs to.
    pub fn id(&self) -> RequestId {
        RequestId::new(self.request_id.clone())
    }

    /// Returns true when the service flagged the query as complete.
    ///
    /// A result without a status block is never complete.
    pub fn is_complete(&self) -> bool {
        self.query_status.as_ref().is_some_and(|s| s.complete)
    }

    /// The error reported by the service, if any.
    pub fn error(&self) -> Option<&Status> {
        self.query_status.as_ref().and_then(|s| s.error.as_ref())
    }

    /// Returns true if the dataset of the given type is populated.
    pub fn has_dataset(&self, kind: DataSetType) -> bool {
        self.response_dataset
            .as_ref()
            .is_some_and(|ds| ds.contains(kind))
    }

    /// Lists the datasets from `required` that are not present.
    pub fn missing_datasets(&self, required: &[DataSetType]) -> Vec<DataSetType> {
        required
            .iter()
            .copied()
            .filter(|kind| !self.has_dataset(*kind))
            .collect()
    }

    /// Fills in the request ID when the payload omitted it.
    pub(crate) fn stamp_request_id(&mut self, id: &RequestId) {
        if self.request_id.is_empty() {
            self.request_id = id.as_str().to_string();
        }
    }
}

fn is_zero(v: &i32) -> bool {
    *v == 0
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

/// Serde adapters rendering prost enum fields by name.
///
/// Unknown numeric values are passed through as numbers so that a newer
/// server's enum values survive a JSON round trip.
mod named {
    use serde::Deserialize;
    use serde::de::{self, Deserializer};
    use serde::ser::{SerializeSeq, Serializer};

    use super::NamedEnum;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NameOrNumber {
        Name(String),
        Number(i32),
    }

    fn resolve<T: NamedEnum, E: de::Error>(raw: NameOrNumber) -> Result<i32, E> {
        match raw {
            NameOrNumber::Number(n) => Ok(n),
            NameOrNumber::Name(name) => T::from_str_name(&name)
                .map(Into::into)
                .ok_or_else(|| E::custom(format!("unknown enum name: {name}"))),
        }
    }

    pub fn serialize_one<T: NamedEnum, S: Serializer>(
        value: &i32,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match T::try_from(*value) {
            Ok(known) => serializer.serialize_str(known.as_str_name()),
            Err(_) => serializer.serialize_i32(*value),
        }
    }

    pub fn deserialize_one<'de, T: NamedEnum, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<i32, D::Error> {
        resolve::<T, D::Error>(NameOrNumber::deserialize(deserializer)?)
    }

    pub fn serialize_many<T: NamedEnum, S: Serializer>(
        values: &[i32],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            match T::try_from(*value) {
                Ok(known) => seq.serialize_element(known.as_str_name())?,
                Err(_) => seq.serialize_element(value)?,
            }
        }
        seq.end()
    }

    pub fn deserialize_many<'de, T: NamedEnum, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<i32>, D::Error> {
        Vec::<NameOrNumber>::deserialize(deserializer)?
            .into_iter()
            .map(resolve::<T, D::Error>)
            .collect()
    }
}
