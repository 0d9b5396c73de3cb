//! Base implementation of records.
use crate::error::MpcError;
use chrono::prelude::{DateTime, Local};
use ndarray::{Array1, Array2, Array3};
use std::collections::{
    hash_map::{IntoIter, Iter, Keys},
    HashMap,
};

/// Represents possible types of values that can be stored in a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    /// A single floating-point value, typically a cost or a reward.
    Scalar(f32),

    /// A timestamp with local timezone.
    DateTime(DateTime<Local>),

    /// A 1-dimensional array, e.g. the action of a single agent.
    Array1(Vec<f32>),

    /// A 2-dimensional array with shape information, e.g. actions of a batch of agents.
    Array2(Vec<f32>, [usize; 2]),

    /// A 3-dimensional array with shape information, e.g. planned trajectories.
    Array3(Vec<f32>, [usize; 3]),

    /// A text value.
    String(String),
}

impl From<&Array1<f32>> for RecordValue {
    fn from(a: &Array1<f32>) -> Self {
        RecordValue::Array1(a.iter().cloned().collect())
    }
}

impl From<&Array2<f32>> for RecordValue {
    fn from(a: &Array2<f32>) -> Self {
        let (d0, d1) = a.dim();
        RecordValue::Array2(a.iter().cloned().collect(), [d0, d1])
    }
}

impl From<&Array3<f32>> for RecordValue {
    fn from(a: &Array3<f32>) -> Self {
        let (d0, d1, d2) = a.dim();
        RecordValue::Array3(a.iter().cloned().collect(), [d0, d1, d2])
    }
}

/// A container for storing key-value pairs of various data types.
///
/// # Examples
///
/// ```rust
/// use neuralmpc_core::record::{Record, RecordValue};
///
/// let mut record = Record::from_scalar("planned_cost", 0.5);
/// record.insert("predicted_reward", RecordValue::Scalar(-0.5));
/// assert_eq!(record.get_scalar("planned_cost").unwrap(), 0.5);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Record(HashMap<String, RecordValue>);

impl Record {
    /// Creates an empty record.
    pub fn empty() -> Self {
        Self(HashMap::new())
    }

    /// Creates a record containing a single scalar value.
    pub fn from_scalar(name: impl Into<String>, value: f32) -> Self {
        Self(HashMap::from([(name.into(), RecordValue::Scalar(value))]))
    }

    /// Creates a record from a slice of key-value pairs.
    pub fn from_slice<K: Into<String> + Clone>(s: &[(K, RecordValue)]) -> Self {
        Self(
            s.iter()
                .map(|(k, v)| (k.clone().into(), v.clone()))
                .collect(),
        )
    }

    /// Returns an iterator over the keys in the record.
    pub fn keys(&self) -> Keys<String, RecordValue> {
        self.0.keys()
    }

    /// Inserts a key-value pair into the record.
    pub fn insert(&mut self, k: impl Into<String>, v: RecordValue) {
        self.0.insert(k.into(), v);
    }

    /// Returns an iterator over the key-value pairs in the record.
    pub fn iter(&self) -> Iter<'_, String, RecordValue> {
        self.0.iter()
    }

    /// Returns an iterator that consumes the record.
    pub fn into_iter_in_record(self) -> IntoIter<String, RecordValue> {
        self.0.into_iter()
    }

    /// Gets a reference to the value associated with the given key.
    pub fn get(&self, k: &str) -> Option<&RecordValue> {
        self.0.get(k)
    }

    /// Merges two records, consuming both.
    ///
    /// Values of `record` overwrite values of `self` with the same key.
    pub fn merge(self, record: Record) -> Self {
        Record(self.0.into_iter().chain(record.0).collect())
    }

    /// Merges another record into this one in place.
    pub fn merge_inplace(&mut self, record: Record) {
        for (k, v) in record.0.into_iter() {
            self.0.insert(k, v);
        }
    }

    /// Gets a scalar value from the record.
    pub fn get_scalar(&self, k: &str) -> Result<f32, MpcError> {
        match self.0.get(k) {
            Some(RecordValue::Scalar(v)) => Ok(*v),
            Some(_) => Err(MpcError::RecordValueTypeError("Scalar".to_string())),
            None => Err(MpcError::RecordKeyError(k.to_string())),
        }
    }

    /// Gets a 1-dimensional array from the record.
    pub fn get_array1(&self, k: &str) -> Result<Vec<f32>, MpcError> {
        match self.0.get(k) {
            Some(RecordValue::Array1(v)) => Ok(v.clone()),
            Some(_) => Err(MpcError::RecordValueTypeError("Array1".to_string())),
            None => Err(MpcError::RecordKeyError(k.to_string())),
        }
    }

    /// Gets a 2-dimensional array and its shape from the record.
    pub fn get_array2(&self, k: &str) -> Result<(Vec<f32>, [usize; 2]), MpcError> {
        match self.0.get(k) {
            Some(RecordValue::Array2(v, s)) => Ok((v.clone(), *s)),
            Some(_) => Err(MpcError::RecordValueTypeError("Array2".to_string())),
            None => Err(MpcError::RecordKeyError(k.to_string())),
        }
    }

    /// Gets a 3-dimensional array and its shape from the record.
    pub fn get_array3(&self, k: &str) -> Result<(Vec<f32>, [usize; 3]), MpcError> {
        match self.0.get(k) {
            Some(RecordValue::Array3(v, s)) => Ok((v.clone(), *s)),
            Some(_) => Err(MpcError::RecordValueTypeError("Array3".to_string())),
            None => Err(MpcError::RecordKeyError(k.to_string())),
        }
    }

    /// Gets a timestamp from the record.
    pub fn get_datetime(&self, k: &str) -> Result<DateTime<Local>, MpcError> {
        match self.0.get(k) {
            Some(RecordValue::DateTime(t)) => Ok(*t),
            Some(_) => Err(MpcError::RecordValueTypeError("DateTime".to_string())),
            None => Err(MpcError::RecordKeyError(k.to_string())),
        }
    }

    /// Gets a string value from the record.
    pub fn get_string(&self, k: &str) -> Result<String, MpcError> {
        match self.0.get(k) {
            Some(RecordValue::String(s)) => Ok(s.clone()),
            Some(_) => Err(MpcError::RecordValueTypeError("String".to_string())),
            None => Err(MpcError::RecordKeyError(k.to_string())),
        }
    }

    /// Checks if the record is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The number of values in the record.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_typed_getters() {
        let mut record = Record::from_scalar("planned_cost", 1.5);
        record.insert("action", RecordValue::from(&array![[0.1f32, 0.2], [0.3, 0.4]]));

        assert_eq!(record.get_scalar("planned_cost").unwrap(), 1.5);
        let (v, shape) = record.get_array2("action").unwrap();
        assert_eq!(shape, [2, 2]);
        assert_eq!(v, vec![0.1, 0.2, 0.3, 0.4]);

        assert_eq!(
            record.get_scalar("action"),
            Err(MpcError::RecordValueTypeError("Scalar".to_string()))
        );
        assert_eq!(
            record.get_array1("missing"),
            Err(MpcError::RecordKeyError("missing".to_string()))
        );
    }

    #[test]
    fn test_merge_overwrites() {
        let r1 = Record::from_slice(&[
            ("a", RecordValue::Scalar(1.0)),
            ("b", RecordValue::Scalar(2.0)),
        ]);
        let r2 = Record::from_scalar("b", 3.0);
        let r = r1.merge(r2);
        assert_eq!(r.len(), 2);
        assert_eq!(r.get_scalar("b").unwrap(), 3.0);
    }
}
