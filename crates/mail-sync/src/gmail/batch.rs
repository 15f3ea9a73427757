//! Partitioned outcome of a batch call

use super::GmailError;

/// One failed item of a batch, with its position in the request
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    /// Index of the item in the original request
    pub index: usize,
    /// Id of the item that failed
    pub id: String,
    pub error: GmailError,
}

/// Succeeded items and failed items of one batch operation
///
/// Nothing here drops failures: every combinator carries them through.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult<T> {
    pub succeeded: Vec<T>,
    pub failed: Vec<BatchFailure>,
}

impl<T> Default for BatchResult<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> BatchResult<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Partition per-item results, keyed by the ids they were requested with
    pub fn from_results<I, S>(results: I) -> Self
    where
        I: IntoIterator<Item = (S, Result<T, GmailError>)>,
        S: Into<String>,
    {
        let mut batch = Self::new();
        for (index, (id, result)) in results.into_iter().enumerate() {
            match result {
                Ok(item) => batch.succeeded.push(item),
                Err(error) => batch.failed.push(BatchFailure {
                    index,
                    id: id.into(),
                    error,
                }),
            }
        }
        batch
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    /// Transform the succeeded items, keeping failures as-is
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> BatchResult<U> {
        BatchResult {
            succeeded: self.succeeded.into_iter().map(f).collect(),
            failed: self.failed,
        }
    }

    /// Append another batch, shifting its failure indexes past ours
    pub fn extend(&mut self, other: BatchResult<T>, index_offset: usize) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed.into_iter().map(|mut f| {
            f.index += index_offset;
            f
        }));
    }

    pub fn into_parts(self) -> (Vec<T>, Vec<BatchFailure>) {
        (self.succeeded, self.failed)
    }
}
