use crate::error::SyncError;
use crate::record::Record;

/// Analytical query engine holding the source rows.
pub trait Warehouse {
    /// Runs `query` to completion and returns every row in result order.
    fn run_query(&self, query: &str) -> Result<Vec<Record>, SyncError>;
}

impl<T: Warehouse + ?Sized> Warehouse for &T {
    fn run_query(&self, query: &str) -> Result<Vec<Record>, SyncError> {
        (**self).run_query(query)
    }
}
