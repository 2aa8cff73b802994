//! Fan-out/fan-in batches of merge units.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use log::{debug, warn};
use tokio::task::{self, JoinSet};

use crate::error::{Error, Result, WalkError};

/// A unit of a batch that did not succeed.
#[derive(Debug)]
pub struct UnitFailure {
    /// Position of the unit in spawn order.
    pub index: usize,
    pub error: Error,
}

/// Result of a drained batch.
#[derive(Debug)]
pub struct BatchReport<T> {
    pub name: String,
    pub total: usize,

    /// Successful unit values, in spawn order.
    pub values: Vec<T>,

    pub failures: Vec<UnitFailure>,
}

impl<T> BatchReport<T> {
    pub fn succeeded(&self) -> usize {
        self.values.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

type FailureFn = Box<dyn FnMut(&UnitFailure) + Send>;
type ThenFn<T> = Box<dyn FnOnce(&BatchReport<T>) + Send>;

/// A set of independent units joined as a barrier.
///
/// Units run concurrently. [`Batch::join`] waits for every one of them; a
/// failing or panicking unit is reported to the failure callback and never
/// cancels its siblings. The completion callback runs once after the last
/// unit finishes.
pub struct Batch<T> {
    name: String,
    units: JoinSet<(usize, Result<T>)>,
    indices: HashMap<task::Id, usize>,
    spawned: usize,
    on_failure: Option<FailureFn>,
    then: Option<ThenFn<T>>,
}

impl<T: Send + 'static> Batch<T> {
    /// Create an empty batch.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            units: JoinSet::new(),
            indices: HashMap::new(),
            spawned: 0,
            on_failure: None,
            then: None,
        }
    }

    /// Set the callback invoked for each failed unit.
    pub fn on_failure<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&UnitFailure) + Send + 'static,
    {
        self.on_failure = Some(Box::new(callback));
        self
    }

    /// Set the callback invoked once the batch has drained.
    pub fn then<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&BatchReport<T>) + Send + 'static,
    {
        self.then = Some(Box::new(callback));
        self
    }

    /// Spawn one unit.
    pub fn spawn<F>(&mut self, unit: F)
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let index = self.spawned;
        let batch = self.name.clone();
        self.spawned += 1;
        let handle = self.units.spawn(async move {
            let result = match AssertUnwindSafe(unit).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(WalkError::UnitPanicked {
                    batch,
                    index,
                    message: panic_message(panic),
                }
                .into()),
            };
            (index, result)
        });
        self.indices.insert(handle.id(), index);
    }

    /// Number of units spawned so far.
    pub fn len(&self) -> usize {
        self.spawned
    }

    pub fn is_empty(&self) -> bool {
        self.spawned == 0
    }

    /// Wait for every unit and collect the results.
    pub async fn join(mut self) -> BatchReport<T> {
        let mut values = Vec::with_capacity(self.spawned);
        let mut failures = Vec::new();

        while let Some(joined) = self.units.join_next_with_id().await {
            match joined {
                Ok((_, (index, Ok(value)))) => values.push((index, value)),
                Ok((_, (index, Err(error)))) => failures.push(UnitFailure { index, error }),
                // Units catch their own panics, so this is a cancellation.
                Err(e) => {
                    let index = self.indices.get(&e.id()).copied().unwrap_or(usize::MAX);
                    warn!("batch '{}' lost unit {}: {}", self.name, index, e);
                    failures.push(UnitFailure {
                        index,
                        error: WalkError::UnitLost {
                            batch: self.name.clone(),
                            index,
                            message: e.to_string(),
                        }
                        .into(),
                    });
                }
            }
        }

        values.sort_by_key(|(index, _)| *index);
        failures.sort_by_key(|f| f.index);

        if let Some(callback) = self.on_failure.as_mut() {
            for failure in &failures {
                callback(failure);
            }
        }

        let report = BatchReport {
            name: self.name,
            total: self.spawned,
            values: values.into_iter().map(|(_, value)| value).collect(),
            failures,
        };
        debug!(
            "batch '{}' drained: {} ok, {} failed",
            report.name,
            report.succeeded(),
            report.failed()
        );

        if let Some(callback) = self.then.take() {
            callback(&report);
        }
        report
    }
}

impl<T> fmt::Debug for Batch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("name", &self.name)
            .field("spawned", &self.spawned)
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
