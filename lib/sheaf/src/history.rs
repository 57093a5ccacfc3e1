//! Shared transaction history.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{Error, Options, Request, Response, Result};

/// One request sent through a history middleware.
///
/// `response` and `error` are both `None` while the call is in flight.
#[derive(Debug, Clone)]
pub struct Transaction {
    /// Request as it was dispatched.
    pub request: Request,
    /// Options it was dispatched with.
    pub options: Options,
    /// Response, once the call succeeded.
    pub response: Option<Response>,
    /// Error, once the call failed.
    pub error: Option<Error>,
}

impl Transaction {
    /// Returns `true` once the call has settled.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        self.response.is_some() || self.error.is_some()
    }
}

/// A cloneable handle on a list of transactions, in dispatch order.
///
/// # Example
///
/// ```ignore
/// use sheaf::{History, middleware};
///
/// let history = History::new();
/// stack.push(middleware::history(&history));
/// // ... send requests ...
/// for transaction in history.transactions() {
///     println!("{}", transaction.request.url());
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Arc<Mutex<Vec<Transaction>>>,
}

impl History {
    /// Create an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded transactions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of every transaction.
    #[must_use]
    pub fn transactions(&self) -> Vec<Transaction> {
        self.lock().clone()
    }

    /// Transaction at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Transaction> {
        self.lock().get(index).cloned()
    }

    /// Most recently dispatched transaction.
    #[must_use]
    pub fn last(&self) -> Option<Transaction> {
        self.lock().last().cloned()
    }

    /// Requests, in dispatch order.
    #[must_use]
    pub fn requests(&self) -> Vec<Request> {
        self.lock()
            .iter()
            .map(|transaction| transaction.request.clone())
            .collect()
    }

    /// Forget every transaction.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Record a dispatched request and return its index.
    pub(crate) fn record(&self, request: Request, options: Options) -> usize {
        let mut entries = self.lock();
        entries.push(Transaction {
            request,
            options,
            response: None,
            error: None,
        });
        entries.len() - 1
    }

    /// Store the outcome of the transaction at `index`.
    ///
    /// Does nothing if the history was cleared in the meantime.
    pub(crate) fn settle(&self, index: usize, outcome: &Result<Response>) {
        if let Some(transaction) = self.lock().get_mut(index) {
            match outcome {
                Ok(response) => transaction.response = Some(response.clone()),
                Err(err) => transaction.error = Some(err.clone()),
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Transaction>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
