//! Bounded-concurrency dispatch of many requests.
//!
//! A [`Pool`] pulls [`PoolItem`]s lazily and keeps at most `pool_size` calls
//! in flight. Each settled call is reported with the index of its item.

use std::collections::BTreeMap;
use std::fmt;
use std::pin::pin;
use std::sync::Arc;

use futures_util::{StreamExt, future, stream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{Client, Error, Options, Request, Response, ResponseFuture, Result};

/// Default number of calls in flight.
pub const DEFAULT_POOL_SIZE: usize = 25;

type ProducerFn = dyn FnOnce(Options) -> ResponseFuture + Send;
type FulfilledFn = dyn Fn(usize, &Response) + Send + Sync;
type RejectedFn = dyn Fn(usize, &Error) + Send + Sync;

/// One unit of work of a [`Pool`].
pub enum PoolItem {
    /// Send this request through the pool's client.
    Request(Request),
    /// Start a call with the pool's request options.
    Call(Box<ProducerFn>),
}

impl PoolItem {
    /// Wrap a closure producing the call.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce(Options) -> ResponseFuture + Send + 'static,
    {
        Self::Call(Box::new(f))
    }

    fn dispatch(self, client: &Client, options: Options) -> ResponseFuture {
        match self {
            Self::Request(request) => client.send(request, options),
            Self::Call(f) => f(options),
        }
    }
}

impl From<Request> for PoolItem {
    fn from(request: Request) -> Self {
        Self::Request(request)
    }
}

impl fmt::Debug for PoolItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request(request) => f.debug_tuple("Request").field(request).finish(),
            Self::Call(_) => f.write_str("Call"),
        }
    }
}

/// Configuration of a [`Pool`].
#[derive(Clone)]
pub struct PoolConfig {
    pool_size: usize,
    request_options: Options,
    on_fulfilled: Option<Arc<FulfilledFn>>,
    on_rejected: Option<Arc<RejectedFn>>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            request_options: Options::default(),
            on_fulfilled: None,
            on_rejected: None,
        }
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("pool_size", &self.pool_size)
            .field("request_options", &self.request_options)
            .field("on_fulfilled", &self.on_fulfilled.is_some())
            .field("on_rejected", &self.on_rejected.is_some())
            .finish()
    }
}

impl PoolConfig {
    /// Create the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of calls in flight.
    #[must_use]
    pub const fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the options every call is sent with.
    #[must_use]
    pub fn request_options(mut self, options: Options) -> Self {
        self.request_options = options;
        self
    }

    /// Called with the item index of each response.
    #[must_use]
    pub fn on_fulfilled<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, &Response) + Send + Sync + 'static,
    {
        self.on_fulfilled = Some(Arc::new(f));
        self
    }

    /// Called with the item index of each error.
    #[must_use]
    pub fn on_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, &Error) + Send + Sync + 'static,
    {
        self.on_rejected = Some(Arc::new(f));
        self
    }
}

/// Cancels a running [`Pool`].
///
/// No further item is dispatched and in-flight calls settle with
/// [`Error::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Cancel the pool.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns `true` once [`CancelHandle::cancel`] was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    async fn guard(&self, call: ResponseFuture) -> Result<Response> {
        tokio::select! {
            () = self.token.cancelled() => Err(Error::Cancelled),
            result = call => result,
        }
    }
}

/// Sends many requests with bounded concurrency.
///
/// # Example
///
/// ```ignore
/// use sheaf::{Client, Pool, PoolConfig, PoolItem};
///
/// let requests = urls.into_iter().map(|url| PoolItem::from(Request::new(Method::Get, url)));
/// let results = Pool::batch(&client, requests, PoolConfig::new().pool_size(5)).await?;
/// ```
pub struct Pool {
    client: Client,
    items: Box<dyn Iterator<Item = PoolItem> + Send>,
    config: PoolConfig,
    cancel: CancelHandle,
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.config)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Pool {
    /// Create a pool over `items`.
    ///
    /// Items are pulled lazily, so `items` may be unbounded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when `pool_size` is zero.
    pub fn new<I, T>(client: &Client, items: I, config: PoolConfig) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
        T: Into<PoolItem> + 'static,
    {
        if config.pool_size == 0 {
            return Err(Error::invalid_argument("pool_size must be greater than zero"));
        }
        Ok(Self {
            client: client.clone(),
            items: Box::new(items.into_iter().map(Into::into)),
            config,
            cancel: CancelHandle::default(),
        })
    }

    /// Handle to cancel the pool while it runs.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Drive every item to completion.
    ///
    /// Outcomes are only reported through the callbacks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] when the pool was cancelled.
    pub async fn wait(self) -> Result<()> {
        let cancel = self.cancel.clone();
        self.run(|_, _| {}).await;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Send every item and collect the outcomes by item index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when `pool_size` is zero. Failed
    /// calls are reported in the returned vector.
    pub async fn batch<I, T>(
        client: &Client,
        items: I,
        config: PoolConfig,
    ) -> Result<Vec<Result<Response>>>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
        T: Into<PoolItem> + 'static,
    {
        let pool = Self::new(client, items, config)?;
        let mut results = BTreeMap::new();
        pool.run(|index, result| {
            results.insert(index, result);
        })
        .await;
        Ok(results.into_values().collect())
    }

    async fn run(self, mut settle: impl FnMut(usize, Result<Response>)) {
        let Self {
            client,
            items,
            config,
            cancel,
        } = self;
        let PoolConfig {
            pool_size,
            request_options,
            on_fulfilled,
            on_rejected,
        } = config;
        debug!(pool_size, "pool started");

        let stop = cancel.clone();
        let calls = stream::iter(items.enumerate())
            .take_while(move |_| future::ready(!stop.is_cancelled()))
            .map(|(index, item)| {
                let call = item.dispatch(&client, request_options.clone());
                let cancel = cancel.clone();
                async move { (index, cancel.guard(call).await) }
            })
            .buffer_unordered(pool_size);
        let mut calls = pin!(calls);

        let mut settled = 0_usize;
        while let Some((index, result)) = calls.next().await {
            match &result {
                Ok(response) => {
                    if let Some(f) = &on_fulfilled {
                        f(index, response);
                    }
                }
                Err(err) => {
                    debug!(index, error = %err, "pool entry rejected");
                    if let Some(f) = &on_rejected {
                        f(index, err);
                    }
                }
            }
            settled += 1;
            settle(index, result);
        }

        if cancel.is_cancelled() {
            info!(settled, "pool cancelled");
        } else {
            debug!(settled, "pool drained");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use assert2::{check, let_assert};

    use super::*;
    use crate::{Handler, HandlerStack, Method};

    /// Sleeps for the number of milliseconds named by the path.
    fn sleeper(in_flight: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> Client {
        let handler = Handler::labeled("sleeper", move |request: Request, _options| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                let millis = request.url().path().trim_start_matches('/').parse().unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(millis)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(Response::new(200, request.url().path().to_string()))
            }
        });
        Client::builder()
            .handler(HandlerStack::with_handler(handler))
            .build()
            .expect("client")
    }

    fn get(path: &str) -> PoolItem {
        let url = url::Url::parse("http://example.com")
            .and_then(|base| base.join(path))
            .expect("valid URL");
        PoolItem::from(Request::new(Method::Get, url))
    }

    #[tokio::test(start_paused = true)]
    async fn batch_orders_by_index_and_bounds_concurrency() {
        let peak = Arc::new(AtomicUsize::new(0));
        let client = sleeper(Arc::new(AtomicUsize::new(0)), Arc::clone(&peak));
        let items = vec![get("/50"), get("/10"), get("/30"), get("/20"), get("/5")];

        let_assert!(Ok(results) = Pool::batch(&client, items, PoolConfig::new().pool_size(2)).await);
        let bodies: Vec<String> = results
            .into_iter()
            .map(|result| result.map(|r| r.text().unwrap_or_default()).unwrap_or_default())
            .collect();
        check!(bodies == vec!["/50", "/10", "/30", "/20", "/5"]);
        check!(peak.load(Ordering::SeqCst) == 2);
    }

    #[tokio::test]
    async fn callbacks_receive_indexes() {
        let fulfilled = Arc::new(Mutex::new(Vec::new()));
        let rejected = Arc::new(Mutex::new(Vec::new()));
        let client = sleeper(Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)));
        let items = vec![
            get("/0"),
            PoolItem::from_fn(|_options| Box::pin(async { Err::<Response, _>(Error::timeout()) })),
        ];

        let config = {
            let fulfilled = Arc::clone(&fulfilled);
            let rejected = Arc::clone(&rejected);
            PoolConfig::new()
                .on_fulfilled(move |index, response| {
                    fulfilled.lock().expect("lock").push((index, response.status()));
                })
                .on_rejected(move |index, err| {
                    rejected.lock().expect("lock").push((index, err.is_timeout()));
                })
        };

        let_assert!(Ok(pool) = Pool::new(&client, items, config));
        let_assert!(Ok(()) = pool.wait().await);
        check!(*fulfilled.lock().expect("lock") == vec![(0, 200)]);
        check!(*rejected.lock().expect("lock") == vec![(1, true)]);
    }

    #[tokio::test]
    async fn producers_receive_request_options() {
        let client = sleeper(Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)));
        let items = vec![PoolItem::from_fn(|options: Options| {
            let status = if options.headers.contains("X-Pool") { 204 } else { 500 };
            Box::pin(async move { Ok::<_, Error>(Response::new(status, "")) })
        })];
        let config = PoolConfig::new().request_options(Options::default().with_header("X-Pool", "1"));

        let_assert!(Ok(results) = Pool::batch(&client, items, config).await);
        let_assert!([Ok(response)] = results.as_slice());
        check!(response.status() == 204);
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        let client = Client::new();
        let_assert!(
            Err(Error::InvalidArgument(_)) =
                Pool::new(&client, Vec::<PoolItem>::new(), PoolConfig::new().pool_size(0))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_dispatch_and_settles_in_flight() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let client = sleeper(Arc::clone(&in_flight), Arc::new(AtomicUsize::new(0)));
        let items = vec![get("/10"), get("/1000"), get("/1000"), get("/1000")];
        let rejected = Arc::new(Mutex::new(Vec::new()));

        let handle = Arc::new(Mutex::new(None::<CancelHandle>));
        let config = {
            let handle = Arc::clone(&handle);
            let rejected = Arc::clone(&rejected);
            PoolConfig::new()
                .pool_size(2)
                .on_fulfilled(move |_index, _response| {
                    if let Some(handle) = handle.lock().expect("lock").as_ref() {
                        handle.cancel();
                    }
                })
                .on_rejected(move |index, err| {
                    rejected.lock().expect("lock").push((index, err.is_cancelled()));
                })
        };

        let_assert!(Ok(pool) = Pool::new(&client, items, config));
        *handle.lock().expect("lock") = Some(pool.cancel_handle());

        let_assert!(Err(Error::Cancelled) = pool.wait().await);
        check!(*rejected.lock().expect("lock") == vec![(1, true)]);
    }
}
