use std::sync::Arc;

use async_trait::async_trait;
use batchload_rs::{
    BatchFunction, BatchResult, LoadError, Loader, LoaderConfig, ResolverKey, Scope,
};
use futures::future;
use parking_lot::Mutex;

type Calls = Arc<Mutex<Vec<Vec<String>>>>;

#[derive(Default)]
struct DummyContext {
    calls: Calls,
    missing: Vec<&'static str>,
}

impl DummyContext {
    fn record(&self, keys: &[ResolverKey]) {
        self.calls.lock().push(keys.iter().map(|k| k.to_string()).collect());
    }
}

/// Echoes every key back as `value#<key>`, except the ones listed as missing.
struct EchoLoader;

#[async_trait]
impl BatchFunction<ResolverKey, String> for EchoLoader {
    type Context = DummyContext;
    async fn load(keys: &[ResolverKey], context: &DummyContext) -> BatchResult<String> {
        context.record(keys);
        Ok(keys
            .iter()
            .map(|k| {
                if context.missing.contains(&k.as_str()) {
                    Err(LoadError::not_found("dummy", k.as_str()))
                } else {
                    Ok(format!("value#{}", k))
                }
            })
            .collect())
    }
}

/// Drops the last result.
struct ShortLoader;

#[async_trait]
impl BatchFunction<ResolverKey, String> for ShortLoader {
    type Context = DummyContext;
    async fn load(keys: &[ResolverKey], context: &DummyContext) -> BatchResult<String> {
        context.record(keys);
        Ok(keys.iter().skip(1).map(|k| Ok(k.to_string())).collect())
    }
}

struct FailingLoader;

#[async_trait]
impl BatchFunction<ResolverKey, String> for FailingLoader {
    type Context = DummyContext;
    async fn load(keys: &[ResolverKey], context: &DummyContext) -> BatchResult<String> {
        context.record(keys);
        Err(LoadError::fetch("db down"))
    }
}

/// Never returns.
struct HangingLoader;

#[async_trait]
impl BatchFunction<ResolverKey, String> for HangingLoader {
    type Context = DummyContext;
    async fn load(keys: &[ResolverKey], context: &DummyContext) -> BatchResult<String> {
        context.record(keys);
        future::pending().await
    }
}

fn key(id: u32) -> ResolverKey {
    ResolverKey::new(id)
}

fn value(id: u32) -> Result<String, LoadError> {
    Ok(format!("value#{}", id))
}

fn echo_loader() -> (Loader<ResolverKey, String>, Calls) {
    let context = DummyContext::default();
    let calls = context.calls.clone();
    (Loader::new(EchoLoader, context), calls)
}

fn recorded(calls: &Calls) -> Vec<Vec<String>> {
    calls.lock().clone()
}

fn batch(ids: &[u32]) -> Vec<String> {
    ids.iter().map(u32::to_string).collect()
}

async fn settle_workers() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn basic_load() {
    let (loader, calls) = echo_loader();
    assert_eq!(loader.load(key(42)).wait().await, value(42));
    assert_eq!(recorded(&calls), vec![batch(&[42])]);
}

#[tokio::test]
async fn repeated_load() {
    let (loader, calls) = echo_loader();
    assert_eq!(loader.load(key(42)).wait().await, value(42));
    assert_eq!(loader.load(key(42)).wait().await, value(42));
    assert_eq!(recorded(&calls), vec![batch(&[42])]);
}

#[tokio::test]
async fn sibling_loads_share_one_batch() {
    let (loader, calls) = echo_loader();

    let tuple = future::join3(
        async { loader.load(key(1)).wait().await },
        async { loader.load(key(2)).wait().await },
        async { loader.load(key(3)).wait().await },
    );

    assert_eq!(tuple.await, (value(1), value(2), value(3)));
    assert_eq!(recorded(&calls), vec![batch(&[1, 2, 3])]);
}

#[tokio::test]
async fn duplicate_identities_are_fetched_once() {
    let (loader, calls) = echo_loader();

    let first = loader.load(key(1));
    let second = loader.load(ResolverKey::new("1"));
    let many = loader.load_many(vec![key(1), key(2), key(1)]);
    assert_eq!(many.len(), 3);

    let (a, b, c) = future::join3(
        first.wait(),
        second.wait(),
        future::join_all(many.iter().map(|t| t.wait())),
    )
    .await;
    assert_eq!(a, value(1));
    assert_eq!(b, value(1));
    assert_eq!(c, vec![value(1), value(2), value(1)]);
    assert_eq!(recorded(&calls), vec![batch(&[1, 2])]);

    assert_eq!(loader.load(key(2)).wait().await, value(2));
    assert_eq!(recorded(&calls).len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_fetch() {
    let (loader, calls) = echo_loader();
    let loader = Arc::new(loader);

    let handles = (0..16)
        .map(|_| {
            let loader = loader.clone();
            tokio::spawn(async move { loader.load(key(7)).wait().await })
        })
        .collect::<Vec<_>>();

    for outcome in future::join_all(handles).await {
        assert_eq!(outcome.unwrap(), value(7));
    }
    let fetched = recorded(&calls).into_iter().flatten().filter(|k| k == "7").count();
    assert_eq!(fetched, 1);
}

#[tokio::test]
async fn load_many_preserves_request_order() {
    let (loader, calls) = echo_loader();
    let thunks = loader.load_many(vec![key(2), key(1), key(3)]);
    let values = future::join_all(thunks.iter().map(|t| t.wait())).await;

    assert_eq!(values, vec![value(2), value(1), value(3)]);
    assert_eq!(recorded(&calls), vec![batch(&[2, 1, 3])]);
}

#[tokio::test]
async fn result_count_mismatch_fails_the_whole_batch() {
    let loader = Loader::new(ShortLoader, DummyContext::default());
    let thunks = loader.load_many(vec![key(1), key(2), key(3)]);

    for outcome in future::join_all(thunks.iter().map(|t| t.wait())).await {
        assert_eq!(outcome, Err(LoadError::CountMismatch { expected: 3, actual: 2 }));
    }
}

#[tokio::test]
async fn not_found_is_isolated_to_its_key() {
    let context = DummyContext { missing: vec!["2"], ..Default::default() };
    let loader = Loader::new(EchoLoader, context);
    let thunks = loader.load_many(vec![key(1), key(2), key(3)]);

    assert_eq!(
        future::join_all(thunks.iter().map(|t| t.wait())).await,
        vec![value(1), Err(LoadError::not_found("dummy", "2")), value(3)]
    );
}

#[tokio::test]
async fn fetch_failure_reaches_every_key_and_is_cached() {
    let context = DummyContext::default();
    let calls = context.calls.clone();
    let loader = Loader::new(FailingLoader, context);

    let (a, b) = future::join(loader.load(key(1)).wait(), loader.load(key(2)).wait()).await;
    assert_eq!(a, Err(LoadError::fetch("db down")));
    assert_eq!(b, Err(LoadError::fetch("db down")));

    // Errors are cached like values; nothing is retried.
    assert_eq!(loader.load(key(1)).wait().await, Err(LoadError::fetch("db down")));
    assert_eq!(recorded(&calls), vec![batch(&[1, 2])]);
}

#[tokio::test]
async fn primed_values_skip_the_fetch() {
    let (loader, calls) = echo_loader();
    assert!(loader.prime(key(5), "primed".to_owned()));
    assert!(!loader.prime(key(5), "again".to_owned()));

    assert_eq!(loader.load(key(5)).wait().await, Ok("primed".to_owned()));
    assert_eq!(loader.load(key(6)).wait().await, value(6));
    assert!(!loader.prime(key(6), "late".to_owned()));
    assert_eq!(recorded(&calls), vec![batch(&[6])]);
}

#[tokio::test]
async fn empty_load_many_fetches_nothing() {
    let (loader, calls) = echo_loader();
    assert!(loader.load_many(Vec::new()).is_empty());
    settle_workers().await;
    assert!(recorded(&calls).is_empty());
}

#[tokio::test]
async fn later_windows_only_fetch_new_keys() {
    let (loader, calls) = echo_loader();
    assert_eq!(loader.load(key(1)).wait().await, value(1));

    let thunks = loader.load_many(vec![key(1), key(2)]);
    let values = future::join_all(thunks.iter().map(|t| t.wait())).await;
    assert_eq!(values, vec![value(1), value(2)]);
    assert_eq!(recorded(&calls), vec![batch(&[1]), batch(&[2])]);
}

#[tokio::test]
async fn max_batch_size_splits_dispatch() {
    let context = DummyContext::default();
    let calls = context.calls.clone();
    let loader =
        Loader::with_config(EchoLoader, context, LoaderConfig::default().with_max_batch_size(2));

    let thunks = loader.load_many((1..=5).map(key));
    let values = future::join_all(thunks.iter().map(|t| t.wait())).await;
    assert_eq!(values, (1..=5).map(value).collect::<Vec<_>>());
    assert_eq!(recorded(&calls), vec![batch(&[1, 2]), batch(&[3, 4]), batch(&[5])]);
}

#[tokio::test]
async fn dropping_the_loader_cancels_outstanding_thunks() {
    let loader = Loader::new(HangingLoader, DummyContext::default());
    let in_flight = loader.load(key(1));
    settle_workers().await;
    let queued = loader.load(key(2));

    drop(loader);
    assert_eq!(in_flight.wait().await, Err(LoadError::Cancelled));
    assert_eq!(queued.wait().await, Err(LoadError::Cancelled));
}

#[tokio::test]
async fn cancelling_the_scope_settles_thunks() {
    let scope = Scope::new();
    let context = DummyContext::default();
    let calls = context.calls.clone();
    let loader = scope.loader(HangingLoader, context);

    let in_flight = loader.load(key(1));
    settle_workers().await;
    assert_eq!(recorded(&calls), vec![batch(&[1])]);

    scope.cancel();
    assert_eq!(in_flight.wait().await, Err(LoadError::Cancelled));
    assert_eq!(loader.load(key(2)).wait().await, Err(LoadError::Cancelled));
    assert_eq!(recorded(&calls).len(), 1);
}

#[tokio::test]
async fn scope_timeout_cancels_hung_fetch() {
    let scope = Scope::new();
    let loader = scope.loader(HangingLoader, DummyContext::default());
    let thunk = loader.load(key(1));

    let outcome =
        scope.run_with_timeout(std::time::Duration::from_millis(20), thunk.wait()).await;
    assert_eq!(outcome, Err(LoadError::Cancelled));
    assert!(scope.is_cancelled());
    assert_eq!(thunk.wait().await, Err(LoadError::Cancelled));
}

#[tokio::test]
async fn zero_max_batch_size_still_dispatches() {
    let context = DummyContext::default();
    let calls = context.calls.clone();
    let mut config = LoaderConfig::default();
    config.max_batch_size = Some(0);
    let loader = Loader::with_config(EchoLoader, context, config);

    let thunks = loader.load_many(vec![key(1), key(2)]);
    let values = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        future::join_all(thunks.iter().map(|t| t.wait())),
    )
    .await
    .expect("loader worker stalled");

    assert_eq!(values, vec![value(1), value(2)]);
    assert_eq!(recorded(&calls), vec![batch(&[1]), batch(&[2])]);
}

#[tokio::test]
async fn cancelling_the_scope_cuts_the_window_delay_short() {
    let scope =
        Scope::with_config(LoaderConfig::default().with_delay(std::time::Duration::from_secs(30)));
    let context = DummyContext::default();
    let calls = context.calls.clone();
    let loader = scope.loader(EchoLoader, context);

    let thunk = loader.load(key(1));
    settle_workers().await;
    scope.cancel();

    let outcome = tokio::time::timeout(std::time::Duration::from_secs(5), thunk.wait())
        .await
        .expect("cancellation waited out the delay");
    assert_eq!(outcome, Err(LoadError::Cancelled));
    assert!(recorded(&calls).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn delay_gathers_spawned_siblings_into_one_batch() {
    let context = DummyContext::default();
    let calls = context.calls.clone();
    let loader = Arc::new(Loader::with_config(
        EchoLoader,
        context,
        LoaderConfig::default().with_delay(std::time::Duration::from_millis(100)),
    ));

    let handles = (1..=3)
        .map(|id| {
            let loader = loader.clone();
            tokio::spawn(async move { loader.load(key(id)).wait().await })
        })
        .collect::<Vec<_>>();

    let outcomes = future::join_all(handles).await;
    for (id, outcome) in (1..=3).zip(outcomes) {
        assert_eq!(outcome.unwrap(), value(id));
    }
    let mut fetched = recorded(&calls);
    assert_eq!(fetched.len(), 1);
    fetched[0].sort();
    assert_eq!(fetched[0], batch(&[1, 2, 3]));
}
