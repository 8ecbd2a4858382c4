use std::collections::HashMap;

use async_trait::async_trait;
use batchload_rs::{ordered_by_keys, BatchFunction, BatchResult, LoadError, Loader, ResolverKey};

// Empty functor that implements the BatchFunction trait. For this example, it
// trivially loads values from some HashMap.
struct MyBatchFn;

#[async_trait]
impl BatchFunction<ResolverKey, String> for MyBatchFn {
    type Context = HashMap<i64, String>;

    async fn load(keys: &[ResolverKey], context: &Self::Context) -> BatchResult<String> {
        let found = keys
            .iter()
            .filter_map(|k| k.parse::<i64>().ok())
            .filter_map(|id| context.get(&id).cloned().map(|v| (id.to_string(), v)));
        Ok(ordered_by_keys("film", keys, found))
    }
}

#[tokio::main]
async fn main() {
    let mut context = HashMap::new();
    context.insert(2001, "a space odyssey".to_owned());
    context.insert(7, "samurai".to_owned());
    context.insert(12, "angry men".to_owned());

    let loader = Loader::new(MyBatchFn {}, context);

    assert_eq!(loader.load(ResolverKey::new(7)).wait().await.as_deref(), Ok("samurai"));
    assert_eq!(
        loader.load(ResolverKey::new(15)).wait().await,
        Err(LoadError::not_found("film", "15"))
    );

    let thunks = loader.load_many([12, 2010, 2001].iter().map(ResolverKey::new));
    let films = futures::future::join_all(thunks.iter().map(|t| t.wait())).await;
    assert_eq!(
        films.iter().map(|f| f.as_deref().ok()).collect::<Vec<_>>(),
        vec![Some("angry men"), None, Some("a space odyssey")]
    );
}
