//! Resolves a user -> orders -> products -> categories tree plus a top level category list,
//! printing one batch function call per entity kind and level instead of one per node.
//!
//! Run with `RUST_LOG=debug` to watch the loaders coalesce keys.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use batchload_rs::{
    fan_out, fan_out_each, ordered_by_keys, BatchFunction, BatchResult, LoadError, Loader,
    ResolverKey, Scope,
};
use futures::future;
use serde::Serialize;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize)]
struct Category {
    id: u32,
    name: String,
}

#[derive(Debug, Clone)]
struct Product {
    id: u32,
    title: String,
    category_ids: Vec<u32>,
}

#[derive(Debug, Clone)]
struct Order {
    id: u32,
    user_id: u32,
    product_ids: Vec<u32>,
}

#[derive(Debug, Clone)]
struct User {
    id: u32,
    first_name: String,
    last_name: String,
}

/// Stand-in for a remote data source.
struct Client;

impl Client {
    async fn list_user_orders(&self, user_ids: &[u32]) -> Result<Vec<Order>, String> {
        tracing::info!(?user_ids, "ListUserOrders");
        Ok(vec![Order { id: 200, user_id: 1, product_ids: vec![100] }])
    }

    async fn list_products(&self, product_ids: &[u32]) -> Result<Vec<Product>, String> {
        tracing::info!(?product_ids, "ListProducts");
        Ok(product_ids
            .iter()
            .map(|&id| Product { id, title: format!("product#{}", id), category_ids: vec![1, 2, 3] })
            .collect())
    }

    async fn list_categories(&self, category_ids: &[u32]) -> Result<Vec<Category>, String> {
        tracing::info!(?category_ids, "ListCategories");
        Ok(category_ids.iter().map(|&id| Category { id, name: format!("name#{}", id) }).collect())
    }
}

fn parse_ids(keys: &[ResolverKey]) -> Result<Vec<u32>, LoadError> {
    keys.iter().map(|k| k.parse::<u32>()).collect()
}

struct UserOrdersBatch;

#[async_trait]
impl BatchFunction<ResolverKey, Vec<Order>> for UserOrdersBatch {
    type Context = Arc<Client>;

    async fn load(keys: &[ResolverKey], client: &Arc<Client>) -> BatchResult<Vec<Order>> {
        let user_ids = parse_ids(keys)?;
        let orders = client.list_user_orders(&user_ids).await.map_err(LoadError::fetch)?;
        let mut by_user = HashMap::<u32, Vec<Order>>::new();
        for order in orders {
            by_user.entry(order.user_id).or_default().push(order);
        }
        Ok(ordered_by_keys("orders", keys, by_user.into_iter().map(|(id, o)| (id.to_string(), o))))
    }
}

struct ProductBatch;

#[async_trait]
impl BatchFunction<ResolverKey, Product> for ProductBatch {
    type Context = Arc<Client>;

    async fn load(keys: &[ResolverKey], client: &Arc<Client>) -> BatchResult<Product> {
        let products = client.list_products(&parse_ids(keys)?).await.map_err(LoadError::fetch)?;
        Ok(ordered_by_keys("product", keys, products.into_iter().map(|p| (p.id.to_string(), p))))
    }
}

struct CategoryBatch;

#[async_trait]
impl BatchFunction<ResolverKey, Category> for CategoryBatch {
    type Context = Arc<Client>;

    async fn load(keys: &[ResolverKey], client: &Arc<Client>) -> BatchResult<Category> {
        let categories =
            client.list_categories(&parse_ids(keys)?).await.map_err(LoadError::fetch)?;
        Ok(ordered_by_keys("category", keys, categories.into_iter().map(|c| (c.id.to_string(), c))))
    }
}

/// Everything one query needs, handed explicitly to each resolver.
struct QueryScope {
    scope: Scope,
    current_user: User,
    user_orders: Loader<ResolverKey, Vec<Order>>,
    products: Loader<ResolverKey, Product>,
    categories: Loader<ResolverKey, Category>,
}

impl QueryScope {
    fn new(client: Arc<Client>, current_user: User) -> Self {
        let scope = Scope::new();
        Self {
            current_user,
            user_orders: scope.named_loader("GetUserOrders", UserOrdersBatch, client.clone()),
            products: scope.named_loader("GetProducts", ProductBatch, client.clone()),
            categories: scope.named_loader("GetCategory", CategoryBatch, client),
            scope,
        }
    }
}

fn field<T: Serialize, E: std::fmt::Display>(
    path: &str,
    outcome: Result<T, E>,
    errors: &mut Vec<Value>,
) -> Value {
    match outcome {
        Ok(value) => serde_json::to_value(value).unwrap_or(Value::Null),
        Err(e) => {
            errors.push(json!({ "message": e.to_string(), "path": path }));
            Value::Null
        }
    }
}

async fn resolve_product(q: &QueryScope, product: Product, errors: &mut Vec<Value>) -> Value {
    // One `load` per category rather than `load_many`, to show they batch all the same.
    let categories = fan_out_each(&q.categories, &product, |p| {
        p.category_ids.iter().map(ResolverKey::new).collect()
    })
    .await;
    json!({
        "id": product.id,
        "title": product.title,
        "categories": field("categories", categories, errors),
    })
}

async fn resolve_order(q: &QueryScope, order: &Order) -> (Value, Vec<Value>) {
    let mut errors = Vec::new();
    let products = match fan_out(&q.products, order, |o| {
        o.product_ids.iter().map(ResolverKey::new).collect()
    })
    .await
    {
        Ok(products) => {
            let resolved = future::join_all(products.into_iter().map(|p| async move {
                let mut errors = Vec::new();
                let value = resolve_product(q, p, &mut errors).await;
                (value, errors)
            }))
            .await;
            let mut values = Vec::new();
            for (value, child_errors) in resolved {
                values.push(value);
                errors.extend(child_errors);
            }
            Value::Array(values)
        }
        Err(e) => field::<(), _>("products", Err(e), &mut errors),
    };
    (json!({ "id": order.id, "products": products }), errors)
}

async fn resolve_current_user(q: &QueryScope, errors: &mut Vec<Value>) -> Value {
    let user = &q.current_user;
    let orders = match q.user_orders.load(ResolverKey::new(user.id)).wait().await {
        Ok(orders) => {
            let resolved = future::join_all(orders.iter().map(|o| resolve_order(q, o))).await;
            let mut values = Vec::new();
            for (value, child_errors) in resolved {
                values.push(value);
                errors.extend(child_errors);
            }
            Value::Array(values)
        }
        Err(e) => field::<(), _>("orders", Err(e), errors),
    };
    json!({
        "id": user.id,
        "firstName": user.first_name,
        "lastName": user.last_name,
        "orders": orders,
    })
}

async fn resolve_categories(q: &QueryScope, errors: &mut Vec<Value>) -> Value {
    let categories = fan_out(&q.categories, &[1u32, 2, 3][..], |ids| {
        ids.iter().map(ResolverKey::new).collect()
    })
    .await;
    field("categories", categories, errors)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let current_user = User {
        id: 1,
        first_name: "user#1 first name".to_owned(),
        last_name: "user#1 last name".to_owned(),
    };
    let q = QueryScope::new(Arc::new(Client), current_user);

    let mut user_errors = Vec::new();
    let mut category_errors = Vec::new();
    let resolved = q
        .scope
        .run_with_timeout(
            Duration::from_secs(5),
            future::join(
                resolve_current_user(&q, &mut user_errors),
                resolve_categories(&q, &mut category_errors),
            ),
        )
        .await;

    let mut result = match resolved {
        Ok((user, categories)) => json!({ "data": { "currentUser": user, "categories": categories } }),
        Err(e) => {
            json!({ "data": Value::Null, "errors": [{ "message": e.to_string() }] })
        }
    };
    user_errors.extend(category_errors);
    if !user_errors.is_empty() {
        result["errors"] = Value::Array(user_errors);
    }
    tracing::info!(result = %result, "[GraphQL] result");
}
