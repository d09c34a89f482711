//! Mutation execution
//!
//! Every mutation runs in one read-write transaction on the context's store.
//! Results settle only after the transaction has committed; an abort fails
//! the completion and leaves the store as it was. Inserted and removed
//! results are displayed when the context asks for it.

use std::future::Future;
use std::mem;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Map, Value};

use crate::completion::Completion;
use crate::connection::Context;
use crate::engine::{Key, TransactionMode};
use crate::errors::{StoreError, StoreResult};
use crate::observability::{Event, ObservationScope};
use crate::query::{Lookup, QueryExecutor, ScanControl, Selector};

use super::request::{RemoveTarget, Removed, Updated, WriteRequest};

/// Runs inserts, updates and removes against one store
pub struct MutationExecutor;

impl MutationExecutor {
    /// Adds every record.
    ///
    /// Settles with the input list once committed. A duplicate or invalid
    /// key aborts the transaction and no record of the batch is kept.
    pub fn insert(ctx: &Context, records: Vec<Value>) -> Completion<Vec<Value>> {
        Self::write_all(ctx, records, Event::Insert, false)
    }

    /// Adds or replaces every record
    pub fn put(ctx: &Context, records: Vec<Value>) -> Completion<Vec<Value>> {
        Self::write_all(ctx, records, Event::Update, true)
    }

    /// Runs a write request
    pub fn update(ctx: &Context, request: WriteRequest) -> Completion<Updated> {
        match request {
            WriteRequest::InsertMany(records) => Self::insert(ctx, records).map(Updated::Inserted),
            WriteRequest::UpdateOne {
                target: Lookup::Key(key),
                data,
            } => Self::update_key(ctx, &key, data).map(Updated::One),
            WriteRequest::UpdateOne {
                target: Lookup::Query(selector),
                data,
            } => match Self::update_query(ctx, selector, data) {
                Ok(completion) => completion.map(Updated::Many),
                Err(e) => Completion::failed(e),
            },
        }
    }

    /// Insert-or-update: `InsertMany` replaces existing records
    pub fn init(ctx: &Context, request: WriteRequest) -> Completion<Updated> {
        match request {
            WriteRequest::InsertMany(records) => Self::put(ctx, records).map(Updated::Inserted),
            update => Self::update(ctx, update),
        }
    }

    /// Merges `data` over the record stored under `key`.
    ///
    /// Fails with `RecordNotFound` if there is no such record.
    pub fn update_key(ctx: &Context, key: &Value, data: Value) -> Completion<Value> {
        let primary = match Self::parse_key(key) {
            Ok(primary) => primary,
            Err(e) => return Completion::failed(e),
        };
        let store = ctx.store().to_string();
        let connection = ctx.connection().clone();

        Self::observed(ctx, Event::Update, async move {
            let mut tx = connection
                .transaction(&store, TransactionMode::ReadWrite)
                .await?;
            let record = tx
                .get(&primary)?
                .ok_or_else(|| StoreError::record_not_found(store.as_str(), &primary))?;

            let merged = merge(&record, &data, tx.key_path())?;
            tx.put(merged.clone())?;
            tx.complete().await?;
            Ok(merged)
        })
    }

    /// Merges `data` over every record matching `selector`
    pub fn update_query(
        ctx: &Context,
        selector: Selector,
        data: Value,
    ) -> StoreResult<Completion<Vec<Value>>> {
        let key_path = ctx.connection().key_path(ctx.store())?;
        let updated = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&updated);

        let scan = QueryExecutor::scan(ctx, selector, move |entry| {
            let merged = merge(entry.value(), &data, &key_path)?;
            entry.update(merged.clone())?;
            sink.lock().unwrap_or_else(PoisonError::into_inner).push(merged);
            Ok(ScanControl::Continue)
        })?;

        Ok(Self::observed(ctx, Event::Update, async move {
            scan.await?;
            Ok(take(&updated))
        }))
    }

    /// Runs a remove
    pub fn remove(ctx: &Context, target: RemoveTarget) -> Completion<Removed> {
        match target {
            RemoveTarget::Key(key) => Self::remove_key(ctx, &key).map(Removed::Keys),
            RemoveTarget::Records(records) => Self::remove_records(ctx, records).map(Removed::Keys),
            RemoveTarget::Query(selector) => match Self::remove_query(ctx, selector) {
                Ok(completion) => completion.map(Removed::Records),
                Err(e) => Completion::failed(e),
            },
        }
    }

    /// Deletes one record; settles with `[key]`, or `[]` if it did not exist
    pub fn remove_key(ctx: &Context, key: &Value) -> Completion<Vec<Value>> {
        let primary = match Self::parse_key(key) {
            Ok(primary) => primary,
            Err(e) => return Completion::failed(e),
        };
        let key = key.clone();
        let target = ctx.clone();

        Self::observed(ctx, Event::Remove, async move {
            let mut tx = target
                .connection()
                .transaction(target.store(), TransactionMode::ReadWrite)
                .await?;
            let deleted = tx.delete(&primary)?;
            tx.complete().await?;

            let keys = deleted.map(|_| vec![key]).unwrap_or_default();
            QueryExecutor::display(&target, &keys);
            Ok(keys)
        })
    }

    /// Deletes each record by its key-path value; settles with the deleted keys
    pub fn remove_records(ctx: &Context, records: Vec<Value>) -> Completion<Vec<Value>> {
        let target = ctx.clone();

        Self::observed(ctx, Event::Remove, async move {
            let mut tx = target
                .connection()
                .transaction(target.store(), TransactionMode::ReadWrite)
                .await?;

            let mut keys = Vec::new();
            for record in &records {
                let primary = match tx.store().primary_key_of(record) {
                    Ok(primary) => primary,
                    Err(e) => {
                        tx.abort(e);
                        break;
                    }
                };
                if tx.delete(&primary)?.is_some() {
                    keys.push(primary.to_json());
                }
            }

            tx.complete().await?;
            QueryExecutor::display(&target, &keys);
            Ok(keys)
        })
    }

    /// Deletes every record matching `selector`; settles with the deleted records
    pub fn remove_query(ctx: &Context, selector: Selector) -> StoreResult<Completion<Vec<Value>>> {
        let removed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&removed);

        let scan = QueryExecutor::scan(ctx, selector, move |entry| {
            let record = entry.value().clone();
            entry.delete()?;
            sink.lock().unwrap_or_else(PoisonError::into_inner).push(record);
            Ok(ScanControl::Continue)
        })?;

        let target = ctx.clone();
        Ok(Self::observed(ctx, Event::Remove, async move {
            scan.await?;
            let removed = take(&removed);
            QueryExecutor::display(&target, &removed);
            Ok(removed)
        }))
    }

    fn write_all(ctx: &Context, records: Vec<Value>, event: Event, replace: bool) -> Completion<Vec<Value>> {
        let target = ctx.clone();

        Self::observed(ctx, event, async move {
            let mut tx = target
                .connection()
                .transaction(target.store(), TransactionMode::ReadWrite)
                .await?;
            for record in &records {
                let written = if replace {
                    tx.put(record.clone())
                } else {
                    tx.add(record.clone())
                };
                // The transaction is aborted; complete reports why
                if written.is_err() {
                    break;
                }
            }
            tx.complete().await?;
            QueryExecutor::display(&target, &records);
            Ok(records)
        })
    }

    fn parse_key(key: &Value) -> StoreResult<Key> {
        Key::from_json(key)
            .ok_or_else(|| StoreError::invalid_selector(format!("{} is not a valid key", key)))
    }

    fn observed<T, F>(ctx: &Context, event: Event, future: F) -> Completion<T>
    where
        T: Send + 'static,
        F: Future<Output = StoreResult<T>> + Send + 'static,
    {
        let call_id = ctx.call_id.to_string();
        let store = ctx.store().to_string();

        Completion::from_future(async move {
            let scope = ObservationScope::with_fields(
                event.as_str(),
                &[("call_id", call_id.as_str()), ("store", store.as_str())],
            );
            let result = future.await;
            match &result {
                Ok(_) => scope.complete(),
                Err(e) => scope.fail(&e.to_string()),
            }
            result
        })
    }
}

/// Top-level merge of `data` over `record`; the key-path field never changes
fn merge(record: &Value, data: &Value, key_path: &str) -> StoreResult<Value> {
    let updates = data
        .as_object()
        .ok_or_else(|| StoreError::invalid_selector(format!("update data must be an object, got {}", data)))?;
    let mut merged: Map<String, Value> = record.as_object().cloned().unwrap_or_default();

    for (field, value) in updates {
        if field != key_path {
            merged.insert(field.clone(), value.clone());
        }
    }
    Ok(Value::Object(merged))
}

fn take(collected: &Mutex<Vec<Value>>) -> Vec<Value> {
    mem::take(&mut *collected.lock().unwrap_or_else(PoisonError::into_inner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::CallParams;
    use crate::engine::{Engine, OpenEvent};
    use serde_json::json;

    async fn plan_context() -> Context {
        let connection = match Engine::new().open("1389_db", None) {
            OpenEvent::UpgradeNeeded(mut change) => {
                change.create_store("plan", "planid");
                change.create_index("plan", "status").unwrap();
                change.commit()
            }
            _ => panic!("expected upgrade"),
        };
        let ctx = Context::new(connection, "plan");
        MutationExecutor::insert(
            &ctx,
            vec![
                json!({"planid": 1, "status": "active", "owner": "u1"}),
                json!({"planid": 2, "status": "active", "owner": "u2"}),
                json!({"planid": 3, "status": "done", "owner": "u1"}),
            ],
        )
        .await
        .unwrap();
        ctx
    }

    async fn all(ctx: &Context) -> Vec<Value> {
        let selector = Selector::parse(&json!({"status": {"$gte": ""}})).unwrap();
        QueryExecutor::find(ctx, selector).unwrap().await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_returns_input() {
        let ctx = plan_context().await;
        let inserted = MutationExecutor::insert(&ctx, vec![json!({"planid": 4, "status": "new"})])
            .await
            .unwrap();
        assert_eq!(inserted, vec![json!({"planid": 4, "status": "new"})]);
        assert_eq!(all(&ctx).await.len(), 4);
    }

    #[tokio::test]
    async fn test_insert_duplicate_rolls_back_batch() {
        let ctx = plan_context().await;
        let err = MutationExecutor::insert(
            &ctx,
            vec![
                json!({"planid": 10, "status": "new"}),
                json!({"planid": 1, "status": "new"}),
            ],
        )
        .await
        .unwrap_err();

        assert_eq!(err.code(), "OFFSTORE_TRANSACTION_ABORTED");
        assert_eq!(all(&ctx).await.len(), 3);
    }

    #[tokio::test]
    async fn test_insert_without_key_aborts() {
        let ctx = plan_context().await;
        let err = MutationExecutor::insert(&ctx, vec![json!({"status": "new"})])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "OFFSTORE_TRANSACTION_ABORTED");
    }

    #[tokio::test]
    async fn test_update_key_merges_fields() {
        let ctx = plan_context().await;
        let updated = MutationExecutor::update(
            &ctx,
            WriteRequest::update(Lookup::key(1), json!({"status": "done", "planid": 99})),
        )
        .await
        .unwrap();

        assert_eq!(
            updated,
            Updated::One(json!({"planid": 1, "status": "done", "owner": "u1"}))
        );
    }

    #[tokio::test]
    async fn test_update_missing_key() {
        let ctx = plan_context().await;
        let err = MutationExecutor::update_key(&ctx, &json!(42), json!({"status": "x"}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "OFFSTORE_RECORD_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_update_by_query() {
        let ctx = plan_context().await;
        let selector = Selector::parse(&json!({"status": "active"})).unwrap();
        let updated = MutationExecutor::update(&ctx, WriteRequest::update(selector, json!({"owner": "u9"})))
            .await
            .unwrap()
            .into_records();

        assert_eq!(updated.len(), 2);
        assert!(updated.iter().all(|r| r["owner"] == "u9"));
        assert_eq!(all(&ctx).await.iter().filter(|r| r["owner"] == "u9").count(), 2);
    }

    #[tokio::test]
    async fn test_remove_by_key() {
        let ctx = plan_context().await;
        assert_eq!(
            MutationExecutor::remove_key(&ctx, &json!(2)).await.unwrap(),
            vec![json!(2)]
        );
        assert!(MutationExecutor::remove_key(&ctx, &json!(2))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_remove_records() {
        let ctx = plan_context().await;
        let keys = MutationExecutor::remove_records(
            &ctx,
            vec![json!({"planid": 1}), json!({"planid": 3}), json!({"planid": 7})],
        )
        .await
        .unwrap();
        assert_eq!(keys, vec![json!(1), json!(3)]);
        assert_eq!(all(&ctx).await.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_by_query_then_empty() {
        let ctx = plan_context().await;
        let selector = Selector::parse(&json!({"status": "active"})).unwrap();

        let removed = MutationExecutor::remove(&ctx, RemoveTarget::Query(selector.clone()))
            .await
            .unwrap();
        assert_eq!(removed.into_keys("planid"), vec![json!(1), json!(2)]);

        let again = QueryExecutor::find(&ctx, selector).unwrap().await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_init_replaces_existing() {
        let ctx = plan_context().await;
        MutationExecutor::init(
            &ctx,
            WriteRequest::insert(json!({"planid": 1, "status": "archived"})),
        )
        .await
        .unwrap();

        let record = QueryExecutor::get(&ctx, &json!(1)).await.unwrap().unwrap();
        assert_eq!(record, json!({"planid": 1, "status": "archived"}));
    }

    #[test]
    fn test_merge_rejects_non_object() {
        assert!(merge(&json!({"planid": 1}), &json!(5), "planid").is_err());
    }

    #[tokio::test]
    async fn test_display_on_insert_and_remove() {
        let ctx = plan_context()
            .await
            .with_params(&CallParams::new().with_display(true));

        let inserted = MutationExecutor::insert(&ctx, vec![json!({"planid": 5, "status": "new"})])
            .await
            .unwrap();
        assert_eq!(inserted, vec![json!({"planid": 5, "status": "new"})]);

        let selector = Selector::parse(&json!({"status": "new"})).unwrap();
        let removed = MutationExecutor::remove_query(&ctx, selector)
            .unwrap()
            .await
            .unwrap();
        assert_eq!(removed, vec![json!({"planid": 5, "status": "new"})]);
        assert_eq!(all(&ctx).await.len(), 3);
    }
}
