//! Query execution
//!
//! A find scans the index named by the selector's first field over the
//! translated range, in index order. The context's limit counts scanned
//! records that satisfy the first field's predicate; the other predicates
//! are applied to those records afterwards.
//!
//! Selectors whose first field is not an index of the target store are
//! rejected before any transaction is opened.

use serde_json::Value;

use crate::completion::Completion;
use crate::connection::Context;
use crate::engine::{Cursor, Key, TransactionMode};
use crate::errors::{StoreError, StoreResult};
use crate::observability::{Event, Logger, ObservationScope, Severity};

use super::filter::SecondaryFilter;
use super::range::RangeTranslator;
use super::selector::Selector;

/// What a scan visitor wants next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanControl {
    Continue,
    Stop,
}

/// One matched record, seen from inside a read-write scan
pub struct CursorEntry<'c, 'tx> {
    cursor: &'c mut Cursor<'tx>,
    value: Value,
}

impl CursorEntry<'_, '_> {
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn primary_key(&self) -> Option<&Key> {
        self.cursor.primary_key()
    }

    /// Deletes the record; the scan moves on to the next match
    pub fn delete(&mut self) -> StoreResult<Option<Value>> {
        self.cursor.delete()
    }

    /// Replaces the record; its primary key must not change
    pub fn update(&mut self, record: Value) -> StoreResult<Key> {
        self.cursor.update(record)
    }
}

/// Runs selectors and key lookups against one store
pub struct QueryExecutor;

impl QueryExecutor {
    /// Checks the selector's first field is an index of the target store
    pub fn check_indexed(ctx: &Context, selector: &Selector) -> StoreResult<()> {
        let field = &selector.first().field;
        let indexes = ctx.connection().index_names(ctx.store())?;
        if !indexes.iter().any(|index| index == field) {
            Logger::log(
                Severity::Warn,
                Event::QueryRejected.as_str(),
                &[("field", field.as_str()), ("store", ctx.store())],
            );
            return Err(StoreError::schema_violation(ctx.store(), field.as_str()));
        }
        Ok(())
    }

    /// Finds every record matching `selector`.
    ///
    /// Fails immediately with `SchemaViolation` or `StoreNotFound`; otherwise
    /// returns a completion settling with the matched, projected records.
    pub fn find(ctx: &Context, selector: Selector) -> StoreResult<Completion<Vec<Value>>> {
        Self::check_indexed(ctx, &selector)?;
        let ctx = ctx.clone();

        Ok(Completion::from_future(async move {
            let call_id = ctx.call_id.to_string();
            let scope = ObservationScope::with_fields(
                Event::Find.as_str(),
                &[("call_id", call_id.as_str()), ("store", ctx.store())],
            );

            match Self::collect(&ctx, &selector).await {
                Ok((scanned, rows)) => {
                    let scanned = scanned.to_string();
                    let returned = rows.len().to_string();
                    scope.complete_with_fields(&[
                        ("returned", returned.as_str()),
                        ("scanned", scanned.as_str()),
                    ]);
                    Self::display(&ctx, &rows);
                    Ok(rows)
                }
                Err(e) => {
                    scope.fail(&e.to_string());
                    Err(e)
                }
            }
        }))
    }

    /// Reads one record by primary key, projected when fields are set
    pub fn get(ctx: &Context, key: &Value) -> Completion<Option<Value>> {
        let primary = match Key::from_json(key) {
            Some(primary) => primary,
            None => {
                return Completion::failed(StoreError::invalid_selector(format!(
                    "{} is not a valid key",
                    key
                )))
            }
        };
        let ctx = ctx.clone();

        Completion::from_future(async move {
            let tx = ctx
                .connection()
                .transaction(ctx.store(), TransactionMode::ReadOnly)
                .await?;
            let record = tx.get(&primary)?;
            tx.complete().await?;

            let record = match (record, ctx.fields()) {
                (Some(record), Some(fields)) => Some(SecondaryFilter::project(&record, fields)),
                (record, _) => record,
            };
            if let Some(record) = &record {
                Self::display(&ctx, std::slice::from_ref(record));
            }
            Ok(record)
        })
    }

    /// Visits each record matching `selector` inside a read-write transaction.
    ///
    /// The visitor may delete or replace the entry it is given. The
    /// transaction commits once the cursor is exhausted, the visitor returns
    /// `Stop`, or the context's limit of visited records is reached. A
    /// visitor error aborts the transaction. Settles with the number of
    /// records visited.
    pub fn scan<F>(ctx: &Context, selector: Selector, mut visitor: F) -> StoreResult<Completion<usize>>
    where
        F: FnMut(&mut CursorEntry<'_, '_>) -> StoreResult<ScanControl> + Send + 'static,
    {
        Self::check_indexed(ctx, &selector)?;
        let ctx = ctx.clone();

        Ok(Completion::from_future(async move {
            let first = selector.first();
            let range = RangeTranslator::translate(&first.condition);
            let limit = ctx.limit();

            let mut tx = ctx
                .connection()
                .transaction(ctx.store(), TransactionMode::ReadWrite)
                .await?;

            let mut visited = 0;
            let mut failure = None;
            {
                let mut cursor = tx.open_cursor(Some(&first.field), &range)?;
                while let Some(value) = cursor.next() {
                    if !SecondaryFilter::matches(&value, selector.residual()) {
                        continue;
                    }

                    let mut entry = CursorEntry {
                        cursor: &mut cursor,
                        value,
                    };
                    let control = visitor(&mut entry);
                    visited += 1;

                    match control {
                        Ok(ScanControl::Continue) => {}
                        Ok(ScanControl::Stop) => break,
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                    if limit.is_some_and(|n| visited >= n) {
                        break;
                    }
                }
            }

            if let Some(e) = failure {
                tx.abort(e);
            }
            tx.complete().await?;
            Ok(visited)
        }))
    }

    async fn collect(ctx: &Context, selector: &Selector) -> StoreResult<(usize, Vec<Value>)> {
        let first = selector.first();
        let range = RangeTranslator::translate(&first.condition);

        let mut tx = ctx
            .connection()
            .transaction(ctx.store(), TransactionMode::ReadOnly)
            .await?;
        let first_check: &[_] = if selector.first_needs_check() {
            std::slice::from_ref(first)
        } else {
            &[]
        };
        let scanned: Vec<Value> = {
            let cursor = tx
                .open_cursor(Some(&first.field), &range)?
                .filter(|record| SecondaryFilter::matches(record, first_check));
            match ctx.limit() {
                Some(n) => cursor.take(n).collect(),
                None => cursor.collect(),
            }
        };
        tx.complete().await?;

        let count = scanned.len();
        let rows = SecondaryFilter::filter(scanned, selector.rest(), ctx.fields());
        Ok((count, rows))
    }

    /// Emits `rows` as a `RESULT_DISPLAY` line when the context asks for it
    pub(crate) fn display(ctx: &Context, rows: &[Value]) {
        if !ctx.display() {
            return;
        }
        let call_id = ctx.call_id.to_string();
        let at = ctx.created_at().to_rfc3339();
        let rendered = Value::Array(rows.to_vec()).to_string();
        Logger::emit(
            Severity::Info,
            Event::ResultDisplay.as_str(),
            &[
                ("at", at.as_str()),
                ("call_id", call_id.as_str()),
                ("rows", rendered.as_str()),
                ("store", ctx.store()),
            ],
        );
    }
}
