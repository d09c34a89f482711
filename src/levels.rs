//! Per-level facade
//!
//! A `LevelStore` binds a level (store name) and a user id and routes
//! `find / insert / update / remove` to the query and mutation executors.
//! Every call opens the user's database and derives a fresh context from
//! the call's parameters.
//!
//! ```ignore
//! let plans = LevelStore::new(manager, "plan");
//! plans.insert(json!([{"planid": 1, "status": "active"}]), CallParams::new()).await?;
//! let found = plans.find(Lookup::parse(json!({"status": "active"}))?, CallParams::new()).await?;
//! ```

use serde_json::Value;

use crate::completion::{Completion, Step};
use crate::connection::{CallParams, Connection, ConnectionManager, Context, OpenOptions};
use crate::mutation::{normalize, MutationExecutor, RemoveTarget, Updated, WriteRequest};
use crate::query::{Lookup, QueryExecutor};
use crate::schema::StoreDef;

/// Result of a facade find
#[derive(Debug, Clone, PartialEq)]
pub enum Found {
    /// Key lookup
    One(Option<Value>),
    /// Selector query
    Many(Vec<Value>),
}

impl Found {
    /// Every record found, in order
    pub fn into_records(self) -> Vec<Value> {
        match self {
            Found::One(record) => record.into_iter().collect(),
            Found::Many(records) => records,
        }
    }
}

/// CRUD facade over one level of a user's database
#[derive(Debug, Clone)]
pub struct LevelStore {
    manager: ConnectionManager,
    level: String,
    options: OpenOptions,
}

impl LevelStore {
    /// Facade over `level` for the configured default user
    pub fn new(manager: ConnectionManager, level: impl Into<String>) -> Self {
        Self {
            manager,
            level: level.into(),
            options: OpenOptions::default(),
        }
    }

    /// Binds the facade to a user id
    pub fn with_userid(mut self, userid: impl Into<String>) -> Self {
        self.options.userid = Some(userid.into());
        self
    }

    /// Opens at a fixed schema version
    pub fn with_version(mut self, version: u32) -> Self {
        self.options.version = Some(version);
        self
    }

    pub fn level(&self) -> &str {
        &self.level
    }

    /// Opens the bound level; `options` override the bound user and version
    pub fn open(&self, options: OpenOptions) -> Completion<Context> {
        let options = OpenOptions {
            userid: options.userid.or_else(|| self.options.userid.clone()),
            version: options.version.or(self.options.version),
        };
        self.manager.open_level(&self.level, options)
    }

    /// Finds by primary key or by selector
    pub fn find(&self, lookup: Lookup, params: CallParams) -> Completion<Found> {
        self.context(params).then(move |ctx| match lookup {
            Lookup::Key(key) => Step::Pending(QueryExecutor::get(&ctx, &key).map(Found::One)),
            Lookup::Query(selector) => match QueryExecutor::find(&ctx, selector) {
                Ok(rows) => Step::Pending(rows.map(Found::Many)),
                Err(e) => Step::from(Err(e)),
            },
        })
    }

    /// Inserts one record or a list of records
    pub fn insert(&self, data: Value, params: CallParams) -> Completion<Vec<Value>> {
        let records = normalize(data);
        self.context(params)
            .then(move |ctx| Step::Pending(MutationExecutor::insert(&ctx, records)))
    }

    /// Runs a write request with default parameters
    pub fn update(&self, request: WriteRequest) -> Completion<Updated> {
        self.update_with(request, CallParams::default())
    }

    pub fn update_with(&self, request: WriteRequest, params: CallParams) -> Completion<Updated> {
        self.context(params)
            .then(move |ctx| Step::Pending(MutationExecutor::update(&ctx, request)))
    }

    /// Insert-or-update
    pub fn init(&self, request: WriteRequest) -> Completion<Updated> {
        self.context(CallParams::default())
            .then(move |ctx| Step::Pending(MutationExecutor::init(&ctx, request)))
    }

    /// Removes by key, record list or selector; settles with the deleted keys
    pub fn remove(&self, target: impl Into<RemoveTarget>, params: CallParams) -> Completion<Vec<Value>> {
        let target = target.into();
        self.context(params).then(move |ctx| {
            let key_path = match ctx.connection().key_path(ctx.store()) {
                Ok(key_path) => key_path,
                Err(e) => return Step::from(Err(e)),
            };
            Step::Pending(
                MutationExecutor::remove(&ctx, target).map(move |removed| removed.into_keys(&key_path)),
            )
        })
    }

    /// Declares a new store in the bound user's database.
    ///
    /// Upgrades to `version`, or the current version plus one.
    pub fn create(&self, def: StoreDef, version: Option<u32>) -> Completion<Connection> {
        let manager = self.manager.clone();
        let name = self.manager.db_name(self.options.userid.as_deref());

        self.manager
            .open(&name, None)
            .then(move |connection| Step::Pending(manager.create_store(&connection, def, version)))
    }

    fn context(&self, params: CallParams) -> Completion<Context> {
        let level = params.level.clone().unwrap_or_else(|| self.level.clone());
        let options = OpenOptions {
            userid: params.userid.clone().or_else(|| self.options.userid.clone()),
            version: self.options.version,
        };

        self.manager
            .open_level(&level, options)
            .map(move |ctx| ctx.with_params(&params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::schema::SchemaCatalog;
    use serde_json::json;

    fn plans() -> LevelStore {
        let catalog = SchemaCatalog::from_defs(
            vec![
                StoreDef::new("plan", "planid").with_index("status"),
                StoreDef::level("unit"),
            ],
            "test",
        )
        .unwrap();
        LevelStore::new(
            ConnectionManager::new(StoreConfig::default().with_schemas(catalog)),
            "plan",
        )
    }

    #[tokio::test]
    async fn test_open_defaults_to_configured_user() {
        let ctx = plans().open(OpenOptions::default()).await.unwrap();
        assert_eq!(ctx.connection().name(), "1389_db");
        assert_eq!(ctx.store(), "plan");
    }

    #[tokio::test]
    async fn test_find_by_key_and_selector() {
        let plans = plans();
        plans
            .insert(json!([{"planid": 1, "status": "active"}]), CallParams::new())
            .await
            .unwrap();

        let one = plans.find(Lookup::key(1), CallParams::new()).await.unwrap();
        assert_eq!(one, Found::One(Some(json!({"planid": 1, "status": "active"}))));

        let many = plans
            .find(Lookup::parse(json!({"status": "active"})).unwrap(), CallParams::new())
            .await
            .unwrap();
        assert_eq!(many.into_records().len(), 1);
    }

    #[tokio::test]
    async fn test_users_are_partitioned() {
        let plans = plans();
        plans
            .insert(json!({"planid": 1, "status": "active"}), CallParams::new().with_userid("a"))
            .await
            .unwrap();

        let other = plans
            .find(Lookup::key(1), CallParams::new().with_userid("b"))
            .await
            .unwrap();
        assert_eq!(other, Found::One(None));
    }

    #[tokio::test]
    async fn test_remove_record_list() {
        let plans = plans();
        plans
            .insert(
                json!([{"planid": 1, "status": "a"}, {"planid": 2, "status": "b"}]),
                CallParams::new(),
            )
            .await
            .unwrap();

        let keys = plans
            .remove(vec![json!({"planid": 2})], CallParams::new())
            .await
            .unwrap();
        assert_eq!(keys, vec![json!(2)]);
    }

    #[tokio::test]
    async fn test_create_new_level() {
        let plans = plans();
        let connection = plans
            .create(StoreDef::new("task", "taskid").with_index("planid"), None)
            .await
            .unwrap();
        assert_eq!(connection.version(), 2);

        let tasks = LevelStore::new(plans.manager.clone(), "task");
        tasks
            .insert(json!({"taskid": "t1", "planid": 1}), CallParams::new())
            .await
            .unwrap();
        let found = tasks
            .find(Lookup::parse(json!({"planid": 1})).unwrap(), CallParams::new())
            .await
            .unwrap();
        assert_eq!(found.into_records().len(), 1);
    }
}
