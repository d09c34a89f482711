//! Connection manager
//!
//! Opens named, versioned databases and creates the declared stores when the
//! engine reports that an upgrade is needed. Store creation is idempotent:
//! stores that already exist are left untouched.

use std::sync::Arc;

use crate::completion::{Completion, Step};
use crate::config::StoreConfig;
use crate::engine::{Engine, OpenEvent, VersionChange};
use crate::errors::{StoreError, StoreResult};
use crate::observability::{log_event_with_fields, Event};
use crate::schema::StoreDef;

use super::context::Context;
use super::Connection;

/// Options of a level open
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenOptions {
    /// User whose database is opened; the configured default when None
    pub userid: Option<String>,
    /// Schema version; the configured version when None
    pub version: Option<u32>,
}

impl OpenOptions {
    pub fn userid(userid: impl Into<String>) -> Self {
        Self {
            userid: Some(userid.into()),
            version: None,
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }
}

/// Opens connections against one engine with one configuration.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    engine: Arc<Engine>,
    config: Arc<StoreConfig>,
}

impl ConnectionManager {
    /// Create a manager with a fresh engine
    pub fn new(config: StoreConfig) -> Self {
        Self::with_engine(Arc::new(Engine::new()), config)
    }

    /// Create a manager sharing an existing engine
    pub fn with_engine(engine: Arc<Engine>, config: StoreConfig) -> Self {
        config.apply_log_level();
        Self {
            engine,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Database name for a user id
    pub fn db_name(&self, userid: Option<&str>) -> String {
        self.config.db_name(userid)
    }

    /// Opens `name` at `version`, creating the catalog's stores on upgrade.
    pub fn open(&self, name: &str, version: Option<u32>) -> Completion<Connection> {
        self.open_with(name, version, &[])
    }

    /// Opens the database of `options.userid` and targets store `level`.
    ///
    /// Fails with `StoreNotFound` if the level is not a store of the database.
    pub fn open_level(&self, level: &str, options: OpenOptions) -> Completion<Context> {
        let name = self.db_name(options.userid.as_deref());
        let version = options.version.or(self.config.version);
        let level = level.to_string();

        self.open(&name, version).then(move |connection| {
            if !connection.contains_store(&level) {
                return Step::from(Err(StoreError::store_not_found(level)));
            }
            Step::Ready(Context::new(connection, level))
        })
    }

    /// Declares an additional store on an open connection.
    ///
    /// Upgrades the database to `version`, or its current version plus one;
    /// the catalog's stores are re-checked in the same upgrade. A version
    /// that is not newer than the current one fails.
    pub fn create_store(
        &self,
        connection: &Connection,
        def: StoreDef,
        version: Option<u32>,
    ) -> Completion<Connection> {
        if let Err(e) = def.validate("create_store") {
            return Completion::failed(e);
        }
        let current = connection.version();
        let version = version.unwrap_or(current + 1);
        if version <= current {
            return Completion::failed(StoreError::connection(
                connection.name(),
                format!(
                    "creating store '{}' needs a version above {}, got {}",
                    def.name, current, version
                ),
            ));
        }
        self.open_with(connection.name(), Some(version), &[def])
    }

    fn open_with(&self, name: &str, version: Option<u32>, extra: &[StoreDef]) -> Completion<Connection> {
        let (resolver, completion) = Completion::pending();
        let on_success = resolver.clone();
        let on_error = resolver.clone();
        let on_upgrade = resolver;

        match self.engine.open(name, version) {
            OpenEvent::Success(connection) => {
                let version = connection.version().to_string();
                log_event_with_fields(
                    Event::DbOpen,
                    &[("database", name), ("version", version.as_str())],
                );
                let _ = on_success.resolve(connection);
            }
            OpenEvent::UpgradeNeeded(change) => match self.upgrade(change, extra) {
                Ok(connection) => {
                    let _ = on_upgrade.resolve(connection);
                }
                Err(e) => {
                    let _ = on_upgrade.fail(e);
                }
            },
            OpenEvent::Error(e) => {
                let reason = e.to_string();
                log_event_with_fields(
                    Event::DbOpenFailed,
                    &[("database", name), ("reason", reason.as_str())],
                );
                let _ = on_error.fail(e);
            }
        }

        completion
    }

    fn upgrade(&self, mut change: VersionChange, extra: &[StoreDef]) -> StoreResult<Connection> {
        for def in self.config.schemas.iter().chain(extra) {
            if !change.create_store(&def.name, &def.primary_key_field) {
                continue;
            }
            for field in &def.indexed_fields {
                change.create_index(&def.name, field)?;
            }

            let indexes = def.indexed_fields.join(",");
            log_event_with_fields(
                Event::StoreCreated,
                &[
                    ("indexes", indexes.as_str()),
                    ("key_path", def.primary_key_field.as_str()),
                    ("store", def.name.as_str()),
                ],
            );
        }

        let old_version = change.old_version().to_string();
        let new_version = change.new_version().to_string();
        let connection = change.commit();
        log_event_with_fields(
            Event::DbUpgrade,
            &[
                ("database", connection.name()),
                ("new_version", new_version.as_str()),
                ("old_version", old_version.as_str()),
            ],
        );
        Ok(connection)
    }
}
