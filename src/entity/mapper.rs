//! Entity mapper: per-type descriptors and the CRUD verbs.

use crate::db::{ConnectionManager, FacadeMode, QueryFacade};
use crate::entity::inflect::pluralize;
use crate::entity::naming::split_by_capital_letter;
use crate::entity::{Entity, FieldSet, ID_FIELD};
use crate::error::{DbalError, DbalResult};
use crate::models::{Condition, Configuration, Fields, Params, Row};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

/// Connection name used when an entity does not choose one.
pub const DEFAULT_CONNECTION: &str = "default";

/// Table name for a type name: split at capitals, pluralize the last word,
/// join with `_`, lowercase. `InvoiceLine` → `invoice_lines`.
pub fn infer_table_name(type_name: &str) -> String {
    let mut words: Vec<String> = split_by_capital_letter(type_name)
        .into_iter()
        .map(str::to_string)
        .collect();
    if let Some(last) = words.last_mut() {
        *last = pluralize(last);
    }
    words.join("_").to_lowercase()
}

/// Resolved configuration of one entity type.
struct EntityDescriptor<T: Entity> {
    type_name: &'static str,
    fields: FieldSet<T>,
    table_name: RwLock<String>,
    connection_name: RwLock<String>,
    facade: OnceCell<Arc<QueryFacade>>,
}

impl<T: Entity> EntityDescriptor<T> {
    fn new() -> Self {
        let type_name = T::type_name();
        Self {
            type_name,
            fields: T::fields(),
            table_name: RwLock::new(infer_table_name(type_name)),
            connection_name: RwLock::new(T::connection_name().to_string()),
            facade: OnceCell::new(),
        }
    }

    fn table_name(&self) -> String {
        self.table_name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn connection_name(&self) -> String {
        self.connection_name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, slot: &RwLock<String>, setting: &str, value: String) -> DbalResult<()> {
        if self.facade.initialized() {
            return Err(DbalError::configuration_locked(self.type_name, setting));
        }
        *slot.write().unwrap_or_else(PoisonError::into_inner) = value;
        Ok(())
    }
}

/// Maps entity types to tables on named connections.
///
/// Each type gets one descriptor per mapper, built on first use. Types bound
/// to the same connection share one [`QueryFacade`], so a transaction begun
/// through [`EntityMapper::facade`] covers every entity the same task writes
/// on that connection. Other tasks wait for it to finish.
pub struct EntityMapper {
    manager: Arc<ConnectionManager>,
    mode: FacadeMode,
    configurations: HashMap<String, Configuration>,
    descriptors: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    facades: Mutex<HashMap<String, Arc<QueryFacade>>>,
}

impl std::fmt::Debug for EntityMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityMapper")
            .field("mode", &self.mode)
            .field("configurations", &self.configurations.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl EntityMapper {
    /// Create a strict mapper over `manager`.
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self {
            manager,
            mode: FacadeMode::Strict,
            configurations: HashMap::new(),
            descriptors: RwLock::new(HashMap::new()),
            facades: Mutex::new(HashMap::new()),
        }
    }

    /// Failure mode of the facades this mapper creates.
    pub fn with_mode(mut self, mode: FacadeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Configuration used to open connection `name` if it is not registered
    /// when an entity first needs it.
    pub fn with_configuration(mut self, name: impl Into<String>, config: Configuration) -> Self {
        self.configurations.insert(name.into(), config);
        self
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    // -------------------------------------------------------------------------
    // Descriptors
    // -------------------------------------------------------------------------

    fn descriptor<T: Entity>(&self) -> Arc<EntityDescriptor<T>> {
        let type_id = TypeId::of::<T>();

        let existing = self
            .descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&type_id)
            .cloned();
        if let Some(Ok(descriptor)) = existing.map(|d| d.downcast::<EntityDescriptor<T>>()) {
            return descriptor;
        }

        let mut descriptors = self
            .descriptors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        // Re-check under the write lock
        if let Some(Ok(descriptor)) = descriptors
            .get(&type_id)
            .cloned()
            .map(|d| d.downcast::<EntityDescriptor<T>>())
        {
            return descriptor;
        }

        let descriptor = Arc::new(EntityDescriptor::<T>::new());
        debug!(
            entity = descriptor.type_name,
            table = %descriptor.table_name(),
            "Registered entity type"
        );
        descriptors.insert(type_id, Arc::clone(&descriptor) as Arc<dyn Any + Send + Sync>);
        descriptor
    }

    /// Table used by `T`.
    pub fn table_name<T: Entity>(&self) -> String {
        self.descriptor::<T>().table_name()
    }

    /// Pin the table used by `T`. Fails once `T` has run a statement.
    pub fn set_table_name<T: Entity>(&self, table_name: impl Into<String>) -> DbalResult<()> {
        let descriptor = self.descriptor::<T>();
        descriptor.set(&descriptor.table_name, "table name", table_name.into())
    }

    /// Connection name used by `T`.
    pub fn connection_name<T: Entity>(&self) -> String {
        self.descriptor::<T>().connection_name()
    }

    /// Choose the connection used by `T`. Fails once `T` has run a statement.
    pub fn set_connection_name<T: Entity>(&self, name: impl Into<String>) -> DbalResult<()> {
        let descriptor = self.descriptor::<T>();
        descriptor.set(&descriptor.connection_name, "connection name", name.into())
    }

    /// Facade bound to `T`'s connection, binding it on first call.
    pub async fn facade<T: Entity>(&self) -> DbalResult<Arc<QueryFacade>> {
        let descriptor = self.descriptor::<T>();
        self.bind(&descriptor).await
    }

    async fn bind<T: Entity>(&self, descriptor: &EntityDescriptor<T>) -> DbalResult<Arc<QueryFacade>> {
        descriptor
            .facade
            .get_or_try_init(|| self.facade_for(descriptor.connection_name()))
            .await
            .cloned()
    }

    async fn facade_for(&self, name: String) -> DbalResult<Arc<QueryFacade>> {
        let mut facades = self.facades.lock().await;
        if let Some(facade) = facades.get(&name) {
            return Ok(Arc::clone(facade));
        }

        let connection = match self.manager.get(&name).await {
            Some(connection) => connection,
            None => match self.configurations.get(&name) {
                Some(config) => self.manager.create(config, &name).await?,
                None => return Err(DbalError::connection_not_found(name)),
            },
        };

        debug!(connection = %name, mode = ?self.mode, "Binding query facade");
        let facade = Arc::new(QueryFacade::with_mode(connection, self.mode));
        facades.insert(name, Arc::clone(&facade));
        Ok(facade)
    }

    // -------------------------------------------------------------------------
    // Mapping
    // -------------------------------------------------------------------------

    /// Build a `T` from a row. Columns without a matching field are ignored.
    pub fn hydrate<T: Entity>(&self, row: &Row) -> DbalResult<T> {
        self.descriptor::<T>().fields.hydrate(row)
    }

    /// Column values of `entity`, skipping fields named in `exclude`.
    pub fn extract_fields<T: Entity>(&self, entity: &T, exclude: &[&str]) -> Fields {
        self.descriptor::<T>().fields.extract(entity, exclude)
    }

    // -------------------------------------------------------------------------
    // Finders
    // -------------------------------------------------------------------------

    pub async fn find_by_id<T: Entity>(&self, id: i64) -> DbalResult<Option<T>> {
        let descriptor = self.descriptor::<T>();
        let sql = format!("SELECT * FROM {} WHERE id = ? LIMIT 1", descriptor.table_name());
        let mut found = self
            .query_descriptor(&descriptor, &sql, Params::positional([id]))
            .await?;
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.swap_remove(0))
        })
    }

    pub async fn find_all<T: Entity>(&self) -> DbalResult<Vec<T>> {
        let descriptor = self.descriptor::<T>();
        let sql = format!("SELECT * FROM {}", descriptor.table_name());
        self.query_descriptor(&descriptor, &sql, Params::none()).await
    }

    /// Run `sql` on `T`'s connection and hydrate every row.
    pub async fn find_by_query<T: Entity>(&self, sql: &str, params: Params) -> DbalResult<Vec<T>> {
        let descriptor = self.descriptor::<T>();
        self.query_descriptor(&descriptor, sql, params).await
    }

    async fn query_descriptor<T: Entity>(
        &self,
        descriptor: &EntityDescriptor<T>,
        sql: &str,
        params: Params,
    ) -> DbalResult<Vec<T>> {
        let facade = self.bind(descriptor).await?;
        let rows = facade.fetch_all(sql, params).await?;
        rows.iter().map(|row| descriptor.fields.hydrate(row)).collect()
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    /// Insert `entity` and assign the generated id to it.
    pub async fn create<T: Entity>(&self, entity: &mut T) -> DbalResult<bool> {
        let descriptor = self.descriptor::<T>();
        let facade = self.bind(&descriptor).await?;
        let fields = descriptor.fields.extract(entity, &[ID_FIELD]);

        let Some(id) = facade
            .insert_returning_id(&descriptor.table_name(), &fields)
            .await?
        else {
            return Ok(false);
        };

        match id.parse::<i64>() {
            Ok(id) => entity.set_id(Some(id)),
            Err(_) => warn!(
                entity = descriptor.type_name,
                id = %id,
                "Insert succeeded but the generated id is unavailable"
            ),
        }
        Ok(true)
    }

    /// Write `entity`'s fields to its row. Returns `false` without running
    /// any SQL when the id is unset.
    pub async fn update<T: Entity>(&self, entity: &T) -> DbalResult<bool> {
        let Some(id) = entity.id() else {
            return Ok(false);
        };

        let descriptor = self.descriptor::<T>();
        let facade = self.bind(&descriptor).await?;
        let fields = descriptor.fields.extract(entity, &[ID_FIELD]);
        let affected = facade
            .update(&descriptor.table_name(), &fields, &Condition::eq(ID_FIELD, id))
            .await?;
        Ok(affected > 0)
    }

    /// Delete `entity`'s row and clear its id. Returns `false` without
    /// running any SQL when the id is unset.
    pub async fn delete<T: Entity>(&self, entity: &mut T) -> DbalResult<bool> {
        let Some(id) = entity.id() else {
            return Ok(false);
        };

        let descriptor = self.descriptor::<T>();
        let facade = self.bind(&descriptor).await?;
        let affected = facade
            .delete(&descriptor.table_name(), &Condition::eq(ID_FIELD, id))
            .await?;
        if affected > 0 {
            entity.set_id(None);
        }
        Ok(affected > 0)
    }

    /// Create when the id is unset, update otherwise.
    pub async fn save<T: Entity>(&self, entity: &mut T) -> DbalResult<bool> {
        if entity.id().is_none() {
            self.create(entity).await
        } else {
            self.update(entity).await
        }
    }
}
