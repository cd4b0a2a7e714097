//! Session: one store, its catalog and the caller context
//!
//! The backend is chosen once, when the session is built. A session is the
//! single writer of its store; isolated copies come from `snapshot`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::config::{BackendConfig, SessionConfig};
use crate::executor::{
    project_columns, AllowAll, EntityCollection, EvaluationContext, FiscalCalendar, QueryEngine,
    SecurityFilter,
};
use crate::format::{FormattedValueProjector, CURRENCY_ENTITY};
use crate::metadata::MetadataCatalog;
use crate::observability::{log_event_with_fields, Event};
use crate::query::{ColumnSet, QueryInput, QueryResult};
use crate::sql::SqlStore;
use crate::store::{EntityStore, MemoryStore, StoreError, StoreResult, UpstreamSource};
use crate::value::{EntityReference, Record};

/// Exchange rate attribute of a currency record
pub const EXCHANGE_RATE_ATTRIBUTE: &str = "exchangerate";
pub const TEAM_ENTITY: &str = "team";
pub const TEAM_TYPE_ATTRIBUTE: &str = "teamtype";
/// `teamtype` option code of access teams
pub const ACCESS_TEAM_TYPE: i32 = 1;
pub const TEAM_MEMBERSHIP_ENTITY: &str = "teammembership";
pub const MEMBER_ATTRIBUTE: &str = "systemuserid";

/// Builds a session
pub struct SessionBuilder {
    catalog: MetadataCatalog,
    backend: BackendConfig,
    fiscal: FiscalCalendar,
    caller_id: Uuid,
    business_unit_id: Option<Uuid>,
    security: Arc<dyn SecurityFilter>,
    upstream: Option<Arc<dyn UpstreamSource>>,
    now: Option<DateTime<Utc>>,
}

impl SessionBuilder {
    fn new(catalog: MetadataCatalog) -> Self {
        Self {
            catalog,
            backend: BackendConfig::Memory,
            fiscal: FiscalCalendar::default(),
            caller_id: Uuid::nil(),
            business_unit_id: None,
            security: Arc::new(AllowAll),
            upstream: None,
            now: None,
        }
    }

    pub fn backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn fiscal(mut self, fiscal: FiscalCalendar) -> Self {
        self.fiscal = fiscal;
        self
    }

    pub fn caller(mut self, caller_id: Uuid) -> Self {
        self.caller_id = caller_id;
        self
    }

    pub fn business_unit(mut self, business_unit_id: Uuid) -> Self {
        self.business_unit_id = Some(business_unit_id);
        self
    }

    pub fn security(mut self, security: impl SecurityFilter + 'static) -> Self {
        self.security = Arc::new(security);
        self
    }

    /// Upstream source for records missing locally; memory backend only
    pub fn upstream(mut self, upstream: Arc<dyn UpstreamSource>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Pins the instant calendar-relative operators evaluate against
    pub fn evaluate_at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Provisions the backend and returns the session
    pub fn build(self) -> StoreResult<Session> {
        let catalog = Arc::new(self.catalog);

        let store: Box<dyn EntityStore> = match &self.backend {
            BackendConfig::Memory => {
                let store = MemoryStore::new(Arc::clone(&catalog));
                match self.upstream {
                    Some(upstream) => Box::new(store.with_upstream(upstream)),
                    None => Box::new(store),
                }
            }
            BackendConfig::Sqlite { path, recreate } => {
                if self.upstream.is_some() {
                    return Err(StoreError::backend_message(
                        "upstream prefetch requires the memory backend",
                    ));
                }
                match path {
                    Some(path) => Box::new(SqlStore::open(Arc::clone(&catalog), path, *recreate)?),
                    None => Box::new(SqlStore::open_in_memory(Arc::clone(&catalog))?),
                }
            }
        };

        let tables = catalog.len().to_string();
        log_event_with_fields(
            Event::BackendInitialized,
            &[("backend", store.backend_name()), ("tables", tables.as_str())],
        );

        let mut context = EvaluationContext::new()
            .with_caller(self.caller_id)
            .with_fiscal(self.fiscal);
        if let Some(business_unit_id) = self.business_unit_id {
            context = context.with_business_unit(business_unit_id);
        }

        Ok(Session {
            catalog,
            store,
            security: self.security,
            context,
            now: self.now,
        })
    }
}

/// A catalog, the store provisioned from it, and the caller context
pub struct Session {
    catalog: Arc<MetadataCatalog>,
    store: Box<dyn EntityStore>,
    security: Arc<dyn SecurityFilter>,
    context: EvaluationContext,
    now: Option<DateTime<Utc>>,
}

impl Session {
    pub fn builder(catalog: MetadataCatalog) -> SessionBuilder {
        SessionBuilder::new(catalog)
    }

    /// Builds a session from configuration, loading metadata from
    /// `metadata_dir` when set
    pub fn from_config(config: &SessionConfig) -> StoreResult<Session> {
        let catalog = match &config.metadata_dir {
            Some(dir) => {
                let catalog = MetadataCatalog::load_dir(dir)?;
                let location = dir.display().to_string();
                let tables = catalog.len().to_string();
                log_event_with_fields(
                    Event::CatalogLoaded,
                    &[("dir", location.as_str()), ("tables", tables.as_str())],
                );
                catalog
            }
            None => MetadataCatalog::new(),
        };

        let mut builder = Session::builder(catalog)
            .backend(config.backend.clone())
            .fiscal(config.fiscal);
        if let Some(caller_id) = config.caller_id {
            builder = builder.caller(caller_id);
        }
        if let Some(business_unit_id) = config.business_unit_id {
            builder = builder.business_unit(business_unit_id);
        }
        log_event_with_fields(Event::ConfigLoaded, &[("backend", backend_kind(&config.backend))]);
        builder.build()
    }

    pub fn catalog(&self) -> &Arc<MetadataCatalog> {
        &self.catalog
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    pub fn is_valid_entity(&self, logical_name: &str) -> bool {
        self.catalog.contains(logical_name)
    }

    /// Changes the caller used by later queries
    pub fn set_caller(&mut self, caller_id: Uuid) {
        self.context.caller_id = caller_id;
    }

    /// Pins (or with `None`, unpins) the evaluation clock
    pub fn evaluate_at(&mut self, now: Option<DateTime<Utc>>) {
        self.now = now;
    }

    /// Inserts a record with reference checks. Returns its id.
    pub fn create(&mut self, record: Record) -> StoreResult<Uuid> {
        self.store.add(record, true)
    }

    /// Inserts a batch, checking references once every record is present so
    /// records may refer to each other. Nothing is kept if any record fails.
    pub fn create_many(&mut self, records: impl IntoIterator<Item = Record>) -> StoreResult<Vec<Uuid>> {
        self.store.begin_batch()?;
        match self.insert_batch(records) {
            Ok(ids) => {
                self.store.commit_batch()?;
                Ok(ids)
            }
            Err(err) => {
                self.store.rollback_batch()?;
                Err(err)
            }
        }
    }

    fn insert_batch(&mut self, records: impl IntoIterator<Item = Record>) -> StoreResult<Vec<Uuid>> {
        let mut added = Vec::new();
        for record in records {
            let entity = record.logical_name.clone();
            let id = self.store.add(record, false)?;
            added.push((entity, id));
        }
        for (entity, id) in &added {
            if let Some(record) = self.store.get(entity, *id)? {
                self.store.check_references(&record)?;
            }
        }
        Ok(added.into_iter().map(|(_, id)| id).collect())
    }

    /// Strict lookup with formatted values, limited to `columns`
    pub fn retrieve(&mut self, reference: &EntityReference, columns: &ColumnSet) -> StoreResult<Record> {
        let record = self.store.retrieve(reference)?;
        self.present(record, columns)
    }

    /// Lookup that returns `None` for a missing record
    pub fn retrieve_or_none(
        &mut self,
        reference: &EntityReference,
        columns: &ColumnSet,
    ) -> StoreResult<Option<Record>> {
        match self.store.resolve(reference)? {
            Some(record) => Ok(Some(self.present(record, columns)?)),
            None => Ok(None),
        }
    }

    fn present(&self, record: Record, columns: &ColumnSet) -> StoreResult<Record> {
        let aliases = HashMap::new();
        let mut rows = [record];
        FormattedValueProjector::new(&self.catalog, &aliases).project(self.store.as_ref(), &mut rows)?;
        let [mut record] = rows;
        project_columns(&mut record, columns);
        Ok(record)
    }

    /// Replaces a record's attributes, with reference checks
    pub fn update(&mut self, record: Record) -> StoreResult<()> {
        self.store.update(record, true)
    }

    /// Deletes a record; a missing record is `RecordNotFound`
    pub fn delete(&mut self, entity: &str, id: Uuid) -> StoreResult<()> {
        self.store.delete(entity, id)
    }

    pub fn delete_if_exists(&mut self, entity: &str, id: Uuid) -> StoreResult<bool> {
        self.store.delete_if_exists(entity, id)
    }

    pub fn exists(&self, reference: &EntityReference) -> StoreResult<bool> {
        self.store.exists(reference)
    }

    /// Runs a query as the session caller
    pub fn retrieve_multiple(&mut self, input: impl Into<QueryInput>) -> QueryResult<EntityCollection> {
        let mut ctx = self.context.clone();
        ctx.now = self.now.unwrap_or_else(Utc::now);
        QueryEngine::new(self.store.as_mut(), self.security.as_ref(), &ctx).execute(input)
    }

    /// Detached rows of a table, without formatted values
    pub fn entities(&self, entity: &str) -> StoreResult<Vec<Record>> {
        self.store.scan(entity)
    }

    /// Independent session over a deep copy of the store
    pub fn snapshot(&self) -> StoreResult<Session> {
        let store = self.store.snapshot()?;
        log_event_with_fields(Event::SnapshotCreated, &[("backend", store.backend_name())]);
        Ok(Session {
            catalog: Arc::clone(&self.catalog),
            store,
            security: Arc::clone(&self.security),
            context: self.context.clone(),
            now: self.now,
        })
    }

    /// Removes every record
    pub fn reset(&mut self) -> StoreResult<()> {
        self.store.reset()?;
        log_event_with_fields(Event::StoreReset, &[("backend", self.store.backend_name())]);
        Ok(())
    }

    /// Exchange rate of a currency. A currency without a rate is at par.
    pub fn retrieve_exchange_rate(&self, currency_id: Uuid) -> StoreResult<Decimal> {
        let currency = self
            .store
            .get(CURRENCY_ENTITY, currency_id)?
            .ok_or_else(|| StoreError::record_not_found(CURRENCY_ENTITY, currency_id))?;
        Ok(currency
            .get(EXCHANGE_RATE_ATTRIBUTE)
            .and_then(|rate| rate.as_decimal())
            .unwrap_or(Decimal::ONE))
    }

    /// Removes access teams and every team membership. Returns the number
    /// of teams removed.
    pub fn reset_access_teams(&mut self) -> StoreResult<usize> {
        let mut removed = 0;
        if self.catalog.contains(TEAM_ENTITY) {
            for team in self.store.scan(TEAM_ENTITY)? {
                let is_access_team = team
                    .get(TEAM_TYPE_ATTRIBUTE)
                    .and_then(|v| v.as_i32())
                    == Some(ACCESS_TEAM_TYPE);
                if is_access_team {
                    self.store.delete(TEAM_ENTITY, team.id)?;
                    removed += 1;
                }
            }
        }
        if self.catalog.contains(TEAM_MEMBERSHIP_ENTITY) {
            for membership in self.store.scan(TEAM_MEMBERSHIP_ENTITY)? {
                self.store.delete(TEAM_MEMBERSHIP_ENTITY, membership.id)?;
            }
        }

        let count = removed.to_string();
        log_event_with_fields(Event::AccessTeamsReset, &[("teams", count.as_str())]);
        Ok(removed)
    }

    /// Team memberships of a user
    pub fn caller_team_memberships(&self, caller_id: Uuid) -> StoreResult<Vec<Record>> {
        if !self.catalog.contains(TEAM_MEMBERSHIP_ENTITY) {
            return Ok(Vec::new());
        }
        Ok(self
            .store
            .scan(TEAM_MEMBERSHIP_ENTITY)?
            .into_iter()
            .filter(|m| m.get(MEMBER_ATTRIBUTE).and_then(|v| v.as_guid()) == Some(caller_id))
            .collect())
    }
}

fn backend_kind(backend: &BackendConfig) -> &'static str {
    match backend {
        BackendConfig::Memory => "memory",
        BackendConfig::Sqlite { .. } => "sqlite",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{AttributeSchema, TableSchema};
    use crate::store::StoreErrorCode;

    fn catalog() -> MetadataCatalog {
        MetadataCatalog::from_tables([
            TableSchema::new("account", "accountid")
                .with_attribute(AttributeSchema::primary_name("name", 100))
                .with_attribute(AttributeSchema::lookup("parentaccountid", ["account"])),
            TableSchema::new(TEAM_ENTITY, "teamid")
                .with_attribute(AttributeSchema::picklist(TEAM_TYPE_ATTRIBUTE, [(0, "Owner"), (1, "Access")])),
            TableSchema::new(TEAM_MEMBERSHIP_ENTITY, "teammembershipid")
                .with_attribute(AttributeSchema::lookup(MEMBER_ATTRIBUTE, ["systemuser"]))
                .with_attribute(AttributeSchema::lookup("teamid", [TEAM_ENTITY])),
            TableSchema::new("systemuser", "systemuserid"),
        ])
        .unwrap()
    }

    #[test]
    fn test_create_many_resolves_forward_references() {
        let mut session = Session::builder(catalog()).build().unwrap();
        let parent = Uuid::new_v4();
        let ids = session
            .create_many([
                Record::new("account").with("name", "child").with(
                    "parentaccountid",
                    EntityReference::new("account", parent),
                ),
                Record::with_id("account", parent).with("name", "parent"),
            ])
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[1], parent);
    }

    #[test]
    fn test_create_many_is_all_or_nothing() {
        let mut session = Session::builder(catalog()).build().unwrap();
        let err = session
            .create_many([
                Record::new("account").with("name", "ok"),
                Record::new("account").with(
                    "parentaccountid",
                    EntityReference::new("account", Uuid::new_v4()),
                ),
            ])
            .unwrap_err();
        assert_eq!(err.code(), StoreErrorCode::MissingReferencedRecord);
        assert!(session.entities("account").unwrap().is_empty());
    }

    #[test]
    fn test_reset_access_teams() {
        let mut session = Session::builder(catalog()).build().unwrap();
        let user = session.create(Record::new("systemuser")).unwrap();
        let owner_team = session
            .create(Record::new(TEAM_ENTITY).with(TEAM_TYPE_ATTRIBUTE, 0))
            .unwrap();
        let access_team = session
            .create(Record::new(TEAM_ENTITY).with(TEAM_TYPE_ATTRIBUTE, 1))
            .unwrap();
        session
            .create(
                Record::new(TEAM_MEMBERSHIP_ENTITY)
                    .with(MEMBER_ATTRIBUTE, EntityReference::new("systemuser", user))
                    .with("teamid", EntityReference::new(TEAM_ENTITY, owner_team)),
            )
            .unwrap();

        assert_eq!(session.caller_team_memberships(user).unwrap().len(), 1);
        assert_eq!(session.reset_access_teams().unwrap(), 1);

        let teams = session.entities(TEAM_ENTITY).unwrap();
        assert_eq!(teams.len(), 1);
        assert_eq!(teams[0].id, owner_team);
        assert!(!session
            .exists(&EntityReference::new(TEAM_ENTITY, access_team))
            .unwrap());
        assert!(session.caller_team_memberships(user).unwrap().is_empty());
    }

    #[test]
    fn test_exchange_rate_requires_currency() {
        let session = Session::builder(
            MetadataCatalog::from_tables([TableSchema::new(CURRENCY_ENTITY, "transactioncurrencyid")
                .with_attribute(AttributeSchema::decimal(EXCHANGE_RATE_ATTRIBUTE, 4))])
            .unwrap(),
        )
        .build()
        .unwrap();
        let err = session.retrieve_exchange_rate(Uuid::new_v4()).unwrap_err();
        assert_eq!(err.code(), StoreErrorCode::RecordNotFound);
    }
}
