//! Shared harness: in-memory SQLite stores plus a scripted channel adapter

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use salesync_cache::{DatabasePool, SqliteEntitySource, SqliteMirrorStore, SqliteSyncRequestQueue};
use salesync_core::domain::{
    ChannelError, ChannelId, ChannelType, EntityKind, LocalEntity, LocalEntityId, MirrorKey,
    MirrorRecord, RetryPolicy, TenantId,
};
use salesync_core::ports::{
    AdapterRegistry, HttpMethod, IChannelAdapter, Payload, PayloadOperation, PushOutcome,
    RemoteResponse,
};
use salesync_sync::{ReconciliationEngine, SignalDispatcher};

pub const CHANNEL: i64 = 2;
pub const ENTITY: i64 = 10;

// ============================================================================
// ScriptedAdapter
// ============================================================================

/// Channel adapter whose push results are queued up by the test
///
/// Pushes without a scripted result succeed with remote id `REMOTE-123`.
#[derive(Default)]
pub struct ScriptedAdapter {
    push_results: Mutex<VecDeque<Result<RemoteResponse, ChannelError>>>,
    delete_results: Mutex<VecDeque<Result<(), ChannelError>>>,
    operations: Mutex<Vec<PayloadOperation>>,
    pushes: AtomicUsize,
    deletes: AtomicUsize,
    push_delay: Mutex<Option<Duration>>,
}

impl ScriptedAdapter {
    pub fn script_push(&self, result: Result<RemoteResponse, ChannelError>) {
        self.push_results.lock().unwrap().push_back(result);
    }

    pub fn script_delete(&self, result: Result<(), ChannelError>) {
        self.delete_results.lock().unwrap().push_back(result);
    }

    /// Makes every push wait, so a concurrent reconcile finds the lease taken
    pub fn delay_pushes(&self, delay: Duration) {
        *self.push_delay.lock().unwrap() = Some(delay);
    }

    pub fn push_count(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn operations(&self) -> Vec<PayloadOperation> {
        self.operations.lock().unwrap().clone()
    }
}

#[async_trait]
impl IChannelAdapter for ScriptedAdapter {
    fn channel_type(&self) -> ChannelType {
        ChannelType::WooCommerce
    }

    fn projection(&self, entity: &LocalEntity) -> Result<Value, ChannelError> {
        let price = entity
            .attribute("price")
            .cloned()
            .ok_or_else(|| ChannelError::missing_field("price", "woocommerce"))?;
        Ok(json!({
            "sku": entity.require_sku("woocommerce")?,
            "name": entity.str_attr("name"),
            "price": price,
        }))
    }

    fn build_payload(
        &self,
        entity: &LocalEntity,
        record: &MirrorRecord,
    ) -> Result<Payload, ChannelError> {
        let body = self.projection(entity)?;
        let payload = match record.remote_id() {
            Some(id) => Payload::new(
                ChannelType::WooCommerce,
                PayloadOperation::Update,
                HttpMethod::Put,
                format!("/products/{id}"),
            )
            .with_remote_key(id.as_str()),
            None => Payload::new(
                ChannelType::WooCommerce,
                PayloadOperation::Create,
                HttpMethod::Post,
                "/products",
            ),
        };
        Ok(payload.with_body(body))
    }

    async fn push(&self, payload: &Payload) -> Result<RemoteResponse, ChannelError> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        self.operations.lock().unwrap().push(payload.operation);

        let delay = *self.push_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.push_results.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(RemoteResponse::new(201, json!({"id": "REMOTE-123"}))
                .with_remote_key(payload.remote_key.clone()))
        })
    }

    fn parse_response(&self, response: &RemoteResponse) -> PushOutcome {
        if let Some(message) = response.body.get("error").and_then(Value::as_str) {
            return PushOutcome::failure(message);
        }
        let id = response
            .body
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| response.remote_key.clone());
        PushOutcome::success(id.and_then(|id| salesync_core::domain::RemoteId::new(id).ok()))
    }

    async fn delete(&self, record: &MirrorRecord) -> Result<(), ChannelError> {
        if record.remote_id().is_none() {
            return Ok(());
        }
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.delete_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub db: DatabasePool,
    pub mirrors: Arc<SqliteMirrorStore>,
    pub queue: Arc<SqliteSyncRequestQueue>,
    pub entities: Arc<SqliteEntitySource>,
    pub adapter: Arc<ScriptedAdapter>,
    pub engine: Arc<ReconciliationEngine>,
    pub dispatcher: SignalDispatcher,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_policy(RetryPolicy::immediate(3)).await
    }

    pub async fn with_policy(policy: RetryPolicy) -> Self {
        let db = DatabasePool::in_memory()
            .await
            .expect("Failed to create in-memory database");
        let mirrors = Arc::new(SqliteMirrorStore::new(db.pool().clone()));
        let queue = Arc::new(SqliteSyncRequestQueue::new(db.pool().clone()));
        let entities = Arc::new(SqliteEntitySource::new(db.pool().clone()));
        let adapter = Arc::new(ScriptedAdapter::default());

        let engine = Arc::new(Self::engine_for(
            &mirrors,
            &queue,
            &entities,
            &adapter,
            "worker-a",
            policy,
        ));
        let dispatcher = SignalDispatcher::new(mirrors.clone(), queue.clone());

        Self {
            db,
            mirrors,
            queue,
            entities,
            adapter,
            engine,
            dispatcher,
        }
    }

    /// A second engine over the same stores, as another worker process would have
    pub fn second_engine(&self, owner: &str) -> ReconciliationEngine {
        Self::engine_for(
            &self.mirrors,
            &self.queue,
            &self.entities,
            &self.adapter,
            owner,
            *self.engine.retry_policy(),
        )
    }

    fn engine_for(
        mirrors: &Arc<SqliteMirrorStore>,
        queue: &Arc<SqliteSyncRequestQueue>,
        entities: &Arc<SqliteEntitySource>,
        adapter: &Arc<ScriptedAdapter>,
        owner: &str,
        policy: RetryPolicy,
    ) -> ReconciliationEngine {
        let mut registry = AdapterRegistry::new();
        registry.register(ChannelId::new(CHANNEL).unwrap(), adapter.clone());
        ReconciliationEngine::new(mirrors.clone(), queue.clone(), entities.clone(), registry)
            .with_retry_policy(policy)
            .with_lease(owner, Duration::from_secs(60))
    }

    pub async fn save(&self, entity: &LocalEntity) {
        self.entities.save(entity).await.expect("save entity");
    }
}

pub fn key() -> MirrorKey {
    MirrorKey::new(
        LocalEntityId::new(ENTITY).unwrap(),
        ChannelId::new(CHANNEL).unwrap(),
        None,
    )
}

pub fn chair(price: &str) -> LocalEntity {
    LocalEntity::new(
        LocalEntityId::new(ENTITY).unwrap(),
        TenantId::new(1).unwrap(),
        EntityKind::Product,
    )
    .with_sku("CHAIR-01")
    .with_attribute("name", json!("Oak chair"))
    .with_attribute("price", json!(price))
}
