//! Agent Registry (§4.2). Grounded on `original_source/enhanced_agent_bus/
//! registry.py`'s `InMemoryAgentRegistry` / `RedisAgentRegistry`: the trait
//! models the same no-overwrite `Register`, `Unregister`, `Get`,
//! `ListAgents`, `Exists`, `UpdateMetadata`, `Clear` contract so both
//! backends satisfy it identically.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{BusError, BusResult};
use crate::types::AgentRecord;

#[async_trait]
pub trait AgentRegistry: Send + Sync {
    /// Returns `false` if `agent_id` is already present (no overwrite).
    async fn register(&self, record: AgentRecord) -> BusResult<bool>;
    /// Returns `false` if not present.
    async fn unregister(&self, agent_id: &str) -> BusResult<bool>;
    async fn get(&self, agent_id: &str) -> BusResult<Option<AgentRecord>>;
    async fn list_agents(&self) -> BusResult<Vec<String>>;
    async fn exists(&self, agent_id: &str) -> BusResult<bool>;
    async fn update_metadata(&self, agent_id: &str, capabilities: Vec<String>) -> BusResult<bool>;
    /// Test-only wipe.
    async fn clear(&self) -> BusResult<()>;
}

/// Single concurrent map guarded internally by `dashmap`'s sharded locks
/// (teacher's `DashMap` choice, generalized from message handlers to agent
/// records).
#[derive(Default)]
pub struct InMemoryAgentRegistry {
    agents: DashMap<String, AgentRecord>,
}

impl InMemoryAgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentRegistry for InMemoryAgentRegistry {
    async fn register(&self, record: AgentRecord) -> BusResult<bool> {
        if self.agents.contains_key(&record.agent_id) {
            return Ok(false);
        }
        self.agents.insert(record.agent_id.clone(), record);
        Ok(true)
    }

    async fn unregister(&self, agent_id: &str) -> BusResult<bool> {
        Ok(self.agents.remove(agent_id).is_some())
    }

    async fn get(&self, agent_id: &str) -> BusResult<Option<AgentRecord>> {
        Ok(self.agents.get(agent_id).map(|r| r.clone()))
    }

    async fn list_agents(&self) -> BusResult<Vec<String>> {
        Ok(self.agents.iter().map(|e| e.key().clone()).collect())
    }

    async fn exists(&self, agent_id: &str) -> BusResult<bool> {
        Ok(self.agents.contains_key(agent_id))
    }

    async fn update_metadata(&self, agent_id: &str, capabilities: Vec<String>) -> BusResult<bool> {
        match self.agents.get_mut(agent_id) {
            Some(mut record) => {
                record.capabilities = capabilities;
                record.updated_at = chrono::Utc::now().to_rfc3339();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn clear(&self) -> BusResult<()> {
        self.agents.clear();
        Ok(())
    }
}

/// Shape of the distributed registry from §4.2/§6: hash key
/// `acgs2:registry:agents`, field = agent_id, `HSETNX`/`HDEL`/`HGET`/
/// `HKEYS`/`HEXISTS` semantics. A concrete Redis transport is out of scope
/// (§1); [`InProcessRedisHashStore`] below exercises the exact hash-field
/// contract (no-overwrite create, absent-on-remove) against an in-process
/// store, while a production deployment swaps the backing `RedisHashStore`
/// trait for a real connection.
#[async_trait]
pub trait RedisHashStore: Send + Sync {
    /// `HSETNX key field value` — returns `true` if the field was newly set.
    async fn hsetnx(&self, key: &str, field: &str, value: &str) -> Result<bool, String>;
    /// `HDEL key field` — returns `true` if the field existed.
    async fn hdel(&self, key: &str, field: &str) -> Result<bool, String>;
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, String>;
    async fn hkeys(&self, key: &str) -> Result<Vec<String>, String>;
    async fn hexists(&self, key: &str, field: &str) -> Result<bool, String>;
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), String>;
    async fn clear(&self, key: &str) -> Result<(), String>;
}

pub const REGISTRY_HASH_KEY: &str = "acgs2:registry:agents";

pub struct DistributedAgentRegistry<S: RedisHashStore> {
    store: S,
}

impl<S: RedisHashStore> DistributedAgentRegistry<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: RedisHashStore> AgentRegistry for DistributedAgentRegistry<S> {
    async fn register(&self, record: AgentRecord) -> BusResult<bool> {
        let value = serde_json::to_string(&record).map_err(|e| BusError::Internal(e.to_string()))?;
        self.store
            .hsetnx(REGISTRY_HASH_KEY, &record.agent_id, &value)
            .await
            .map_err(BusError::RegistryUnavailable)
    }

    async fn unregister(&self, agent_id: &str) -> BusResult<bool> {
        self.store
            .hdel(REGISTRY_HASH_KEY, agent_id)
            .await
            .map_err(BusError::RegistryUnavailable)
    }

    async fn get(&self, agent_id: &str) -> BusResult<Option<AgentRecord>> {
        let raw = self
            .store
            .hget(REGISTRY_HASH_KEY, agent_id)
            .await
            .map_err(BusError::RegistryUnavailable)?;
        match raw {
            Some(json) => {
                let record = serde_json::from_str(&json).map_err(|e| BusError::Internal(e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn list_agents(&self) -> BusResult<Vec<String>> {
        self.store
            .hkeys(REGISTRY_HASH_KEY)
            .await
            .map_err(BusError::RegistryUnavailable)
    }

    async fn exists(&self, agent_id: &str) -> BusResult<bool> {
        self.store
            .hexists(REGISTRY_HASH_KEY, agent_id)
            .await
            .map_err(BusError::RegistryUnavailable)
    }

    async fn update_metadata(&self, agent_id: &str, capabilities: Vec<String>) -> BusResult<bool> {
        let mut record = match self.get(agent_id).await? {
            Some(r) => r,
            None => return Ok(false),
        };
        record.capabilities = capabilities;
        record.updated_at = chrono::Utc::now().to_rfc3339();
        let value = serde_json::to_string(&record).map_err(|e| BusError::Internal(e.to_string()))?;
        self.store
            .hset(REGISTRY_HASH_KEY, agent_id, &value)
            .await
            .map_err(BusError::RegistryUnavailable)?;
        Ok(true)
    }

    async fn clear(&self) -> BusResult<()> {
        self.store
            .clear(REGISTRY_HASH_KEY)
            .await
            .map_err(BusError::RegistryUnavailable)
    }
}

/// In-process `RedisHashStore`, keyed the way a real `HSETNX`/`HDEL` server
/// would be: one `DashMap<field, value>` per hash key. Grounded on
/// `original_source/.../tests/test_redis_registry.py`'s `mock_redis` fixture
/// (`hsetnx` returns whether the field was newly set, `hdel` whether it
/// existed), generalized from a mocked client to a real in-process store so
/// [`DistributedAgentRegistry`] is exercised against actual hash semantics
/// rather than a mock that always returns canned values.
#[derive(Default)]
pub struct InProcessRedisHashStore {
    hashes: DashMap<String, DashMap<String, String>>,
}

impl InProcessRedisHashStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RedisHashStore for InProcessRedisHashStore {
    async fn hsetnx(&self, key: &str, field: &str, value: &str) -> Result<bool, String> {
        let hash = self.hashes.entry(key.to_string()).or_default();
        if hash.contains_key(field) {
            return Ok(false);
        }
        hash.insert(field.to_string(), value.to_string());
        Ok(true)
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, String> {
        match self.hashes.get(key) {
            Some(hash) => Ok(hash.remove(field).is_some()),
            None => Ok(false),
        }
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, String> {
        Ok(self.hashes.get(key).and_then(|hash| hash.get(field).map(|v| v.clone())))
    }

    async fn hkeys(&self, key: &str) -> Result<Vec<String>, String> {
        Ok(self
            .hashes
            .get(key)
            .map(|hash| hash.iter().map(|e| e.key().clone()).collect())
            .unwrap_or_default())
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool, String> {
        Ok(self.hashes.get(key).map(|hash| hash.contains_key(field)).unwrap_or(false))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), String> {
        self.hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<(), String> {
        self.hashes.remove(key);
        Ok(())
    }
}
