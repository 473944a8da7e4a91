//! Node registry
//!
//! Agents push node and health snapshots here on a fixed interval and
//! record completed deploys; the controller's monitoring views read them.

use convoy_core::domain::node::{HealthStatus, NodeStatus};
use convoy_core::domain::service::DeployRecord;
use convoy_core::{Result, keys};
use std::sync::Arc;
use std::time::Duration;

use crate::CoordinationStore;
use crate::json::{decode_list, get_json, set_json_ex, to_json};

#[derive(Clone)]
pub struct NodeRegistry {
    store: Arc<dyn CoordinationStore>,
    ttl: Duration,
}

impl NodeRegistry {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self {
            store,
            ttl: keys::MONITOR_TTL,
        }
    }

    /// Writes both snapshots and registers the node in `node:list`
    pub async fn push_snapshot(&self, node: &NodeStatus, health: &HealthStatus) -> Result<()> {
        let store = self.store.as_ref();
        set_json_ex(store, &keys::node_status(&node.node_id), self.ttl, node).await?;
        set_json_ex(store, &keys::health_status(&node.node_id), self.ttl, health).await?;
        store.sadd(keys::NODE_LIST, &node.node_id).await?;
        store.expire(keys::NODE_LIST, self.ttl).await?;
        Ok(())
    }

    pub async fn node_ids(&self) -> Result<Vec<String>> {
        let ids = self.store.smembers(keys::NODE_LIST).await?;
        if !ids.is_empty() {
            self.store.expire(keys::NODE_LIST, self.ttl).await?;
        }
        Ok(ids)
    }

    pub async fn node_status(&self, node_id: &str) -> Result<Option<NodeStatus>> {
        self.read(&keys::node_status(node_id)).await
    }

    pub async fn health_status(&self, node_id: &str) -> Result<Option<HealthStatus>> {
        self.read(&keys::health_status(node_id)).await
    }

    /// Every node that has a live snapshot; nodes whose snapshot expired are skipped
    pub async fn all_node_status(&self) -> Result<Vec<NodeStatus>> {
        let mut nodes = Vec::new();
        for id in self.node_ids().await? {
            if let Some(status) = self.node_status(&id).await? {
                nodes.push(status);
            }
        }
        Ok(nodes)
    }

    pub async fn all_health_status(&self) -> Result<Vec<HealthStatus>> {
        let mut reports = Vec::new();
        for id in self.node_ids().await? {
            if let Some(status) = self.health_status(&id).await? {
                reports.push(status);
            }
        }
        Ok(reports)
    }

    /// Stores the latest deploy for (node, service) and appends it to the
    /// trimmed history list
    pub async fn record_deploy(&self, record: &DeployRecord) -> Result<()> {
        let store = self.store.as_ref();
        let info_key = keys::deploy_info(&record.node_id, &record.service_name);
        let history_key = keys::deploy_history(&record.node_id, &record.service_name);

        set_json_ex(store, &info_key, keys::HISTORY_TTL, record).await?;

        let payload = to_json(&history_key, record)?;
        store.lpush(&history_key, &payload).await?;
        store
            .ltrim(&history_key, 0, keys::DEPLOY_HISTORY_LIMIT as isize - 1)
            .await?;
        store.expire(&history_key, keys::HISTORY_TTL).await?;
        Ok(())
    }

    pub async fn last_deploy(&self, node_id: &str, service: &str) -> Result<Option<DeployRecord>> {
        Ok(get_json(self.store.as_ref(), &keys::deploy_info(node_id, service)).await?)
    }

    /// Newest first
    pub async fn deploy_history(&self, node_id: &str, service: &str) -> Result<Vec<DeployRecord>> {
        let key = keys::deploy_history(node_id, service);
        let raw = self.store.lrange(&key, 0, -1).await?;
        Ok(decode_list(&key, raw))
    }

    async fn read<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let value = get_json(self.store.as_ref(), key).await?;
        if value.is_some() {
            self.store.expire(key, self.ttl).await?;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use chrono::Utc;
    use convoy_core::domain::node::HealthVerdict;
    use convoy_core::domain::service::RecordStatus;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn snapshot(node_id: &str) -> (NodeStatus, HealthStatus) {
        let now = Utc::now();
        let node = NodeStatus {
            node_id: node_id.to_string(),
            node_name: format!("host-{}", node_id),
            service_status: "RUNNING".to_string(),
            services: BTreeMap::new(),
            cpu_usage: 12.5,
            memory_usage: 40.0,
            health_status: HealthVerdict::Healthy,
            last_heartbeat: now,
            last_deploy_time: None,
            last_deploy_version: None,
            uptime_secs: 60,
        };
        let health = HealthStatus {
            node_id: node_id.to_string(),
            status: HealthVerdict::Healthy,
            check_time: now,
            message: "all services healthy".to_string(),
            reports: Vec::new(),
            last_deploy_time: None,
            last_deploy_version: None,
        };
        (node, health)
    }

    #[tokio::test]
    async fn test_snapshots_listed_by_node() {
        let registry = NodeRegistry::new(Arc::new(MemoryStore::new()));
        for id in ["n2", "n1"] {
            let (node, health) = snapshot(id);
            registry.push_snapshot(&node, &health).await.unwrap();
        }

        assert_eq!(registry.node_ids().await.unwrap(), vec!["n1", "n2"]);
        let nodes = registry.all_node_status().await.unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].node_name, "host-n1");

        let health = registry.health_status("n2").await.unwrap().unwrap();
        assert_eq!(health.status, HealthVerdict::Healthy);
        assert!(registry.node_status("n9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_snapshot_skipped() {
        let store = Arc::new(MemoryStore::new());
        let registry = NodeRegistry::new(store.clone());
        let (node, health) = snapshot("n1");
        registry.push_snapshot(&node, &health).await.unwrap();

        store.del(&keys::node_status("n1")).await.unwrap();
        assert!(registry.all_node_status().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deploy_history_trimmed() {
        let registry = NodeRegistry::new(Arc::new(MemoryStore::new()));
        for i in 0..(keys::DEPLOY_HISTORY_LIMIT + 5) {
            let record = DeployRecord {
                service_name: "svc-a".to_string(),
                node_id: "n1".to_string(),
                task_id: format!("deploy_svc-a_{}", i),
                version: Some(format!("v{}", i)),
                deploy_time: Utc::now(),
                status: RecordStatus::Success,
                operator: None,
                artifact_path: PathBuf::from("/opt/convoy/svc-a/svc-a.jar"),
                artifact_size: 1024,
            };
            registry.record_deploy(&record).await.unwrap();
        }

        let history = registry.deploy_history("n1", "svc-a").await.unwrap();
        assert_eq!(history.len(), keys::DEPLOY_HISTORY_LIMIT);
        assert_eq!(history[0].version.as_deref(), Some("v54"));

        let last = registry.last_deploy("n1", "svc-a").await.unwrap().unwrap();
        assert_eq!(last.version.as_deref(), Some("v54"));
    }
}
