//! Implements JobStorePort using a JSON file.
//!
//! The whole registry is one file; every mutation rewrites it through the
//! write-replace pattern so `create` never reports success before the job
//! is crash-durable.

use crate::domain::{DomainError, ScheduledJob};
use crate::ports::JobStorePort;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// On-disk shape: a flat list of job records.
#[derive(Debug, Default, Serialize, Deserialize)]
struct JobFile {
    jobs: Vec<ScheduledJob>,
}

/// JSON file-based job registry.
pub struct JobStoreJson {
    path: std::path::PathBuf,
    cache: tokio::sync::RwLock<HashMap<Uuid, ScheduledJob>>,
}

impl JobStoreJson {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            cache: tokio::sync::RwLock::new(HashMap::new()),
        }
    }

    /// Load the registry from disk. Call once after construction; a missing
    /// file is an empty registry.
    pub async fn load(&self) -> Result<(), DomainError> {
        let data: JobFile = match fs::read_to_string(&self.path).await {
            Ok(s) => serde_json::from_str(&s)
                .map_err(|e| DomainError::Store(format!("corrupt job file: {}", e)))?,
            Err(_) => JobFile::default(),
        };
        let mut cache = self.cache.write().await;
        *cache = data.jobs.into_iter().map(|j| (j.id, j)).collect();
        Ok(())
    }

    /// Atomic save using write-replace:
    /// 1. Write to temp file
    /// 2. sync_all() to ensure flush to disk
    /// 3. Atomic rename to target path
    async fn save(&self) -> Result<(), DomainError> {
        let jobs = {
            let cache = self.cache.read().await;
            let mut jobs: Vec<ScheduledJob> = cache.values().cloned().collect();
            jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            jobs
        };
        let json = serde_json::to_string_pretty(&JobFile { jobs })
            .map_err(|e| DomainError::Store(e.to_string()))?;

        let temp_path = self.path.with_extension("json.tmp");
        let mut f = fs::File::create(&temp_path)
            .await
            .map_err(|e| DomainError::Store(format!("create temp file: {}", e)))?;
        f.write_all(json.as_bytes())
            .await
            .map_err(|e| DomainError::Store(format!("write temp file: {}", e)))?;
        f.sync_all()
            .await
            .map_err(|e| DomainError::Store(format!("sync temp file: {}", e)))?;
        drop(f);

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| DomainError::Store(format!("atomic rename failed: {}", e)))?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl JobStorePort for JobStoreJson {
    async fn create(&self, job: &ScheduledJob) -> Result<(), DomainError> {
        {
            let mut cache = self.cache.write().await;
            cache.insert(job.id, job.clone());
        }
        if let Err(e) = self.save().await {
            // Roll the cache back: an unsaved job must not look created.
            self.cache.write().await.remove(&job.id);
            return Err(e);
        }
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<ScheduledJob>, DomainError> {
        let cache = self.cache.read().await;
        let mut jobs: Vec<ScheduledJob> = cache.values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(jobs)
    }

    async fn delete(&self, id: Uuid) -> Result<(), DomainError> {
        let removed = {
            let mut cache = self.cache.write().await;
            cache.remove(&id).is_some()
        };
        if removed {
            self.save().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PostBody, PostSpec, ScheduleSpec, TimeOfDay};
    use chrono::Utc;

    fn job(text: &str) -> ScheduledJob {
        ScheduledJob {
            id: Uuid::new_v4(),
            owner_chat_id: 9,
            channel_target: "@chan".to_string(),
            post: PostSpec {
                body: PostBody::Text { text: text.to_string() },
                spans: vec![],
                buttons: vec![],
            },
            schedule: ScheduleSpec {
                weekdays: vec![0, 2],
                time: TimeOfDay { hour: 8, minute: 0 },
            },
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_then_load_all() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStoreJson::new(dir.path().join("jobs.json"));
        store.load().await.unwrap();

        let a = job("a");
        let b = job("b");
        store.create(&a).await.unwrap();
        store.create(&b).await.unwrap();

        let all = store.load_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.contains(&a));
        assert!(all.contains(&b));
    }

    #[tokio::test]
    async fn test_restart_recovers_persisted_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");

        let store = JobStoreJson::new(&path);
        store.load().await.unwrap();
        let jobs = vec![job("a"), job("b"), job("c")];
        for j in &jobs {
            store.create(j).await.unwrap();
        }
        drop(store);

        // New process: a fresh store over the same file sees all three.
        let reopened = JobStoreJson::new(&path);
        reopened.load().await.unwrap();
        let all = reopened.load_all().await.unwrap();
        assert_eq!(all.len(), 3);
        for j in &jobs {
            assert!(all.contains(j));
        }
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStoreJson::new(dir.path().join("jobs.json"));
        store.load().await.unwrap();

        let a = job("a");
        store.create(&a).await.unwrap();
        store.delete(a.id).await.unwrap();
        store.delete(a.id).await.unwrap();
        store.delete(Uuid::new_v4()).await.unwrap();
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStoreJson::new(dir.path().join("nope.json"));
        store.load().await.unwrap();
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_job_record_serde_round_trip() {
        let a = job("formatted");
        let json = serde_json::to_string(&a).unwrap();
        // Persisted field names are the external compatibility surface.
        assert!(json.contains("\"channel_target\""));
        assert!(json.contains("\"owner_chat_id\""));
        assert!(json.contains("\"weekdays\""));
        let back: ScheduledJob = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }
}
