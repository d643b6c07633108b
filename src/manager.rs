//! Resource manager bridging the pool to container-runtime truth
//!
//! Tracks which sandbox owns which pooled interface through one binding
//! file per resource, and reclaims interfaces whose sandbox is gone.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::network;
use crate::pool::{Initializer, Pool, ResourceHolder};
use crate::resource::{NetworkResource, Veth};
use crate::{Error, Result};

/// Source of truth for which pod sandboxes are alive
pub trait ContainerRuntime: Send + Sync {
    fn running_sandboxes(&self) -> Result<Vec<String>>;
}

/// Queries the docker CLI for running pod sandbox containers
pub struct DockerRuntime;

impl ContainerRuntime for DockerRuntime {
    fn running_sandboxes(&self) -> Result<Vec<String>> {
        let output = Command::new("docker")
            .args([
                "ps",
                "-q",
                "--no-trunc",
                "--filter",
                "label=io.kubernetes.docker.type=podsandbox",
            ])
            .output()?;
        if !output.status.success() {
            return Err(Error::Runtime(format!(
                "docker ps failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }
}

/// A resource-to-sandbox ownership record
#[derive(Debug, Clone, Serialize)]
pub struct Binding {
    pub resource_id: String,
    pub sandbox_id: String,
}

/// Hands pooled resources to sandboxes and garbage-collects leaks.
pub struct Manager<T> {
    pool: Pool<T>,
    runtime: Arc<dyn ContainerRuntime>,
    bindings_dir: PathBuf,
    acquire_timeout: Duration,
}

impl<T: NetworkResource + 'static> Manager<T> {
    pub fn new(
        pool: Pool<T>,
        runtime: Arc<dyn ContainerRuntime>,
        bindings_dir: impl Into<PathBuf>,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        let bindings_dir = bindings_dir.into();
        fs::create_dir_all(&bindings_dir)?;
        Ok(Self {
            pool,
            runtime,
            bindings_dir,
            acquire_timeout,
        })
    }

    pub fn pool(&self) -> &Pool<T> {
        &self.pool
    }

    /// Acquire a resource for a sandbox and record the binding
    pub async fn allocate(&self, sandbox_id: &str, preferred: Option<&str>) -> Result<Arc<T>> {
        let resource = self.pool.acquire_timeout(preferred, self.acquire_timeout).await?;
        if let Err(e) = self.write_binding(resource.resource_id(), sandbox_id) {
            // Can't record ownership: don't hand the resource out
            let _ = self.pool.release(resource.resource_id());
            return Err(e);
        }
        tracing::info!(
            resource = resource.resource_id(),
            sandbox = sandbox_id,
            "resource allocated"
        );
        Ok(resource)
    }

    /// Return a resource to the pool and drop its binding
    pub fn release(&self, resource_id: &str) -> Result<()> {
        self.pool.release(resource_id)?;
        self.remove_binding(resource_id);
        tracing::info!(resource = resource_id, "resource released");
        Ok(())
    }

    /// List current ownership records
    pub fn bindings(&self) -> Result<Vec<Binding>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.bindings_dir)? {
            let entry = entry?;
            let resource_id = entry.file_name().to_string_lossy().to_string();
            let sandbox_id = fs::read_to_string(entry.path())?.trim().to_string();
            out.push(Binding {
                resource_id,
                sandbox_id,
            });
        }
        Ok(out)
    }

    /// Reclaim resources whose sandbox is no longer running.
    ///
    /// Returns how many leaked resources went back into the pool.
    pub fn garbage_collect(&self) -> Result<usize> {
        let running: HashSet<String> = self.runtime.running_sandboxes()?.into_iter().collect();

        let mut reclaimed = 0;
        for binding in self.bindings()? {
            if binding.sandbox_id.is_empty() || running.contains(&binding.sandbox_id) {
                continue;
            }
            tracing::warn!(
                resource = %binding.resource_id,
                sandbox = %binding.sandbox_id,
                "detected resource leak, reclaiming"
            );
            match self.pool.release(&binding.resource_id) {
                Ok(()) => reclaimed += 1,
                // Already idle or never recovered; only the record is stale
                Err(Error::InvalidState(_)) => {}
                Err(e) => {
                    tracing::error!(resource = %binding.resource_id, error = %e, "failed to reclaim resource");
                    continue;
                }
            }
            self.remove_binding(&binding.resource_id);
        }
        Ok(reclaimed)
    }

    fn write_binding(&self, resource_id: &str, sandbox_id: &str) -> Result<()> {
        fs::write(self.bindings_dir.join(resource_id), sandbox_id)?;
        Ok(())
    }

    fn remove_binding(&self, resource_id: &str) {
        if let Err(e) = fs::remove_file(self.bindings_dir.join(resource_id)) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(resource = resource_id, error = %e, "failed to remove binding record");
            }
        }
    }
}

/// Initializer that rebuilds pool state from what is actually on the host:
/// links carrying the daemon prefix, split into in-use and idle by whether
/// their bound sandbox is still running. Stale binding records are removed.
pub fn veth_initializer(
    prefix: String,
    bindings_dir: PathBuf,
    runtime: Arc<dyn ContainerRuntime>,
) -> Initializer<Veth> {
    Box::new(move |holder: &mut ResourceHolder<Veth>| {
        let links = network::list_links(&prefix)?;
        if links.is_empty() {
            return Ok(());
        }
        let running: HashSet<String> = runtime.running_sandboxes()?.into_iter().collect();

        for link in links {
            let peer = format!("vp{}", &link.ifname[prefix.len()..]);
            let veth = Veth::new(link.ifname.clone(), peer);
            match read_binding(&bindings_dir, &link.ifname) {
                Some(sandbox) if running.contains(&sandbox) => {
                    tracing::info!(host = %link.ifname, sandbox = %sandbox, "recovered in-use interface");
                    holder.add_inuse(veth);
                }
                Some(_) => {
                    tracing::info!(host = %link.ifname, "recovered interface with stale binding");
                    let _ = fs::remove_file(bindings_dir.join(&link.ifname));
                    holder.add_idle(veth);
                }
                None => {
                    tracing::info!(host = %link.ifname, "recovered idle interface");
                    holder.add_idle(veth);
                }
            }
        }
        Ok(())
    })
}

fn read_binding(dir: &Path, resource_id: &str) -> Option<String> {
    let content = fs::read_to_string(dir.join(resource_id)).ok()?;
    let sandbox = content.trim().to_string();
    if sandbox.is_empty() {
        None
    } else {
        Some(sandbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{PoolConfig, ResourceFactory};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TestFactory {
        counter: AtomicUsize,
    }

    #[async_trait]
    impl ResourceFactory<Veth> for TestFactory {
        async fn create(&self) -> Result<Veth> {
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(Veth::new(format!("vethtest{}", n), format!("vptest{}", n)))
        }

        async fn dispose(&self, _resource: &Veth) -> Result<()> {
            Ok(())
        }
    }

    struct StaticRuntime {
        sandboxes: Vec<String>,
    }

    impl ContainerRuntime for StaticRuntime {
        fn running_sandboxes(&self) -> Result<Vec<String>> {
            Ok(self.sandboxes.clone())
        }
    }

    fn test_dir() -> PathBuf {
        std::env::temp_dir().join(format!("veth-kube-test-{}", uuid::Uuid::new_v4()))
    }

    fn test_manager(sandboxes: Vec<String>) -> Manager<Veth> {
        let pool = Pool::new(
            PoolConfig::new(Arc::new(TestFactory {
                counter: AtomicUsize::new(0),
            }))
            .min_idle(0)
            .max_idle(5)
            .capacity(10),
        )
        .unwrap();
        Manager::new(
            pool,
            Arc::new(StaticRuntime { sandboxes }),
            test_dir(),
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_allocate_records_binding() {
        let manager = test_manager(vec!["sandbox-1".into()]);

        let resource = manager.allocate("sandbox-1", None).await.unwrap();
        let bindings = manager.bindings().unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].resource_id, resource.resource_id());
        assert_eq!(bindings[0].sandbox_id, "sandbox-1");

        manager.release(resource.resource_id()).unwrap();
        assert!(manager.bindings().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gc_reclaims_leaked_resources() {
        let manager = test_manager(vec!["alive".into()]);

        let kept = manager.allocate("alive", None).await.unwrap();
        let leaked = manager.allocate("dead", None).await.unwrap();
        assert_eq!(manager.pool().stat().inuse, 2);

        let reclaimed = manager.garbage_collect().unwrap();
        assert_eq!(reclaimed, 1);
        assert_eq!(manager.pool().stat().inuse, 1);
        assert_eq!(manager.pool().stat().idle, 1);

        // The live binding survives, the leaked one is gone
        let bindings = manager.bindings().unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].resource_id, kept.resource_id());
        assert_ne!(bindings[0].resource_id, leaked.resource_id());
    }

    #[tokio::test]
    async fn test_gc_ignores_running_sandboxes() {
        let manager = test_manager(vec!["alive".into()]);
        manager.allocate("alive", None).await.unwrap();
        assert_eq!(manager.garbage_collect().unwrap(), 0);
        assert_eq!(manager.pool().stat().inuse, 1);
    }
}
