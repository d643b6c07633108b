//! veth-kube - Minimal CNI-style warm pool for container network interfaces
//!
//! Maintains a bounded pool of pre-provisioned veth pairs so pods get their
//! network interface instantly instead of paying the provisioning cost on
//! the scheduling hot path.
//!
//! # Key Features
//!
//! - **Warm reserve** - idle interfaces kept between configurable bounds by
//!   a background reconciler
//! - **Hard capacity** - total outstanding interfaces never exceed the
//!   configured cap, including creations still in flight
//! - **Crash recovery** - pool state is rebuilt at startup from the host's
//!   actual links and on-disk binding records
//! - **Leak collection** - interfaces bound to dead sandboxes flow back
//!   into the reserve
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use veth_kube::{Pool, PoolConfig, VethFactory};
//!
//! # async fn run() -> veth_kube::Result<()> {
//! let factory = Arc::new(VethFactory::new("veth")?);
//! let pool = Pool::new(
//!     PoolConfig::new(factory)
//!         .min_idle(3)
//!         .max_idle(5)
//!         .capacity(10),
//! )?;
//!
//! let veth = pool.acquire(None).await?;
//! println!("got interface {}", veth.host_veth);
//! pool.release(&veth.host_veth)?;
//!
//! pool.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod manager;
pub mod network;
pub mod pool;
pub mod resource;

pub use api::Server;
pub use config::DaemonConfig;
pub use error::{Error, Result};
pub use manager::{Binding, ContainerRuntime, DockerRuntime, Manager};
pub use network::VethFactory;
pub use pool::{Initializer, Pool, PoolConfig, PoolStat, ResourceFactory, ResourceHolder};
pub use resource::{NetworkResource, Veth};
