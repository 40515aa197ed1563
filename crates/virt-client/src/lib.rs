//! KubeVirt API client
//!
//! Typed access to the Kubernetes objects the VirtualMachineClone controller
//! reads and writes: virtual machines, snapshots and their content, restores,
//! controller revisions and the clone status subresource.
//!
//! # Example
//!
//! ```no_run
//! use virt_client::{VirtClient, VirtClientTrait};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = VirtClient::try_default().await?;
//!
//! if let Some(vm) = client.get_vm("default", "fedora").await? {
//!     println!("{} interfaces", vm.spec.interfaces().len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **test-util**: `MockVirtClient`, an in-memory implementation that can
//!   also simulate the KubeVirt snapshot and restore controllers

pub mod client;
pub mod error;
pub mod storage;
#[path = "trait.rs"]
pub mod virt_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::VirtClient;
pub use error::VirtError;
pub use virt_trait::VirtClientTrait;
#[cfg(feature = "test-util")]
pub use mock::{CallCounts, MockVirtClient};
