//! VirtualMachineClone CRD Definitions
//!
//! The `VirtualMachineClone` custom resource served by the clone controller,
//! plus typed views of the KubeVirt resources it reads and creates.

pub mod condition;
pub mod references;
pub mod restore;
pub mod snapshot;
pub mod virtual_machine;
pub mod vm_clone;

pub use condition::*;
pub use references::*;
pub use restore::*;
pub use snapshot::*;
pub use virtual_machine::*;
pub use vm_clone::*;
