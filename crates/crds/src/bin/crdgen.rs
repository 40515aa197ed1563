//! Prints the VirtualMachineClone CustomResourceDefinition as YAML.
//!
//! Usage: `cargo run -p crds --bin crdgen > config/crd/virtualmachineclone.yaml`

use crds::VirtualMachineClone;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&VirtualMachineClone::crd())?);
    Ok(())
}
