//! The register-and-stack bytecode VM: the second of Ionia's two execution
//! back-ends, consuming the bytecode `crate::compiler` emits. See
//! `machine` for the dispatch loop, `env`/`value` for the runtime
//! environment and value representation, and `ext` for the native
//! built-ins bound into the VM's `ext` environment.

pub mod env;
pub mod ext;
pub mod machine;
pub mod value;

pub use machine::{NativeOutcome, Vm, VmError};
pub use value::VmValue;
