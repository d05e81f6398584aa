//! Runtime: values, host objects, environments and the virtual machine.

pub mod env;
pub mod function;
pub mod object;
pub mod value;
pub mod vm;

pub use env::{environment_object, Environment, Getter, GlobalBinding, Setter};
pub use function::{CallResult, Function, HostCall, NativeFunction};
pub use object::{ObjectRef, ScriptObject};
pub use value::{Enumerator, TypeId, Value};
pub use vm::{ExecutionContext, ExecutionResult, Frame, VirtualMachine};
