//! The runtime binding table between a compilation unit and its host.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::compiler::unit::CompilationUnit;
use crate::error::RuntimeError;

use super::function::{CallResult, Function};
use super::object::{ObjectRef, ScriptObject};
use super::value::Value;
use super::vm::ExecutionContext;

/// Reads a named global on behalf of the host.
pub type Getter = Rc<dyn Fn() -> Value>;
/// Writes a named global on behalf of the host.
pub type Setter = Rc<dyn Fn(Value)>;

/// One host-visible named global.
pub enum GlobalBinding {
    /// A value stored inside the environment.
    Stored(Value),
    /// A reference to a value owned elsewhere.
    Shared(Rc<RefCell<Value>>),
    /// A computed variable. Either half may be absent, which makes the
    /// variable write-only or read-only.
    Accessor {
        getter: Option<Getter>,
        setter: Option<Setter>,
    },
}

impl GlobalBinding {
    /// A read-only accessor binding.
    pub fn getter(get: impl Fn() -> Value + 'static) -> Self {
        GlobalBinding::Accessor {
            getter: Some(Rc::new(get)),
            setter: None,
        }
    }
}

/// The environment binds a compilation unit to host functions, the
/// indexed globals vector and named globals. Script functions from the
/// unit are registered automatically on construction.
pub struct Environment {
    unit: Rc<CompilationUnit>,
    functions: IndexMap<String, Rc<dyn Function>>,
    script_globals: Vec<Value>,
    named_globals: IndexMap<String, GlobalBinding>,
}

impl Environment {
    pub fn new(unit: Rc<CompilationUnit>) -> Rc<RefCell<Environment>> {
        let env = Rc::new(RefCell::new(Environment {
            unit: unit.clone(),
            functions: IndexMap::new(),
            script_globals: vec![Value::Void; unit.global_count as usize],
            named_globals: IndexMap::new(),
        }));

        {
            let mut inner = env.borrow_mut();
            for (name, info) in &unit.functions {
                inner.functions.insert(
                    name.clone(),
                    Rc::new(ScriptFunction {
                        unit: Rc::downgrade(&unit),
                        env: Rc::downgrade(&env),
                        entry_point: info.entry_point,
                        local_count: info.local_count,
                    }),
                );
            }
        }

        env
    }

    /// The compilation unit this environment executes.
    pub fn unit(&self) -> Rc<CompilationUnit> {
        self.unit.clone()
    }

    /// Register a host function. Replaces a script function of the same
    /// name.
    pub fn register(&mut self, name: impl Into<String>, function: Rc<dyn Function>) {
        self.functions.insert(name.into(), function);
    }

    /// Register a named global visible to `extern` declarations.
    pub fn register_global(&mut self, name: impl Into<String>, binding: GlobalBinding) {
        self.named_globals.insert(name.into(), binding);
    }

    pub fn get_function(&self, name: &str) -> Option<Rc<dyn Function>> {
        self.functions.get(name).cloned()
    }

    // --- Indexed globals ---

    pub fn global(&self, index: u16) -> Result<Value, RuntimeError> {
        self.script_globals
            .get(index as usize)
            .cloned()
            .ok_or(RuntimeError::InvalidVariable)
    }

    pub fn set_global(&mut self, index: u16, value: Value) -> Result<(), RuntimeError> {
        match self.script_globals.get_mut(index as usize) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(RuntimeError::InvalidVariable),
        }
    }

    // --- Named globals ---

    pub fn load_named(&self, name: &str) -> Result<Value, RuntimeError> {
        match self.named_globals.get(name) {
            None => Err(RuntimeError::InvalidVariable),
            Some(GlobalBinding::Stored(value)) => Ok(value.clone()),
            Some(GlobalBinding::Shared(cell)) => Ok(cell.borrow().clone()),
            Some(GlobalBinding::Accessor { getter, .. }) => match getter {
                Some(get) => Ok(get()),
                None => Err(RuntimeError::ReadOnlyVariable(name.to_string())),
            },
        }
    }

    pub fn store_named(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        match self.named_globals.get_mut(name) {
            None => Err(RuntimeError::InvalidVariable),
            Some(GlobalBinding::Stored(slot)) => {
                *slot = value;
                Ok(())
            }
            Some(GlobalBinding::Shared(cell)) => {
                *cell.borrow_mut() = value;
                Ok(())
            }
            Some(GlobalBinding::Accessor { setter, .. }) => match setter {
                Some(set) => {
                    set(value);
                    Ok(())
                }
                None => Err(RuntimeError::ReadOnlyVariable(name.to_string())),
            },
        }
    }
}

/// An environment can itself be handed to a script as an object; its
/// functions become the object's methods. This is how one VM drives
/// code living in another environment.
impl ScriptObject for RefCell<Environment> {
    fn get_function(&self, name: &str) -> Option<Rc<dyn Function>> {
        self.borrow().get_function(name)
    }
}

/// Wrap an environment in an object handle.
pub fn environment_object(env: &Rc<RefCell<Environment>>) -> ObjectRef {
    ObjectRef::new(env.clone())
}

/// A function defined in script code. Calling it schedules a fresh
/// execution context bound to the owning environment.
struct ScriptFunction {
    unit: Weak<CompilationUnit>,
    env: Weak<RefCell<Environment>>,
    entry_point: u32,
    local_count: u16,
}

impl Function for ScriptFunction {
    fn call(&self, args: &[Value]) -> Result<CallResult, RuntimeError> {
        let unit = self
            .unit
            .upgrade()
            .ok_or_else(|| RuntimeError::UnsupportedFunction("<script>".to_string()))?;

        // Arguments land in the leading local slots.
        if args.len() > self.local_count as usize {
            return Err(RuntimeError::InvalidVariable);
        }
        let mut locals = vec![Value::Void; self.local_count as usize];
        for (slot, arg) in locals.iter_mut().zip(args) {
            *slot = arg.clone();
        }

        let mut context = ExecutionContext::new(unit, self.entry_point as usize, locals);
        context.override_env = self.env.upgrade();
        Ok(CallResult::Script(context))
    }
}
