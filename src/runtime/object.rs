//! Host-object handles.
//!
//! The host owns its objects; scripts only hold weak handles. A small
//! shared tombstone record carries a nullable reference so the host can
//! invalidate an object while outstanding script references survive
//! safely. A disposed handle is observable as `ObjectDisposed` the next
//! time a script dereferences it.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::function::Function;

/// Implemented by host objects that scripts can call methods on.
pub trait ScriptObject {
    /// Look up a method by name. Unknown names make the calling script
    /// fail with `UnsupportedFunction`.
    fn get_function(&self, name: &str) -> Option<Rc<dyn Function>>;
}

/// The shared indirection record between a host object and all script
/// references to it.
struct Tombstone {
    target: RefCell<Option<Rc<dyn ScriptObject>>>,
}

/// A weak handle to a host-provided object. Cloning the handle shares
/// the same tombstone; two handles are equal when they share it.
#[derive(Clone)]
pub struct ObjectRef {
    stone: Rc<Tombstone>,
}

impl ObjectRef {
    /// Create a live handle for a host object.
    pub fn new(object: Rc<dyn ScriptObject>) -> Self {
        Self {
            stone: Rc::new(Tombstone {
                target: RefCell::new(Some(object)),
            }),
        }
    }

    /// Access the object, or `None` if the host disposed it.
    pub fn lock(&self) -> Option<Rc<dyn ScriptObject>> {
        self.stone.target.borrow().clone()
    }

    /// Invalidate the object. Outstanding handles stay valid but
    /// observe the disposal.
    pub fn dispose(&self) {
        *self.stone.target.borrow_mut() = None;
    }

    pub fn is_alive(&self) -> bool {
        self.stone.target.borrow().is_some()
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.stone, &other.stone)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ObjectRef({})",
            if self.is_alive() { "alive" } else { "disposed" }
        )
    }
}
