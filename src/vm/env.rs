//! The VM's lexical environment: unlike the interpreter, frames are keyed by
//! interned symbol id (`u32`) rather than by name, since the loaded program
//! only carries a symbol table, not live strings at the call site. Each
//! frame doubles as a call-stack entry: besides its slot map and outer
//! pointer it carries the `ret_pc` to resume at when the frame is popped.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::vm::value::VmValue;

pub struct VmScope {
    slots: HashMap<u32, VmValue>,
    pub outer: Option<VmEnv>,
    pub ret_pc: usize,
}

pub type VmEnv = Rc<RefCell<VmScope>>;

pub fn new_frame(outer: Option<VmEnv>) -> VmEnv {
    Rc::new(RefCell::new(VmScope { slots: HashMap::new(), outer, ret_pc: 0 }))
}

/// Walks the chain outward from `env`, returning the first binding found.
pub fn lookup(env: &VmEnv, sym: u32) -> Option<VmValue> {
    let scope = env.borrow();
    if let Some(v) = scope.slots.get(&sym) {
        return Some(v.clone());
    }
    match &scope.outer {
        Some(outer) => lookup(outer, sym),
        None => None,
    }
}

/// Insertion always targets the innermost (top) frame.
pub fn bind(env: &VmEnv, sym: u32, value: VmValue) {
    env.borrow_mut().slots.insert(sym, value);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lookup_walks_outer_chain() {
        let root = new_frame(None);
        bind(&root, 1, VmValue::Int(42));
        let child = new_frame(Some(root));
        assert_eq!(lookup(&child, 1), Some(VmValue::Int(42)));
        assert_eq!(lookup(&child, 2), None);
    }

    #[test]
    fn bind_only_affects_innermost_frame() {
        let root = new_frame(None);
        bind(&root, 1, VmValue::Int(1));
        let child = new_frame(Some(root.clone()));
        bind(&child, 1, VmValue::Int(2));
        assert_eq!(lookup(&root, 1), Some(VmValue::Int(1)));
        assert_eq!(lookup(&child, 1), Some(VmValue::Int(2)));
    }
}
