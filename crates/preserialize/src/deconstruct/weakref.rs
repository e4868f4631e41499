//! Weak reference adapter.
//!
//! A weak reference decomposes into the attribute `object` (the target, or
//! null once the target is gone) and, when one is set, `callback`. Both are
//! regular attributes, so a weak back-edge to an ancestor is encoded as a
//! reference marker and closed by the deferred patch pass like any other.

use crate::deconstruct::{Deconstructor, Parts, TypeBinding};
use crate::error::Result;
use crate::model::{Attributes, Node, Object, PathKey, WeakObj, WeakRef};

const OBJECT: &str = "object";
const CALLBACK: &str = "callback";

#[derive(Debug, Clone, Copy, Default)]
pub struct WeakRefDeconstructor;

impl Deconstructor for WeakRefDeconstructor {
    fn deconstruct(&self, binding: &TypeBinding, obj: &Object) -> Result<Parts> {
        let r = obj.as_ref_obj().ok_or_else(|| binding.mismatch(obj))?;
        let node = r.borrow();
        let Node::Weak(weak) = &*node else {
            return Err(binding.mismatch(obj));
        };

        let mut kwargs = Attributes::new();
        let target = weak.target.upgrade().map(Object::Ref).unwrap_or(Object::Null);
        kwargs.insert(OBJECT.to_string(), target);
        if let Some(callback) = &weak.callback {
            kwargs.insert(CALLBACK.to_string(), callback.clone());
        }
        Ok(Parts::kwargs(kwargs))
    }

    fn make_shell(&self, binding: &TypeBinding, args: Vec<Object>) -> Result<Object> {
        if !args.is_empty() {
            return Err(binding.bad_arguments("weak references take no positional arguments"));
        }
        Ok(Object::new(Node::Weak(WeakRef::default())))
    }

    fn setattr(&self, binding: &TypeBinding, obj: &Object, key: &PathKey, value: Object) -> Result<()> {
        let r = obj.as_ref_obj().ok_or_else(|| binding.mismatch(obj))?;
        let mut node = r.borrow_mut();
        let Node::Weak(weak) = &mut *node else {
            return Err(binding.mismatch(obj));
        };

        match (key.as_key(), value) {
            (Some(OBJECT), Object::Ref(target)) => weak.target = target.downgrade(),
            // Placeholder for a target that is patched in later, or a dead reference.
            (Some(OBJECT), Object::Null) => weak.target = WeakObj::new(),
            (Some(CALLBACK), Object::Null) => weak.callback = None,
            (Some(CALLBACK), callback) => weak.callback = Some(callback),
            _ => return Err(binding.unsupported_attribute(key)),
        }
        Ok(())
    }
}
