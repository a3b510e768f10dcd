//! Runtime variable storage
//!
//! One global frame per evaluation plus a stack of per-call frames. Slots are
//! assigned at compile time, so lookups are plain indexing.

use crate::ast::Slot;
use crate::error::{JsltError, Result};
use crate::value::Value;

#[derive(Debug, Clone, Default)]
pub struct Scope {
    globals: Vec<Value>,
    locals: Vec<Vec<Value>>,
}

impl Scope {
    pub fn new(global_frame_size: usize) -> Self {
        Self { globals: vec![Value::Null; global_frame_size], locals: Vec::new() }
    }

    pub fn get(&self, slot: Slot) -> Result<&Value> {
        self.frame(slot)?
            .get(slot.offset())
            .ok_or_else(|| JsltError::runtime(format!("Variable slot {} is out of range", slot)))
    }

    pub fn set(&mut self, slot: Slot, value: Value) -> Result<()> {
        let frame = if slot.is_local() {
            self.locals
                .last_mut()
                .ok_or_else(|| JsltError::runtime(format!("No call frame for slot {}", slot)))?
        } else {
            &mut self.globals
        };
        match frame.get_mut(slot.offset()) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(JsltError::runtime(format!("Variable slot {} is out of range", slot))),
        }
    }

    fn frame(&self, slot: Slot) -> Result<&Vec<Value>> {
        if slot.is_local() {
            self.locals
                .last()
                .ok_or_else(|| JsltError::runtime(format!("No call frame for slot {}", slot)))
        } else {
            Ok(&self.globals)
        }
    }

    /// Pushes a fresh frame for a function call.
    pub fn enter_call(&mut self, frame_size: usize) {
        self.locals.push(vec![Value::Null; frame_size]);
    }

    pub fn leave_call(&mut self) {
        self.locals.pop();
    }

    pub fn call_depth(&self) -> usize {
        self.locals.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_slots() {
        let mut scope = Scope::new(2);
        scope.set(Slot::global(1), Value::Integer(7)).unwrap();
        assert_eq!(scope.get(Slot::global(1)).unwrap(), &Value::Integer(7));
        assert_eq!(scope.get(Slot::global(0)).unwrap(), &Value::Null);
        assert!(scope.get(Slot::global(2)).is_err());
    }

    #[test]
    fn test_call_frames_are_isolated() {
        let mut scope = Scope::new(0);
        assert!(scope.get(Slot::local(0)).is_err());

        scope.enter_call(1);
        scope.set(Slot::local(0), Value::from("outer")).unwrap();
        scope.enter_call(1);
        assert_eq!(scope.get(Slot::local(0)).unwrap(), &Value::Null);
        scope.set(Slot::local(0), Value::from("inner")).unwrap();
        assert_eq!(scope.call_depth(), 2);
        scope.leave_call();
        assert_eq!(scope.get(Slot::local(0)).unwrap(), &Value::from("outer"));
    }
}
