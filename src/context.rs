//! Variable scopes for a running script.
//!
//! A [`Context`] is an arena of scope frames linked to their parents by
//! index. Frame `0` is created with the context and is the root of every
//! chain. Lookups are two-tier: the current frame, then the root frame.
//! Frames in between are never consulted.

use std::collections::HashMap;

use crate::value::Value;

/// Index of a scope frame inside a [`Context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

impl ScopeId {
    /// The frame every context starts with.
    pub const ROOT: ScopeId = ScopeId(0);
}

#[derive(Debug, Default)]
struct Frame {
    variables: HashMap<String, Value>,
    parent: Option<ScopeId>,
}

/// Execution context containing the scope frames of one script run.
#[derive(Debug)]
pub struct Context {
    frames: Vec<Frame>,
    current: ScopeId,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Create a context holding only an empty root frame.
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::default()],
            current: ScopeId::ROOT,
        }
    }

    /// Create a context whose root frame is seeded with `variables`.
    pub fn with_variables(variables: HashMap<String, Value>) -> Self {
        Self {
            frames: vec![Frame {
                variables,
                parent: None,
            }],
            current: ScopeId::ROOT,
        }
    }

    /// The frame reads and writes currently go to.
    pub fn current(&self) -> ScopeId {
        self.current
    }

    /// Parent of the current frame, `None` at the root.
    pub fn parent(&self) -> Option<ScopeId> {
        self.frames[self.current.0].parent
    }

    /// Root ancestor of the current frame.
    pub fn root(&self) -> ScopeId {
        self.root_of(self.current)
    }

    /// Walks parent links until a frame without a parent is reached.
    fn root_of(&self, mut id: ScopeId) -> ScopeId {
        while let Some(parent) = self.frames[id.0].parent {
            id = parent;
        }
        id
    }

    /// Number of live frames, root included.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Open a new frame under the current one and make it current.
    ///
    /// Returns the previously current frame, to be handed back to
    /// [`Context::pop_scope`].
    pub fn push_scope(&mut self) -> ScopeId {
        self.push_scope_under(self.current)
    }

    /// Open a new frame under `parent` and make it current.
    pub fn push_scope_under(&mut self, parent: ScopeId) -> ScopeId {
        let previous = self.current;
        self.frames.push(Frame {
            variables: HashMap::new(),
            parent: Some(parent),
        });
        self.current = ScopeId(self.frames.len() - 1);
        previous
    }

    /// Close the current frame and restore `previous` as current.
    ///
    /// Frames are released in call-stack order; the closed frame is always
    /// the most recently opened one.
    pub fn pop_scope(&mut self, previous: ScopeId) {
        debug_assert_eq!(self.current.0, self.frames.len() - 1);
        debug_assert!(self.current != ScopeId::ROOT, "the root frame is never popped");
        if self.current != ScopeId::ROOT {
            self.frames.truncate(self.current.0);
        }
        self.current = previous;
    }

    /// Drop every frame above the root and make the root current.
    ///
    /// Used when an evaluation was cut off before it could close the
    /// scopes it opened.
    pub fn unwind_to_root(&mut self) {
        self.frames.truncate(ScopeId::ROOT.0 + 1);
        self.current = ScopeId::ROOT;
    }

    /// Read `name` from the current frame, then from the root frame.
    ///
    /// Absent in both yields [`Value::Null`].
    pub fn get(&self, name: &str) -> Value {
        let current = &self.frames[self.current.0];
        if let Some(value) = current.variables.get(name) {
            return value.clone();
        }
        let root = self.root();
        if root == self.current {
            return Value::Null;
        }
        self.frames[root.0]
            .variables
            .get(name)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Whether `name` is bound in the current or the root frame.
    pub fn contains(&self, name: &str) -> bool {
        self.frames[self.current.0].variables.contains_key(name)
            || self.frames[self.root().0].variables.contains_key(name)
    }

    /// Assign `name`.
    ///
    /// Overwrites an existing binding in the current frame, else an existing
    /// binding in the root frame, else creates the binding locally.
    pub fn set(&mut self, name: &str, value: Value) {
        let current = self.current;
        if self.frames[current.0].variables.contains_key(name) {
            self.frames[current.0]
                .variables
                .insert(name.to_string(), value);
            return;
        }
        let root = self.root();
        let target = if self.frames[root.0].variables.contains_key(name) {
            root
        } else {
            current
        };
        self.frames[target.0]
            .variables
            .insert(name.to_string(), value);
    }

    /// Assign `name` in the root frame regardless of the current frame.
    ///
    /// A null value creates a missing global but never replaces an
    /// existing one.
    pub fn set_global(&mut self, name: &str, value: Value) {
        let root = self.root();
        let globals = &mut self.frames[root.0].variables;
        match globals.get_mut(name) {
            Some(existing) => {
                if !value.is_null() {
                    *existing = value;
                }
            }
            None => {
                globals.insert(name.to_string(), value);
            }
        }
    }

    /// Copy of the root frame's bindings.
    pub fn variables(&self) -> HashMap<String, Value> {
        self.frames[self.root().0].variables.clone()
    }

    /// Consume the context, keeping the root frame's bindings.
    pub fn into_variables(mut self) -> HashMap<String, Value> {
        self.frames.swap_remove(ScopeId::ROOT.0).variables
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_root_binding_visible_from_nested_scope() {
        let mut ctx = Context::new();
        ctx.set("x", Value::from(1));
        let outer = ctx.push_scope();
        let inner = ctx.push_scope();
        assert_eq!(ctx.get("x"), Value::from(1));
        ctx.pop_scope(inner);
        ctx.pop_scope(outer);
    }

    #[test]
    fn test_intermediate_binding_is_not_visible() {
        let mut ctx = Context::new();
        let outer = ctx.push_scope();
        ctx.set("x", Value::from("middle"));
        let inner = ctx.push_scope();
        assert_eq!(ctx.get("x"), Value::Null);
        assert!(!ctx.contains("x"));
        ctx.pop_scope(inner);
        assert_eq!(ctx.get("x"), Value::from("middle"));
        ctx.pop_scope(outer);
    }

    #[test]
    fn test_unwind_to_root_discards_open_scopes() {
        let mut ctx = Context::new();
        ctx.set("kept", Value::from(1));
        ctx.push_scope();
        ctx.push_scope();
        ctx.set("dropped", Value::from(2));
        assert_eq!(ctx.depth(), 3);

        ctx.unwind_to_root();
        assert_eq!(ctx.depth(), 1);
        assert_eq!(ctx.current(), ScopeId::ROOT);
        assert_eq!(ctx.get("kept"), Value::from(1));
        assert_eq!(ctx.get("dropped"), Value::Null);
    }

    #[test]
    fn test_set_creates_local_binding() {
        let mut ctx = Context::new();
        let previous = ctx.push_scope();
        ctx.set("local", Value::from(5));
        assert_eq!(ctx.get("local"), Value::from(5));
        ctx.pop_scope(previous);

        assert_eq!(ctx.get("local"), Value::Null);
        let sibling = ctx.push_scope();
        assert_eq!(ctx.get("local"), Value::Null);
        ctx.pop_scope(sibling);
    }

    #[test]
    fn test_set_overwrites_existing_root_binding() {
        let mut ctx = Context::new();
        ctx.set("count", Value::from(1));
        let previous = ctx.push_scope();
        ctx.set("count", Value::from(2));
        ctx.pop_scope(previous);
        assert_eq!(ctx.get("count"), Value::from(2));
    }

    #[test]
    fn test_set_prefers_local_binding_over_root() {
        let mut ctx = Context::new();
        ctx.set("v", Value::from("root"));
        let previous = ctx.push_scope();
        // Forced local shadow through the arena API.
        ctx.frames[ctx.current.0]
            .variables
            .insert("v".to_string(), Value::from("local"));
        ctx.set("v", Value::from("updated"));
        assert_eq!(ctx.get("v"), Value::from("updated"));
        ctx.pop_scope(previous);
        assert_eq!(ctx.get("v"), Value::from("root"));
    }

    #[test]
    fn test_set_global_targets_root() {
        let mut ctx = Context::new();
        let previous = ctx.push_scope();
        ctx.set_global("g", Value::from(7));
        ctx.pop_scope(previous);
        assert_eq!(ctx.get("g"), Value::from(7));
        assert_eq!(ctx.variables().get("g"), Some(&Value::from(7)));
    }

    #[test]
    fn test_set_global_null_keeps_existing_value() {
        let mut ctx = Context::new();
        ctx.set_global("g", Value::from("kept"));
        let previous = ctx.push_scope();
        ctx.set_global("g", Value::Null);
        assert_eq!(ctx.get("g"), Value::from("kept"));
        ctx.pop_scope(previous);
    }

    #[test]
    fn test_set_global_null_creates_missing_binding() {
        let mut ctx = Context::new();
        ctx.set_global("g", Value::Null);
        assert!(ctx.contains("g"));
    }

    // `set` lands new names locally while `set_global` lands them at the
    // root. Both behaviours are relied upon by stored scripts.
    #[test]
    fn test_set_and_set_global_asymmetry() {
        let mut ctx = Context::new();
        let previous = ctx.push_scope();
        ctx.set("a", Value::from(1));
        ctx.set_global("b", Value::from(2));
        ctx.pop_scope(previous);
        assert_eq!(ctx.get("a"), Value::Null);
        assert_eq!(ctx.get("b"), Value::from(2));
    }

    #[test]
    fn test_scope_under_root_skips_caller_frame() {
        let mut ctx = Context::new();
        let caller = ctx.push_scope();
        ctx.set("arg", Value::from(1));
        let caller_frame = ctx.current();
        let call = ctx.push_scope_under(ScopeId::ROOT);
        assert_eq!(ctx.parent(), Some(ScopeId::ROOT));
        assert_eq!(ctx.get("arg"), Value::Null);
        ctx.pop_scope(call);
        assert_eq!(ctx.current(), caller_frame);
        ctx.pop_scope(caller);
        assert_eq!(ctx.depth(), 1);
    }

    proptest! {
        #[test]
        fn prop_root_binding_visible_at_any_depth(depth in 0usize..16, value in -1e6f64..1e6) {
            let mut ctx = Context::new();
            ctx.set("x", Value::Number(value));
            let mut stack = Vec::new();
            for _ in 0..depth {
                stack.push(ctx.push_scope());
            }
            prop_assert_eq!(ctx.get("x"), Value::Number(value));
            while let Some(previous) = stack.pop() {
                ctx.pop_scope(previous);
            }
            prop_assert_eq!(ctx.depth(), 1);
        }

        #[test]
        fn prop_intermediate_binding_never_visible(depth in 2usize..12, at in 1usize..11) {
            prop_assume!(at < depth);
            let mut ctx = Context::new();
            let mut stack = Vec::new();
            for level in 1..=depth {
                stack.push(ctx.push_scope());
                if level == at {
                    ctx.set("hidden", Value::from(true));
                }
            }
            prop_assert_eq!(ctx.get("hidden"), Value::Null);
            while let Some(previous) = stack.pop() {
                ctx.pop_scope(previous);
            }
        }
    }
}
