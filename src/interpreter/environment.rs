//! Scoped Variable Environment
//!
//! A stack of scopes, root first. Lookup walks from the innermost scope
//! outward. Typed assignment creates or overwrites in the current scope;
//! weak assignment updates the nearest existing binding or creates one in
//! the current scope. A binding with a declared type validates every later
//! weak assignment against that type.

use indexmap::IndexMap;
use tracing::trace;

use crate::ast::types::DeclaredType;
use crate::interpreter::value::{Value, ValueError};

/// Value plus its constraints
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub value: Value,
    pub declared: Option<DeclaredType>,
    pub exported: bool,
}

#[derive(Debug, Clone, Default)]
struct Scope {
    bindings: IndexMap<String, Binding>,
}

#[derive(Debug, Clone)]
pub struct Environment {
    scopes: Vec<Scope>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// Environment with an empty root scope
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }

    /// Root scope seeded from `vars` as exported strings
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut env = Self::new();
        for (name, value) in vars {
            env.scopes[0].bindings.insert(
                name.into(),
                Binding {
                    value: Value::Str(value.into()),
                    declared: None,
                    exported: true,
                },
            );
        }
        env
    }

    /// Root scope seeded from the process environment
    pub fn from_process_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
        trace!(depth = self.scopes.len(), "enter scope");
    }

    /// Drop the innermost scope; the root scope is never removed
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
        trace!(depth = self.scopes.len(), "leave scope");
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        self.scopes.iter().rev().find_map(|scope| scope.bindings.get(name))
    }

    /// Value of `name`, or None when unbound in every scope
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.lookup(name).map(|binding| &binding.value)
    }

    /// Typed assignment into the current scope
    pub fn declare(&mut self, name: &str, declared: DeclaredType, value: Value) -> Result<(), ValueError> {
        let value = value.coerce_to(declared)?;
        let exported = self.lookup(name).is_some_and(|b| b.exported);
        self.current_scope().bindings.insert(
            name.to_string(),
            Binding {
                value,
                declared: Some(declared),
                exported,
            },
        );
        Ok(())
    }

    /// Weak assignment: update the nearest binding or create a local one
    pub fn assign(&mut self, name: &str, value: Value) -> Result<(), ValueError> {
        match self.lookup_mut(name) {
            Some(binding) => {
                binding.value = match binding.declared {
                    Some(declared) => value.coerce_to(declared)?,
                    None => value,
                };
            }
            None => {
                self.current_scope().bindings.insert(
                    name.to_string(),
                    Binding {
                        value,
                        declared: None,
                        exported: false,
                    },
                );
            }
        }
        Ok(())
    }

    /// Bind in the current scope regardless of outer bindings
    pub fn set_local(&mut self, name: &str, value: Value) {
        self.current_scope().bindings.insert(
            name.to_string(),
            Binding {
                value,
                declared: None,
                exported: false,
            },
        );
    }

    /// Binding of `name` in the current scope only
    pub fn local(&self, name: &str) -> Option<&Binding> {
        self.scopes.last().and_then(|scope| scope.bindings.get(name))
    }

    /// Put back what `local` returned earlier; None removes the binding
    pub fn restore_local(&mut self, name: &str, saved: Option<Binding>) {
        let scope = self.current_scope();
        match saved {
            Some(binding) => {
                scope.bindings.insert(name.to_string(), binding);
            }
            None => {
                scope.bindings.shift_remove(name);
            }
        }
    }

    /// Remove the nearest binding of `name`
    pub fn unset(&mut self, name: &str) -> bool {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.bindings.shift_remove(name))
            .is_some()
    }

    /// Mark the nearest binding exported, creating an empty one if needed
    pub fn export(&mut self, name: &str) {
        match self.lookup_mut(name) {
            Some(binding) => binding.exported = true,
            None => {
                self.scopes[0].bindings.insert(
                    name.to_string(),
                    Binding {
                        value: Value::Str(String::new()),
                        declared: None,
                        exported: true,
                    },
                );
            }
        }
    }

    /// Exported name/value pairs as seen from the current scope
    pub fn exported(&self) -> Vec<(String, String)> {
        self.visible()
            .into_iter()
            .filter(|(_, binding)| binding.exported)
            .map(|(name, binding)| (name.to_string(), binding.value.to_text()))
            .collect()
    }

    /// Every visible binding, outer scopes first, shadowed names resolved
    pub fn visible(&self) -> Vec<(&str, &Binding)> {
        let mut merged: IndexMap<&str, &Binding> = IndexMap::new();
        for scope in &self.scopes {
            for (name, binding) in &scope.bindings {
                merged.insert(name.as_str(), binding);
            }
        }
        merged.into_iter().collect()
    }

    fn current_scope(&mut self) -> &mut Scope {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    fn lookup_mut(&mut self, name: &str) -> Option<&mut Binding> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.bindings.get_mut(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_outward() {
        let mut env = Environment::new();
        env.assign("x", Value::Int(1)).unwrap();
        env.push_scope();
        assert_eq!(env.get("x"), Some(&Value::Int(1)));
        assert_eq!(env.get("missing"), None);
    }

    #[test]
    fn test_weak_assignment_updates_nearest() {
        let mut env = Environment::new();
        env.assign("x", Value::Int(1)).unwrap();
        env.push_scope();
        env.assign("x", Value::Int(2)).unwrap();
        env.assign("y", Value::Int(3)).unwrap();
        env.pop_scope();
        assert_eq!(env.get("x"), Some(&Value::Int(2)));
        assert_eq!(env.get("y"), None);
    }

    #[test]
    fn test_restore_local() {
        let mut env = Environment::new();
        env.set_local("1", Value::Str("outer".into()));
        let saved = env.local("1").cloned();
        let absent = env.local("2").cloned();
        env.set_local("1", Value::Str("inner".into()));
        env.set_local("2", Value::Str("extra".into()));
        env.restore_local("1", saved);
        env.restore_local("2", absent);
        assert_eq!(env.get("1"), Some(&Value::Str("outer".into())));
        assert_eq!(env.get("2"), None);
    }

    #[test]
    fn test_typed_assignment_shadows() {
        let mut env = Environment::new();
        env.assign("x", Value::Str("outer".into())).unwrap();
        env.push_scope();
        env.declare("x", DeclaredType::Int, Value::Int(5)).unwrap();
        assert_eq!(env.get("x"), Some(&Value::Int(5)));
        env.pop_scope();
        assert_eq!(env.get("x"), Some(&Value::Str("outer".into())));
    }

    #[test]
    fn test_declared_type_constrains_weak_assignment() {
        let mut env = Environment::new();
        env.declare("f", DeclaredType::Float, Value::Int(1)).unwrap();
        assert_eq!(env.get("f"), Some(&Value::float(1.0)));
        env.assign("f", Value::Int(2)).unwrap();
        assert_eq!(env.get("f"), Some(&Value::float(2.0)));
        assert!(env.assign("f", Value::Str("abc".into())).is_err());
        assert_eq!(env.get("f"), Some(&Value::float(2.0)));
    }

    #[test]
    fn test_exports() {
        let mut env = Environment::from_vars([("HOME", "/home/me")]);
        env.assign("local", Value::Int(1)).unwrap();
        env.export("local");
        let exported = env.exported();
        assert!(exported.contains(&("HOME".to_string(), "/home/me".to_string())));
        assert!(exported.contains(&("local".to_string(), "1".to_string())));
    }

    #[test]
    fn test_unset_and_root_survives_pop() {
        let mut env = Environment::new();
        env.assign("x", Value::Int(1)).unwrap();
        env.pop_scope();
        assert_eq!(env.depth(), 1);
        assert!(env.unset("x"));
        assert!(!env.unset("x"));
    }
}
