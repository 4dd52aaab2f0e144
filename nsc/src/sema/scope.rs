use smol_str::SmolStr;
use std::collections::HashMap;

use super::VarId;

/// Lexical scopes of a function body, innermost last.
#[derive(Debug, Default)]
pub struct ScopeStack {
    scopes: Vec<HashMap<SmolStr, VarId>>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    #[inline]
    pub fn pop(&mut self) {
        self.scopes.pop();
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Declare a name in the innermost scope.
    ///
    /// Fails with the existing variable when the name is already
    /// declared in that same scope. Shadowing an outer scope is allowed.
    pub fn declare(&mut self, name: SmolStr, var: VarId) -> Result<(), VarId> {
        match self.scopes.last_mut() {
            Some(scope) => match scope.get(&name) {
                Some(existing) => Err(*existing),
                None => {
                    scope.insert(name, var);
                    Ok(())
                }
            },
            None => Ok(()),
        }
    }

    /// Innermost visible declaration of a name.
    pub fn lookup(&self, name: &str) -> Option<VarId> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name).copied())
    }

    pub fn clear(&mut self) {
        self.scopes.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_shadowing() {
        let mut scopes = ScopeStack::new();
        scopes.push();
        assert_eq!(scopes.declare("a".into(), VarId(0)), Ok(()));
        assert_eq!(scopes.declare("a".into(), VarId(1)), Err(VarId(0)));

        scopes.push();
        assert_eq!(scopes.declare("a".into(), VarId(2)), Ok(()));
        assert_eq!(scopes.lookup("a"), Some(VarId(2)));
        scopes.pop();

        assert_eq!(scopes.lookup("a"), Some(VarId(0)));
        assert_eq!(scopes.lookup("b"), None);
    }
}
