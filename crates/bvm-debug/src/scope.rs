use std::sync::Arc;

/// One named local-variable slot, linked to the slots declared before it.
#[derive(Debug, PartialEq, Eq)]
pub struct ScopeInfo {
    pub name: String,
    pub slot: u32,
    outer: Option<Arc<ScopeInfo>>,
}

impl ScopeInfo {
    pub fn outer(&self) -> Option<&ScopeInfo> {
        self.outer.as_deref()
    }
}

/// The locals visible at a bytecode position, most-local first.
///
/// Slots are assigned in declaration order, so a later declaration of a name
/// shadows an earlier one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Scope {
    innermost: Option<Arc<ScopeInfo>>,
}

impl Scope {
    pub fn from_locals<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut scope = Self::default();
        for name in names {
            scope.push(name);
        }
        scope
    }

    /// Declares `name` in the next free slot.
    pub fn push(&mut self, name: impl Into<String>) {
        let slot = self.innermost.as_ref().map_or(0, |info| info.slot + 1);
        self.innermost = Some(Arc::new(ScopeInfo {
            name: name.into(),
            slot,
            outer: self.innermost.take(),
        }));
    }

    pub fn is_empty(&self) -> bool {
        self.innermost.is_none()
    }

    /// Nearest declaration of `name`, walking outward.
    pub fn lookup(&self, name: &str) -> Option<&ScopeInfo> {
        self.iter().find(|info| info.name == name)
    }

    /// Most-local first.
    pub fn iter(&self) -> impl Iterator<Item = &ScopeInfo> {
        std::iter::successors(self.innermost.as_deref(), |info| info.outer())
    }

    /// Declaration order, with shadowed declarations dropped.
    pub fn visible_locals(&self) -> Vec<&ScopeInfo> {
        let mut seen = Vec::new();
        let mut out: Vec<&ScopeInfo> = Vec::new();
        for info in self.iter() {
            if !seen.contains(&info.name.as_str()) {
                seen.push(info.name.as_str());
                out.push(info);
            }
        }
        out.reverse();
        out
    }
}
