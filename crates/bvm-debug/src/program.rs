//! Read-only view of the compiled program: functions, classes, selectors and
//! the debug info that maps bytecode positions to source.
//!
//! The compiler itself lives elsewhere; the debugger only needs the
//! [`ProgramSymbols`] and [`DebugInfo`] lookups. [`StaticProgram`] implements
//! both from a JSON symbol-table export.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use bvm_wire::{ClassId, FunctionId};

use crate::error::{DebugError, DebugResult};
use crate::scope::Scope;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionKind {
    #[default]
    Normal,
    Closure,
    /// Synthetic call adapter generated for closures and tear-offs.
    Trampoline,
    /// Runtime machinery that user code never names.
    Internal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationEntry {
    pub bytecode_index: u32,
    pub file: String,
    pub line: u32,
    pub column: u32,
    /// Locals in scope at this entry, in declaration order.
    #[serde(default)]
    pub locals: Vec<String>,
}

impl LocationEntry {
    fn location(&self) -> SourceLocation {
        SourceLocation {
            file: self.file.clone(),
            line: self.line,
            column: self.column,
        }
    }

    fn same_location(&self, other: &LocationEntry) -> bool {
        self.file == other.file && self.line == other.line && self.column == other.column
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub id: FunctionId,
    pub name: String,
    #[serde(default)]
    pub kind: FunctionKind,
    #[serde(default)]
    pub class: Option<ClassId>,
    /// Sorted by `bytecode_index`.
    #[serde(default)]
    pub locations: Vec<LocationEntry>,
}

impl FunctionInfo {
    pub fn new(id: FunctionId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: FunctionKind::Normal,
            class: None,
            locations: Vec::new(),
        }
    }

    pub fn with_kind(mut self, kind: FunctionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn in_class(mut self, class: ClassId) -> Self {
        self.class = Some(class);
        self
    }

    /// Adds a debug-info entry.
    pub fn at(mut self, bytecode_index: u32, file: &str, line: u32, column: u32, locals: &[&str]) -> Self {
        self.locations.push(LocationEntry {
            bytecode_index,
            file: file.to_owned(),
            line,
            column,
            locals: locals.iter().map(|local| (*local).to_owned()).collect(),
        });
        self.normalize();
        self
    }

    fn normalize(&mut self) {
        self.locations.sort_by_key(|entry| entry.bytecode_index);
    }

    pub fn is_internal(&self) -> bool {
        matches!(self.kind, FunctionKind::Trampoline | FunctionKind::Internal)
    }

    fn entry_index_at(&self, bytecode_index: u32) -> Option<usize> {
        let after = self
            .locations
            .partition_point(|entry| entry.bytecode_index <= bytecode_index);
        after.checked_sub(1)
    }

    /// Source location of the last debug-info entry at or before `bytecode_index`.
    pub fn location_at(&self, bytecode_index: u32) -> Option<SourceLocation> {
        let index = self.entry_index_at(bytecode_index)?;
        Some(self.locations[index].location())
    }

    /// First bytecode index after `bytecode_index` whose source location
    /// differs from the current one.
    pub fn next_step_target(&self, bytecode_index: u32) -> Option<u32> {
        let current = &self.locations[self.entry_index_at(bytecode_index)?];
        self.locations
            .iter()
            .filter(|entry| entry.bytecode_index > bytecode_index)
            .find(|entry| !entry.same_location(current))
            .map(|entry| entry.bytecode_index)
    }

    pub fn scope_at(&self, bytecode_index: u32) -> Scope {
        match self.entry_index_at(bytecode_index) {
            Some(index) => Scope::from_locals(self.locations[index].locals.iter().cloned()),
            None => Scope::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub id: ClassId,
    pub name: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

impl ClassInfo {
    pub fn new(id: ClassId, name: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            id,
            name: name.into(),
            fields: fields.iter().map(|field| (*field).to_owned()).collect(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectorKind {
    Method,
    Getter,
    Setter,
}

/// A dispatch key: `id << 10 | kind << 8 | arity`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selector {
    pub id: u32,
    pub kind: SelectorKind,
    pub arity: u32,
}

impl Selector {
    const ARITY_BITS: u32 = 8;
    const KIND_BITS: u32 = 2;

    pub fn decode(encoded: i64) -> Option<Self> {
        let encoded = u64::try_from(encoded).ok()?;
        let arity = (encoded & ((1 << Self::ARITY_BITS) - 1)) as u32;
        let kind = match (encoded >> Self::ARITY_BITS) & ((1 << Self::KIND_BITS) - 1) {
            0 => SelectorKind::Method,
            1 => SelectorKind::Getter,
            2 => SelectorKind::Setter,
            _ => return None,
        };
        let id = u32::try_from(encoded >> (Self::ARITY_BITS + Self::KIND_BITS)).ok()?;
        Some(Self { id, kind, arity })
    }

    pub fn encode(&self) -> i64 {
        let kind = match self.kind {
            SelectorKind::Method => 0,
            SelectorKind::Getter => 1,
            SelectorKind::Setter => 2,
        };
        (i64::from(self.id) << (Self::ARITY_BITS + Self::KIND_BITS))
            | (kind << Self::ARITY_BITS)
            | i64::from(self.arity)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ColumnSpec {
    Column(u32),
    /// First occurrence of the text on the requested line.
    Pattern(String),
}

/// A resolved breakpoint target.
#[derive(Clone, Debug)]
pub struct Position {
    pub function: Arc<FunctionInfo>,
    pub bytecode_index: u32,
    pub location: SourceLocation,
}

pub trait ProgramSymbols {
    fn function(&self, id: FunctionId) -> Option<Arc<FunctionInfo>>;
    fn class(&self, id: ClassId) -> Option<&ClassInfo>;
    fn class_by_name(&self, name: &str) -> Option<&ClassInfo>;
    fn selector_name(&self, id: u32) -> Option<&str>;
    /// Every function named `name` (or `Class.name`), ordered by id.
    fn functions_named(&self, name: &str) -> Vec<Arc<FunctionInfo>>;
}

pub trait DebugInfo {
    fn position_for_offset(&self, file: &str, offset: usize) -> Option<Position>;
    fn position_for_line(&self, file: &str, line: u32, column: &ColumnSpec) -> Option<Position>;
}

pub trait Program: ProgramSymbols + DebugInfo + Send + Sync {}

impl<T: ProgramSymbols + DebugInfo + Send + Sync> Program for T {}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProgramExport {
    #[serde(default)]
    functions: Vec<FunctionInfo>,
    #[serde(default)]
    classes: Vec<ClassInfo>,
    #[serde(default)]
    selectors: BTreeMap<u32, String>,
    #[serde(default)]
    sources: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
pub struct StaticProgram {
    functions: BTreeMap<FunctionId, Arc<FunctionInfo>>,
    classes: HashMap<ClassId, ClassInfo>,
    selectors: HashMap<u32, String>,
    sources: HashMap<String, String>,
}

impl StaticProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(text: &str) -> DebugResult<Self> {
        let export: ProgramExport = serde_json::from_str(text)
            .map_err(|err| DebugError::Program(format!("invalid symbol table: {err}")))?;
        let mut program = Self::new();
        for function in export.functions {
            program.add_function(function);
        }
        for class in export.classes {
            program.add_class(class);
        }
        program.selectors.extend(export.selectors);
        program.sources.extend(export.sources);
        Ok(program)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> DebugResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| DebugError::Program(format!("failed to read {}: {err}", path.display())))?;
        Self::from_json_str(&text)
    }

    pub fn add_function(&mut self, mut function: FunctionInfo) {
        function.normalize();
        self.functions.insert(function.id, Arc::new(function));
    }

    pub fn add_class(&mut self, class: ClassInfo) {
        self.classes.insert(class.id, class);
    }

    pub fn with_function(mut self, function: FunctionInfo) -> Self {
        self.add_function(function);
        self
    }

    pub fn with_class(mut self, class: ClassInfo) -> Self {
        self.add_class(class);
        self
    }

    pub fn with_selector(mut self, id: u32, name: impl Into<String>) -> Self {
        self.selectors.insert(id, name.into());
        self
    }

    pub fn with_source(mut self, file: impl Into<String>, text: impl Into<String>) -> Self {
        self.sources.insert(file.into(), text.into());
        self
    }

    fn qualified_name(&self, function: &FunctionInfo) -> Option<String> {
        let class = self.classes.get(&function.class?)?;
        Some(format!("{}.{}", class.name, function.name))
    }
}

impl ProgramSymbols for StaticProgram {
    fn function(&self, id: FunctionId) -> Option<Arc<FunctionInfo>> {
        self.functions.get(&id).cloned()
    }

    fn class(&self, id: ClassId) -> Option<&ClassInfo> {
        self.classes.get(&id)
    }

    fn class_by_name(&self, name: &str) -> Option<&ClassInfo> {
        self.classes
            .values()
            .filter(|class| class.name == name)
            .min_by_key(|class| class.id)
    }

    fn selector_name(&self, id: u32) -> Option<&str> {
        self.selectors.get(&id).map(String::as_str)
    }

    fn functions_named(&self, name: &str) -> Vec<Arc<FunctionInfo>> {
        self.functions
            .values()
            .filter(|function| {
                function.name == name || self.qualified_name(function).as_deref() == Some(name)
            })
            .cloned()
            .collect()
    }
}

impl DebugInfo for StaticProgram {
    fn position_for_offset(&self, file: &str, offset: usize) -> Option<Position> {
        let text = self.sources.get(file)?;
        let before = text.get(..offset)?;
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map_or(0, |newline| newline + 1);
        let column = offset - line_start + 1;
        self.position_for_line(
            file,
            u32::try_from(line).ok()?,
            &ColumnSpec::Column(u32::try_from(column).ok()?),
        )
    }

    fn position_for_line(&self, file: &str, line: u32, column: &ColumnSpec) -> Option<Position> {
        let min_column = match column {
            ColumnSpec::Column(column) => *column,
            ColumnSpec::Pattern(pattern) => {
                let text = self.sources.get(file)?.lines().nth(line.checked_sub(1)? as usize)?;
                u32::try_from(text.find(pattern.as_str())? + 1).ok()?
            }
        };

        // Closest column at or after the requested one; ties go to the
        // lowest function id, then the lowest bytecode index.
        self.functions
            .values()
            .flat_map(|function| {
                function
                    .locations
                    .iter()
                    .filter(|entry| entry.file == file && entry.line == line && entry.column >= min_column)
                    .map(move |entry| (entry.column, function, entry))
            })
            .min_by_key(|(column, function, entry)| (*column, function.id, entry.bytecode_index))
            .map(|(_, function, entry)| Position {
                function: function.clone(),
                bytecode_index: entry.bytecode_index,
                location: entry.location(),
            })
    }
}
