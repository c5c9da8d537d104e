use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BasicType {
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uintptr,
    Float32,
    Float64,
    Complex64,
    Complex128,
    String,
    UnsafePointer,
}

impl BasicType {
    /// Canonical lowercase spelling. Aliases (`byte`, `rune`) do not exist
    /// at this level; the front end resolves them before handoff.
    pub fn name(self) -> &'static str {
        match self {
            BasicType::Bool => "bool",
            BasicType::Int => "int",
            BasicType::Int8 => "int8",
            BasicType::Int16 => "int16",
            BasicType::Int32 => "int32",
            BasicType::Int64 => "int64",
            BasicType::Uint => "uint",
            BasicType::Uint8 => "uint8",
            BasicType::Uint16 => "uint16",
            BasicType::Uint32 => "uint32",
            BasicType::Uint64 => "uint64",
            BasicType::Uintptr => "uintptr",
            BasicType::Float32 => "float32",
            BasicType::Float64 => "float64",
            BasicType::Complex64 => "complex64",
            BasicType::Complex128 => "complex128",
            BasicType::String => "string",
            BasicType::UnsafePointer => "unsafe.Pointer",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChanDir {
    SendRecv,
    SendOnly,
    RecvOnly,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub ty: Type,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub embedded: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    #[serde(default)]
    pub params: Vec<Type>,
    #[serde(default)]
    pub results: Vec<Type>,
}

impl Signature {
    pub fn new(params: Vec<Type>, results: Vec<Type>) -> Self {
        Self { params, results }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterfaceMethod {
    pub name: String,
    /// Import path of the declaring package; only significant for
    /// unexported methods, which match per-package.
    #[serde(default)]
    pub pkg: String,
    pub sig: Signature,
}

impl InterfaceMethod {
    /// Matching label: bare name when exported, package-qualified otherwise.
    pub fn label(&self) -> String {
        if is_exported(&self.name) {
            self.name.clone()
        } else {
            format!("{}.{}", self.pkg, self.name)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Basic(BasicType),
    /// Fully-qualified name; definition lives in [`TypeDefs`]. Back edges of
    /// recursive types always pass through this indirection, so the type
    /// graph itself is acyclic.
    Named(String),
    Pointer(Box<Type>),
    Slice(Box<Type>),
    Array(u64, Box<Type>),
    Chan(ChanDir, Box<Type>),
    Map(Box<Type>, Box<Type>),
    Struct(Vec<StructField>),
    Interface(Vec<InterfaceMethod>),
    Signature(Box<Signature>),
}

impl Type {
    /// Build an interface type with its method list in canonical
    /// (label-sorted) order.
    pub fn interface(mut methods: Vec<InterfaceMethod>) -> Type {
        methods.sort_by_key(InterfaceMethod::label);
        Type::Interface(methods)
    }

    pub fn pointer_to(self) -> Type {
        Type::Pointer(Box::new(self))
    }

    pub fn is_interface(&self, defs: &TypeDefs) -> bool {
        matches!(defs.underlying(self), Ok(Type::Interface(_)))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Basic(b) => write!(f, "{}", b.name()),
            Type::Named(name) => write!(f, "{}", name),
            Type::Pointer(elem) => write!(f, "*{}", elem),
            Type::Slice(elem) => write!(f, "[]{}", elem),
            Type::Array(len, elem) => write!(f, "[{}]{}", len, elem),
            Type::Chan(_, elem) => write!(f, "chan {}", elem),
            Type::Map(key, value) => write!(f, "map[{}]{}", key, value),
            Type::Struct(_) => write!(f, "struct{{..}}"),
            Type::Interface(_) => write!(f, "interface{{..}}"),
            Type::Signature(_) => write!(f, "func(..)"),
        }
    }
}

/// Source-language visibility rule: a name is exported iff its first
/// character is uppercase.
pub fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// One method attached to a named type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDef {
    pub name: String,
    #[serde(default)]
    pub pkg: String,
    pub sig: Signature,
    /// True when the receiver is `*T` rather than `T`.
    #[serde(default)]
    pub ptr_recv: bool,
    /// Link name of the concrete implementation function.
    pub func: String,
}

impl MethodDef {
    pub fn label(&self) -> String {
        if is_exported(&self.name) {
            self.name.clone()
        } else {
            format!("{}.{}", self.pkg, self.name)
        }
    }

    /// The receiver type of the concrete implementation.
    pub fn recv_type(&self, named: &str) -> Type {
        let base = Type::Named(named.to_string());
        if self.ptr_recv { base.pointer_to() } else { base }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedDef {
    pub underlying: Type,
    #[serde(default)]
    pub methods: Vec<MethodDef>,
}

/// Table of named type definitions, keyed by fully-qualified name.
/// Method lists are kept in canonical (label-sorted) order on insert.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TypeDefs {
    types: HashMap<String, NamedDef>,
}

impl TypeDefs {
    pub fn insert(&mut self, name: impl Into<String>, mut def: NamedDef) {
        def.methods.sort_by_key(MethodDef::label);
        self.types.insert(name.into(), def);
    }

    pub fn get(&self, name: &str) -> Option<&NamedDef> {
        self.types.get(name)
    }

    /// Restore canonical method order after loading an external dump,
    /// which bypasses [`TypeDefs::insert`].
    pub fn normalize(&mut self) {
        for def in self.types.values_mut() {
            def.methods.sort_by_key(MethodDef::label);
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve to the first non-named type, following definition edges.
    /// A chain longer than the table can only be a definition cycle.
    pub fn underlying<'a>(&'a self, ty: &'a Type) -> Result<&'a Type, String> {
        let mut cur = ty;
        let mut hops = 0usize;
        while let Type::Named(name) = cur {
            let def = self
                .types
                .get(name)
                .ok_or_else(|| format!("unknown named type {}", name))?;
            cur = &def.underlying;
            hops += 1;
            if hops > self.types.len() {
                return Err(format!("named type definition cycle through {}", name));
            }
        }
        Ok(cur)
    }

    /// Method set of a type. `T` carries its value-receiver methods; `*T`
    /// carries all of them. Other shapes have empty method sets.
    pub fn method_set<'a>(&'a self, ty: &'a Type) -> Vec<(&'a str, &'a MethodDef)> {
        match ty {
            Type::Named(name) => match self.types.get(name) {
                Some(def) => def
                    .methods
                    .iter()
                    .filter(|m| !m.ptr_recv)
                    .map(|m| (name.as_str(), m))
                    .collect(),
                None => Vec::new(),
            },
            Type::Pointer(elem) => match elem.as_ref() {
                Type::Named(name) => match self.types.get(name) {
                    Some(def) => def.methods.iter().map(|m| (name.as_str(), m)).collect(),
                    None => Vec::new(),
                },
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }
}
