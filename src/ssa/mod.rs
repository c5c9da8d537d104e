// Purpose: Define the typed-SSA handoff consumed by the lowering core.
// Inputs/Outputs: Deserialized from a front-end dump or built in code; read-only during lowering.
// Invariants: Value names are single-assignment within a body; method tables are canonically ordered.
// Gotchas: A FuncDecl without a body is an external declaration, not an error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub mod types;

use types::{Signature, Type, TypeDefs};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

/// One function the front end hands off. Concrete methods list their
/// receiver as the first parameter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuncDecl {
    pub name: String,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub results: Vec<Type>,
    #[serde(default)]
    pub body: Option<Vec<Instr>>,
}

impl FuncDecl {
    pub fn sig(&self) -> Signature {
        Signature::new(
            self.params.iter().map(|p| p.ty.clone()).collect(),
            self.results.clone(),
        )
    }
}

/// The interface-related subset of the provider's instruction set. All
/// other instruction forms are translated elsewhere and never reach this
/// core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instr {
    /// Wrap a concrete value into a `{type-descriptor, opaque-ptr}` tuple.
    /// `iface` is the static interface type of the result.
    MakeInterface {
        dst: String,
        value: String,
        ty: Type,
        iface: Type,
    },
    /// `x.(AT)`; with `comma_ok` the result is a `{value, ok}` tuple.
    TypeAssert {
        dst: String,
        value: String,
        asserted: Type,
        #[serde(default)]
        comma_ok: bool,
    },
    /// Dynamic dispatch of `method` on an interface value.
    Invoke {
        #[serde(default)]
        dst: Option<String>,
        value: String,
        method: String,
        #[serde(default)]
        args: Vec<String>,
    },
    Return {
        #[serde(default)]
        values: Vec<String>,
    },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Program {
    pub defs: TypeDefs,
    #[serde(default)]
    pub functions: Vec<FuncDecl>,
}

impl Program {
    /// Link-name index used when resolving concrete method implementations.
    pub fn function_index(&self) -> HashMap<&str, &FuncDecl> {
        self.functions.iter().map(|f| (f.name.as_str(), f)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::types::BasicType;
    use super::*;

    #[test]
    fn program_round_trips_through_json() {
        let program = Program {
            defs: TypeDefs::default(),
            functions: vec![FuncDecl {
                name: "main".into(),
                params: vec![Param {
                    name: "n".into(),
                    ty: Type::Basic(BasicType::Int32),
                }],
                results: vec![],
                body: Some(vec![
                    Instr::MakeInterface {
                        dst: "itf".into(),
                        value: "n".into(),
                        ty: Type::Basic(BasicType::Int32),
                        iface: Type::interface(vec![]),
                    },
                    Instr::Return { values: vec![] },
                ]),
            }],
        };
        let json = serde_json::to_string(&program).expect("serialize program");
        let back: Program = serde_json::from_str(&json).expect("parse program");
        assert_eq!(back.functions, program.functions);
    }

    #[test]
    fn function_lookup_by_link_name() {
        let program = Program {
            defs: TypeDefs::default(),
            functions: vec![FuncDecl {
                name: "main.Celsius.String".into(),
                params: vec![],
                results: vec![],
                body: None,
            }],
        };
        let index = program.function_index();
        assert!(index.contains_key("main.Celsius.String"));
        assert!(!index.contains_key("main.Celsius.Format"));
    }
}
