use std::fs;
use std::path::Path;

use crate::codegen::{lower_program, LoweredModule, TargetInfo};
use crate::ssa::types::{
    BasicType, InterfaceMethod, MethodDef, NamedDef, Signature, StructField, Type, TypeDefs,
};
use crate::ssa::{FuncDecl, Instr, Param, Program};

#[derive(Clone, Copy, Debug)]
pub struct CompileOptions {
    pub word_bytes: u64,
    pub verbose: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            word_bytes: 8,
            verbose: false,
        }
    }
}

/// Load a typed-SSA program dump and lower it to an LLVM IR module.
pub fn compile_file(path: &Path, opts: &CompileOptions) -> Result<LoweredModule, String> {
    let source = fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    let mut program: Program = serde_json::from_str(&source)
        .map_err(|e| format!("{}: invalid program dump: {}", path.display(), e))?;
    program.defs.normalize();
    compile_program(&program, opts)
}

pub fn compile_program(program: &Program, opts: &CompileOptions) -> Result<LoweredModule, String> {
    let target = TargetInfo {
        ptr_bytes: opts.word_bytes,
    };
    lower_program(program, target, opts.verbose)
}

/// Built-in showcase program: two named types implementing small
/// interfaces, exercising make-interface, both assertion forms, and
/// dynamic dispatch end to end.
pub fn demo_program() -> Program {
    let mut defs = TypeDefs::default();

    let string_sig = Signature::new(vec![], vec![Type::Basic(BasicType::String)]);
    defs.insert(
        "error",
        NamedDef {
            underlying: Type::interface(vec![InterfaceMethod {
                name: "Error".into(),
                pkg: String::new(),
                sig: string_sig.clone(),
            }]),
            methods: vec![],
        },
    );
    defs.insert(
        "main.Stringer",
        NamedDef {
            underlying: Type::interface(vec![InterfaceMethod {
                name: "String".into(),
                pkg: "main".into(),
                sig: string_sig.clone(),
            }]),
            methods: vec![],
        },
    );
    let close_sig = Signature::new(vec![], vec![Type::Named("error".into())]);
    defs.insert(
        "main.Closer",
        NamedDef {
            underlying: Type::interface(vec![InterfaceMethod {
                name: "Close".into(),
                pkg: "main".into(),
                sig: close_sig.clone(),
            }]),
            methods: vec![],
        },
    );
    defs.insert(
        "main.Celsius",
        NamedDef {
            underlying: Type::Basic(BasicType::Float64),
            methods: vec![MethodDef {
                name: "String".into(),
                pkg: "main".into(),
                sig: string_sig.clone(),
                ptr_recv: false,
                func: "main.Celsius.String".into(),
            }],
        },
    );
    defs.insert(
        "main.File",
        NamedDef {
            underlying: Type::Struct(vec![StructField {
                name: "fd".into(),
                ty: Type::Basic(BasicType::Int),
                tag: String::new(),
                embedded: false,
            }]),
            methods: vec![
                MethodDef {
                    name: "Name".into(),
                    pkg: "main".into(),
                    sig: string_sig.clone(),
                    ptr_recv: false,
                    func: "main.File.Name".into(),
                },
                MethodDef {
                    name: "Close".into(),
                    pkg: "main".into(),
                    sig: close_sig,
                    ptr_recv: true,
                    func: "main.(*File).Close".into(),
                },
            ],
        },
    );

    let celsius = Type::Named("main.Celsius".into());
    let file = Type::Named("main.File".into());
    let stringer = Type::Named("main.Stringer".into());
    let closer = Type::Named("main.Closer".into());

    Program {
        defs,
        functions: vec![
            FuncDecl {
                name: "main.Celsius.String".into(),
                params: vec![Param {
                    name: "c".into(),
                    ty: celsius.clone(),
                }],
                results: vec![Type::Basic(BasicType::String)],
                body: None,
            },
            FuncDecl {
                name: "main.File.Name".into(),
                params: vec![Param {
                    name: "f".into(),
                    ty: file.clone(),
                }],
                results: vec![Type::Basic(BasicType::String)],
                body: None,
            },
            FuncDecl {
                name: "main.(*File).Close".into(),
                params: vec![Param {
                    name: "f".into(),
                    ty: file.clone().pointer_to(),
                }],
                results: vec![Type::Named("error".into())],
                body: None,
            },
            FuncDecl {
                name: "main.describe".into(),
                params: vec![Param {
                    name: "c".into(),
                    ty: celsius.clone(),
                }],
                results: vec![Type::Basic(BasicType::String)],
                body: Some(vec![
                    Instr::MakeInterface {
                        dst: "x".into(),
                        value: "c".into(),
                        ty: celsius.clone(),
                        iface: stringer.clone(),
                    },
                    Instr::Invoke {
                        dst: Some("s".into()),
                        value: "x".into(),
                        method: "String".into(),
                        args: vec![],
                    },
                    Instr::Return {
                        values: vec!["s".into()],
                    },
                ]),
            },
            FuncDecl {
                name: "main.inspect".into(),
                params: vec![Param {
                    name: "x".into(),
                    ty: stringer.clone(),
                }],
                results: vec![celsius.clone(), Type::Basic(BasicType::Bool)],
                body: Some(vec![
                    Instr::TypeAssert {
                        dst: "t".into(),
                        value: "x".into(),
                        asserted: celsius.clone(),
                        comma_ok: true,
                    },
                    Instr::Return {
                        values: vec!["t".into()],
                    },
                ]),
            },
            FuncDecl {
                name: "main.widen".into(),
                params: vec![Param {
                    name: "x".into(),
                    ty: stringer,
                }],
                results: vec![],
                body: Some(vec![
                    Instr::TypeAssert {
                        dst: "c".into(),
                        value: "x".into(),
                        asserted: closer.clone(),
                        comma_ok: true,
                    },
                    Instr::Return { values: vec![] },
                ]),
            },
            FuncDecl {
                name: "main.run".into(),
                params: vec![Param {
                    name: "f".into(),
                    ty: file.clone().pointer_to(),
                }],
                results: vec![Type::Named("error".into())],
                body: Some(vec![
                    Instr::MakeInterface {
                        dst: "x".into(),
                        value: "f".into(),
                        ty: file.pointer_to(),
                        iface: closer,
                    },
                    Instr::Invoke {
                        dst: Some("e".into()),
                        value: "x".into(),
                        method: "Close".into(),
                        args: vec![],
                    },
                    Instr::Return {
                        values: vec!["e".into()],
                    },
                ]),
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_program_lowers_end_to_end() {
        let program = demo_program();
        let lowered = compile_program(&program, &CompileOptions::default()).expect("lower demo");
        let text = &lowered.text;
        assert!(
            text.contains("@\"reflect/types.type:named:main.Celsius\""),
            "celsius descriptor missing:\n{}",
            text
        );
        assert!(
            text.contains("@\"main.Celsius$methodset\""),
            "celsius method set missing:\n{}",
            text
        );
        assert!(
            text.contains(".$typeassert\"(i8*) \"tinygo-methods\"="),
            "assert placeholder missing:\n{}",
            text
        );
        assert!(
            text.contains("String$invoke\"") && text.contains("Close$invoke\""),
            "invoke thunks missing:\n{}",
            text
        );
        assert!(
            text.contains("@\"reflect/types.typeid:named:main.Celsius\" = external constant i8"),
            "typeid token missing:\n{}",
            text
        );
    }

    #[test]
    fn demo_manifest_lists_every_descriptor_once() {
        let program = demo_program();
        let lowered = compile_program(&program, &CompileOptions::default()).expect("lower demo");
        let mut symbols: Vec<&str> = lowered.types.iter().map(|r| r.symbol.as_str()).collect();
        let before = symbols.len();
        symbols.dedup();
        assert_eq!(symbols.len(), before, "duplicate descriptor records");
        assert!(lowered
            .types
            .iter()
            .any(|r| r.symbol == "reflect/types.type:named:main.File"));
    }

    #[test]
    fn word_size_threads_through_lowering() {
        let program = demo_program();
        let opts = CompileOptions {
            word_bytes: 4,
            verbose: false,
        };
        let lowered = compile_program(&program, &opts).expect("lower demo");
        assert!(
            lowered.text.contains("declare i8* @runtime.alloc(i32)"),
            "32-bit word should show in the runtime surface:\n{}",
            lowered.text
        );
    }
}
