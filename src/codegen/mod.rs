// Purpose: Lowering context and module assembly for the interface/descriptor core.
// Inputs/Outputs: Consumes a typed-SSA Program and produces a textual LLVM IR module.
// Invariants: Every emitted global is memoized by symbol name; cross-references are symbolic.
// Gotchas: Globals render after function bodies; order inside the module is not semantic.

use std::collections::{HashMap, HashSet};

use crate::manifest::TypeRecord;
use crate::ssa::types::{BasicType, Type, TypeDefs};
use crate::ssa::{FuncDecl, Instr, Program};

mod descriptor;
mod emitter;
mod methods;

pub use descriptor::{meta_byte, method_signature, type_key, type_kind, type_string, NAMED_FLAG};

use self::emitter::{FnBuilder, IrModule, Value};

/// String attribute carrying the interface method list on placeholder
/// declarations; consumed by the later monomorphising pass.
pub const METHODS_ATTR: &str = "tinygo-methods";
/// String attribute naming the signature token an invoke thunk dispatches on.
pub const INVOKE_ATTR: &str = "tinygo-invoke";

#[derive(Clone, Copy, Debug)]
pub struct TargetInfo {
    pub ptr_bytes: u64,
}

impl Default for TargetInfo {
    fn default() -> Self {
        Self { ptr_bytes: 8 }
    }
}

impl TargetInfo {
    /// LLVM spelling of the native pointer-width integer.
    pub fn word_ty(&self) -> &'static str {
        match self.ptr_bytes {
            4 => "i32",
            _ => "i64",
        }
    }

    pub fn word_bits(&self) -> u64 {
        self.ptr_bytes * 8
    }
}

pub struct LoweredModule {
    pub text: String,
    pub types: Vec<TypeRecord>,
}

/// Per-compilation lowering state: the IR sink plus the deduplication
/// caches keyed by TypeKey and symbol name. Lives for one module.
pub struct LowerCtx<'p> {
    pub(crate) program: &'p Program,
    pub(crate) fn_index: HashMap<&'p str, &'p FuncDecl>,
    pub(crate) target: TargetInfo,
    pub(crate) verbose: bool,
    pub(crate) module: IrModule,
    pub(crate) descriptor_refs: HashMap<String, String>,
    pub(crate) typeid_names: HashSet<String>,
    pub(crate) methodset_refs: HashMap<String, String>,
    pub(crate) records: Vec<TypeRecord>,
}

impl<'p> LowerCtx<'p> {
    pub fn new(program: &'p Program, target: TargetInfo, verbose: bool) -> Self {
        let mut module = IrModule::default();
        emit_prelude(&mut module, &target);
        Self {
            program,
            fn_index: program.function_index(),
            target,
            verbose,
            module,
            descriptor_refs: HashMap::new(),
            typeid_names: HashSet::new(),
            methodset_refs: HashMap::new(),
            records: Vec::new(),
        }
    }

    pub(crate) fn defs(&self) -> &'p TypeDefs {
        &self.program.defs
    }

    pub(crate) fn log(&self, msg: impl AsRef<str>) {
        if self.verbose {
            eprintln!("[lower] {}", msg.as_ref());
        }
    }

    pub fn finish(mut self) -> LoweredModule {
        self.records.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        LoweredModule {
            text: self.module.render(),
            types: self.records,
        }
    }
}

/// Lower every function in the program and render the module.
pub fn lower_program(
    program: &Program,
    target: TargetInfo,
    verbose: bool,
) -> Result<LoweredModule, String> {
    let mut ctx = LowerCtx::new(program, target, verbose);
    for func in &program.functions {
        lower_function(&mut ctx, func)?;
    }
    Ok(ctx.finish())
}

fn emit_prelude(module: &mut IrModule, target: &TargetInfo) {
    let w = target.word_ty();
    module.add_type_line("%runtime._interface = type { i8*, i8* }");
    module.add_type_line(format!("%runtime._string = type {{ i8*, {} }}", w));
    module.add_type_line("%runtime.channel = type opaque");
    module.add_type_line("%runtime.hashmap = type opaque");
    module.declare_raw(format!("declare i8* @runtime.alloc({})", w));
    module.declare_raw("declare i1 @runtime.typeAssert(i8*, i8*)");
    module.declare_raw("declare void @runtime.interfaceTypeAssert(i1)");
}

fn lower_function(ctx: &mut LowerCtx, func: &FuncDecl) -> Result<(), String> {
    let mut param_tys = Vec::new();
    for param in &func.params {
        param_tys.push(llvm_type(&param.ty, ctx.defs(), &ctx.target)?);
    }
    let ret = ret_llvm(&func.results, ctx.defs(), &ctx.target)?;

    let Some(body) = &func.body else {
        ctx.module
            .declare_function(&func.name, &ret, &param_tys, &[])?;
        return Ok(());
    };

    ctx.log(format!("lowering function {}", func.name));
    let mut b = FnBuilder::new(ctx, func.name.as_str());
    let mut values: HashMap<String, Value> = HashMap::new();
    for param in &func.params {
        let llvm = llvm_type(&param.ty, b.defs(), &b.target())?;
        let prev = values.insert(
            param.name.clone(),
            Value::new(param.ty.clone(), llvm, FnBuilder::local_ref(&param.name)),
        );
        if prev.is_some() {
            return Err(invariant_violation(&format!(
                "duplicate parameter {} in {}",
                param.name, func.name
            )));
        }
    }

    for instr in body {
        match instr {
            Instr::MakeInterface {
                dst,
                value,
                ty,
                iface,
            } => {
                let src = lookup(&values, value, &func.name)?;
                let out = b.create_make_interface(&src, ty, iface)?;
                bind(&mut values, dst, out, &func.name)?;
            }
            Instr::TypeAssert {
                dst,
                value,
                asserted,
                comma_ok,
            } => {
                let src = lookup(&values, value, &func.name)?;
                let out = b.create_type_assert(&src, asserted, *comma_ok)?;
                bind(&mut values, dst, out, &func.name)?;
            }
            Instr::Invoke {
                dst,
                value,
                method,
                args,
            } => {
                let src = lookup(&values, value, &func.name)?;
                let mut arg_values = Vec::with_capacity(args.len());
                for arg in args {
                    arg_values.push(lookup(&values, arg, &func.name)?);
                }
                let out = b.create_invoke(&src, method, &arg_values)?;
                match (dst, out) {
                    (Some(dst), Some(out)) => bind(&mut values, dst, out, &func.name)?,
                    (Some(dst), None) => {
                        return Err(invariant_violation(&format!(
                            "void interface call bound to {} in {}",
                            dst, func.name
                        )));
                    }
                    _ => {}
                }
            }
            Instr::Return { values: names } => {
                let mut rets = Vec::with_capacity(names.len());
                for name in names {
                    rets.push(lookup(&values, name, &func.name)?);
                }
                b.create_return(&rets, &ret)?;
            }
        }
    }

    if !b.current_block_terminated() {
        if func.results.is_empty() {
            b.create_return(&[], &ret)?;
        } else {
            return Err(format!("function {} missing return", func.name));
        }
    }

    b.finish_define(&ret, &func.params, &param_tys)
}

fn lookup(values: &HashMap<String, Value>, name: &str, func: &str) -> Result<Value, String> {
    values.get(name).cloned().ok_or_else(|| {
        invariant_violation(&format!("use of undefined value {} in {}", name, func))
    })
}

fn bind(
    values: &mut HashMap<String, Value>,
    name: &str,
    value: Value,
    func: &str,
) -> Result<(), String> {
    if values.insert(name.to_string(), value).is_some() {
        return Err(invariant_violation(&format!(
            "value {} assigned twice in {}",
            name, func
        )));
    }
    Ok(())
}

pub(crate) fn invariant_violation(msg: &str) -> String {
    format!("internal codegen invariant violated: {}", msg)
}

pub(crate) fn not_implemented(msg: &str) -> String {
    format!("not implemented: {}", msg)
}

/// Map a source type to its LLVM representation.
pub fn llvm_type(ty: &Type, defs: &TypeDefs, target: &TargetInfo) -> Result<String, String> {
    let w = target.word_ty();
    let s = match ty {
        Type::Basic(BasicType::Bool) => "i1".to_string(),
        Type::Basic(BasicType::Int) | Type::Basic(BasicType::Uint) => w.to_string(),
        Type::Basic(BasicType::Int8) | Type::Basic(BasicType::Uint8) => "i8".to_string(),
        Type::Basic(BasicType::Int16) | Type::Basic(BasicType::Uint16) => "i16".to_string(),
        Type::Basic(BasicType::Int32) | Type::Basic(BasicType::Uint32) => "i32".to_string(),
        Type::Basic(BasicType::Int64) | Type::Basic(BasicType::Uint64) => "i64".to_string(),
        Type::Basic(BasicType::Uintptr) => w.to_string(),
        Type::Basic(BasicType::Float32) => "float".to_string(),
        Type::Basic(BasicType::Float64) => "double".to_string(),
        Type::Basic(BasicType::Complex64) => "{ float, float }".to_string(),
        Type::Basic(BasicType::Complex128) => "{ double, double }".to_string(),
        Type::Basic(BasicType::String) => "%runtime._string".to_string(),
        Type::Basic(BasicType::UnsafePointer) => "i8*".to_string(),
        Type::Named(_) => llvm_type(defs.underlying(ty)?, defs, target)?,
        Type::Pointer(elem) => format!("{}*", llvm_type(elem, defs, target)?),
        Type::Slice(elem) => format!("{{ {}*, {}, {} }}", llvm_type(elem, defs, target)?, w, w),
        Type::Array(len, elem) => format!("[{} x {}]", len, llvm_type(elem, defs, target)?),
        Type::Chan(_, _) => "%runtime.channel*".to_string(),
        Type::Map(_, _) => "%runtime.hashmap*".to_string(),
        Type::Struct(fields) => {
            let mut parts = Vec::with_capacity(fields.len());
            for field in fields {
                parts.push(llvm_type(&field.ty, defs, target)?);
            }
            if parts.is_empty() {
                "{}".to_string()
            } else {
                format!("{{ {} }}", parts.join(", "))
            }
        }
        Type::Interface(_) => "%runtime._interface".to_string(),
        Type::Signature(_) => "{ i8*, i8* }".to_string(),
    };
    Ok(s)
}

/// LLVM return type for a result list: void, the single type, or a
/// literal struct for multiple results.
pub fn ret_llvm(results: &[Type], defs: &TypeDefs, target: &TargetInfo) -> Result<String, String> {
    match results {
        [] => Ok("void".to_string()),
        [single] => llvm_type(single, defs, target),
        many => {
            let mut parts = Vec::with_capacity(many.len());
            for ty in many {
                parts.push(llvm_type(ty, defs, target)?);
            }
            Ok(format!("{{ {} }}", parts.join(", ")))
        }
    }
}

pub fn zero_value(ty: &Type, defs: &TypeDefs) -> Result<String, String> {
    let s = match ty {
        Type::Basic(
            BasicType::Bool
            | BasicType::Int
            | BasicType::Int8
            | BasicType::Int16
            | BasicType::Int32
            | BasicType::Int64
            | BasicType::Uint
            | BasicType::Uint8
            | BasicType::Uint16
            | BasicType::Uint32
            | BasicType::Uint64
            | BasicType::Uintptr,
        ) => "0".to_string(),
        Type::Basic(BasicType::Float32 | BasicType::Float64) => "0.0".to_string(),
        Type::Basic(BasicType::UnsafePointer) => "null".to_string(),
        Type::Basic(BasicType::Complex64 | BasicType::Complex128 | BasicType::String) => {
            "zeroinitializer".to_string()
        }
        Type::Named(_) => zero_value(defs.underlying(ty)?, defs)?,
        Type::Pointer(_) | Type::Chan(_, _) | Type::Map(_, _) => "null".to_string(),
        Type::Slice(_)
        | Type::Array(_, _)
        | Type::Struct(_)
        | Type::Interface(_)
        | Type::Signature(_) => "zeroinitializer".to_string(),
    };
    Ok(s)
}

pub fn align_of(ty: &Type, defs: &TypeDefs, target: &TargetInfo) -> Result<u64, String> {
    let w = target.ptr_bytes;
    let a = match ty {
        Type::Basic(BasicType::Bool | BasicType::Int8 | BasicType::Uint8) => 1,
        Type::Basic(BasicType::Int16 | BasicType::Uint16) => 2,
        Type::Basic(
            BasicType::Int32 | BasicType::Uint32 | BasicType::Float32 | BasicType::Complex64,
        ) => 4,
        Type::Basic(
            BasicType::Int64 | BasicType::Uint64 | BasicType::Float64 | BasicType::Complex128,
        ) => 8,
        Type::Basic(
            BasicType::Int
            | BasicType::Uint
            | BasicType::Uintptr
            | BasicType::String
            | BasicType::UnsafePointer,
        ) => w,
        Type::Named(_) => align_of(defs.underlying(ty)?, defs, target)?,
        Type::Pointer(_)
        | Type::Slice(_)
        | Type::Chan(_, _)
        | Type::Map(_, _)
        | Type::Interface(_)
        | Type::Signature(_) => w,
        Type::Array(_, elem) => align_of(elem, defs, target)?,
        Type::Struct(fields) => {
            let mut align = 1;
            for field in fields {
                align = align.max(align_of(&field.ty, defs, target)?);
            }
            align
        }
    };
    Ok(a)
}

pub fn size_of(ty: &Type, defs: &TypeDefs, target: &TargetInfo) -> Result<u64, String> {
    let w = target.ptr_bytes;
    let s = match ty {
        Type::Basic(BasicType::Bool | BasicType::Int8 | BasicType::Uint8) => 1,
        Type::Basic(BasicType::Int16 | BasicType::Uint16) => 2,
        Type::Basic(BasicType::Int32 | BasicType::Uint32 | BasicType::Float32) => 4,
        Type::Basic(
            BasicType::Int64 | BasicType::Uint64 | BasicType::Float64 | BasicType::Complex64,
        ) => 8,
        Type::Basic(BasicType::Complex128) => 16,
        Type::Basic(BasicType::Int | BasicType::Uint | BasicType::Uintptr) => w,
        Type::Basic(BasicType::UnsafePointer) => w,
        Type::Basic(BasicType::String) => 2 * w,
        Type::Named(_) => size_of(defs.underlying(ty)?, defs, target)?,
        Type::Pointer(_) | Type::Chan(_, _) | Type::Map(_, _) => w,
        Type::Slice(_) => 3 * w,
        Type::Interface(_) | Type::Signature(_) => 2 * w,
        Type::Array(len, elem) => {
            let elem_size = size_of(elem, defs, target)?;
            let elem_align = align_of(elem, defs, target)?;
            round_up(elem_size, elem_align) * len
        }
        Type::Struct(fields) => {
            let mut offset = 0u64;
            let mut align = 1u64;
            for field in fields {
                let a = align_of(&field.ty, defs, target)?;
                align = align.max(a);
                offset = round_up(offset, a);
                offset += size_of(&field.ty, defs, target)?;
            }
            round_up(offset, align)
        }
    };
    Ok(s)
}

fn round_up(value: u64, align: u64) -> u64 {
    debug_assert!(align > 0);
    value.div_ceil(align) * align
}

/// True when the pointer pack keeps the value in place instead of boxing:
/// word-sized scalars only, so pack and unpack stay exact inverses.
pub(crate) fn packs_in_place(
    ty: &Type,
    defs: &TypeDefs,
    target: &TargetInfo,
) -> Result<bool, String> {
    let fits = match defs.underlying(ty)? {
        Type::Basic(
            BasicType::Bool
            | BasicType::Int
            | BasicType::Int8
            | BasicType::Int16
            | BasicType::Int32
            | BasicType::Int64
            | BasicType::Uint
            | BasicType::Uint8
            | BasicType::Uint16
            | BasicType::Uint32
            | BasicType::Uint64
            | BasicType::Uintptr
            | BasicType::Float32
            | BasicType::Float64
            | BasicType::UnsafePointer,
        ) => size_of(ty, defs, target)? <= target.ptr_bytes,
        Type::Pointer(_) | Type::Chan(_, _) | Type::Map(_, _) => true,
        _ => false,
    };
    Ok(fits)
}
