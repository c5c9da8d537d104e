// Purpose: Textual IR sink and per-function instruction builder for the lowering core.
// Inputs/Outputs: Receives globals/declarations/instructions and renders one LLVM module string.
// Invariants: Symbol names are registered once; re-registration with a different shape is an error.
// Gotchas: Instructions emitted into a terminated block are dropped, matching builder semantics.

use std::collections::HashMap;

use crate::ssa::types::{Type, TypeDefs};
use crate::ssa::Param;

use super::{
    invariant_violation, llvm_type, packs_in_place, size_of, zero_value, LowerCtx, TargetInfo,
};

/// Render a byte string for a `c"..."` constant: printable ASCII stays
/// literal, everything else becomes `\HH`.
pub(crate) fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if (0x20..=0x7E).contains(&b) && b != b'"' && b != b'\\' {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\{:02X}", b));
        }
    }
    out
}

fn needs_quotes(name: &str) -> bool {
    name.is_empty()
        || name
            .bytes()
            .any(|b| !(b.is_ascii_alphanumeric() || b == b'$' || b == b'.' || b == b'_' || b == b'-'))
}

/// `@`-reference for a global symbol, quoted when the name uses characters
/// outside the plain identifier set.
pub(crate) fn global_ref(name: &str) -> String {
    if needs_quotes(name) {
        format!("@\"{}\"", escape_bytes(name.as_bytes()))
    } else {
        format!("@{}", name)
    }
}

fn local_ref_raw(name: &str) -> String {
    if needs_quotes(name) {
        format!("%\"{}\"", escape_bytes(name.as_bytes()))
    } else {
        format!("%{}", name)
    }
}

fn attr_value(value: &str) -> String {
    escape_bytes(value.as_bytes())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SymbolKind {
    Global,
    Declared,
    Defined,
}

struct Symbol {
    kind: SymbolKind,
    shape: String,
}

/// Accumulates the pieces of one output module. Named types and runtime
/// declarations come first, then function bodies, then data globals.
#[derive(Default)]
pub(crate) struct IrModule {
    type_lines: Vec<String>,
    declares: Vec<String>,
    defines: Vec<String>,
    globals: Vec<String>,
    symbols: HashMap<String, Symbol>,
}

impl IrModule {
    pub(crate) fn add_type_line(&mut self, line: impl Into<String>) {
        self.type_lines.push(line.into());
    }

    pub(crate) fn declare_raw(&mut self, line: impl Into<String>) {
        self.declares.push(line.into());
    }

    pub(crate) fn has_symbol(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    fn register(&mut self, name: &str, kind: SymbolKind, shape: &str) -> Result<bool, String> {
        if let Some(existing) = self.symbols.get(name) {
            if existing.shape != shape {
                return Err(format!(
                    "symbol @{} redeclared with incompatible type: {} vs {}",
                    name, existing.shape, shape
                ));
            }
            if kind == SymbolKind::Defined {
                return Err(match existing.kind {
                    SymbolKind::Defined => format!("symbol @{} defined more than once", name),
                    _ => format!("symbol @{} is already declared and cannot be defined", name),
                });
            }
            return Ok(false);
        }
        self.symbols.insert(
            name.to_string(),
            Symbol {
                kind,
                shape: shape.to_string(),
            },
        );
        Ok(true)
    }

    /// Add a data global. Returns false (and emits nothing) when an
    /// identical-shaped global already exists under this name.
    pub(crate) fn add_global(
        &mut self,
        name: &str,
        shape: &str,
        text: impl Into<String>,
    ) -> Result<bool, String> {
        if !self.register(name, SymbolKind::Global, shape)? {
            return Ok(false);
        }
        self.globals.push(text.into());
        Ok(true)
    }

    pub(crate) fn declare_function(
        &mut self,
        name: &str,
        ret: &str,
        params: &[String],
        attrs: &[(&str, String)],
    ) -> Result<bool, String> {
        let shape = format!("{} ({})", ret, params.join(", "));
        if !self.register(name, SymbolKind::Declared, &shape)? {
            return Ok(false);
        }
        let mut line = format!("declare {} {}({})", ret, global_ref(name), params.join(", "));
        for (key, value) in attrs {
            line.push_str(&format!(" \"{}\"=\"{}\"", key, attr_value(value)));
        }
        self.declares.push(line);
        Ok(true)
    }

    pub(crate) fn define_function(
        &mut self,
        name: &str,
        shape: &str,
        text: String,
    ) -> Result<(), String> {
        self.register(name, SymbolKind::Defined, shape)?;
        self.defines.push(text);
        Ok(())
    }

    pub(crate) fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.type_lines {
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        for line in &self.declares {
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        for text in &self.defines {
            out.push_str(text);
            out.push('\n');
        }
        for line in &self.globals {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// A typed IR value: the source type it carries, its rendered LLVM type,
/// and the register or constant expression holding it.
#[derive(Clone)]
pub(crate) struct Value {
    pub(crate) ty: Type,
    pub(crate) llvm: String,
    pub(crate) ir: String,
}

impl Value {
    pub(crate) fn new(ty: Type, llvm: impl Into<String>, ir: impl Into<String>) -> Self {
        Self {
            ty,
            llvm: llvm.into(),
            ir: ir.into(),
        }
    }
}

pub(crate) struct BlockInsts {
    name: String,
    instrs: Vec<String>,
    terminated: bool,
}

/// Builds one function body: named blocks, `%tN` temporaries, terminator
/// discipline. Interface operations live here because they are the only
/// instructions this core ever emits into bodies.
pub(crate) struct FnBuilder<'a, 'p> {
    ctx: &'a mut LowerCtx<'p>,
    fn_name: String,
    blocks: Vec<BlockInsts>,
    current: usize,
    temp_counter: usize,
    block_counter: usize,
}

impl<'a, 'p> FnBuilder<'a, 'p> {
    pub(crate) fn new(ctx: &'a mut LowerCtx<'p>, fn_name: impl Into<String>) -> Self {
        let entry = BlockInsts {
            name: "entry".to_string(),
            instrs: Vec::new(),
            terminated: false,
        };
        Self {
            ctx,
            fn_name: fn_name.into(),
            blocks: vec![entry],
            current: 0,
            temp_counter: 0,
            block_counter: 0,
        }
    }

    pub(crate) fn defs(&self) -> &'p TypeDefs {
        &self.ctx.program.defs
    }

    pub(crate) fn target(&self) -> TargetInfo {
        self.ctx.target
    }

    pub(crate) fn local_ref(name: &str) -> String {
        local_ref_raw(name)
    }

    pub(crate) fn emit(&mut self, instr: impl Into<String>) {
        let block = &mut self.blocks[self.current];
        if !block.terminated {
            block.instrs.push(instr.into());
        }
    }

    pub(crate) fn terminate(&mut self, instr: impl Into<String>) {
        let block = &mut self.blocks[self.current];
        if !block.terminated {
            block.instrs.push(instr.into());
            block.terminated = true;
        }
    }

    pub(crate) fn current_block_terminated(&self) -> bool {
        self.blocks[self.current].terminated
    }

    fn current_block_name(&self) -> String {
        self.blocks[self.current].name.clone()
    }

    pub(crate) fn new_temp(&mut self) -> String {
        let name = format!("%t{}", self.temp_counter);
        self.temp_counter += 1;
        name
    }

    fn add_block(&mut self, prefix: &str) -> (usize, String) {
        let name = format!("{}{}", prefix, self.block_counter);
        self.block_counter += 1;
        self.blocks.push(BlockInsts {
            name: name.clone(),
            instrs: Vec::new(),
            terminated: false,
        });
        (self.blocks.len() - 1, name)
    }

    fn switch_to(&mut self, idx: usize) {
        self.current = idx;
    }

    /// Fit a value into one opaque pointer word: word-sized scalars are
    /// reinterpreted in place, everything else is boxed into a fresh heap
    /// slot. Shared with interface extraction, which runs the inverse.
    fn emit_pointer_pack(&mut self, val: &Value) -> Result<String, String> {
        let defs = self.defs();
        let target = self.target();
        if packs_in_place(&val.ty, defs, &target)? {
            let w = target.word_ty();
            return match defs.underlying(&val.ty)? {
                Type::Pointer(_) | Type::Chan(_, _) | Type::Map(_, _) => {
                    let out = self.new_temp();
                    self.emit(format!("{} = bitcast {} {} to i8*", out, val.llvm, val.ir));
                    Ok(out)
                }
                Type::Basic(b) if val.llvm == "i8*" => {
                    debug_assert_eq!(b.name(), "unsafe.Pointer");
                    Ok(val.ir.clone())
                }
                Type::Basic(_) if val.llvm == "float" || val.llvm == "double" => {
                    let bits = if val.llvm == "float" { "i32" } else { "i64" };
                    let cast = self.new_temp();
                    self.emit(format!(
                        "{} = bitcast {} {} to {}",
                        cast, val.llvm, val.ir, bits
                    ));
                    let word = if bits == w {
                        cast
                    } else {
                        let ext = self.new_temp();
                        self.emit(format!("{} = zext {} {} to {}", ext, bits, cast, w));
                        ext
                    };
                    let out = self.new_temp();
                    self.emit(format!("{} = inttoptr {} {} to i8*", out, w, word));
                    Ok(out)
                }
                Type::Basic(_) => {
                    let word = if val.llvm == w {
                        val.ir.clone()
                    } else {
                        let ext = self.new_temp();
                        self.emit(format!("{} = zext {} {} to {}", ext, val.llvm, val.ir, w));
                        ext
                    };
                    let out = self.new_temp();
                    self.emit(format!("{} = inttoptr {} {} to i8*", out, w, word));
                    Ok(out)
                }
                other => Err(invariant_violation(&format!(
                    "in-place pack of non-scalar type {}",
                    other
                ))),
            };
        }
        let size = size_of(&val.ty, defs, &target)?;
        let raw = self.new_temp();
        self.emit(format!(
            "{} = call i8* @runtime.alloc({} {})",
            raw,
            target.word_ty(),
            size
        ));
        let slot = self.new_temp();
        self.emit(format!("{} = bitcast i8* {} to {}*", slot, raw, val.llvm));
        self.emit(format!(
            "store {} {}, {}* {}",
            val.llvm, val.ir, val.llvm, slot
        ));
        Ok(raw)
    }

    /// Inverse of the pointer pack. Must only run on paths where the
    /// dynamic type is known to be `ty`; reinterpreting a foreign pointer
    /// with this layout is undefined.
    pub(crate) fn emit_pointer_unpack(&mut self, ptr_ir: &str, ty: &Type) -> Result<Value, String> {
        let defs = self.defs();
        let target = self.target();
        let llvm = llvm_type(ty, defs, &target)?;
        if packs_in_place(ty, defs, &target)? {
            let w = target.word_ty();
            return match defs.underlying(ty)? {
                Type::Pointer(_) | Type::Chan(_, _) | Type::Map(_, _) => {
                    let out = self.new_temp();
                    self.emit(format!("{} = bitcast i8* {} to {}", out, ptr_ir, llvm));
                    Ok(Value::new(ty.clone(), llvm, out))
                }
                Type::Basic(_) if llvm == "i8*" => {
                    Ok(Value::new(ty.clone(), llvm, ptr_ir.to_string()))
                }
                Type::Basic(_) if llvm == "float" || llvm == "double" => {
                    let bits = if llvm == "float" { "i32" } else { "i64" };
                    let word = self.new_temp();
                    self.emit(format!("{} = ptrtoint i8* {} to {}", word, ptr_ir, w));
                    let narrowed = if bits == w {
                        word
                    } else {
                        let t = self.new_temp();
                        self.emit(format!("{} = trunc {} {} to {}", t, w, word, bits));
                        t
                    };
                    let out = self.new_temp();
                    self.emit(format!("{} = bitcast {} {} to {}", out, bits, narrowed, llvm));
                    Ok(Value::new(ty.clone(), llvm, out))
                }
                Type::Basic(_) => {
                    let word = self.new_temp();
                    self.emit(format!("{} = ptrtoint i8* {} to {}", word, ptr_ir, w));
                    let out = if llvm == w {
                        word
                    } else {
                        let t = self.new_temp();
                        self.emit(format!("{} = trunc {} {} to {}", t, w, word, llvm));
                        t
                    };
                    Ok(Value::new(ty.clone(), llvm, out))
                }
                other => Err(invariant_violation(&format!(
                    "in-place unpack of non-scalar type {}",
                    other
                ))),
            };
        }
        let slot = self.new_temp();
        self.emit(format!("{} = bitcast i8* {} to {}*", slot, ptr_ir, llvm));
        let out = self.new_temp();
        self.emit(format!("{} = load {}, {}* {}", out, llvm, llvm, slot));
        Ok(Value::new(ty.clone(), llvm, out))
    }

    /// Lower `make-interface`: pair the type descriptor of `ty` with the
    /// packed value.
    pub(crate) fn create_make_interface(
        &mut self,
        src: &Value,
        ty: &Type,
        iface: &Type,
    ) -> Result<Value, String> {
        if src.ty != *ty {
            return Err(invariant_violation(&format!(
                "make-interface value has type {}, instruction says {}",
                src.ty, ty
            )));
        }
        let descriptor = self.ctx.descriptor(ty)?;
        let packed = self.emit_pointer_pack(src)?;
        let half = self.new_temp();
        self.emit(format!(
            "{} = insertvalue %runtime._interface undef, i8* {}, 0",
            half, descriptor
        ));
        let full = self.new_temp();
        self.emit(format!(
            "{} = insertvalue %runtime._interface {}, i8* {}, 1",
            full, half, packed
        ));
        Ok(Value::new(iface.clone(), "%runtime._interface", full))
    }

    /// Lower `x.(AT)`. The asserted-value unpack only ever runs on the ok
    /// path; running it speculatively would reinterpret a pointer whose
    /// layout is not known to match.
    pub(crate) fn create_type_assert(
        &mut self,
        src: &Value,
        asserted: &Type,
        comma_ok: bool,
    ) -> Result<Value, String> {
        if src.llvm != "%runtime._interface" {
            return Err(invariant_violation(&format!(
                "type assertion on non-interface value of type {}",
                src.ty
            )));
        }
        let actual = self.new_temp();
        self.emit(format!(
            "{} = extractvalue %runtime._interface {}, 0",
            actual, src.ir
        ));

        let assert_on_interface = asserted.is_interface(self.defs());
        let ok = if assert_on_interface {
            let fn_name = self.ctx.implements_fn(asserted)?;
            let out = self.new_temp();
            self.emit(format!(
                "{} = call i1 {}(i8* {})",
                out,
                global_ref(&fn_name),
                actual
            ));
            out
        } else {
            let token = self.ctx.typeid_token(asserted)?;
            let out = self.new_temp();
            self.emit(format!(
                "{} = call i1 @runtime.typeAssert(i8* {}, i8* {})",
                out, actual, token
            ));
            out
        };

        let prev = self.current_block_name();
        let (ok_idx, ok_name) = self.add_block("typeassert.ok");
        let (next_idx, next_name) = self.add_block("typeassert.next");
        self.terminate(format!(
            "br i1 {}, label %{}, label %{}",
            ok, ok_name, next_name
        ));

        self.switch_to(ok_idx);
        let value_ok = if assert_on_interface {
            src.ir.clone()
        } else {
            let data = self.new_temp();
            self.emit(format!(
                "{} = extractvalue %runtime._interface {}, 1",
                data, src.ir
            ));
            self.emit_pointer_unpack(&data, asserted)?.ir
        };
        self.terminate(format!("br label %{}", next_name));

        self.switch_to(next_idx);
        let asserted_llvm = if assert_on_interface {
            "%runtime._interface".to_string()
        } else {
            llvm_type(asserted, self.defs(), &self.target())?
        };
        let zero = if assert_on_interface {
            "zeroinitializer".to_string()
        } else {
            zero_value(asserted, self.defs())?
        };
        let phi = self.new_temp();
        self.emit(format!(
            "{} = phi {} [ {}, %{} ], [ {}, %{} ]",
            phi, asserted_llvm, zero, prev, value_ok, ok_name
        ));

        if comma_ok {
            let tuple_ty = format!("{{ {}, i1 }}", asserted_llvm);
            let half = self.new_temp();
            self.emit(format!(
                "{} = insertvalue {} undef, {} {}, 0",
                half, tuple_ty, asserted_llvm, phi
            ));
            let full = self.new_temp();
            self.emit(format!(
                "{} = insertvalue {} {}, i1 {}, 1",
                full, tuple_ty, half, ok
            ));
            return Ok(Value::new(asserted.clone(), tuple_ty, full));
        }
        self.emit(format!("call void @runtime.interfaceTypeAssert(i1 {})", ok));
        Ok(Value::new(asserted.clone(), asserted_llvm, phi))
    }

    /// Lower dynamic dispatch through the declared invoke thunk; the later
    /// pass rewrites the call into a switch over concrete receivers.
    pub(crate) fn create_invoke(
        &mut self,
        src: &Value,
        method: &str,
        args: &[Value],
    ) -> Result<Option<Value>, String> {
        if src.llvm != "%runtime._interface" {
            return Err(invariant_violation(&format!(
                "interface call on non-interface value of type {}",
                src.ty
            )));
        }
        let target = self.ctx.invoke_fn(&src.ty, method)?;
        if args.len() != target.params.len() {
            return Err(invariant_violation(&format!(
                "interface call to {} passes {} arguments, method takes {}",
                method,
                args.len(),
                target.params.len()
            )));
        }
        for (arg, want) in args.iter().zip(&target.params) {
            if arg.ty != *want {
                return Err(invariant_violation(&format!(
                    "interface call to {} passes {} where {} is expected",
                    method, arg.ty, want
                )));
            }
        }
        let data = self.new_temp();
        self.emit(format!(
            "{} = extractvalue %runtime._interface {}, 1",
            data, src.ir
        ));
        let mut call_args = Vec::with_capacity(args.len() + 1);
        for arg in args {
            call_args.push(format!("{} {}", arg.llvm, arg.ir));
        }
        call_args.push(format!("i8* {}", data));
        let ret = target.ret;
        if ret == "void" {
            self.emit(format!(
                "call void {}({})",
                global_ref(&target.name),
                call_args.join(", ")
            ));
            return Ok(None);
        }
        let out = self.new_temp();
        self.emit(format!(
            "{} = call {} {}({})",
            out,
            ret,
            global_ref(&target.name),
            call_args.join(", ")
        ));
        let ty = match target.results.as_slice() {
            [single] => single.clone(),
            many => Type::Struct(
                many.iter()
                    .enumerate()
                    .map(|(i, ty)| crate::ssa::types::StructField {
                        name: format!("r{}", i),
                        ty: ty.clone(),
                        tag: String::new(),
                        embedded: false,
                    })
                    .collect(),
            ),
        };
        Ok(Some(Value::new(ty, ret, out)))
    }

    pub(crate) fn create_return(&mut self, rets: &[Value], ret_llvm: &str) -> Result<(), String> {
        match rets {
            [] => {
                if ret_llvm != "void" {
                    return Err(invariant_violation(&format!(
                        "empty return from function {} returning {}",
                        self.fn_name, ret_llvm
                    )));
                }
                self.terminate("ret void");
            }
            [single] => {
                self.terminate(format!("ret {} {}", single.llvm, single.ir));
            }
            many => {
                let mut agg = "undef".to_string();
                for (idx, val) in many.iter().enumerate() {
                    let next = self.new_temp();
                    self.emit(format!(
                        "{} = insertvalue {} {}, {} {}, {}",
                        next, ret_llvm, agg, val.llvm, val.ir, idx
                    ));
                    agg = next;
                }
                self.terminate(format!("ret {} {}", ret_llvm, agg));
            }
        }
        Ok(())
    }

    fn render_blocks(&self) -> Result<String, String> {
        let mut out = String::new();
        for block in &self.blocks {
            if !block.terminated {
                return Err(invariant_violation(&format!(
                    "block {} in {} has no terminator",
                    block.name, self.fn_name
                )));
            }
            out.push_str(&block.name);
            out.push_str(":\n");
            for instr in &block.instrs {
                out.push_str("  ");
                out.push_str(instr);
                out.push('\n');
            }
        }
        Ok(out)
    }

    /// Render a `define` under the given header line and hand it to the
    /// module. Consumes the builder.
    pub(crate) fn finish_define_raw(self, shape: &str, header: String) -> Result<(), String> {
        let body = self.render_blocks()?;
        let text = format!("{} {{\n{}}}\n", header, body);
        let name = self.fn_name.clone();
        self.ctx.module.define_function(&name, shape, text)
    }

    pub(crate) fn finish_define(
        self,
        ret: &str,
        params: &[Param],
        param_tys: &[String],
    ) -> Result<(), String> {
        let rendered: Vec<String> = params
            .iter()
            .zip(param_tys)
            .map(|(p, ty)| format!("{} {}", ty, local_ref_raw(&p.name)))
            .collect();
        let shape = format!("{} ({})", ret, param_tys.join(", "));
        let header = format!(
            "define {} {}({})",
            ret,
            global_ref(&self.fn_name),
            rendered.join(", ")
        );
        self.finish_define_raw(&shape, header)
    }
}
