// Purpose: Method-set globals, signature tokens, invoke wrappers, and placeholder declarations.
// Inputs/Outputs: Reads method tables from the program; emits globals and declared-only functions.
// Invariants: A signature token's address is its identity; equal spellings must collide.
// Gotchas: Pointer-receiver methods skip wrapping; calling them through an opaque
//          receiver prototype is the defined dispatch contract.

use crate::ssa::types::{is_exported, InterfaceMethod, MethodDef, Signature, Type};
use crate::suggest;

use super::descriptor::{method_signature, type_key, type_string};
use super::emitter::{global_ref, FnBuilder};
use super::{invariant_violation, llvm_type, ret_llvm, LowerCtx, INVOKE_ATTR, METHODS_ATTR};

/// Global name whose address identifies a method name+shape pair.
/// Exported methods share one namespace; unexported ones are scoped to
/// their declaring package.
pub fn signature_token_name(name: &str, pkg: &str, sig: &Signature) -> String {
    let signature = method_signature(name, sig);
    if is_exported(name) {
        format!("reflect/methods.{}", signature)
    } else {
        format!("{}.$methods.{}", pkg, signature)
    }
}

fn methods_attr_value(methods: &[InterfaceMethod]) -> String {
    let names: Vec<String> = methods
        .iter()
        .map(|m| signature_token_name(&m.name, &m.pkg, &m.sig))
        .collect();
    names.join("; ")
}

/// Resolved dispatch target for one interface call site.
pub(crate) struct InvokeTarget {
    pub(crate) name: String,
    pub(crate) ret: String,
    pub(crate) params: Vec<Type>,
    pub(crate) results: Vec<Type>,
}

impl<'p> LowerCtx<'p> {
    fn signature_token(&mut self, m: &MethodDef) -> Result<String, String> {
        let name = signature_token_name(&m.name, &m.pkg, &m.sig);
        self.module.add_global(
            &name,
            "i8",
            format!("{} = linkonce_odr constant i8 0, align 1", global_ref(&name)),
        )?;
        Ok(global_ref(&name))
    }

    /// Emit (at most once) the `{count, signature table, wrapper table}`
    /// global for the method set of `ty` and return its symbol and LLVM
    /// struct type.
    pub(crate) fn method_set_global(&mut self, ty: &Type) -> Result<(String, String), String> {
        let set_name = format!("{}$methodset", type_string(ty));
        if let Some(set_ty) = self.methodset_refs.get(&set_name) {
            return Ok((set_name, set_ty.clone()));
        }
        let defs = self.defs();
        let methods = defs.method_set(ty);
        if methods.is_empty() {
            return Err(invariant_violation(&format!(
                "method set requested for {} which has no methods",
                type_string(ty)
            )));
        }
        let via_pointer = matches!(ty, Type::Pointer(_));
        let mut signatures = Vec::with_capacity(methods.len());
        let mut wrappers = Vec::with_capacity(methods.len());
        for &(named, m) in &methods {
            signatures.push(self.signature_token(m)?);
            wrappers.push(self.invoke_wrapper(named, m, via_pointer)?);
        }

        let w = self.target.word_ty();
        let count = methods.len();
        let table_ty = format!("[{} x i8*]", count);
        let table_elems: Vec<String> = signatures.iter().map(|s| format!("i8* {}", s)).collect();
        let wrapper_tys: Vec<String> = wrappers.iter().map(|(ty, _)| ty.clone()).collect();
        let wrapper_elems: Vec<String> = wrappers
            .iter()
            .map(|(ty, reference)| format!("{} {}", ty, reference))
            .collect();
        let wrap_ty = format!("{{ {} }}", wrapper_tys.join(", "));
        let set_ty = format!("{{ {}, {}, {} }}", w, table_ty, wrap_ty);
        let init = format!(
            "{{ {} {}, {} [{}], {} {{ {} }} }}",
            w,
            count,
            table_ty,
            table_elems.join(", "),
            wrap_ty,
            wrapper_elems.join(", ")
        );
        self.module.add_global(
            &set_name,
            &set_ty,
            format!(
                "{} = linkonce_odr unnamed_addr constant {} {}",
                global_ref(&set_name),
                set_ty,
                init
            ),
        )?;
        self.methodset_refs.insert(set_name.clone(), set_ty.clone());
        self.log(format!("method set {}", set_name));
        Ok((set_name, set_ty))
    }

    /// Dispatch-table entry for one method: its LLVM function-pointer type
    /// and the referenced function. Pointer receivers use the concrete
    /// function unwrapped; value receivers get an adapter.
    fn invoke_wrapper(
        &mut self,
        named: &str,
        m: &MethodDef,
        via_pointer: bool,
    ) -> Result<(String, String), String> {
        let defs = self.defs();
        let target = self.target;
        let Some(decl) = self.fn_index.get(m.func.as_str()).copied() else {
            let mut msg = format!(
                "missing implementation {} for method {} on {}",
                m.func, m.name, named
            );
            let candidates = self.program.functions.iter().map(|f| f.name.clone());
            if let Some(hint) = suggest::did_you_mean(&m.func, candidates) {
                msg.push_str(&format!("; {}", hint));
            }
            return Err(invariant_violation(&msg));
        };
        let recv_ty = m.recv_type(named);
        match decl.params.first() {
            Some(p) if p.ty == recv_ty => {}
            _ => {
                return Err(invariant_violation(&format!(
                    "implementation {} does not take receiver {}",
                    m.func,
                    type_string(&recv_ty)
                )));
            }
        }
        let decl_params: Vec<Type> = decl.params.iter().skip(1).map(|p| p.ty.clone()).collect();
        if decl_params != m.sig.params || decl.results != m.sig.results {
            return Err(invariant_violation(&format!(
                "implementation {} does not match the signature of method {}",
                m.func, m.name
            )));
        }

        let recv_llvm = llvm_type(&recv_ty, defs, &target)?;
        let ret = ret_llvm(&m.sig.results, defs, &target)?;
        let mut param_llvms = Vec::with_capacity(m.sig.params.len());
        for ty in &m.sig.params {
            param_llvms.push(llvm_type(ty, defs, &target)?);
        }
        let tail = param_llvms
            .iter()
            .map(|ty| format!(", {}", ty))
            .collect::<String>();

        if m.ptr_recv {
            let fnptr_ty = format!("{} ({}{})*", ret, recv_llvm, tail);
            return Ok((fnptr_ty, global_ref(&m.func)));
        }

        let named_params: Vec<(String, String)> = decl
            .params
            .iter()
            .skip(1)
            .zip(&param_llvms)
            .map(|(p, ty)| (FnBuilder::local_ref(&p.name), ty.clone()))
            .collect();
        let forwarded: Vec<String> = named_params
            .iter()
            .map(|(name, ty)| format!("{} {}", ty, name))
            .collect();

        if via_pointer {
            // Value method reached through *T: a deref thunk loads the
            // receiver and forwards. Its receiver is a single-word
            // pointer, so the thunk itself needs no further wrapping.
            let thunk_name = format!("(*{}).{}", named, m.name);
            let ptr_llvm = format!("{}*", recv_llvm);
            let fnptr_ty = format!("{} ({}{})*", ret, ptr_llvm, tail);
            if !self.module.has_symbol(&thunk_name) {
                let mut b = FnBuilder::new(self, thunk_name.clone());
                let loaded = b.new_temp();
                b.emit(format!(
                    "{} = load {}, {} %.recv",
                    loaded, recv_llvm, ptr_llvm
                ));
                let mut call_args = vec![format!("{} {}", recv_llvm, loaded)];
                call_args.extend(forwarded.clone());
                emit_forwarding_call(&mut b, &ret, &m.func, &call_args)?;
                let rendered_params: Vec<String> = std::iter::once(format!("{} %.recv", ptr_llvm))
                    .chain(named_params.iter().map(|(n, ty)| format!("{} {}", ty, n)))
                    .collect();
                let shape = format!("{} ({}{})", ret, ptr_llvm, tail);
                let header = format!(
                    "define linkonce_odr {} {}({}) unnamed_addr",
                    ret,
                    global_ref(&thunk_name),
                    rendered_params.join(", ")
                );
                b.finish_define_raw(&shape, header)?;
            }
            return Ok((fnptr_ty, global_ref(&thunk_name)));
        }

        let wrapper_name = format!("{}$invoke", m.func);
        let fnptr_ty = format!("{} (i8*{})*", ret, tail);
        if !self.module.has_symbol(&wrapper_name) {
            let mut b = FnBuilder::new(self, wrapper_name.clone());
            let recv = b.emit_pointer_unpack("%.recv", &recv_ty)?;
            let mut call_args = vec![format!("{} {}", recv.llvm, recv.ir)];
            call_args.extend(forwarded);
            emit_forwarding_call(&mut b, &ret, &m.func, &call_args)?;
            let rendered_params: Vec<String> = std::iter::once("i8* %.recv".to_string())
                .chain(named_params.iter().map(|(n, ty)| format!("{} {}", ty, n)))
                .collect();
            let shape = format!("{} (i8*{})", ret, tail);
            let header = format!(
                "define linkonce_odr {} {}({}) unnamed_addr",
                ret,
                global_ref(&wrapper_name),
                rendered_params.join(", ")
            );
            b.finish_define_raw(&shape, header)?;
        }
        Ok((fnptr_ty, global_ref(&wrapper_name)))
    }

    /// Declared-only interface satisfaction predicate for `asserted`. The
    /// later pass fills in a type switch over every concrete type whose
    /// method set satisfies the interface.
    pub(crate) fn implements_fn(&mut self, asserted: &Type) -> Result<String, String> {
        let defs = self.defs();
        let under = defs.underlying(asserted)?;
        let Type::Interface(methods) = under else {
            return Err(invariant_violation(&format!(
                "interface assertion placeholder requested for {}",
                type_string(asserted)
            )));
        };
        let name = format!("{}.$typeassert", type_key(under));
        let added = self.module.declare_function(
            &name,
            "i1",
            &["i8*".to_string()],
            &[(METHODS_ATTR, methods_attr_value(methods))],
        )?;
        if added {
            self.log(format!("assert placeholder {}", name));
        }
        Ok(name)
    }

    /// Declared-only invoke thunk for a dynamic call of `method` through
    /// the static interface type of the receiver.
    pub(crate) fn invoke_fn(&mut self, itf_ty: &Type, method: &str) -> Result<InvokeTarget, String> {
        let defs = self.defs();
        let target = self.target;
        let under = defs.underlying(itf_ty)?;
        let Type::Interface(methods) = under else {
            return Err(invariant_violation(&format!(
                "interface call on non-interface type {}",
                type_string(itf_ty)
            )));
        };
        let Some(m) = methods.iter().find(|m| m.name == method) else {
            let mut msg = format!(
                "interface {} has no method {}",
                type_string(itf_ty),
                method
            );
            let candidates = methods.iter().map(|m| m.name.clone());
            if let Some(hint) = suggest::did_you_mean(method, candidates) {
                msg.push_str(&format!("; {}", hint));
            }
            return Err(invariant_violation(&msg));
        };
        let name = format!("{}.{}$invoke", type_key(under), m.name);
        let ret = ret_llvm(&m.sig.results, defs, &target)?;
        let mut params = Vec::with_capacity(m.sig.params.len() + 1);
        for ty in &m.sig.params {
            params.push(llvm_type(ty, defs, &target)?);
        }
        params.push("i8*".to_string());
        let added = self.module.declare_function(
            &name,
            &ret,
            &params,
            &[
                (INVOKE_ATTR, signature_token_name(&m.name, &m.pkg, &m.sig)),
                (METHODS_ATTR, methods_attr_value(methods)),
            ],
        )?;
        if added {
            self.log(format!("invoke thunk {}", name));
        }
        Ok(InvokeTarget {
            name,
            ret,
            params: m.sig.params.clone(),
            results: m.sig.results.clone(),
        })
    }
}

fn emit_forwarding_call(
    b: &mut FnBuilder,
    ret: &str,
    callee: &str,
    call_args: &[String],
) -> Result<(), String> {
    if ret == "void" {
        b.emit(format!(
            "call void {}({})",
            global_ref(callee),
            call_args.join(", ")
        ));
        b.terminate("ret void");
    } else {
        let out = b.new_temp();
        b.emit(format!(
            "{} = call {} {}({})",
            out,
            ret,
            global_ref(callee),
            call_args.join(", ")
        ));
        b.terminate(format!("ret {} {}", ret, out));
    }
    Ok(())
}
