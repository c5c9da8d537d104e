// Purpose: Canonical type naming, kind encoding, and descriptor global synthesis.
// Inputs/Outputs: Takes source types; emits one linkonce_odr descriptor global per TypeKey.
// Invariants: The cache is seeded before recursing so pointer cycles terminate.
// Gotchas: The exposed descriptor address points at the kind byte, not the global head.

use crate::manifest::TypeRecord;
use crate::ssa::types::{BasicType, ChanDir, Signature, Type};

use super::emitter::{escape_bytes, global_ref};
use super::{invariant_violation, not_implemented, LowerCtx};

/// Bit 5 of the meta byte: set when the type is named.
pub const NAMED_FLAG: u8 = 1 << 5;

fn basic_kind(b: BasicType) -> u8 {
    match b {
        BasicType::Bool => 1,
        BasicType::Int => 2,
        BasicType::Int8 => 3,
        BasicType::Int16 => 4,
        BasicType::Int32 => 5,
        BasicType::Int64 => 6,
        BasicType::Uint => 7,
        BasicType::Uint8 => 8,
        BasicType::Uint16 => 9,
        BasicType::Uint32 => 10,
        BasicType::Uint64 => 11,
        BasicType::Uintptr => 12,
        BasicType::Float32 => 13,
        BasicType::Float64 => 14,
        BasicType::Complex64 => 15,
        BasicType::Complex128 => 16,
        BasicType::String => 17,
        BasicType::UnsafePointer => 18,
    }
}

/// Kind code of a type as the reflection runtime defines it, taken from
/// the underlying form. Codes 1..18 are the basic types, 19..26 the
/// composite kinds.
pub fn type_kind(ty: &Type, defs: &crate::ssa::types::TypeDefs) -> Result<u8, String> {
    let code = match defs.underlying(ty)? {
        Type::Basic(b) => basic_kind(*b),
        Type::Chan(_, _) => 19,
        Type::Interface(_) => 20,
        Type::Pointer(_) => 21,
        Type::Slice(_) => 22,
        Type::Array(_, _) => 23,
        Type::Signature(_) => 24,
        Type::Map(_, _) => 25,
        Type::Struct(_) => 26,
        Type::Named(name) => {
            return Err(invariant_violation(&format!(
                "underlying resolution stopped at named type {}",
                name
            )));
        }
    };
    Ok(code)
}

/// `kind | named-flag`, the single byte stored at the descriptor address.
pub fn meta_byte(ty: &Type, defs: &crate::ssa::types::TypeDefs) -> Result<u8, String> {
    let mut meta = type_kind(ty, defs)?;
    if matches!(ty, Type::Named(_)) {
        meta |= NAMED_FLAG;
    }
    Ok(meta)
}

fn sig_key(sig: &Signature) -> String {
    let params: Vec<String> = sig.params.iter().map(type_key).collect();
    let results: Vec<String> = sig.results.iter().map(type_key).collect();
    format!("func:{{{}}}{{{}}}", params.join(","), results.join(","))
}

/// Canonical structural key: injective over source-type identity and used
/// for descriptor symbol naming and global deduplication.
pub fn type_key(ty: &Type) -> String {
    match ty {
        Type::Basic(b) => format!("basic:{}", b.name()),
        Type::Named(name) => format!("named:{}", name),
        Type::Pointer(elem) => format!("pointer:{}", type_key(elem)),
        Type::Slice(elem) => format!("slice:{}", type_key(elem)),
        Type::Chan(_, elem) => format!("chan:{}", type_key(elem)),
        Type::Array(len, elem) => format!("array:{}:{}", len, type_key(elem)),
        Type::Map(key, value) => format!("map:{{{},{}}}", type_key(key), type_key(value)),
        Type::Signature(sig) => sig_key(sig),
        Type::Struct(fields) => {
            let elems: Vec<String> = fields
                .iter()
                .map(|f| {
                    let embedded = if f.embedded { "#" } else { "" };
                    let mut elem = format!("{}{}:{}", embedded, f.name, type_key(&f.ty));
                    if !f.tag.is_empty() {
                        elem.push_str(&format!("`{}`", f.tag));
                    }
                    elem
                })
                .collect();
            format!("struct:{{{}}}", elems.join(","))
        }
        Type::Interface(methods) => {
            let elems: Vec<String> = methods
                .iter()
                .map(|m| format!("{}:{}", m.label(), sig_key(&m.sig)))
                .collect();
            format!("interface:{{{}}}", elems.join(","))
        }
    }
}

/// Readable signature form used for interface matching, excluding any
/// receiver: `() string`, `([]uint8) (int, error)`.
pub fn signature_string(sig: &Signature) -> String {
    let mut s = String::new();
    if sig.params.is_empty() {
        s.push_str("()");
    } else {
        let params: Vec<String> = sig.params.iter().map(type_string).collect();
        s.push_str(&format!("({})", params.join(", ")));
    }
    match sig.results.as_slice() {
        [] => {}
        [single] => s.push_str(&format!(" {}", type_string(single))),
        many => {
            let results: Vec<String> = many.iter().map(type_string).collect();
            s.push_str(&format!(" ({})", results.join(", ")));
        }
    }
    s
}

/// Method name plus signature: the matching primitive shared by signature
/// tokens and interface method lists.
pub fn method_signature(name: &str, sig: &Signature) -> String {
    format!("{}{}", name, signature_string(sig))
}

/// Stable type spelling used only for signature matching. Differs from
/// [`type_key`] in bracket style, so the two namespaces never collide.
pub fn type_string(ty: &Type) -> String {
    match ty {
        Type::Array(len, elem) => format!("[{}]{}", len, type_string(elem)),
        Type::Basic(b) => b.name().to_string(),
        Type::Chan(dir, elem) => match dir {
            ChanDir::SendRecv => format!("chan ({})", type_string(elem)),
            ChanDir::SendOnly => format!("chan<- ({})", type_string(elem)),
            ChanDir::RecvOnly => format!("<-chan ({})", type_string(elem)),
        },
        Type::Interface(methods) => {
            let elems: Vec<String> = methods
                .iter()
                .map(|m| method_signature(&m.name, &m.sig))
                .collect();
            format!("interface{{{}}}", elems.join(";"))
        }
        Type::Map(key, value) => format!("map[{}]{}", type_string(key), type_string(value)),
        Type::Named(name) => name.clone(),
        Type::Pointer(elem) => format!("*{}", type_string(elem)),
        Type::Signature(sig) => format!("func{}", signature_string(sig)),
        Type::Slice(elem) => format!("[]{}", type_string(elem)),
        Type::Struct(fields) => {
            let elems: Vec<String> = fields
                .iter()
                .map(|f| {
                    let mut elem = format!("{} {}", f.name, type_string(&f.ty));
                    if !f.tag.is_empty() {
                        elem.push_str(&format!(" {:?}", f.tag));
                    }
                    elem
                })
                .collect();
            format!("struct{{{}}}", elems.join(";"))
        }
    }
}

impl<'p> LowerCtx<'p> {
    /// Emit (at most once) the descriptor global for `ty` and return the
    /// i8*-typed constant expression referencing its kind byte. When the
    /// type carries methods the global is prefixed with a method-set
    /// pointer, so the reference skips one slot.
    pub(crate) fn descriptor(&mut self, ty: &Type) -> Result<String, String> {
        let key = type_key(ty);
        if let Some(reference) = self.descriptor_refs.get(&key) {
            return Ok(reference.clone());
        }
        let defs = self.defs();
        let under = defs.underlying(ty)?.clone();
        let meta = meta_byte(ty, defs)?;
        let has_method_set =
            !matches!(under, Type::Interface(_)) && !defs.method_set(ty).is_empty();
        let symbol = format!("reflect/types.type:{}", key);
        let word = self.target.word_ty();

        // Slot types after the kind byte. Map key/value, interface method,
        // and signature param/result slots are reserved, not stored.
        let slot_tys: Vec<String> = match ty {
            Type::Basic(_)
            | Type::Map(_, _)
            | Type::Interface(_)
            | Type::Signature(_)
            | Type::Pointer(_) => vec!["i8*".into()],
            Type::Named(_) | Type::Chan(_, _) | Type::Slice(_) => {
                vec!["i8*".into(), "i8*".into()]
            }
            Type::Array(_, _) => vec!["i8*".into(), "i8*".into(), word.into()],
            Type::Struct(fields) => vec![
                "i16".into(),
                "i8*".into(),
                format!("[{} x {{ i8*, i8* }}]", fields.len()),
            ],
        };
        let mut field_tys: Vec<String> = Vec::with_capacity(slot_tys.len() + 2);
        if has_method_set {
            field_tys.push("i8*".into());
        }
        field_tys.push("i8".into());
        field_tys.extend(slot_tys);
        let struct_ty = format!("{{ {} }}", field_tys.join(", "));
        let kind_index = usize::from(has_method_set);
        let reference = format!(
            "getelementptr inbounds ({}, {}* {}, i32 0, i32 {})",
            struct_ty,
            struct_ty,
            global_ref(&symbol),
            kind_index
        );
        // Publish the reference before recursing so that cycles through
        // pointer types terminate.
        self.descriptor_refs.insert(key.clone(), reference.clone());

        let mut slots: Vec<String> = Vec::new();
        match ty {
            Type::Basic(_) => {
                let ptr_to = self.descriptor(&ty.clone().pointer_to())?;
                slots.push(format!("i8* {}", ptr_to));
            }
            Type::Named(_) => {
                let ptr_to = self.descriptor(&ty.clone().pointer_to())?;
                let underlying = self.descriptor(&under)?;
                slots.push(format!("i8* {}", ptr_to));
                slots.push(format!("i8* {}", underlying));
            }
            Type::Chan(_, elem) | Type::Slice(elem) => {
                let ptr_to = self.descriptor(&ty.clone().pointer_to())?;
                let elem = self.descriptor(elem)?;
                slots.push(format!("i8* {}", ptr_to));
                slots.push(format!("i8* {}", elem));
            }
            Type::Pointer(elem) => {
                // No ptrTo slot: `**T` cannot be rebuilt from `*T`.
                let elem = self.descriptor(elem)?;
                slots.push(format!("i8* {}", elem));
            }
            Type::Array(len, elem) => {
                let ptr_to = self.descriptor(&ty.clone().pointer_to())?;
                let elem = self.descriptor(elem)?;
                slots.push(format!("i8* {}", ptr_to));
                slots.push(format!("i8* {}", elem));
                slots.push(format!("{} {}", word, len));
            }
            Type::Map(_, _) | Type::Interface(_) | Type::Signature(_) => {
                let ptr_to = self.descriptor(&ty.clone().pointer_to())?;
                slots.push(format!("i8* {}", ptr_to));
            }
            Type::Struct(fields) => {
                if fields.len() > usize::from(u16::MAX) {
                    return Err(not_implemented(&format!(
                        "struct with {} fields exceeds the u16 field count",
                        fields.len()
                    )));
                }
                let ptr_to = self.descriptor(&ty.clone().pointer_to())?;
                slots.push(format!("i16 {}", fields.len()));
                slots.push(format!("i8* {}", ptr_to));
                let mut records = Vec::with_capacity(fields.len());
                for field in fields {
                    let mut flags = 0u8;
                    if field.embedded {
                        flags |= 1;
                    }
                    if !field.tag.is_empty() {
                        flags |= 2;
                    }
                    if crate::ssa::types::is_exported(&field.name) {
                        flags |= 4;
                    }
                    let mut data = vec![flags];
                    data.extend_from_slice(field.name.as_bytes());
                    if !field.tag.is_empty() {
                        data.push(0);
                        data.extend_from_slice(field.tag.as_bytes());
                    }
                    let blob_name = format!("{}.{}", symbol, field.name);
                    let blob_ty = format!("[{} x i8]", data.len());
                    self.module.add_global(
                        &blob_name,
                        &blob_ty,
                        format!(
                            "{} = internal unnamed_addr constant {} c\"{}\", align 1",
                            global_ref(&blob_name),
                            blob_ty,
                            escape_bytes(&data)
                        ),
                    )?;
                    let field_desc = self.descriptor(&field.ty)?;
                    records.push(format!(
                        "{{ i8*, i8* }} {{ i8* {}, i8* getelementptr inbounds ({}, {}* {}, i32 0, i32 0) }}",
                        field_desc,
                        blob_ty,
                        blob_ty,
                        global_ref(&blob_name)
                    ));
                }
                slots.push(format!(
                    "[{} x {{ i8*, i8* }}] [{}]",
                    fields.len(),
                    records.join(", ")
                ));
            }
        }

        let mut parts: Vec<String> = Vec::with_capacity(slots.len() + 2);
        if has_method_set {
            let (set_name, set_ty) = self.method_set_global(ty)?;
            parts.push(format!(
                "i8* bitcast ({}* {} to i8*)",
                set_ty,
                global_ref(&set_name)
            ));
        }
        parts.push(format!("i8 {}", meta));
        parts.extend(slots);
        let init = format!("{{ {} }}", parts.join(", "));

        let mut text = String::new();
        if self.verbose {
            text.push_str(&format!("; type {}\n", type_string(ty)));
        }
        text.push_str(&format!(
            "{} = linkonce_odr constant {} {}, align {}",
            global_ref(&symbol),
            struct_ty,
            init,
            self.target.ptr_bytes
        ));
        self.module.add_global(&symbol, &struct_ty, text)?;
        self.records.push(TypeRecord {
            symbol: symbol.clone(),
            key,
            kind: meta & 31,
            named: matches!(ty, Type::Named(_)),
            method_set: if has_method_set {
                Some(format!("{}$methodset", type_string(ty)))
            } else {
                None
            },
        });
        self.log(format!("descriptor {}", symbol));
        Ok(reference)
    }

    /// Declared-only identity token for a concrete type assertion; its
    /// address is the identity the later pass compares against.
    pub(crate) fn typeid_token(&mut self, ty: &Type) -> Result<String, String> {
        let name = format!("reflect/types.typeid:{}", type_key(ty));
        if self.typeid_names.insert(name.clone()) {
            self.module.add_global(
                &name,
                "i8",
                format!("{} = external constant i8", global_ref(&name)),
            )?;
        }
        Ok(global_ref(&name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssa::types::{InterfaceMethod, StructField, TypeDefs};

    fn bytes_sig() -> Signature {
        Signature::new(
            vec![Type::Slice(Box::new(Type::Basic(BasicType::Uint8)))],
            vec![Type::Basic(BasicType::Int), Type::Named("error".into())],
        )
    }

    #[test]
    fn keys_for_basic_and_composite_types() {
        assert_eq!(type_key(&Type::Basic(BasicType::Int32)), "basic:int32");
        assert_eq!(
            type_key(&Type::Basic(BasicType::Int32).pointer_to()),
            "pointer:basic:int32"
        );
        assert_eq!(
            type_key(&Type::Array(4, Box::new(Type::Basic(BasicType::Uint8)))),
            "array:4:basic:uint8"
        );
        assert_eq!(
            type_key(&Type::Map(
                Box::new(Type::Basic(BasicType::String)),
                Box::new(Type::Basic(BasicType::Int)),
            )),
            "map:{basic:string,basic:int}"
        );
        assert_eq!(
            type_key(&Type::Chan(
                ChanDir::SendRecv,
                Box::new(Type::Basic(BasicType::Bool)),
            )),
            "chan:basic:bool"
        );
    }

    #[test]
    fn reader_interface_key_matches_runtime_expectation() {
        let reader = Type::interface(vec![InterfaceMethod {
            name: "Read".into(),
            pkg: "io".into(),
            sig: bytes_sig(),
        }]);
        assert_eq!(
            type_key(&reader),
            "interface:{Read:func:{slice:basic:uint8}{basic:int,named:error}}"
        );
    }

    #[test]
    fn struct_keys_mark_embedding_and_tags() {
        let ty = Type::Struct(vec![
            StructField {
                name: "Reader".into(),
                ty: Type::Named("io.Reader".into()),
                tag: String::new(),
                embedded: true,
            },
            StructField {
                name: "y".into(),
                ty: Type::Basic(BasicType::String),
                tag: "json:\"y\"".into(),
                embedded: false,
            },
        ]);
        assert_eq!(
            type_key(&ty),
            "struct:{#Reader:named:io.Reader,y:basic:string`json:\"y\"`}"
        );
    }

    #[test]
    fn keys_separate_structurally_distinct_types() {
        let tys = [
            Type::Basic(BasicType::Int32),
            Type::Named("main.int32".into()),
            Type::Basic(BasicType::Int32).pointer_to(),
            Type::Slice(Box::new(Type::Basic(BasicType::Int32))),
            Type::Array(1, Box::new(Type::Basic(BasicType::Int32))),
            Type::Array(2, Box::new(Type::Basic(BasicType::Int32))),
        ];
        for (i, a) in tys.iter().enumerate() {
            for (j, b) in tys.iter().enumerate() {
                assert_eq!(type_key(a) == type_key(b), i == j, "{} vs {}", a, b);
            }
        }
    }

    #[test]
    fn unexported_interface_methods_are_package_qualified() {
        let itf = Type::interface(vec![InterfaceMethod {
            name: "lock".into(),
            pkg: "sync".into(),
            sig: Signature::new(vec![], vec![]),
        }]);
        assert_eq!(type_key(&itf), "interface:{sync.lock:func:{}{}}");
    }

    #[test]
    fn method_signature_examples() {
        assert_eq!(
            method_signature(
                "String",
                &Signature::new(vec![], vec![Type::Basic(BasicType::String)]),
            ),
            "String() string"
        );
        assert_eq!(
            method_signature("Read", &bytes_sig()),
            "Read([]uint8) (int, error)"
        );
    }

    #[test]
    fn type_strings_follow_source_syntax() {
        assert_eq!(
            type_string(&Type::Slice(Box::new(Type::Basic(BasicType::Uint8)))),
            "[]uint8"
        );
        assert_eq!(
            type_string(&Type::Chan(
                ChanDir::RecvOnly,
                Box::new(Type::Basic(BasicType::Int)),
            )),
            "<-chan (int)"
        );
        let ty = Type::Struct(vec![StructField {
            name: "y".into(),
            ty: Type::Basic(BasicType::String),
            tag: "json:\"y\"".into(),
            embedded: false,
        }]);
        assert_eq!(type_string(&ty), "struct{y string \"json:\\\"y\\\"\"}");
    }

    #[test]
    fn meta_byte_packs_kind_and_named_flag() {
        let mut defs = TypeDefs::default();
        defs.insert(
            "main.Celsius",
            crate::ssa::types::NamedDef {
                underlying: Type::Basic(BasicType::Float64),
                methods: vec![],
            },
        );
        let celsius = Type::Named("main.Celsius".into());
        let meta = meta_byte(&celsius, &defs).unwrap();
        assert_eq!(meta & 31, 14, "float64 kind");
        assert_eq!(meta & 32, 32, "named flag");
        let meta = meta_byte(&Type::Basic(BasicType::Int32), &defs).unwrap();
        assert_eq!(meta, 5);
        let meta = meta_byte(&Type::Basic(BasicType::Int32).pointer_to(), &defs).unwrap();
        assert_eq!(meta, 21);
    }

    fn lower_descriptor(program: &crate::ssa::Program, ty: &Type) -> (String, String) {
        let mut ctx =
            crate::codegen::LowerCtx::new(program, crate::codegen::TargetInfo::default(), false);
        let reference = ctx.descriptor(ty).expect("descriptor");
        (reference, ctx.finish().text)
    }

    #[test]
    fn basic_descriptor_carries_kind_and_ptr_to() {
        let program = crate::ssa::Program::default();
        let (reference, text) = lower_descriptor(&program, &Type::Basic(BasicType::Int32));
        assert_eq!(
            reference,
            "getelementptr inbounds ({ i8, i8* }, { i8, i8* }* @\"reflect/types.type:basic:int32\", i32 0, i32 0)"
        );
        assert!(
            text.contains(
                "@\"reflect/types.type:basic:int32\" = linkonce_odr constant { i8, i8* } { i8 5, i8* getelementptr inbounds ({ i8, i8* }, { i8, i8* }* @\"reflect/types.type:pointer:basic:int32\", i32 0, i32 0) }, align 8"
            ),
            "int32 descriptor malformed:\n{}",
            text
        );
        // The pointer descriptor stores the element only; no ptrTo slot.
        assert!(
            text.contains(
                "@\"reflect/types.type:pointer:basic:int32\" = linkonce_odr constant { i8, i8* } { i8 21, i8* getelementptr inbounds ({ i8, i8* }, { i8, i8* }* @\"reflect/types.type:basic:int32\", i32 0, i32 0) }, align 8"
            ),
            "pointer descriptor malformed:\n{}",
            text
        );
    }

    #[test]
    fn array_descriptor_stores_length_in_word_units() {
        let program = crate::ssa::Program::default();
        let ty = Type::Array(4, Box::new(Type::Basic(BasicType::Uint8)));
        let (_, text) = lower_descriptor(&program, &ty);
        assert!(
            text.contains(
                "@\"reflect/types.type:array:4:basic:uint8\" = linkonce_odr constant { i8, i8*, i8*, i64 } { i8 23, i8*"
            ),
            "array descriptor malformed:\n{}",
            text
        );
        assert!(
            text.contains(", i64 4 }, align 8"),
            "array length missing:\n{}",
            text
        );
        assert!(
            text.contains("@\"reflect/types.type:basic:uint8\""),
            "element descriptor missing:\n{}",
            text
        );
    }

    #[test]
    fn struct_descriptor_emits_field_records_and_blobs() {
        let program = crate::ssa::Program::default();
        let ty = Type::Struct(vec![
            StructField {
                name: "X".into(),
                ty: Type::Basic(BasicType::Int),
                tag: String::new(),
                embedded: false,
            },
            StructField {
                name: "y".into(),
                ty: Type::Basic(BasicType::String),
                tag: "json:\"y\"".into(),
                embedded: false,
            },
        ]);
        let (_, text) = lower_descriptor(&program, &ty);
        assert!(
            text.contains("{ i8, i16, i8*, [2 x { i8*, i8* }] } { i8 26, i16 2, i8*"),
            "struct descriptor malformed:\n{}",
            text
        );
        // Exported flag only for X; has-tag flag and nul-separated tag for y.
        assert!(text.contains("c\"\\04X\""), "X blob missing:\n{}", text);
        assert!(
            text.contains("c\"\\02y\\00json:\\22y\\22\""),
            "y blob missing:\n{}",
            text
        );
        assert!(
            text.contains("internal unnamed_addr constant [2 x i8] c\"\\04X\", align 1"),
            "blob global attributes wrong:\n{}",
            text
        );
    }

    #[test]
    fn descriptors_are_memoized_per_type_key() {
        let program = crate::ssa::Program::default();
        let mut ctx =
            crate::codegen::LowerCtx::new(&program, crate::codegen::TargetInfo::default(), false);
        let ty = Type::Basic(BasicType::Int32);
        let first = ctx.descriptor(&ty).expect("first");
        let second = ctx.descriptor(&ty).expect("second");
        assert_eq!(first, second);
        let text = ctx.finish().text;
        assert_eq!(
            text.matches("@\"reflect/types.type:basic:int32\" = ").count(),
            1,
            "descriptor must appear exactly once:\n{}",
            text
        );
    }

    #[test]
    fn mutually_recursive_pointer_types_terminate() {
        let mut defs = TypeDefs::default();
        defs.insert(
            "main.A",
            crate::ssa::types::NamedDef {
                underlying: Type::Named("main.B".into()).pointer_to(),
                methods: vec![],
            },
        );
        defs.insert(
            "main.B",
            crate::ssa::types::NamedDef {
                underlying: Type::Named("main.A".into()).pointer_to(),
                methods: vec![],
            },
        );
        let program = crate::ssa::Program {
            defs,
            functions: vec![],
        };
        let (_, text) = lower_descriptor(&program, &Type::Named("main.A".into()));
        for symbol in [
            "reflect/types.type:named:main.A",
            "reflect/types.type:named:main.B",
            "reflect/types.type:pointer:named:main.A",
            "reflect/types.type:pointer:named:main.B",
        ] {
            assert_eq!(
                text.matches(&format!("@\"{}\" = ", symbol)).count(),
                1,
                "{} missing or duplicated:\n{}",
                symbol,
                text
            );
        }
        // The cross-references close the cycle by symbol name.
        assert!(
            text.contains(
                "@\"reflect/types.type:pointer:named:main.B\" = linkonce_odr constant { i8, i8* } { i8 21, i8* getelementptr inbounds ({ i8, i8*, i8* }, { i8, i8*, i8* }* @\"reflect/types.type:named:main.B\", i32 0, i32 0) }"
            ),
            "cycle back-edge malformed:\n{}",
            text
        );
    }

    #[test]
    fn method_bearing_descriptor_prefixes_the_set_and_skips_one_slot() {
        let mut defs = TypeDefs::default();
        defs.insert(
            "main.Celsius",
            crate::ssa::types::NamedDef {
                underlying: Type::Basic(BasicType::Float64),
                methods: vec![crate::ssa::types::MethodDef {
                    name: "String".into(),
                    pkg: "main".into(),
                    sig: Signature::new(vec![], vec![Type::Basic(BasicType::String)]),
                    ptr_recv: false,
                    func: "main.Celsius.String".into(),
                }],
            },
        );
        let program = crate::ssa::Program {
            defs,
            functions: vec![crate::ssa::FuncDecl {
                name: "main.Celsius.String".into(),
                params: vec![crate::ssa::Param {
                    name: "c".into(),
                    ty: Type::Named("main.Celsius".into()),
                }],
                results: vec![Type::Basic(BasicType::String)],
                body: None,
            }],
        };
        let (reference, text) = lower_descriptor(&program, &Type::Named("main.Celsius".into()));
        assert!(
            reference.ends_with("i32 0, i32 1)"),
            "reference must skip the method-set slot: {}",
            reference
        );
        assert!(
            text.contains("{ i8*, i8, i8*, i8* } { i8* bitcast (")
                && text.contains("@\"main.Celsius$methodset\" to i8*), i8 46, i8*"),
            "method-set prefix malformed:\n{}",
            text
        );
    }

    #[test]
    fn typeid_tokens_are_declared_once() {
        let program = crate::ssa::Program::default();
        let mut ctx =
            crate::codegen::LowerCtx::new(&program, crate::codegen::TargetInfo::default(), false);
        let ty = Type::Basic(BasicType::Int32);
        let first = ctx.typeid_token(&ty).expect("token");
        let second = ctx.typeid_token(&ty).expect("token again");
        assert_eq!(first, "@\"reflect/types.typeid:basic:int32\"");
        assert_eq!(first, second);
        let text = ctx.finish().text;
        assert_eq!(
            text.matches("@\"reflect/types.typeid:basic:int32\" = external constant i8")
                .count(),
            1,
            "token must be declared once:\n{}",
            text
        );
    }

    #[test]
    fn every_kind_code_is_in_range() {
        let defs = TypeDefs::default();
        let composite = [
            (
                Type::Chan(ChanDir::SendRecv, Box::new(Type::Basic(BasicType::Int))),
                19,
            ),
            (Type::interface(vec![]), 20),
            (Type::Basic(BasicType::Int).pointer_to(), 21),
            (Type::Slice(Box::new(Type::Basic(BasicType::Int))), 22),
            (Type::Array(3, Box::new(Type::Basic(BasicType::Int))), 23),
            (
                Type::Signature(Box::new(Signature::new(vec![], vec![]))),
                24,
            ),
            (
                Type::Map(
                    Box::new(Type::Basic(BasicType::String)),
                    Box::new(Type::Basic(BasicType::Int)),
                ),
                25,
            ),
            (Type::Struct(vec![]), 26),
        ];
        for (ty, want) in composite {
            assert_eq!(type_kind(&ty, &defs).unwrap(), want, "{}", ty);
        }
        assert_eq!(type_kind(&Type::Basic(BasicType::Bool), &defs).unwrap(), 1);
        assert_eq!(
            type_kind(&Type::Basic(BasicType::UnsafePointer), &defs).unwrap(),
            18
        );
    }
}
