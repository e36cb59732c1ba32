use crate::ast::{ConstantValue, NodeKind};
use crate::intern::StringId;
use crate::scope::ObjectKind;
use crate::translator::{TranslationUnit, Translator};
use crate::types::{ArrayBound, TypeKind, TypeQualifiers, TypeRef};

fn parse(src: &str) -> (Translator, TranslationUnit) {
    let _ = env_logger::try_init();
    let mut translator = Translator::new();
    let tu = translator.parse_source("<test>", src).expect("no lex error");
    (translator, tu)
}

fn parse_ok(src: &str) -> (Translator, TranslationUnit) {
    let (translator, tu) = parse(src);
    assert!(
        !translator.has_errors(),
        "{:?}",
        translator.diagnostics.diagnostics()
    );
    (translator, tu)
}

#[test]
fn test_main_function_shape() {
    let (tr, tu) = parse_ok("int main(void) { return 0; }");

    assert_eq!(tu.globals.len(), 1);
    let object = tr.scopes.object(tu.globals[0]);
    assert_eq!(object.name, StringId::new("main"));

    let TypeKind::Function(f) = tr.types.get(object.ty) else {
        panic!("expected a function type, got {:?}", tr.types.get(object.ty));
    };
    assert!(f.complete);
    assert!(f.params.is_empty());
    assert!(!f.is_variadic);
    assert_eq!(f.return_type, TypeRef::INT);

    let ObjectKind::Function { body: Some(body) } = object.kind else {
        panic!("expected a function body");
    };
    let NodeKind::Block { children, .. } = &tr.ast.get(body).kind else {
        panic!("body must be a block");
    };
    assert_eq!(children.len(), 1);
    let NodeKind::Return(Some(value)) = tr.ast.get(children[0]).kind else {
        panic!("body must contain exactly one return");
    };
    assert!(matches!(
        tr.ast.get(value).kind,
        NodeKind::Constant(ConstantValue::Int(0))
    ));
}

#[test]
fn test_abstract_declarator_reconstruction() {
    // pointer -> function(unsigned long, short) -> pointer ->
    // array[0xff] of const volatile int
    let (tr, _) = parse_ok(
        "typedef const volatile int (*(*fp_t)(unsigned long x, short y))[0xff];",
    );

    let object = tr
        .scopes
        .lookup(StringId::new("fp_t"))
        .map(|r| tr.scopes.object(r))
        .expect("typedef registered");
    assert!(matches!(object.kind, ObjectKind::Typedef));

    let TypeKind::Pointer(fn_ty) = tr.types.get(object.ty) else {
        panic!("outermost must be a pointer");
    };
    let TypeKind::Function(f) = tr.types.get(*fn_ty) else {
        panic!("pointee must be a function");
    };
    assert_eq!(f.params.len(), 2);
    assert_eq!(f.params[0].ty, TypeRef::ULONG);
    assert_eq!(f.params[0].name, Some(StringId::new("x")));
    assert_eq!(f.params[1].ty, TypeRef::SHORT);

    let TypeKind::Pointer(arr_ty) = tr.types.get(f.return_type) else {
        panic!("return type must be a pointer");
    };
    let TypeKind::Array(a) = tr.types.get(*arr_ty) else {
        panic!("pointee must be an array");
    };
    assert_eq!(a.bound, ArrayBound::Constant);
    assert_eq!(a.length, Some(0xff));

    let TypeKind::Qualified(q) = tr.types.get(a.element) else {
        panic!("element must be qualified");
    };
    assert_eq!(q.qualifiers, TypeQualifiers::CONST | TypeQualifiers::VOLATILE);
    assert_eq!(q.base, TypeRef::INT);
}

#[test]
fn test_enum_auto_numbering() {
    let (tr, _) = parse_ok("enum e { eVal1 = 1, eVal2 = 2, eVal3 = 3, eVal };");

    let object = tr
        .scopes
        .lookup(StringId::new("eVal"))
        .map(|r| tr.scopes.object(r))
        .expect("enumerator registered");
    let ObjectKind::EnumConstant { value, .. } = object.kind else {
        panic!("expected an enum constant");
    };
    assert_eq!(value, 4);
}

#[test]
fn test_bitfield_struct_size() {
    let (tr, _) = parse_ok("struct s { int f1:16; int f2:16; int f3:16; int x; };");
    let ty = tr.scopes.lookup_tag(StringId::new("s")).expect("tag registered");
    assert_eq!(tr.types.size_of(ty), Some(12));
}

#[test]
fn test_over_wide_bitfield_is_reported() {
    let (tr, _) = parse("struct s { int f : 99; };");
    assert!(tr.has_errors());
    let rendered = format!("{:?}", tr.diagnostics.diagnostics());
    assert!(rendered.contains("exceeds"), "{rendered}");
}

#[test]
fn test_unbounded_array_must_be_last_member() {
    let (tr, _) = parse("struct s { int a[]; int b; };");
    assert!(tr.has_errors());

    let (tr, _) = parse("struct s { int b; int a[]; };");
    assert!(!tr.has_errors(), "{:?}", tr.diagnostics.diagnostics());
}

#[test]
fn test_forward_function_declaration_merges() {
    let (tr, tu) = parse_ok("int f();\nint f(int x);\n");
    assert_eq!(tu.globals.len(), 1);
    let object = tr.scopes.object(tu.globals[0]);
    let TypeKind::Function(f) = tr.types.get(object.ty) else {
        panic!("expected a function");
    };
    assert!(f.complete);
    assert_eq!(f.params.len(), 1);
    assert_eq!(f.params[0].ty, TypeRef::INT);
}

#[test]
fn test_incompatible_redeclaration_is_reported() {
    let (tr, _) = parse("int x;\ndouble x;\n");
    assert!(tr.has_errors());
}

#[test]
fn test_typedef_used_as_type() {
    let (tr, _) = parse_ok("typedef unsigned long size_tt;\nsize_tt n;\n");
    let object = tr
        .scopes
        .lookup(StringId::new("n"))
        .map(|r| tr.scopes.object(r))
        .expect("variable registered");
    assert_eq!(object.ty, TypeRef::ULONG);
}

#[test]
fn test_struct_forward_reference_completes() {
    let (tr, _) = parse_ok("struct node;\nstruct node { struct node *next; int v; };");
    let ty = tr.scopes.lookup_tag(StringId::new("node")).expect("tag");
    assert!(tr.types.is_complete(ty));
    // next (8) + v (4) padded to 16.
    assert_eq!(tr.types.size_of(ty), Some(16));
}

#[test]
fn test_variadic_parameter_list() {
    let (tr, tu) = parse_ok("int printf_like(const char *fmt, ...);");
    let object = tr.scopes.object(tu.globals[0]);
    let TypeKind::Function(f) = tr.types.get(object.ty) else {
        panic!("expected a function");
    };
    assert!(f.is_variadic);
    assert_eq!(f.params.len(), 1);
}

#[test]
fn test_parameter_array_decays_to_pointer() {
    let (tr, tu) = parse_ok("void fill(int buf[16]);");
    let object = tr.scopes.object(tu.globals[0]);
    let TypeKind::Function(f) = tr.types.get(object.ty) else {
        panic!("expected a function");
    };
    let TypeKind::Pointer(p) = tr.types.get(f.params[0].ty) else {
        panic!("array parameter must decay to a pointer");
    };
    assert_eq!(*p, TypeRef::INT);
}

#[test]
fn test_pointer_subtraction_of_mismatched_elements() {
    let (tr, _) = parse(
        "void f(void) { int *p; double *d; long x = p - d; }",
    );
    assert!(tr.has_errors());
    let rendered = format!("{:?}", tr.diagnostics.diagnostics());
    assert!(rendered.contains("incompatible element sizes"), "{rendered}");
}

#[test]
fn test_pointer_arithmetic_and_index_desugar() {
    // p[3], p + 1, ++p, p += 2 all go through the scaled-add rewrite.
    let (_, _) = parse_ok(
        "int read3(int *p) { ++p; p += 2; return p[3] + *(p + 1); }",
    );
}

#[test]
fn test_undeclared_identifier_is_reported() {
    let (tr, _) = parse("int f(void) { return missing; }");
    assert!(tr.has_errors());
    let rendered = format!("{:?}", tr.diagnostics.diagnostics());
    assert!(rendered.contains("undeclared"), "{rendered}");
}

#[test]
fn test_error_recovery_reaches_later_declarations() {
    let (tr, _) = parse("int bad(void) { return 0 }\nint good;\n");
    assert!(tr.has_errors());
    assert!(tr.scopes.lookup(StringId::new("good")).is_some());
}

#[test]
fn test_call_argument_count_checked() {
    let (tr, _) = parse("int f(int a, int b);\nint g(void) { return f(1); }");
    assert!(tr.has_errors());
    let rendered = format!("{:?}", tr.diagnostics.diagnostics());
    assert!(rendered.contains("too few"), "{rendered}");
}

#[test]
fn test_cast_retypes_operand() {
    let (tr, _) = parse_ok("void f(void) { long x = (long)1; char *p = (char *)0; }");
    assert!(!tr.has_errors());
}

#[test]
fn test_sizeof_in_constant_position() {
    let (tr, _) = parse_ok("enum sz { a = sizeof(long), b = sizeof(int) };");
    let value_of = |name: &str| {
        let obj = tr.scopes.lookup(StringId::new(name)).expect("enumerator");
        match tr.scopes.object(obj).kind {
            ObjectKind::EnumConstant { value, .. } => value,
            _ => panic!("expected an enum constant"),
        }
    };
    assert_eq!(value_of("a"), 8);
    assert_eq!(value_of("b"), 4);
}

#[test]
fn test_shadowing_in_nested_blocks() {
    let (_, _) = parse_ok(
        "int x;\nint f(void) { int x; { int x; x = 1; } return x; }",
    );
}

#[test]
fn test_if_else_and_while_statements() {
    let (tr, tu) = parse_ok(
        "int abs_like(int v) { while (0) { v = v; } if (v < 0) return -v; else return v; }",
    );
    let object = tr.scopes.object(tu.globals[0]);
    let ObjectKind::Function { body: Some(body) } = object.kind else {
        panic!("expected a body");
    };
    let NodeKind::Block { children, .. } = &tr.ast.get(body).kind else {
        panic!("body must be a block");
    };
    assert_eq!(children.len(), 2);
    assert!(matches!(tr.ast.get(children[0]).kind, NodeKind::While { .. }));
    assert!(matches!(tr.ast.get(children[1]).kind, NodeKind::If { .. }));
}

#[test]
fn test_invalid_specifier_combination_reported() {
    let (tr, _) = parse("short double x;");
    assert!(tr.has_errors());
    let rendered = format!("{:?}", tr.diagnostics.diagnostics());
    assert!(rendered.contains("invalid type specifier"), "{rendered}");
}

#[test]
fn test_array_bound_constant_folding() {
    let (tr, _) = parse_ok("enum { N = 4 };\nint table[N * 2];");
    let object = tr
        .scopes
        .lookup(StringId::new("table"))
        .map(|r| tr.scopes.object(r))
        .expect("variable registered");
    let TypeKind::Array(a) = tr.types.get(object.ty) else {
        panic!("expected an array");
    };
    assert_eq!(a.length, Some(8));
}
