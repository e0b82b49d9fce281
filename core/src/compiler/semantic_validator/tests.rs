//! Tests for the semantic validation system

use super::*;
use crate::compiler::parser::parse_module;

// ============================================================================
// Helper Functions
// ============================================================================

/// Parse source and validate, returning errors
fn validate(source: &str) -> Vec<ValidationError> {
    let module = parse_module(source).expect("Parse should succeed");
    validate_module(&module, &ValidationContext::new(source))
}

/// Check if errors contain a specific rule
fn has_rule(errors: &[ValidationError], rule_id: &str) -> bool {
    errors.iter().any(|e| e.rule_id == rule_id)
}

/// Get errors for a specific rule
fn for_rule<'a>(errors: &'a [ValidationError], rule_id: &str) -> Vec<&'a ValidationError> {
    errors.iter().filter(|e| e.rule_id == rule_id).collect()
}

// ============================================================================
// Undefined Variable Tests
// ============================================================================

#[test]
fn test_undefined_variable_simple() {
    let errors = validate("let y = x + 1\nprint(y)");

    let undef_errors = for_rule(&errors, "undefined-variable");
    assert_eq!(undef_errors.len(), 1);
    assert!(undef_errors[0].message.contains("'x'"));
    assert!(undef_errors[0].is_error());
}

#[test]
fn test_undefined_variable_ok_when_declared() {
    let source = r#"
let x = 5
let y = x + 1
print(y)
"#;

    let errors = validate(source);
    assert!(!has_rule(&errors, "undefined-variable"));
}

#[test]
fn test_undefined_variable_builtins_ok() {
    let source = r#"
console.log(Math.floor(2.5), tostring(NaN))
const e = new Error("bad")
print(e.message, string.rep("a", 2))
"#;

    let errors = validate(source);
    assert!(
        for_rule(&errors, "undefined-variable").is_empty(),
        "Built-ins should not be flagged as undefined: {:?}",
        errors
    );
}

#[test]
fn test_undefined_variable_self_reference() {
    let errors = validate("let x = x + 1");
    assert!(has_rule(&errors, "undefined-variable"));
}

#[test]
fn test_function_declarations_are_hoisted() {
    let source = r#"
greet("world")
function greet(name) {
    print(prefix + name)
}
const prefix = "hello "
"#;

    let errors = validate(source);
    assert!(
        for_rule(&errors, "undefined-variable").is_empty(),
        "{:?}",
        errors
    );
}

#[test]
fn test_block_scoped_names_do_not_leak() {
    let source = r#"
if (true) {
    let inner = 1
    print(inner)
}
print(inner)
"#;

    let undef = validate(source);
    let undef = for_rule(&undef, "undefined-variable");
    assert_eq!(undef.len(), 1);
    assert_eq!(undef[0].span.start_line, 5);
}

#[test]
fn test_assign_to_undeclared_variable() {
    let errors = validate("total = 3");
    let undef = for_rule(&errors, "undefined-variable");
    assert_eq!(undef.len(), 1);
    assert!(undef[0].message.contains("undeclared"));
}

#[test]
fn test_ambient_globals_from_context() {
    let source = "print(hostValue)";
    let module = parse_module(source).unwrap();
    let ctx = ValidationContext::new(source).with_globals(["hostValue".to_string()]);

    let errors = validate_module(&module, &ctx);
    assert!(!has_rule(&errors, "undefined-variable"));

    let local = validate("declare const hostValue;\nprint(hostValue)");
    assert!(!has_rule(&local, "undefined-variable"));
}

#[test]
fn test_arrow_params_in_scope() {
    let errors = validate("const double = (n) => n * 2\nprint(double(2))");
    assert!(!has_rule(&errors, "undefined-variable"));
}

// ============================================================================
// Const Assign Tests
// ============================================================================

#[test]
fn test_const_reassignment() {
    let errors = validate("const limit = 3\nlimit = 4\nlimit += 1");
    let const_errors = for_rule(&errors, "const-assign");
    assert_eq!(const_errors.len(), 2);
    assert!(const_errors[0].message.contains("'limit'"));
}

#[test]
fn test_const_property_write_allowed() {
    let errors = validate("const config = {}\nconfig.debug = true\nconfig[\"x\"] = 1");
    assert!(!has_rule(&errors, "const-assign"));
}

#[test]
fn test_let_shadowing_const() {
    let source = r#"
const value = 1
function update() {
    let value = 2
    value = 3
    return value
}
print(update())
"#;

    let errors = validate(source);
    assert!(!has_rule(&errors, "const-assign"), "{:?}", errors);
}

#[test]
fn test_const_loop_binding() {
    let errors = validate("for (const item of [1, 2]) {\n    item = 3\n}");
    assert!(has_rule(&errors, "const-assign"));
}

// ============================================================================
// Invalid Jump Tests
// ============================================================================

#[test]
fn test_break_outside_loop() {
    let errors = validate("break");
    let jumps = for_rule(&errors, "invalid-jump");
    assert_eq!(jumps.len(), 1);
    assert!(jumps[0].message.contains("inside a loop"));
}

#[test]
fn test_break_inside_loop_ok() {
    let source = r#"
let i = 0
while (true) {
    i += 1
    if (i > 3) { break }
    continue
}
"#;

    let errors = validate(source);
    assert!(!has_rule(&errors, "invalid-jump"));
}

#[test]
fn test_jump_out_of_try_block() {
    let source = r#"
while (true) {
    try {
        break
    } catch (e) {
        continue
    }
}
"#;

    let errors = validate(source);
    let jumps = for_rule(&errors, "invalid-jump");
    assert_eq!(jumps.len(), 1);
    assert!(jumps[0].message.contains("try block"));
}

#[test]
fn test_function_resets_loop_context() {
    let source = r#"
while (true) {
    const stop = () => { break }
    stop()
}
"#;

    let errors = validate(source);
    assert!(has_rule(&errors, "invalid-jump"));
}

// ============================================================================
// Unreachable Code Tests
// ============================================================================

#[test]
fn test_unreachable_after_return() {
    let source = r#"
function f() {
    return 1
    print("never")
    print("also never")
}
print(f())
"#;

    let errors = validate(source);
    let unreachable = for_rule(&errors, "unreachable-code");
    assert_eq!(unreachable.len(), 1);
    assert_eq!(unreachable[0].severity, Severity::Warning);
    assert_eq!(unreachable[0].span.start_line, 3);
}

#[test]
fn test_unreachable_after_throw() {
    let errors = validate("throw \"boom\"\nprint(1)");
    assert!(has_rule(&errors, "unreachable-code"));
}

#[test]
fn test_reachable_after_conditional_return() {
    let source = r#"
function f(x) {
    if (x) {
        return 1
    }
    return 2
}
print(f(true))
"#;

    let errors = validate(source);
    assert!(!has_rule(&errors, "unreachable-code"));
}

#[test]
fn test_hoisted_function_after_return_not_reported() {
    let source = r#"
function outer() {
    return inner()
    function inner() { return 1 }
}
print(outer())
"#;

    let errors = validate(source);
    assert!(!has_rule(&errors, "unreachable-code"));
}

// ============================================================================
// Unused Variable Tests
// ============================================================================

#[test]
fn test_unused_variable() {
    let errors = validate("let x = 5\nlet y = 10\nprint(y)");
    let unused = for_rule(&errors, "unused-variable");
    assert_eq!(unused.len(), 1);
    assert!(unused[0].message.contains("'x'"));
    assert!(!unused[0].is_error());
}

#[test]
fn test_unused_variable_exemptions() {
    let source = r#"
let _ignored = 1
export const answer = 42
export function helper() { return 1 }
"#;

    let errors = validate(source);
    assert!(!has_rule(&errors, "unused-variable"), "{:?}", errors);
}

#[test]
fn test_used_inside_closure() {
    let errors = validate("const base = 2\nconst f = (n) => n * base\nprint(f(2))");
    assert!(!has_rule(&errors, "unused-variable"));
}

// ============================================================================
// Validator
// ============================================================================

#[test]
fn test_errors_sorted_by_position() {
    let errors = validate("let a = missing\nbreak");
    let starts: Vec<usize> = errors.iter().map(|e| e.span.start).collect();
    let mut sorted = starts.clone();
    sorted.sort();
    assert_eq!(starts, sorted);
    assert!(has_errors(
        &parse_module("break").unwrap(),
        &ValidationContext::new("break")
    ));
}

#[test]
fn test_to_diagnostic() {
    let errors = validate("print(missing)");
    let diagnostic = errors[0].to_diagnostic("main.flow");
    assert_eq!(diagnostic.code, "undefined-variable");
    assert_eq!(diagnostic.start, 6);
    assert_eq!(diagnostic.length, 7);
    assert_eq!(diagnostic.file, "main.flow");
    assert!(diagnostic.is_error());
}

#[test]
fn test_all_rules_registered() {
    let ids: Vec<_> = Validator::new().rules().map(|(id, _)| id).collect();
    assert_eq!(
        ids,
        vec![
            "undefined-variable",
            "const-assign",
            "invalid-jump",
            "unreachable-code",
            "unused-variable"
        ]
    );
}
