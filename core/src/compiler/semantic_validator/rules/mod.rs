//! Validation Rules
//!
//! Each file in this module contains one validation rule:
//!
//! - `undefined_variable.rs` - Names used without a declaration in scope
//! - `const_assign.rs` - Assignments to `const` bindings
//! - `invalid_jump.rs` - `break`/`continue` with no loop to jump to
//! - `unreachable_code.rs` - Code that can never execute
//! - `unused_variable.rs` - Variables declared but never used

mod const_assign;
mod invalid_jump;
mod undefined_variable;
mod unreachable_code;
mod unused_variable;

pub use const_assign::ConstAssignRule;
pub use invalid_jump::InvalidJumpRule;
pub use undefined_variable::UndefinedVariableRule;
pub use unreachable_code::UnreachableCodeRule;
pub use unused_variable::UnusedVariableRule;
