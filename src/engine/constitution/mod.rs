//! Constitutional Validation Module
//!
//! Principle-tagged rules checked before and after an action

pub mod rules;
pub mod validator;

pub use rules::{default_rules, education_rules, ConstitutionalRule, Context, Principle};
pub use validator::{ConstitutionalValidator, PostValidation, ValidationResult};
