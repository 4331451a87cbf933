//! The process-wide table of executable builtins (§4.4). Populated once from
//! every `builtins::*::specs()` on first use; queried by name from
//! `interpreter::evaluate`'s `Call` arm.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::function::FunctionSpec;

pub static REGISTRY: Lazy<HashMap<&'static str, FunctionSpec>> = Lazy::new(|| {
    crate::builtins::all()
        .into_iter()
        .map(|spec| (spec.name(), spec))
        .collect()
});

pub fn lookup(name: &str) -> Option<&'static FunctionSpec> {
    REGISTRY.get(name.to_ascii_uppercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_signature_has_a_matching_builtin_except_the_short_circuit_forms() {
        let short_circuit_and_literal = ["IF", "AND", "OR", "NOT"];
        for name in formulon_common::signatures::all_names() {
            if short_circuit_and_literal.contains(&name) {
                continue;
            }
            assert!(lookup(name).is_some(), "missing builtin for {name}");
        }
    }
}
