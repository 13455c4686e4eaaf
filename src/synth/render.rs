//! Test block rendering for each dialect and hypothesis strategy.

use super::extract::Declaration;
use super::{Dialect, HypothesisStrategy};

/// Values assigned to the first two synthesized parameters.
const FIRST_OPERAND: i64 = 2;
const SECOND_OPERAND: i64 = 3;
/// Result expected by the addition hypothesis.
const EXPECTED_SUM: i64 = FIRST_OPERAND + SECOND_OPERAND;

const JAVASCRIPT_PRELUDE: &str = "const assert = require(\"node:assert\");\n";

/// Render the full test file for `declarations`.
///
/// Returns an empty string when there is nothing to test.
pub(super) fn render_tests(
    dialect: Dialect,
    strategy: HypothesisStrategy,
    declarations: &[Declaration],
) -> String {
    if declarations.is_empty() {
        return String::new();
    }

    let mut content = String::new();
    if dialect == Dialect::JavaScript {
        content.push_str(JAVASCRIPT_PRELUDE);
    }

    for declaration in declarations {
        let block = match dialect {
            Dialect::Python => python_block(strategy, declaration),
            Dialect::JavaScript => javascript_block(strategy, declaration),
        };
        content.push_str(&block);
    }

    content
}

fn parameter_names(arity: usize) -> Vec<String> {
    (1..=arity).map(|position| format!("param{position}")).collect()
}

/// Values bound to parameters under each strategy.
///
/// The addition hypothesis only ever binds the first two names; the arity
/// skeleton binds every name to successive integers starting at 2.
fn bound_values(strategy: HypothesisStrategy, names: &[String]) -> Vec<(&str, i64)> {
    let limit = match strategy {
        HypothesisStrategy::Addition => 2,
        HypothesisStrategy::Arity => names.len(),
        HypothesisStrategy::Stub => 0,
    };

    names
        .iter()
        .take(limit)
        .zip(FIRST_OPERAND..)
        .map(|(name, value)| (name.as_str(), value))
        .collect()
}

fn python_block(strategy: HypothesisStrategy, declaration: &Declaration) -> String {
    let name = declaration.name();
    let mut block = format!("\ndef test_{name}():\n");

    if strategy == HypothesisStrategy::Stub {
        block.push_str("    pass\n");
        return block;
    }

    let names = parameter_names(declaration.arity());
    for (param, value) in bound_values(strategy, &names) {
        block.push_str(&format!("    {param} = {value}\n"));
    }

    let call = format!("{name}({})", names.join(", "));
    if strategy == HypothesisStrategy::Addition {
        block.push_str(&format!("    assert {call} == {EXPECTED_SUM}\n"));
    } else {
        block.push_str(&format!("    {call}\n"));
    }
    block
}

fn javascript_block(strategy: HypothesisStrategy, declaration: &Declaration) -> String {
    let name = declaration.name();
    let mut block = format!("\n(function test_{name}() {{\n");

    if strategy != HypothesisStrategy::Stub {
        let names = parameter_names(declaration.arity());
        for (param, value) in bound_values(strategy, &names) {
            block.push_str(&format!("  const {param} = {value};\n"));
        }

        let call = format!("{name}({})", names.join(", "));
        if strategy == HypothesisStrategy::Addition {
            block.push_str(&format!("  assert.strictEqual({call}, {EXPECTED_SUM});\n"));
        } else {
            block.push_str(&format!("  {call};\n"));
        }
    }

    block.push_str("})();\n");
    block
}
