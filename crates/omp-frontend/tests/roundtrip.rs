//! Printer/parser round-trip properties.
//!
//! The canonical form must be a fixed point: printing a parsed module and
//! re-parsing it yields the same printed text. Expressions are fuzzed
//! structurally; whole-module cases cover the statement grammar.

use omp_frontend::diag::SourceFile;
use omp_frontend::parser::parse_module;
use omp_frontend::unparse::unparse_module;
use proptest::prelude::*;

fn reprint(src: &str) -> String {
    let module = parse_module(&SourceFile::new("t.py", src)).expect("input parses");
    unparse_module(&module)
}

fn assert_fixed_point(src: &str) {
    let once = reprint(src);
    let twice = reprint(&once);
    assert_eq!(once, twice, "printed form must be stable for:\n{src}");
}

#[test]
fn module_cases_are_fixed_points() {
    for src in [
        "x = 1\n",
        "def f(a, b=2):\n    return a + b\n",
        "@omp\ndef work(q):\n    with omp(\"parallel\"):\n        q.put(omp_get_thread_num())\n",
        "for i in range(0, 10, 2):\n    total += i\n",
        "while not done:\n    step()\n",
        "if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n",
        "try:\n    f()\nfinally:\n    release()\n",
        "del x, y\n",
        "xs = [1, 2, 3]\npair = (a, b)\n",
        "value = left if cond else right\n",
        "import math\nfrom queue import Queue as Q\n",
    ] {
        assert_fixed_point(src);
    }
}

/// Strategy for expression source text that exercises the precedence ladder.
fn expr_strategy() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        (0i64..1000).prop_map(|n| n.to_string()),
        "[a-e]".prop_map(|s| s.to_string()),
        Just("True".to_string()),
        Just("None".to_string()),
    ];
    leaf.prop_recursive(4, 32, 3, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{a} + {b}")),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{a} * {b}")),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{a} - {b}")),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("({a}) // ({b})")),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{a} < {b}")),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{a} and {b}")),
            inner.clone().prop_map(|a| format!("-({a})")),
            inner.clone().prop_map(|a| format!("f({a})")),
            inner.clone().prop_map(|a| format!("xs[{a}]")),
            (inner.clone(), inner.clone(), inner)
                .prop_map(|(a, b, c)| format!("{a} if {b} else {c}")),
        ]
    })
}

proptest! {
    #[test]
    fn printed_expressions_are_fixed_points(expr in expr_strategy()) {
        let src = format!("x = {expr}\n");
        let once = reprint(&src);
        let twice = reprint(&once);
        prop_assert_eq!(once, twice);
    }
}
