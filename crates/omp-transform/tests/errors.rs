//! Diagnostic coverage: every transform-time error class, with spans that
//! land on the user's source.

use omp_transform::{transform_source, Options, TransformError};

fn err_of(src: &str) -> omp_frontend::SyntaxError {
    match transform_source(src, "test.py", &Options::default()) {
        Err(TransformError::Syntax(err)) => err,
        Ok(out) => panic!("expected a transform error, got:\n{out}"),
        Err(other) => panic!("expected a syntax error, got: {other}"),
    }
}

#[test]
fn unknown_directive_names_the_offender() {
    let err = err_of("def f():\n    with omp(\"paralel\"):\n        pass\n");
    assert!(err.message.contains("a valid directive"), "got {}", err.message);
    assert_eq!(err.line, 2);
    assert!(err.source_line.contains("paralel"));
}

#[test]
fn unknown_clause_after_directive() {
    let err = err_of("def f():\n    with omp(\"parallel turbo\"):\n        pass\n");
    assert!(err.message.contains("not a valid clause"), "got {}", err.message);
}

#[test]
fn barrier_rejects_a_real_body() {
    let err = err_of(
        "def f(q):\n    with omp(\"parallel\"):\n        with omp(\"barrier\"):\n            q.put(1)\n",
    );
    assert!(err.message.contains("does not take a statement body"), "got {}", err.message);
    // A lone `pass` placeholder body is fine.
    let ok = transform_source(
        "def f():\n    with omp(\"parallel\"):\n        with omp(\"barrier\"):\n            pass\n",
        "test.py",
        &Options::default(),
    );
    assert!(ok.is_ok());
}

#[test]
fn taskwait_rejects_a_real_body() {
    let err = err_of(
        "def f(q):\n    with omp(\"parallel\"):\n        with omp(\"taskwait\"):\n            q.put(1)\n",
    );
    assert!(err.message.contains("does not take a statement body"));
}

#[test]
fn parallel_for_needs_a_loop() {
    let err = err_of("def f(q):\n    with omp(\"parallel for\"):\n        q.put(0)\n");
    assert!(err.message.contains("for statement expected"), "got {}", err.message);
}

#[test]
fn work_shared_loop_must_be_range_form() {
    let err = err_of(
        "def f(q, elems):\n    with omp(\"parallel for\"):\n        for i in elems:\n            q.put(i)\n",
    );
    assert!(err.message.contains("range for expected"), "got {}", err.message);
}

#[test]
fn trailing_statement_breaks_the_loop_body() {
    let err = err_of(
        "def f(q):\n    with omp(\"for\"):\n        for i in range(3):\n            q.put(i)\n        q.put(-1)\n",
    );
    assert!(err.message.contains("unindent expected"), "got {}", err.message);
}

#[test]
fn collapse_requires_perfect_nesting() {
    let err = err_of(
        "\
def f(q):
    with omp(\"for collapse(2)\"):
        for i in range(3):
            q.put(i)
            for j in range(3):
                q.put(j)
",
    );
    assert!(
        err.message.contains("for statement expected")
            || err.message.contains("perfectly nested"),
        "got {}",
        err.message
    );
}

#[test]
fn break_inside_work_shared_loop() {
    let err = err_of(
        "def f(q):\n    with omp(\"parallel for\"):\n        for i in range(3):\n            break\n",
    );
    assert!(err.message.contains("`break` is not allowed"), "got {}", err.message);
}

#[test]
fn return_cannot_leave_a_region() {
    let err = err_of(
        "def f():\n    x = 0\n    with omp(\"parallel\"):\n        x = 2\n        return x\n",
    );
    assert!(err.message.contains("`return` cannot leave"), "got {}", err.message);
    assert_eq!(err.line, 5);
}

#[test]
fn yield_cannot_leave_a_region() {
    let err = err_of(
        "def f():\n    with omp(\"parallel\"):\n        yield 2\n",
    );
    assert!(err.message.contains("`yield` cannot leave"), "got {}", err.message);
}

#[test]
fn nested_defs_may_return() {
    let ok = transform_source(
        "\
def f():
    x = 0
    with omp(\"parallel\"):
        def g():
            return 2
        x = g()
    return x
",
        "test.py",
        &Options::default(),
    );
    assert!(ok.is_ok());
}

#[test]
fn duplicate_data_classification() {
    let err = err_of(
        "def f():\n    x = 0\n    with omp(\"parallel private(x) shared(x)\"):\n        x = 1\n",
    );
    assert!(
        err.message.contains("appears more than once in data clauses"),
        "got {}",
        err.message
    );
}

#[test]
fn shared_requires_a_visible_binding() {
    let err = err_of("def f():\n    x = 0\n    with omp(\"parallel shared(y)\"):\n        x = 1\n");
    assert!(err.message.contains("undeclared"), "got {}", err.message);
    // `private` of an unknown name is a fresh binding, not an error.
    let ok = transform_source(
        "def f():\n    x = 0\n    with omp(\"parallel private(y)\"):\n        x = 1\n",
        "test.py",
        &Options::default(),
    );
    assert!(ok.is_ok());
}

#[test]
fn default_none_requires_classification() {
    let err = err_of("def f():\n    x = 0\n    with omp(\"parallel default(none)\"):\n        x = 1\n");
    assert!(err.message.contains("not specified in enclosing"), "got {}", err.message);
    // Region-local names need no classification.
    let ok = transform_source(
        "def f():\n    x = 0\n    with omp(\"parallel default(none)\"):\n        y = 1\n",
        "test.py",
        &Options::default(),
    );
    assert!(ok.is_ok());
}

#[test]
fn unknown_reduction_operator() {
    let err = err_of(
        "def f():\n    x = 0\n    with omp(\"parallel reduction(sum: x)\"):\n        x = 1\n",
    );
    assert!(err.message.contains("`sum` is not defined"), "got {}", err.message);
}

#[test]
fn reduction_without_operator() {
    let err = err_of("def f():\n    x = 0\n    with omp(\"parallel reduction(x)\"):\n        x = 1\n");
    assert!(err.message.contains("identifier"), "got {}", err.message);
}

#[test]
fn with_binding_is_rejected() {
    let err = err_of("def f():\n    with omp(\"parallel\") as p:\n        pass\n");
    assert!(err.message.contains("cannot bind a name with `as`"), "got {}", err.message);
}

#[test]
fn with_must_contain_only_the_directive() {
    let err = err_of("def f(g):\n    with omp(\"parallel\"), g():\n        pass\n");
    assert!(err.message.contains("only context item"), "got {}", err.message);
}

#[test]
fn marker_call_arity() {
    let err = err_of("def f():\n    with omp(\"parallel\", 2):\n        pass\n");
    assert!(err.message.contains("takes exactly one argument"), "got {}", err.message);
}

#[test]
fn marker_argument_must_be_constant_string() {
    let err = err_of("def f(s):\n    with omp(s):\n        pass\n");
    assert!(err.message.contains("constant string"), "got {}", err.message);
    let err = err_of("def f():\n    with omp(42):\n        pass\n");
    assert!(err.message.contains("constant string"), "got {}", err.message);
}

#[test]
fn empty_directive_string() {
    let err = err_of("def f():\n    with omp(\"  \"):\n        pass\n");
    assert!(err.message.contains("empty directive string"), "got {}", err.message);
}

#[test]
fn atomic_requires_augmented_assignment() {
    let err = err_of(
        "def f():\n    x = 0\n    with omp(\"parallel\"):\n        with omp(\"atomic\"):\n            x = x + 1\n",
    );
    assert!(err.message.contains("augmented assignment"), "got {}", err.message);
}

#[test]
fn atomic_rhs_must_not_use_target() {
    let err = err_of(
        "def f():\n    x = 0\n    with omp(\"parallel\"):\n        with omp(\"atomic\"):\n            x += x + 1\n",
    );
    assert!(
        err.message.contains("must not reference the updated variable"),
        "got {}",
        err.message
    );
}

#[test]
fn section_outside_sections() {
    let err = err_of("def f(q):\n    with omp(\"section\"):\n        q.put(1)\n");
    assert!(err.message.contains("only be used inside `sections`"), "got {}", err.message);
}

#[test]
fn sections_admit_only_sections() {
    let err = err_of(
        "def f(q):\n    with omp(\"sections\"):\n        q.put(1)\n",
    );
    assert!(err.message.contains("expected `omp section`"), "got {}", err.message);
}

#[test]
fn ordered_needs_an_ordered_loop() {
    let err = err_of(
        "def f(q):\n    with omp(\"parallel\"):\n        with omp(\"ordered\"):\n            q.put(1)\n",
    );
    assert!(err.message.contains("`ordered` must be nested"), "got {}", err.message);
}

#[test]
fn runtime_schedule_takes_no_chunk() {
    let err = err_of(
        "def f(q):\n    with omp(\"parallel for schedule(runtime, 1)\"):\n        for i in range(4):\n            q.put(i)\n",
    );
    assert!(err.message.contains("does not take a `chunk_size`"), "got {}", err.message);
    let err = err_of(
        "def f(q):\n    with omp(\"parallel for schedule(auto, 1)\"):\n        for i in range(4):\n            q.put(i)\n",
    );
    assert!(err.message.contains("does not take a `chunk_size`"), "got {}", err.message);
}

#[test]
fn teams_restricts_nested_directives() {
    let err = err_of(
        "def f(q):\n    with omp(\"teams num_teams(2)\"):\n        with omp(\"single\"):\n            q.put(1)\n",
    );
    assert!(err.message.contains("strictly nested inside a `teams`"), "got {}", err.message);
}

#[test]
fn copyin_requires_threadprivate() {
    let err = err_of(
        "def f(q):\n    x = 0\n    with omp(\"parallel copyin(x)\"):\n        q.put(x)\n",
    );
    assert!(err.message.contains("must be declared threadprivate"), "got {}", err.message);
}

#[test]
fn unimplemented_directives_are_reported() {
    let err = err_of("def f(q):\n    with omp(\"distribute\"):\n        q.put(1)\n");
    assert!(err.message.contains("not implemented yet"), "got {}", err.message);
}

#[test]
fn rendered_error_points_into_the_directive_string() {
    let err = err_of("def f():\n    with omp(\"parallel num_threads()\"):\n        pass\n");
    let rendered = err.to_string();
    assert!(rendered.contains("test.py:2:"), "got:\n{rendered}");
    assert!(rendered.contains("num_threads"), "got:\n{rendered}");
    assert!(rendered.contains('^'), "got:\n{rendered}");
}
