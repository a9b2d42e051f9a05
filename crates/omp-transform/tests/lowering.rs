//! End-to-end lowering shapes: source in, transformed source out.

use omp_transform::{transform_source, Options};
use pretty_assertions::assert_eq;

fn transform(src: &str) -> String {
    transform_source(src, "test.py", &Options::default()).expect("transform succeeds")
}

#[test]
fn parallel_lifts_body_and_strips_decorator() {
    let out = transform(
        "\
@omp
def work(q):
    with omp(\"parallel\"):
        q.put(omp_get_thread_num())
",
    );
    assert_eq!(
        out,
        "\
def work(q):
    def __omp_parallel():
        q.put(omp_get_thread_num())
    __omp.parallel_run(__omp_parallel, True, \"\", (), -1, \"fatal\")
"
    );
}

#[test]
fn shared_write_captures_via_nonlocal() {
    let out = transform(
        "\
def work():
    x = 0
    with omp(\"parallel\"):
        x = 1
    return x
",
    );
    assert_eq!(
        out,
        "\
def work():
    x = 0
    def __omp_parallel():
        nonlocal x
        x = 1
    __omp.parallel_run(__omp_parallel, True, \"\", (), -1, \"fatal\")
    return x
"
    );
}

#[test]
fn private_renames_without_capture() {
    let out = transform(
        "\
def work():
    x = 0
    with omp(\"parallel private(x)\"):
        x = 1
    return x
",
    );
    assert_eq!(
        out,
        "\
def work():
    x = 0
    def __omp_parallel():
        _omp_1x = __omp.new(x)
        _omp_1x = 1
    __omp.parallel_run(__omp_parallel, True, \"\", (), -1, \"fatal\")
    return x
"
    );
}

#[test]
fn firstprivate_copies_the_outer_value() {
    let out = transform(
        "\
def work(q):
    x = 2
    with omp(\"parallel firstprivate(x)\"):
        q.put(x)
",
    );
    assert!(out.contains("_omp_1x = __omp.copy(x)"), "got:\n{out}");
    assert!(out.contains("q.put(_omp_1x)"), "got:\n{out}");
}

#[test]
fn reduction_inits_combines_under_mutex() {
    let out = transform(
        "\
def work():
    x = 0
    with omp(\"parallel reduction(+: x)\"):
        x = 1
    return x
",
    );
    assert_eq!(
        out,
        "\
def work():
    x = 0
    def __omp_parallel():
        nonlocal x
        _omp_1x = 0
        _omp_1x = 1
        __omp.mutex_lock()
        try:
            x += _omp_1x
        finally:
            __omp.mutex_unlock()
    __omp.parallel_run(__omp_parallel, True, \"\", (), -1, \"fatal\")
    return x
"
    );
}

#[test]
fn clause_expressions_reach_the_entry_call() {
    let out = transform(
        "\
def work(q, n, flag):
    with omp(\"parallel num_threads(n) if(flag)\"):
        q.put(0)
",
    );
    assert!(
        out.contains("__omp.parallel_run(__omp_parallel, bool(flag), \"\", (int(n),), -1, \"fatal\")"),
        "got:\n{out}"
    );
}

#[test]
fn parallel_for_lowers_schedule_and_chunks() {
    let out = transform(
        "\
def work(q):
    with omp(\"parallel for schedule(static, 1)\"):
        for i in range(11):
            q.put((i, omp_get_thread_num()))
",
    );
    assert_eq!(
        out,
        "\
def work(q):
    def __omp_parallel():
        __omp_bounds = __omp.for_bounds([0, 11, 1])
        __omp.for_init(__omp_bounds, 0, 1, True, 0, -1)
        while __omp.for_next(__omp_bounds):
            for i in range(__omp_bounds[0], __omp_bounds[1], 1):
                q.put((i, omp_get_thread_num()))
        __omp.barrier()
    __omp.parallel_run(__omp_parallel, True, \"\", (), -1, \"fatal\")
"
    );
}

#[test]
fn collapse_unrolls_counter_into_per_loop_indices() {
    let out = transform(
        "\
def work(q):
    with omp(\"for collapse(2) schedule(dynamic)\"):
        for i in range(3):
            for j in range(4):
                q.put((i, j))
",
    );
    assert!(out.contains("__omp.for_bounds([0, 3, 1, 0, 4, 1])"), "got:\n{out}");
    assert!(out.contains("__omp.for_init(__omp_bounds, 1, -1, True, 0, -1)"), "got:\n{out}");
    assert!(
        out.contains(
            "for i in range(__omp_bounds[2] + (__omp_bounds[5] if __omp_bounds[0] == __omp_bounds[1] else 0), __omp_bounds[3], 1):"
        ),
        "got:\n{out}"
    );
    assert!(out.contains("__omp_bounds[0] -= 1"), "got:\n{out}");
    assert!(out.contains("if not __omp_bounds[0]:"), "got:\n{out}");
}

#[test]
fn ordered_wraps_body_with_sequence_calls() {
    let out = transform(
        "\
def work(q):
    with omp(\"for ordered\"):
        for i in range(4):
            with omp(\"ordered\"):
                q.put(i)
",
    );
    assert!(out.contains("__omp.for_init(__omp_bounds, -1, -1, True, 1, -1)"), "got:\n{out}");
    assert!(out.contains("__omp.ordered_start(i)"), "got:\n{out}");
    assert!(out.contains("__omp.ordered_end()"), "got:\n{out}");
}

#[test]
fn lastprivate_publishes_from_the_last_chunk() {
    let out = transform(
        "\
def work():
    x = 0
    with omp(\"for lastprivate(x)\"):
        for i in range(10):
            x = i
    return x
",
    );
    assert!(out.contains("if __omp.for_last():"), "got:\n{out}");
    assert!(out.contains("x = _omp_1x"), "got:\n{out}");
}

#[test]
fn nowait_elides_the_trailing_barrier() {
    let with_wait = transform(
        "\
def work(q):
    with omp(\"for\"):
        for i in range(4):
            q.put(i)
",
    );
    assert!(with_wait.contains("__omp.barrier()"), "got:\n{with_wait}");
    let without = transform(
        "\
def work(q):
    with omp(\"for nowait\"):
        for i in range(4):
            q.put(i)
",
    );
    assert!(!without.contains("__omp.barrier()"), "got:\n{without}");
}

#[test]
fn single_claims_once_with_implicit_barrier() {
    let out = transform(
        "\
def work(q):
    with omp(\"parallel\"):
        with omp(\"single\"):
            q.put(0)
",
    );
    assert!(out.contains("if __omp.single_enter():"), "got:\n{out}");
    // Both branches rejoin at the implicit barrier.
    assert_eq!(out.matches("__omp.barrier()").count(), 2, "got:\n{out}");
}

#[test]
fn copyprivate_replaces_the_barrier_with_a_broadcast() {
    let out = transform(
        "\
def work(q):
    x = 0
    with omp(\"parallel private(x)\"):
        with omp(\"single copyprivate(x)\"):
            x = 4
        q.put(x)
",
    );
    assert!(out.contains("__omp.copyprivate_write(False, _omp_1x)"), "got:\n{out}");
    assert!(out.contains("def __omp_copyprivate(__omp__omp_1x):"), "got:\n{out}");
    assert!(out.contains("nonlocal _omp_1x"), "got:\n{out}");
    assert!(out.contains("__omp.copyprivate_read(False, __omp_copyprivate)"), "got:\n{out}");
}

#[test]
fn sections_become_claim_guards() {
    let out = transform(
        "\
def work(q):
    with omp(\"sections\"):
        with omp(\"section\"):
            q.put(1)
        with omp(\"section\"):
            q.put(2)
",
    );
    assert!(out.contains("if __omp.section_claim(0, 1):"), "got:\n{out}");
    assert!(out.contains("if __omp.section_claim(1, 1):"), "got:\n{out}");
}

#[test]
fn task_lifts_and_submits() {
    let out = transform(
        "\
def work(q, cond):
    with omp(\"parallel\"):
        with omp(\"single\"):
            with omp(\"task if(cond)\"):
                q.put(1)
",
    );
    assert!(out.contains("def __omp_task():"), "got:\n{out}");
    assert!(out.contains("__omp.task_submit(__omp_task, bool(cond))"), "got:\n{out}");
}

#[test]
fn barrier_and_taskwait_statement_forms() {
    let out = transform(
        "\
def work():
    x = 1
    with omp(\"parallel\"):
        x = 2
        omp(\"barrier\")
        omp(\"taskwait\")
",
    );
    assert!(out.contains("__omp.barrier()"), "got:\n{out}");
    assert!(out.contains("__omp.task_wait()"), "got:\n{out}");
}

#[test]
fn critical_guards_with_release_on_all_paths() {
    let out = transform(
        "\
def work():
    x = 0
    with omp(\"parallel\"):
        with omp(\"critical\"):
            x += 1
",
    );
    assert!(out.contains("__omp.mutex_lock()"), "got:\n{out}");
    assert!(out.contains("finally:"), "got:\n{out}");
    assert!(out.contains("__omp.mutex_unlock()"), "got:\n{out}");
}

#[test]
fn master_gates_on_thread_zero() {
    let out = transform(
        "\
def work(q):
    with omp(\"parallel\"):
        with omp(\"master\"):
            q.put(0)
",
    );
    assert!(out.contains("if __omp.master():"), "got:\n{out}");
}

#[test]
fn default_private_renames_unclassified_names() {
    let out = transform(
        "\
def work():
    x = 0
    with omp(\"parallel default(private)\"):
        x = 1
",
    );
    assert!(out.contains("_omp_1x = __omp.new(x)"), "got:\n{out}");
    assert!(out.contains("_omp_1x = 1"), "got:\n{out}");
}

#[test]
fn declare_reduction_registers_typed_templates() {
    let out = transform(
        "\
omp(\"declare reduction(clamp: int) initializer(omp_priv = 100) combiner(omp_out = omp_out - omp_in)\")
def work():
    x: int = 100
    with omp(\"parallel reduction(clamp: x)\"):
        x = 2
    return x
",
    );
    assert!(out.contains("_omp_1x = 100"), "got:\n{out}");
    assert!(out.contains("x = x - _omp_1x"), "got:\n{out}");
}

#[test]
fn threadprivate_copyin_seeds_worker_bindings() {
    let out = transform(
        "\
def work(q):
    omp(\"threadprivate(cfg)\")
    with omp(\"parallel copyin(cfg)\"):
        q.put(cfg)
",
    );
    assert!(out.contains("_omp_1cfg = __omp.copyin(\"cfg\", None)"), "got:\n{out}");
    assert!(out.contains("q.put(_omp_1cfg)"), "got:\n{out}");
    assert!(out.contains("__omp.tp_store(\"cfg\", _omp_1cfg)"), "got:\n{out}");
}

#[test]
fn alias_option_detects_renamed_imports() {
    let src = "\
@par
def work(q):
    with par(\"parallel\"):
        q.put(0)
";
    let options = Options {
        alias: "par".to_string(),
        ..Options::default()
    };
    let out = transform_source(src, "test.py", &options).unwrap();
    assert!(out.contains("__omp.parallel_run(__omp_parallel"), "got:\n{out}");
    assert!(!out.contains("@par"), "decorator must be stripped:\n{out}");
}

#[test]
fn teams_emits_league_dispatch() {
    let out = transform(
        "\
def work(q):
    with omp(\"teams num_teams(2: 8) thread_limit(16)\"):
        with omp(\"parallel\"):
            q.put(0)
",
    );
    assert!(
        out.contains("__omp.teams_run(__omp_teams, True, (2, 8), 16)"),
        "got:\n{out}"
    );
}

#[test]
fn nested_single_inside_parallel_resolves_renames() {
    let out = transform(
        "\
def work(q):
    x = 0
    with omp(\"parallel private(x)\"):
        x = 1
        with omp(\"single private(x)\"):
            x = 2
            q.put(x)
        q.put(x)
",
    );
    // The single's private is a second-generation rename of the parallel's.
    assert!(out.contains("_omp_2x = __omp.new(_omp_1x)"), "got:\n{out}");
    assert!(out.contains("q.put(_omp_2x)"), "got:\n{out}");
    assert!(out.contains("q.put(_omp_1x)"), "got:\n{out}");
}
