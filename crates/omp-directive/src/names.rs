//! Canonical spellings for directives, clauses, modifiers, and keyword
//! arguments. Every registry and processor keys off these constants so a
//! misspelling is a compile error, not a silent parse failure.

// Directives.
pub const D_PARALLEL: &str = "parallel";
pub const D_TEAMS: &str = "teams";
pub const D_FOR: &str = "for";
pub const D_PARALLEL_FOR: &str = "parallel for";
pub const D_SECTIONS: &str = "sections";
pub const D_SECTION: &str = "section";
pub const D_SINGLE: &str = "single";
pub const D_TASK: &str = "task";
pub const D_TASKWAIT: &str = "taskwait";
pub const D_BARRIER: &str = "barrier";
pub const D_CRITICAL: &str = "critical";
pub const D_ATOMIC: &str = "atomic";
pub const D_MASTER: &str = "master";
pub const D_ORDERED: &str = "ordered";
pub const D_THREADPRIVATE: &str = "threadprivate";
pub const D_DISTRIBUTE: &str = "distribute";
pub const D_SCAN: &str = "scan";
pub const D_DECLARE: &str = "declare";
pub const D_DECLARE_REDUCTION: &str = "declare_reduction";

// Clauses.
pub const C_IF: &str = "if";
pub const C_NUM_THREADS: &str = "num_threads";
pub const C_NUM_TEAMS: &str = "num_teams";
pub const C_THREAD_LIMIT: &str = "thread_limit";
pub const C_DEFAULT: &str = "default";
pub const C_PRIVATE: &str = "private";
pub const C_FIRSTPRIVATE: &str = "firstprivate";
pub const C_LASTPRIVATE: &str = "lastprivate";
pub const C_SHARED: &str = "shared";
pub const C_REDUCTION: &str = "reduction";
pub const C_SCHEDULE: &str = "schedule";
pub const C_COLLAPSE: &str = "collapse";
pub const C_ORDERED: &str = "ordered";
pub const C_ORDER: &str = "order";
pub const C_NOWAIT: &str = "nowait";
pub const C_COPYIN: &str = "copyin";
pub const C_COPYPRIVATE: &str = "copyprivate";
pub const C_UNTIED: &str = "untied";
pub const C_PROC_BIND: &str = "proc_bind";
pub const C_MESSAGE: &str = "message";
pub const C_SEVERITY: &str = "severity";
pub const C_SAFESYNC: &str = "safesync";
pub const C_ALLOCATE: &str = "allocate";
pub const C_LINEAR: &str = "linear";
pub const C_INDUCTION: &str = "induction";
pub const C_INITIALIZER: &str = "initializer";
pub const C_COMBINER: &str = "combiner";
pub const C_EXCLUSIVE: &str = "exclusive";
pub const C_INCLUSIVE: &str = "inclusive";

// Modifiers.
pub const M_ARGS: &str = "@args";
pub const M_DIRECTIVE_NAME: &str = "@directive";
pub const M_REDUCTION_ID: &str = "@reduction_id";
pub const M_SAVED: &str = "saved";
pub const M_LOWER_BOUND: &str = "@lower_bound";
pub const M_ORDER_MODIFIER: &str = "@order_modifier";
pub const M_ORDERING_MODIFIER: &str = "@ordering_modifier";
pub const M_SIMD: &str = "simd";
pub const M_LASTPRIVATE_MODIFIER: &str = "conditional";
pub const M_VARIABLE_CATEGORY: &str = "@variable_category";

// Keyword argument values.
pub const K_SHARED: &str = "shared";
pub const K_NONE: &str = "none";
pub const K_PRIVATE: &str = "private";
pub const K_FIRSTPRIVATE: &str = "firstprivate";
pub const K_STATIC: &str = "static";
pub const K_DYNAMIC: &str = "dynamic";
pub const K_GUIDED: &str = "guided";
pub const K_AUTO: &str = "auto";
pub const K_RUNTIME: &str = "runtime";
pub const K_MONOTONIC: &str = "monotonic";
pub const K_NONMONOTONIC: &str = "nonmonotonic";
pub const K_CONCURRENT: &str = "concurrent";
pub const K_REPRODUCIBLE: &str = "reproducible";
pub const K_UNCONSTRAINED: &str = "unconstrained";
pub const K_FATAL: &str = "fatal";
pub const K_WARNING: &str = "warning";
pub const K_CLOSE: &str = "close";
pub const K_PRIMARY: &str = "primary";
pub const K_SPREAD: &str = "spread";
pub const K_AGGREGATE: &str = "aggregate";
pub const K_ALL: &str = "all";
pub const K_ALLOCATABLE: &str = "allocatable";
pub const K_POINTER: &str = "pointer";
pub const K_SCALAR: &str = "scalar";
