//! Declarative catalog of directives, clauses, and modifiers.
//!
//! The registries are plain data. The argument parser and the directive-line
//! parser interpret them; nothing here executes. Invariants:
//! * every clause referenced by a clause group is also in the owning
//!   directive's clause list (guaranteed by [`DirectiveSpec::build`]);
//! * every modifier referenced by a modifier group is also in the owning
//!   [`ArgSpec`]'s modifier list (guaranteed by [`ArgSpec::build`]).

use std::collections::HashMap;
use std::sync::LazyLock;

use bitflags::bitflags;
use omp_frontend::TokenKind;

use crate::names::*;

bitflags! {
    /// Attributes shared by clauses and modifiers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ItemFlags: u8 {
        /// Must appear at least once.
        const REQUIRED = 1;
        /// May appear more than once.
        const REPEATABLE = 2;
        /// Must be the last element of its sequence.
        const ULTIMATE = 4;
    }
}

/// How a positional argument or modifier body is turned into an item value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemTransform {
    /// A single identifier token.
    Ident,
    /// An identifier or single-level subscript of an identifier.
    Var,
    /// An expression that folds to a constant with no names or calls.
    ConstExpr,
    /// Any single host expression.
    Expr,
    /// One or more `;`-separated simple statements.
    Stmt,
    /// A single raw token of any kind.
    RawToken,
    /// Position 0 is an identifier, position 1 an expression (`schedule`).
    KindPair,
}

/// A group of clause or modifier names with joint requirements.
#[derive(Debug, Clone)]
pub struct Group {
    pub elems: &'static [&'static str],
    pub required: bool,
    pub exclusive: bool,
}

impl Group {
    pub const fn exclusive(elems: &'static [&'static str]) -> Self {
        Self {
            elems,
            required: false,
            exclusive: true,
        }
    }

    pub const fn required(elems: &'static [&'static str]) -> Self {
        Self {
            elems,
            required: true,
            exclusive: true,
        }
    }
}

/// Shape of a parenthesized argument list.
#[derive(Debug, Clone)]
pub struct ArgSpec {
    /// Modifiers come after the `:` instead of before it.
    pub post_modified: bool,
    /// Multiple `;`-separated argument sets are accepted.
    pub multiple: bool,
    pub modifiers: Vec<&'static str>,
    pub modifier_groups: Vec<Group>,
    /// Exact argument count, or -1 for any number (at least one).
    pub num_args: i32,
    pub choices: Option<&'static [&'static str]>,
    pub transform: ItemTransform,
    /// The parenthesized group must be present.
    pub require_args: bool,
}

impl Default for ArgSpec {
    fn default() -> Self {
        Self {
            post_modified: false,
            multiple: false,
            modifiers: Vec::new(),
            modifier_groups: Vec::new(),
            num_args: -1,
            choices: None,
            transform: ItemTransform::Ident,
            require_args: true,
        }
    }
}

impl ArgSpec {
    /// Finish construction: fold group members into the modifier list.
    fn build(mut self) -> Self {
        for group in &self.modifier_groups {
            for elem in group.elems {
                if !self.modifiers.contains(elem) {
                    self.modifiers.push(elem);
                }
            }
        }
        self
    }
}

/// A modifier: how it is recognized and what it carries.
#[derive(Clone)]
pub struct ModifierSpec {
    /// Predicate over (token text, token kind). `None` kind means the
    /// candidate spans several tokens and `text` is their canonical join.
    pub match_fn: Option<fn(&str, Option<TokenKind>) -> bool>,
    /// Enumerated spellings (single-token modifiers like `saved`).
    pub values: Option<&'static [&'static str]>,
    /// Text used in "expected …" diagnostics, when the name is internal.
    pub msg_value: Option<&'static str>,
    pub flags: ItemFlags,
    pub transform: ItemTransform,
    pub args: Option<ArgSpec>,
}

impl Default for ModifierSpec {
    fn default() -> Self {
        Self {
            match_fn: None,
            values: None,
            msg_value: None,
            flags: ItemFlags::empty(),
            transform: ItemTransform::Ident,
            args: None,
        }
    }
}

#[derive(Clone, Default)]
pub struct ClauseSpec {
    pub flags: ItemFlags,
    pub args: Option<ArgSpec>,
}

impl ClauseSpec {
    fn new(flags: ItemFlags, args: Option<ArgSpec>) -> Self {
        // Every clause accepts a leading directive-name modifier that pins
        // it to one directive of a combined chain.
        let args = args.map(|mut a| {
            a.modifiers.insert(0, M_DIRECTIVE_NAME);
            a
        });
        Self { flags, args }
    }
}

#[derive(Clone, Default)]
pub struct DirectiveSpec {
    /// Composable prefix (e.g. `declare`, which must be followed by a
    /// registered suffix such as `reduction`).
    pub prefix: bool,
    pub clauses: Vec<&'static str>,
    pub clause_groups: Vec<Group>,
    pub args: Option<ArgSpec>,
}

impl DirectiveSpec {
    fn build(mut self) -> Self {
        for group in &self.clause_groups {
            for elem in group.elems {
                if !self.clauses.contains(elem) {
                    self.clauses.push(elem);
                }
            }
        }
        self
    }
}

/// Combine two directives into their composed form, excluding clauses that
/// do not survive composition (`parallel for` drops `nowait`).
fn combine(a: &DirectiveSpec, b: &DirectiveSpec, exclude: &[&str]) -> DirectiveSpec {
    let mut clauses: Vec<&'static str> = Vec::new();
    for c in a.clauses.iter().chain(&b.clauses) {
        if !exclude.contains(c) && !clauses.contains(c) {
            clauses.push(c);
        }
    }
    DirectiveSpec {
        prefix: false,
        clauses,
        clause_groups: Vec::new(),
        args: None,
    }
}

fn is_reduction_op(text: &str, kind: Option<TokenKind>) -> bool {
    matches!(text, "+" | "-" | "*" | "&" | "|" | "^" | "&&" | "||" | "and" | "or")
        || kind == Some(TokenKind::Name)
}

pub static MODIFIERS: LazyLock<HashMap<&'static str, ModifierSpec>> = LazyLock::new(|| {
    let mut m = HashMap::new();
    m.insert(
        M_DIRECTIVE_NAME,
        ModifierSpec {
            match_fn: Some(|text, _| DIRECTIVES.contains_key(text)),
            msg_value: Some("directive"),
            ..Default::default()
        },
    );
    m.insert(
        M_REDUCTION_ID,
        ModifierSpec {
            match_fn: Some(is_reduction_op),
            msg_value: Some(
                "'+' or '-' or '*' or '&' or '|' or '^' or '&&' or '||' or identifier",
            ),
            flags: ItemFlags::REQUIRED,
            transform: ItemTransform::RawToken,
            ..Default::default()
        },
    );
    m.insert(
        M_SAVED,
        ModifierSpec {
            values: Some(&[M_SAVED]),
            ..Default::default()
        },
    );
    m.insert(
        M_LOWER_BOUND,
        ModifierSpec {
            match_fn: Some(|_, _| true),
            msg_value: Some("expression"),
            transform: ItemTransform::Expr,
            ..Default::default()
        },
    );
    m.insert(
        M_ORDER_MODIFIER,
        ModifierSpec {
            values: Some(&[K_REPRODUCIBLE, K_UNCONSTRAINED]),
            ..Default::default()
        },
    );
    m.insert(
        M_ORDERING_MODIFIER,
        ModifierSpec {
            values: Some(&[K_MONOTONIC, K_NONMONOTONIC]),
            ..Default::default()
        },
    );
    m.insert(
        M_SIMD,
        ModifierSpec {
            values: Some(&[M_SIMD]),
            ..Default::default()
        },
    );
    m.insert(
        M_LASTPRIVATE_MODIFIER,
        ModifierSpec {
            values: Some(&[M_LASTPRIVATE_MODIFIER]),
            ..Default::default()
        },
    );
    m.insert(
        M_VARIABLE_CATEGORY,
        ModifierSpec {
            values: Some(&[K_AGGREGATE, K_ALL, K_ALLOCATABLE, K_POINTER, K_SCALAR]),
            ..Default::default()
        },
    );
    m
});

pub static CLAUSES: LazyLock<HashMap<&'static str, ClauseSpec>> = LazyLock::new(|| {
    use ItemFlags as F;
    use ItemTransform as T;
    let mut m = HashMap::new();
    let spec = |flags: ItemFlags, args: Option<ArgSpec>| ClauseSpec::new(flags, args);

    m.insert(
        C_IF,
        spec(
            F::empty(),
            Some(ArgSpec {
                num_args: 1,
                transform: T::Expr,
                ..Default::default()
            }),
        ),
    );
    m.insert(
        C_NUM_THREADS,
        spec(
            F::empty(),
            Some(ArgSpec {
                transform: T::Expr,
                ..Default::default()
            }),
        ),
    );
    m.insert(
        C_NUM_TEAMS,
        spec(
            F::empty(),
            Some(ArgSpec {
                num_args: 1,
                transform: T::Expr,
                modifiers: vec![M_LOWER_BOUND],
                ..Default::default()
            }),
        ),
    );
    m.insert(
        C_THREAD_LIMIT,
        spec(
            F::empty(),
            Some(ArgSpec {
                num_args: 1,
                transform: T::Expr,
                ..Default::default()
            }),
        ),
    );
    m.insert(
        C_DEFAULT,
        spec(
            F::empty(),
            Some(ArgSpec {
                num_args: 1,
                choices: Some(&[K_FIRSTPRIVATE, K_NONE, K_PRIVATE, K_SHARED]),
                modifiers: vec![M_VARIABLE_CATEGORY],
                post_modified: true,
                ..Default::default()
            }),
        ),
    );
    m.insert(C_PRIVATE, spec(F::REPEATABLE, Some(ArgSpec::default())));
    m.insert(
        C_FIRSTPRIVATE,
        spec(
            F::REPEATABLE,
            Some(ArgSpec {
                modifiers: vec![M_SAVED],
                ..Default::default()
            }),
        ),
    );
    m.insert(
        C_LASTPRIVATE,
        spec(
            F::empty(),
            Some(ArgSpec {
                modifiers: vec![M_LASTPRIVATE_MODIFIER],
                ..Default::default()
            }),
        ),
    );
    m.insert(C_SHARED, spec(F::REPEATABLE, Some(ArgSpec::default())));
    m.insert(
        C_REDUCTION,
        spec(
            F::REPEATABLE,
            Some(ArgSpec {
                transform: T::Var,
                modifiers: vec![M_REDUCTION_ID],
                ..Default::default()
            }),
        ),
    );
    m.insert(
        C_SCHEDULE,
        spec(
            F::empty(),
            Some(
                ArgSpec {
                    transform: T::KindPair,
                    choices: Some(&[K_STATIC, K_DYNAMIC, K_GUIDED, K_RUNTIME, K_AUTO]),
                    modifiers: vec![M_SIMD],
                    modifier_groups: vec![Group::exclusive(&[
                        M_ORDER_MODIFIER,
                        M_ORDERING_MODIFIER,
                    ])],
                    ..Default::default()
                }
                .build(),
            ),
        ),
    );
    m.insert(
        C_COLLAPSE,
        spec(
            F::empty(),
            Some(ArgSpec {
                num_args: 1,
                transform: T::ConstExpr,
                ..Default::default()
            }),
        ),
    );
    m.insert(
        C_ORDERED,
        spec(
            F::empty(),
            Some(ArgSpec {
                require_args: false,
                num_args: 1,
                transform: T::Expr,
                ..Default::default()
            }),
        ),
    );
    m.insert(
        C_ORDER,
        spec(
            F::empty(),
            Some(ArgSpec {
                num_args: 1,
                choices: Some(&[K_CONCURRENT]),
                modifiers: vec![M_ORDER_MODIFIER],
                ..Default::default()
            }),
        ),
    );
    m.insert(
        C_NOWAIT,
        spec(
            F::empty(),
            Some(ArgSpec {
                require_args: false,
                num_args: 1,
                transform: T::Expr,
                ..Default::default()
            }),
        ),
    );
    m.insert(C_COPYIN, spec(F::empty(), Some(ArgSpec::default())));
    m.insert(C_COPYPRIVATE, spec(F::empty(), Some(ArgSpec::default())));
    m.insert(C_UNTIED, spec(F::empty(), None));
    m.insert(
        C_PROC_BIND,
        spec(
            F::empty(),
            Some(ArgSpec {
                num_args: 1,
                choices: Some(&[K_CLOSE, K_PRIMARY, K_SPREAD]),
                ..Default::default()
            }),
        ),
    );
    m.insert(
        C_MESSAGE,
        spec(
            F::empty(),
            Some(ArgSpec {
                num_args: 1,
                transform: T::Expr,
                ..Default::default()
            }),
        ),
    );
    m.insert(
        C_SEVERITY,
        spec(
            F::empty(),
            Some(ArgSpec {
                num_args: 1,
                choices: Some(&[K_FATAL, K_WARNING]),
                ..Default::default()
            }),
        ),
    );
    m.insert(
        C_SAFESYNC,
        spec(
            F::empty(),
            Some(ArgSpec {
                require_args: false,
                num_args: 1,
                transform: T::Expr,
                ..Default::default()
            }),
        ),
    );
    m.insert(C_ALLOCATE, spec(F::empty(), Some(ArgSpec::default())));
    m.insert(C_LINEAR, spec(F::empty(), Some(ArgSpec::default())));
    m.insert(C_INDUCTION, spec(F::empty(), Some(ArgSpec::default())));
    m.insert(
        C_INITIALIZER,
        spec(
            F::REQUIRED,
            Some(ArgSpec {
                transform: T::Stmt,
                ..Default::default()
            }),
        ),
    );
    m.insert(
        C_COMBINER,
        spec(
            F::REQUIRED,
            Some(ArgSpec {
                transform: T::Stmt,
                ..Default::default()
            }),
        ),
    );
    m.insert(C_EXCLUSIVE, spec(F::empty(), Some(ArgSpec::default())));
    m.insert(C_INCLUSIVE, spec(F::empty(), Some(ArgSpec::default())));
    m
});

pub static DIRECTIVES: LazyLock<HashMap<&'static str, DirectiveSpec>> = LazyLock::new(|| {
    let mut m = HashMap::new();

    let parallel = DirectiveSpec {
        clauses: vec![
            C_ALLOCATE,
            C_COPYIN,
            C_DEFAULT,
            C_FIRSTPRIVATE,
            C_IF,
            C_MESSAGE,
            C_NUM_THREADS,
            C_PRIVATE,
            C_PROC_BIND,
            C_REDUCTION,
            C_SAFESYNC,
            C_SEVERITY,
            C_SHARED,
        ],
        ..Default::default()
    }
    .build();
    let for_ = DirectiveSpec {
        clauses: vec![
            C_ALLOCATE,
            C_COLLAPSE,
            C_FIRSTPRIVATE,
            C_INDUCTION,
            C_LASTPRIVATE,
            C_LINEAR,
            C_NOWAIT,
            C_ORDER,
            C_ORDERED,
            C_PRIVATE,
            C_REDUCTION,
            C_SCHEDULE,
        ],
        ..Default::default()
    }
    .build();
    let parallel_for = combine(&parallel, &for_, &[C_NOWAIT]);

    m.insert(D_PARALLEL, parallel);
    m.insert(D_FOR, for_);
    m.insert(D_PARALLEL_FOR, parallel_for);
    m.insert(
        D_TEAMS,
        DirectiveSpec {
            clauses: vec![
                C_ALLOCATE,
                C_DEFAULT,
                C_FIRSTPRIVATE,
                C_IF,
                C_NUM_TEAMS,
                C_PRIVATE,
                C_REDUCTION,
                C_SHARED,
                C_THREAD_LIMIT,
            ],
            ..Default::default()
        }
        .build(),
    );
    m.insert(
        D_SECTIONS,
        DirectiveSpec {
            clauses: vec![
                C_ALLOCATE,
                C_FIRSTPRIVATE,
                C_LASTPRIVATE,
                C_NOWAIT,
                C_PRIVATE,
                C_REDUCTION,
            ],
            ..Default::default()
        }
        .build(),
    );
    m.insert(D_SECTION, DirectiveSpec::default());
    m.insert(
        D_SINGLE,
        DirectiveSpec {
            clauses: vec![
                C_ALLOCATE,
                C_COPYPRIVATE,
                C_FIRSTPRIVATE,
                C_NOWAIT,
                C_PRIVATE,
            ],
            ..Default::default()
        }
        .build(),
    );
    m.insert(
        D_TASK,
        DirectiveSpec {
            clauses: vec![
                C_IF,
                C_UNTIED,
                C_DEFAULT,
                C_PRIVATE,
                C_FIRSTPRIVATE,
                C_SHARED,
            ],
            ..Default::default()
        }
        .build(),
    );
    m.insert(D_TASKWAIT, DirectiveSpec::default());
    m.insert(D_BARRIER, DirectiveSpec::default());
    m.insert(D_CRITICAL, DirectiveSpec::default());
    m.insert(D_ATOMIC, DirectiveSpec::default());
    m.insert(D_MASTER, DirectiveSpec::default());
    m.insert(
        D_ORDERED,
        DirectiveSpec {
            args: None,
            ..Default::default()
        },
    );
    m.insert(
        D_THREADPRIVATE,
        DirectiveSpec {
            args: Some(ArgSpec::default()),
            ..Default::default()
        },
    );
    m.insert(D_DISTRIBUTE, DirectiveSpec::default());
    m.insert(
        D_SCAN,
        DirectiveSpec {
            clause_groups: vec![Group::exclusive(&[C_EXCLUSIVE, C_INCLUSIVE])],
            args: Some(ArgSpec {
                require_args: false,
                ..Default::default()
            }),
            ..Default::default()
        }
        .build(),
    );
    m.insert(
        D_DECLARE,
        DirectiveSpec {
            prefix: true,
            ..Default::default()
        },
    );
    m.insert(
        D_DECLARE_REDUCTION,
        DirectiveSpec {
            clauses: vec![C_INITIALIZER, C_COMBINER],
            args: Some(ArgSpec {
                modifiers: vec![M_REDUCTION_ID],
                ..Default::default()
            }),
            ..Default::default()
        }
        .build(),
    );
    m
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_directive_clause_is_registered() {
        for (name, dir) in DIRECTIVES.iter() {
            for clause in &dir.clauses {
                assert!(
                    CLAUSES.contains_key(clause),
                    "directive {name} lists unknown clause {clause}"
                );
            }
        }
    }

    #[test]
    fn group_members_are_in_clause_lists() {
        for (name, dir) in DIRECTIVES.iter() {
            for group in &dir.clause_groups {
                for elem in group.elems {
                    assert!(
                        dir.clauses.contains(elem),
                        "directive {name} group member {elem} missing from clause list"
                    );
                }
            }
        }
    }

    #[test]
    fn clause_modifiers_are_registered() {
        for (name, clause) in CLAUSES.iter() {
            if let Some(args) = &clause.args {
                for m in &args.modifiers {
                    assert!(
                        MODIFIERS.contains_key(m),
                        "clause {name} lists unknown modifier {m}"
                    );
                }
            }
        }
    }

    #[test]
    fn parallel_for_excludes_nowait() {
        let spec = &DIRECTIVES[D_PARALLEL_FOR];
        assert!(!spec.clauses.contains(&C_NOWAIT));
        assert!(spec.clauses.contains(&C_SCHEDULE));
        assert!(spec.clauses.contains(&C_NUM_THREADS));
    }

    #[test]
    fn clauses_accept_directive_name_modifier() {
        let args = CLAUSES[C_PRIVATE].args.as_ref().unwrap();
        assert_eq!(args.modifiers[0], M_DIRECTIVE_NAME);
    }

    #[test]
    fn declare_is_prefix() {
        assert!(DIRECTIVES[D_DECLARE].prefix);
        assert!(!DIRECTIVES[D_DECLARE_REDUCTION].prefix);
    }
}
