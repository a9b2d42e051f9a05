//! Directive-line parser: tokens → validated `OmpDirective`.
//!
//! Handles composed directive chains (`parallel for`, `declare reduction`),
//! clause-to-directive attribution, and the schema's required / exclusive /
//! repeatable / ultimate constraints. Every failure points at the offending
//! token inside the original source file.

use tracing::trace;

use omp_frontend::diag::{SourceFile, SyntaxError};
use omp_frontend::span::Span;
use omp_frontend::token::{Token, TokenKind};

use crate::argsparser::{parse_args, ItemValue, OmpArgs};
use crate::names::M_DIRECTIVE_NAME;
use crate::schema::{ItemFlags, CLAUSES, DIRECTIVES};
use crate::tokenizer::{generate_tokens, merge_spans};

/// A parsed clause, attributed to one directive of the chain.
#[derive(Debug, Clone)]
pub struct OmpClause {
    /// Name of the directive this clause applies to.
    pub directive: String,
    pub token: Token,
    pub args: Option<OmpArgs>,
}

impl OmpClause {
    pub fn name(&self) -> &str {
        &self.token.text
    }

    pub fn span(&self) -> Span {
        self.token.span
    }

    /// The clause's argument group, which the schema guarantees is present
    /// for clauses whose spec requires one.
    pub fn args(&self) -> &OmpArgs {
        self.args
            .as_ref()
            .expect("schema guarantees arguments for this clause")
    }
}

/// A parsed directive line.
#[derive(Debug, Clone)]
pub struct OmpDirective {
    /// Full (possibly composed) name, e.g. `parallel for`.
    pub name: String,
    pub tokens: Vec<Token>,
    pub args: Option<OmpArgs>,
    pub clauses: Vec<OmpClause>,
    pub span: Span,
}

impl OmpDirective {
    pub fn clauses_named<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a OmpClause> + 'a {
        let name = name.to_string();
        self.clauses.iter().filter(move |c| c.name() == name)
    }

    pub fn clause(&self, name: &str) -> Option<&OmpClause> {
        self.clauses_named(name).next()
    }
}

/// Parse the directive text occupying `span` inside `src`.
pub fn parse_line(src: &SourceFile, span: Span) -> Result<OmpDirective, SyntaxError> {
    let tokens = generate_tokens(src, span)?;
    if tokens.is_empty() {
        return Err(src.expected("a valid directive", span));
    }

    let mut result_name = String::new();
    let mut result_tokens: Vec<Token> = Vec::new();
    let mut result_args: Option<OmpArgs> = None;
    let mut used_directives: Vec<String> = Vec::new();

    let mut i = 0usize;
    let mut prefix = String::new();

    // Directive chain.
    while i < tokens.len() {
        if tokens[i].kind != TokenKind::Name {
            if result_name.is_empty() || !prefix.is_empty() {
                return Err(src.expected("identifier", tokens[i].span));
            }
            break;
        }
        let word = tokens[i].text.as_str();

        // A name that is not a directive begins the clause list.
        if !DIRECTIVES.contains_key(word) && prefix.is_empty() && !result_name.is_empty() {
            break;
        }

        let joined = if !prefix.is_empty() {
            format!("{result_name}_{word}")
        } else if !result_name.is_empty() {
            format!("{result_name} {word}")
        } else {
            word.to_string()
        };
        if !DIRECTIVES.contains_key(joined.as_str()) {
            if !prefix.is_empty() {
                break; // reported below with the valid completions
            }
            if result_name.is_empty() {
                return Err(src.expected("a valid directive", tokens[i].span));
            }
            return Err(src.error(
                format!("`{word}` is not valid for `omp {result_name}`"),
                tokens[i].span,
            ));
        }
        result_name = joined;
        result_tokens.push(tokens[i].clone());

        let full = format!("{prefix}{word}");
        let specs = &DIRECTIVES[full.as_str()];
        if specs.prefix {
            prefix = format!("{full}_");
            i += 1;
            continue;
        }
        prefix.clear();

        let (n_args, args) = parse_args(src, specs.args.as_ref(), &tokens[i..])?;
        if args.is_some() {
            result_args = args;
        }
        used_directives.push(full);
        i += n_args + 1;
    }

    // A dangling prefix names its possible completions.
    if !prefix.is_empty() {
        let options: Vec<String> = DIRECTIVES
            .keys()
            .filter(|d| d.starts_with(prefix.as_str()))
            .map(|d| format!("'{}'", d.rsplit('_').next().unwrap_or(d)))
            .collect();
        let at = tokens
            .get(i)
            .map(|t| t.span)
            .unwrap_or_else(|| tokens[tokens.len() - 1].span);
        return Err(src.expected(options.join(" or "), at));
    }

    // Clause list.
    let mut clauses: Vec<OmpClause> = Vec::new();
    let mut used_clauses: Vec<String> = Vec::new();
    while i < tokens.len() {
        if tokens[i].kind != TokenKind::Name {
            return Err(src.expected("identifier", tokens[i].span));
        }
        let clause_name = tokens[i].text.clone();
        let Some(specs) = CLAUSES.get(clause_name.as_str()) else {
            return Err(src.error(
                format!("`{clause_name}` is not a valid clause"),
                tokens[i].span,
            ));
        };

        // Clauses dropped by a composed directive (`parallel for` has no
        // `nowait`) are rejected against the composed spec.
        if let Some(full_spec) = DIRECTIVES.get(result_name.as_str()) {
            if !full_spec.clauses.contains(&clause_name.as_str()) {
                return Err(src.error(
                    format!("`{clause_name}` is not a valid clause for `omp {result_name}`"),
                    tokens[i].span,
                ));
            }
        }

        let (n_args, args) = parse_args(src, specs.args.as_ref(), &tokens[i..])?;
        if used_clauses.contains(&clause_name) && !specs.flags.contains(ItemFlags::REPEATABLE) {
            return Err(src.error(
                format!("too many `{clause_name}` clauses"),
                tokens[i].span,
            ));
        }

        // Attribute the clause: an explicit directive-name modifier wins,
        // otherwise the first chain member supporting the clause.
        let mut dir_name: Option<String> = None;
        if let Some(args) = &args {
            if let Some(m) = args.modifier(M_DIRECTIVE_NAME) {
                if let ItemValue::Ident(name) = &m.value {
                    if !used_directives.contains(name) {
                        let valid: Vec<&String> = used_directives
                            .iter()
                            .filter(|d| {
                                DIRECTIVES[d.as_str()].clauses.contains(&clause_name.as_str())
                            })
                            .collect();
                        if valid.is_empty() {
                            return Err(src.error(
                                format!(
                                    "`{name}` is not a valid directive for `{clause_name}`"
                                ),
                                merge_spans(&m.tokens),
                            ));
                        }
                        let msg = valid
                            .iter()
                            .map(|d| d.as_str())
                            .collect::<Vec<_>>()
                            .join(" or ");
                        return Err(src.expected(msg, merge_spans(&m.tokens)));
                    }
                    dir_name = Some(name.clone());
                }
            }
        }
        let dir_name = match dir_name {
            Some(d) => d,
            None => {
                match used_directives.iter().find(|d| {
                    DIRECTIVES[d.as_str()].clauses.contains(&clause_name.as_str())
                }) {
                    Some(d) => d.clone(),
                    None => {
                        return Err(src.error(
                            format!(
                                "`{clause_name}` is not a valid clause for `omp {result_name}`"
                            ),
                            tokens[i].span,
                        ));
                    }
                }
            }
        };

        used_clauses.push(clause_name);
        clauses.push(OmpClause {
            directive: dir_name,
            token: tokens[i].clone(),
            args,
        });
        i += n_args + 1;
    }

    let last_span = tokens[tokens.len() - 1].span;
    for dir in &used_directives {
        let specs = &DIRECTIVES[dir.as_str()];
        for clause_name in &specs.clauses {
            let cspec = &CLAUSES[clause_name];
            if cspec.flags.contains(ItemFlags::REQUIRED)
                && !used_clauses.iter().any(|c| c == clause_name)
            {
                return Err(src.expected(format!("`{clause_name}`"), last_span));
            }
        }
        for group in &specs.clause_groups {
            let members: Vec<usize> = clauses
                .iter()
                .enumerate()
                .filter(|(_, c)| group.elems.contains(&c.name()))
                .map(|(idx, _)| idx)
                .collect();
            if group.required && members.is_empty() {
                return Err(src.expected(group.elems.join(" or "), last_span));
            }
            if group.exclusive && members.len() > 1 {
                let a = &clauses[members[0]];
                let b = &clauses[members[1]];
                return Err(src.error(
                    format!(
                        "`{}` and `{}` cannot be used together",
                        a.token.text, b.token.text
                    ),
                    b.span(),
                ));
            }
        }
    }

    // Ultimate clauses close the directive.
    for window in clauses.windows(2) {
        if CLAUSES[window[0].name()].flags.contains(ItemFlags::ULTIMATE) {
            return Err(src.error(
                format!("`{}` must be the last clause", window[0].name()),
                window[0].span(),
            ));
        }
    }

    trace!(
        target: "directive",
        name = %result_name,
        clauses = clauses.len(),
        "parsed directive"
    );
    Ok(OmpDirective {
        name: result_name,
        tokens: result_tokens,
        args: result_args,
        clauses,
        span,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::*;

    fn parse(text: &str) -> Result<OmpDirective, SyntaxError> {
        let src = SourceFile::new("t.py", text);
        parse_line(&src, Span::new(0, text.len()))
    }

    #[test]
    fn bare_parallel() {
        let d = parse("parallel").unwrap();
        assert_eq!(d.name, "parallel");
        assert!(d.clauses.is_empty());
    }

    #[test]
    fn parallel_with_clauses() {
        let d = parse("parallel num_threads(4) private(x) shared(y)").unwrap();
        assert_eq!(d.clauses.len(), 3);
        assert_eq!(d.clauses[0].name(), "num_threads");
        assert_eq!(d.clauses[0].directive, "parallel");
    }

    #[test]
    fn combined_parallel_for() {
        let d = parse("parallel for schedule(static, 1) reduction(+: x)").unwrap();
        assert_eq!(d.name, "parallel for");
        assert_eq!(d.clause("schedule").unwrap().directive, "for");
        assert_eq!(d.clause("reduction").unwrap().directive, "parallel");
    }

    #[test]
    fn combined_rejects_nowait() {
        let err = parse("parallel for nowait").unwrap_err();
        assert!(
            err.message.contains("not a valid clause for `omp parallel for`"),
            "got {}",
            err.message
        );
    }

    #[test]
    fn unknown_directive() {
        let err = parse("paralel").unwrap_err();
        assert!(err.message.contains("a valid directive"));
    }

    #[test]
    fn unknown_second_word() {
        let err = parse("parallel bogus(1)").unwrap_err();
        assert!(err.message.contains("not a valid clause"), "got {}", err.message);
    }

    #[test]
    fn clause_not_supported_by_chain() {
        let err = parse("barrier nowait").unwrap_err();
        assert!(
            err.message.contains("not a valid clause for `omp barrier`"),
            "got {}",
            err.message
        );
    }

    #[test]
    fn repeated_unrepeatable_clause() {
        let err = parse("parallel if(a) if(b)").unwrap_err();
        assert!(err.message.contains("too many `if` clauses"));
    }

    #[test]
    fn repeatable_clause_accumulates() {
        let d = parse("parallel private(x) private(y)").unwrap();
        assert_eq!(d.clauses_named("private").count(), 2);
    }

    #[test]
    fn declare_reduction_chain() {
        let d = parse(
            "declare reduction(myop: int) initializer(omp_priv = 0) combiner(omp_out += omp_in)",
        );
        let d = d.unwrap();
        assert_eq!(d.name, "declare_reduction");
        assert!(d.clause("initializer").is_some());
        assert!(d.clause("combiner").is_some());
    }

    #[test]
    fn declare_reduction_requires_clauses() {
        let err = parse("declare reduction(myop: int)").unwrap_err();
        assert!(err.message.contains("initializer") || err.message.contains("combiner"));
    }

    #[test]
    fn dangling_prefix_lists_completions() {
        let err = parse("declare").unwrap_err();
        assert!(err.message.contains("'reduction'"), "got {}", err.message);
    }

    #[test]
    fn directive_name_modifier_pins_clause() {
        let d = parse("parallel for private(for: x)").unwrap();
        assert_eq!(d.clause("private").unwrap().directive, "for");
    }

    #[test]
    fn directive_name_modifier_must_be_used() {
        let err = parse("parallel private(task: x)").unwrap_err();
        assert!(
            err.message.contains("parallel") || err.message.contains("not a valid directive"),
            "got {}",
            err.message
        );
    }

    #[test]
    fn scan_exclusive_group() {
        let err = parse("scan(x) exclusive(a) inclusive(b)").unwrap_err();
        assert!(err.message.contains("cannot be used together"));
    }

    #[test]
    fn schedule_chunk_error_reported_by_span() {
        let err = parse("parallel for schedule(bogus)").unwrap_err();
        assert!(err.message.contains("'static'"), "got {}", err.message);
    }
}
