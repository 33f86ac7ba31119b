//! Problem files: a TOML document whose formulas, typed lists and predicate
//! declarations are written as PDDL-style s-expressions.
//!
//! ```toml
//! [domain]
//! name = "shuttle"
//! types = ["location"]
//! predicates = ["(at ?l - location)"]
//!
//! [[domain.actions]]
//! name = "move"
//! parameters = "?from ?to - location"
//! precondition = "(at ?from)"
//! effect = "(and (at ?to) (not (at ?from)))"
//!
//! [problem]
//! name = "one-hop"
//! objects = "a b - location"
//! init = ["(at a)"]
//! goal = "(at b)"
//! ```

use nom::{
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, multispace1},
    combinator::{all_consuming, cut, map, value},
    error::{context, convert_error, VerboseError},
    multi::many0,
    sequence::{delimited, preceded, terminated},
    IResult,
};
use serde::Deserialize;

use super::error::{DomainError, DomainResult};
use super::formula::{Atom, Effect, Formula, PredicateTable};
use super::problem::{ActionSchema, Domain, Problem};
use super::terms::{ObjectTable, Term};
use super::types::{TypeId, TypeTable};

#[derive(Debug, Clone, Deserialize)]
pub struct ProblemFile {
    pub domain: DomainSection,
    pub problem: ProblemSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DomainSection {
    pub name: String,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub constants: String,
    #[serde(default)]
    pub predicates: Vec<String>,
    #[serde(default)]
    pub actions: Vec<ActionSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionSection {
    pub name: String,
    #[serde(default)]
    pub parameters: String,
    #[serde(default)]
    pub precondition: Option<String>,
    #[serde(default)]
    pub effect: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProblemSection {
    pub name: String,
    #[serde(default)]
    pub objects: String,
    #[serde(default)]
    pub init: Vec<String>,
    pub goal: String,
}

pub fn parse_problem(text: &str) -> DomainResult<Problem> {
    ProblemFile::from_toml_str(text)?.build()
}

impl ProblemFile {
    pub fn from_toml_str(text: &str) -> DomainResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn build(&self) -> DomainResult<Problem> {
        let mut domain = self.domain.build()?;
        let mut objects = domain.constants.clone();
        for (name, ty) in typed_list(&parse_all(&self.problem.objects)?, &mut domain.types)? {
            objects.add(&name, ty)?;
        }
        let scope = Scope {
            predicates: &domain.predicates,
            types: &domain.types,
            objects: &objects,
            parameters: &[],
            context: &self.problem.name,
        };

        let mut init = Vec::new();
        for entry in &self.problem.init {
            let formula = scope.formula(&parse_one(entry)?)?;
            match formula {
                Formula::Atom(atom) if atom.is_ground() => init.push(atom),
                Formula::True => {}
                _ => return Err(DomainError::InvalidInitialAtom(entry.clone())),
            }
        }
        let goal = scope.formula(&parse_one(&self.problem.goal)?)?;

        Ok(Problem::new(self.problem.name.clone(), domain, objects, init, goal))
    }
}

impl DomainSection {
    fn build(&self) -> DomainResult<Domain> {
        let mut types = TypeTable::new();
        for entry in &self.types {
            declare_types(&parse_all(entry)?, &mut types)?;
        }

        let mut constants = ObjectTable::default();
        for (name, ty) in typed_list(&parse_all(&self.constants)?, &mut types)? {
            constants.add(&name, ty)?;
        }

        let mut predicates = PredicateTable::default();
        for entry in &self.predicates {
            match parse_one(entry)? {
                SExpr::List(items) => {
                    let (name, rest) = split_head(&items, entry)?;
                    let parameters = typed_list(rest, &mut types)?
                        .into_iter()
                        .map(|(_, ty)| ty)
                        .collect();
                    predicates.add(&name, parameters)?;
                }
                SExpr::Symbol(name) => {
                    predicates.add(&name, Vec::new())?;
                }
            }
        }

        let mut actions = Vec::new();
        for section in &self.actions {
            let parameters = typed_list(&parse_all(&section.parameters)?, &mut types)?;
            let scope = Scope {
                predicates: &predicates,
                types: &types,
                objects: &constants,
                parameters: &parameters,
                context: &section.name,
            };
            let precondition = match &section.precondition {
                Some(text) => scope.formula(&parse_one(text)?)?,
                None => Formula::True,
            };
            let mut effects = Vec::new();
            if !section.effect.trim().is_empty() {
                for conjunct in scope.formula(&parse_one(&section.effect)?)?.conjuncts() {
                    let literal = conjunct.as_literal().ok_or_else(|| DomainError::InvalidEffect {
                        action: section.name.clone(),
                    })?;
                    effects.push(Effect::new(literal));
                }
            }
            actions.push(ActionSchema {
                name: section.name.to_lowercase(),
                parameter_names: parameters.iter().map(|(name, _)| name.clone()).collect(),
                parameters: parameters.iter().map(|(_, ty)| *ty).collect(),
                precondition,
                effects,
            });
        }

        Ok(Domain::new(
            self.name.clone(),
            types,
            predicates,
            constants,
            actions,
        ))
    }
}

struct Scope<'a> {
    predicates: &'a PredicateTable,
    types: &'a TypeTable,
    objects: &'a ObjectTable,
    parameters: &'a [(String, TypeId)],
    context: &'a str,
}

impl Scope<'_> {
    fn formula(&self, expr: &SExpr) -> DomainResult<Formula> {
        let items = match expr {
            SExpr::List(items) => items,
            SExpr::Symbol(symbol) => {
                return Err(syntax(symbol, "expected a parenthesized formula"));
            }
        };
        let Some(SExpr::Symbol(head)) = items.first() else {
            if items.is_empty() {
                return Ok(Formula::True);
            }
            return Err(syntax(&render(expr), "formula must start with a keyword or predicate"));
        };
        let rest = &items[1..];
        match head.as_str() {
            "and" => Ok(Formula::and(
                rest.iter()
                    .map(|e| self.formula(e))
                    .collect::<DomainResult<Vec<_>>>()?,
            )),
            "or" => Ok(Formula::or(
                rest.iter()
                    .map(|e| self.formula(e))
                    .collect::<DomainResult<Vec<_>>>()?,
            )),
            "not" => match rest {
                [inner] => Ok(self.formula(inner)?.negate()),
                _ => Err(syntax(&render(expr), "`not` takes exactly one argument")),
            },
            name => Ok(Formula::Atom(self.atom(name, rest)?)),
        }
    }

    fn atom(&self, name: &str, args: &[SExpr]) -> DomainResult<Atom> {
        let predicate = self
            .predicates
            .find(name)
            .ok_or_else(|| DomainError::UnknownPredicate(name.to_string()))?;
        let expected = &self.predicates.get(predicate).parameters;
        if expected.len() != args.len() {
            return Err(DomainError::Arity {
                predicate: name.to_string(),
                expected: expected.len(),
                found: args.len(),
            });
        }
        let mut terms = Vec::with_capacity(args.len());
        for (arg, expected_ty) in args.iter().zip(expected) {
            let SExpr::Symbol(symbol) = arg else {
                return Err(syntax(&render(arg), "predicate arguments must be names"));
            };
            let (term, ty) = self.term(symbol)?;
            let fits = match term {
                Term::Object(_) => self.types.subtype(ty, *expected_ty),
                _ => self.types.compatible(ty, *expected_ty),
            };
            if !fits {
                return Err(DomainError::TypeMismatch {
                    predicate: name.to_string(),
                    argument: symbol.clone(),
                    expected: self.types.name(*expected_ty),
                    found: self.types.name(ty),
                });
            }
            terms.push(term);
        }
        Ok(Atom::new(predicate, terms))
    }

    fn term(&self, symbol: &str) -> DomainResult<(Term, TypeId)> {
        if symbol.starts_with('?') {
            let index = self
                .parameters
                .iter()
                .position(|(name, _)| name == symbol)
                .ok_or_else(|| DomainError::UnknownParameter {
                    parameter: symbol.to_string(),
                    context: self.context.to_string(),
                })?;
            let ty = self.parameters[index].1;
            Ok((Term::Parameter { index, ty }, ty))
        } else {
            let id = self
                .objects
                .find(symbol)
                .ok_or_else(|| DomainError::UnknownObject(symbol.to_string()))?;
            Ok((Term::Object(id), self.objects.type_of(id)))
        }
    }
}

fn declare_types(exprs: &[SExpr], types: &mut TypeTable) -> DomainResult<()> {
    let mut pending: Vec<String> = Vec::new();
    let mut iter = exprs.iter();
    while let Some(expr) = iter.next() {
        match expr {
            SExpr::Symbol(s) if s == "-" => {
                let parent = match iter.next() {
                    Some(SExpr::Symbol(name)) => types.add_simple(name, TypeTable::OBJECT)?,
                    Some(other) => {
                        return Err(syntax(&render(other), "supertype must be a simple type"))
                    }
                    None => return Err(syntax("-", "missing supertype")),
                };
                for name in pending.drain(..) {
                    types.add_simple(&name, parent)?;
                }
            }
            SExpr::Symbol(name) => pending.push(name.clone()),
            SExpr::List(_) => return Err(syntax(&render(expr), "unexpected list in type list")),
        }
    }
    for name in pending {
        types.add_simple(&name, TypeTable::OBJECT)?;
    }
    Ok(())
}

/// Parses `a b - t c - (either u v) d` into names with types; untyped names
/// are `object`.
fn typed_list(exprs: &[SExpr], types: &mut TypeTable) -> DomainResult<Vec<(String, TypeId)>> {
    let mut out = Vec::new();
    let mut pending: Vec<String> = Vec::new();
    let mut iter = exprs.iter();
    while let Some(expr) = iter.next() {
        match expr {
            SExpr::Symbol(s) if s == "-" => {
                let ty = match iter.next() {
                    Some(spec) => type_spec(spec, types)?,
                    None => return Err(syntax("-", "missing type")),
                };
                out.extend(pending.drain(..).map(|name| (name, ty)));
            }
            SExpr::Symbol(name) => pending.push(name.clone()),
            SExpr::List(_) => return Err(syntax(&render(expr), "unexpected list in typed list")),
        }
    }
    out.extend(pending.into_iter().map(|name| (name, TypeTable::OBJECT)));
    Ok(out)
}

fn type_spec(expr: &SExpr, types: &mut TypeTable) -> DomainResult<TypeId> {
    match expr {
        SExpr::Symbol(name) => types
            .find(name)
            .ok_or_else(|| DomainError::UnknownType(name.clone())),
        SExpr::List(items) => {
            let (head, rest) = split_head(items, &render(expr))?;
            if head != "either" {
                return Err(syntax(&render(expr), "expected (either ...)"));
            }
            let mut union: Option<TypeId> = None;
            for member in rest {
                let member = type_spec(member, types)?;
                union = Some(match union {
                    Some(current) => types.union(current, member),
                    None => member,
                });
            }
            Ok(union.unwrap_or(TypeTable::OBJECT))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SExpr {
    Symbol(String),
    List(Vec<SExpr>),
}

fn split_head<'a>(items: &'a [SExpr], text: &str) -> DomainResult<(String, &'a [SExpr])> {
    match items.split_first() {
        Some((SExpr::Symbol(head), rest)) => Ok((head.clone(), rest)),
        _ => Err(syntax(text, "expected a name at the head of the list")),
    }
}

fn syntax(text: &str, message: &str) -> DomainError {
    DomainError::Syntax {
        text: text.to_string(),
        message: message.to_string(),
    }
}

fn render(expr: &SExpr) -> String {
    match expr {
        SExpr::Symbol(s) => s.clone(),
        SExpr::List(items) => {
            let inner: Vec<String> = items.iter().map(render).collect();
            format!("({})", inner.join(" "))
        }
    }
}

type ParseResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// Whitespace and `;` comments running to the end of the line.
fn blank(input: &str) -> ParseResult<'_, ()> {
    value(
        (),
        many0(alt((
            value((), multispace1),
            value((), preceded(char(';'), take_while(|c: char| c != '\n'))),
        ))),
    )(input)
}

fn symbol(input: &str) -> ParseResult<'_, SExpr> {
    map(
        take_while1(|c: char| !c.is_whitespace() && !matches!(c, '(' | ')' | ';')),
        |name: &str| SExpr::Symbol(name.to_string()),
    )(input)
}

fn list(input: &str) -> ParseResult<'_, SExpr> {
    map(
        delimited(
            char('('),
            cut(many0(sexpr)),
            cut(preceded(blank, context("closing parenthesis", char(')')))),
        ),
        SExpr::List,
    )(input)
}

fn sexpr(input: &str) -> ParseResult<'_, SExpr> {
    preceded(blank, alt((list, symbol)))(input)
}

/// Every expression in `text`. Names are case-insensitive and come back
/// lowercased.
fn parse_all(text: &str) -> DomainResult<Vec<SExpr>> {
    let lowered = text.to_lowercase();
    let result = match all_consuming(terminated(many0(sexpr), blank))(lowered.as_str()) {
        Ok((_, exprs)) => Ok(exprs),
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => {
            Err(syntax(text, &convert_error(lowered.as_str(), e)))
        }
        Err(nom::Err::Incomplete(_)) => Err(syntax(text, "incomplete input")),
    };
    result
}

fn parse_one(text: &str) -> DomainResult<SExpr> {
    let mut exprs = parse_all(text)?;
    match exprs.len() {
        1 => Ok(exprs.remove(0)),
        0 => Err(syntax(text, "empty expression")),
        _ => Err(syntax(text, "expected a single expression")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGISTICS: &str = r#"
[domain]
name = "logistics"
types = ["truck airplane - vehicle", "location"]
constants = "depot - location"
predicates = ["(at ?v - vehicle ?l - location)", "(road ?a ?b - location)", "(ready)"]

[[domain.actions]]
name = "Drive"
parameters = "?t - truck ?from ?to - location"
precondition = "(and (at ?t ?from) (road ?from ?to))"
effect = "(and (at ?t ?to) (not (at ?t ?from)))"

[[domain.actions]]
name = "wait"
effect = "(ready)"

[problem]
name = "small"
objects = "t1 - truck a b - location ; trailing comment"
init = ["(at t1 a)", "(road a b)"]
goal = "(or (at t1 b) (at t1 depot))"
"#;

    #[test]
    fn builds_typed_problem() {
        let problem = parse_problem(LOGISTICS).expect("problem should parse");
        let types = problem.types();
        let truck = types.find("truck").unwrap();
        let vehicle = types.find("vehicle").unwrap();
        assert!(types.subtype(truck, vehicle));

        assert_eq!(problem.objects.len(), 4);
        assert_eq!(problem.objects.find("depot"), Some(crate::domain::ObjectId(0)));
        assert_eq!(problem.init().len(), 2);
        assert!(matches!(problem.goal(), Formula::Disjunction(parts) if parts.len() == 2));

        let drive = &problem.domain.actions[0];
        assert_eq!(drive.name, "drive");
        assert_eq!(drive.parameter_names, vec!["?t", "?from", "?to"]);
        assert_eq!(drive.effects.len(), 2);
        assert!(!drive.effects[1].literal.positive);
        assert!(problem.domain.is_static(problem.domain.predicates.find("road").unwrap()));
        assert!(!problem.domain.is_static(problem.domain.predicates.find("ready").unwrap()));
    }

    #[test]
    fn rejects_bad_input() {
        let arity = LOGISTICS.replace("goal = \"(or (at t1 b) (at t1 depot))\"", "goal = \"(at t1)\"");
        assert!(matches!(parse_problem(&arity), Err(DomainError::Arity { .. })));

        let unknown = LOGISTICS.replace("(road a b)", "(road a c)");
        assert!(matches!(parse_problem(&unknown), Err(DomainError::UnknownObject(name)) if name == "c"));

        let mistyped = LOGISTICS.replace("(at t1 a)", "(at a t1)");
        assert!(matches!(parse_problem(&mistyped), Err(DomainError::TypeMismatch { .. })));

        let disjunctive_effect = LOGISTICS.replace("effect = \"(ready)\"", "effect = \"(or (ready) (ready))\"");
        assert!(matches!(
            parse_problem(&disjunctive_effect),
            Err(DomainError::InvalidEffect { action }) if action == "wait"
        ));

        let unbalanced = LOGISTICS.replace("(ready)\"]", "(ready\"]");
        assert!(matches!(parse_problem(&unbalanced), Err(DomainError::Syntax { .. })));
    }

    #[test]
    fn reads_nested_lists_with_comments_and_case() {
        let exprs = parse_all("(AND (at ?X) ; first\n  (not (At b)))  x").unwrap();
        let symbol = |name: &str| SExpr::Symbol(name.to_string());
        assert_eq!(
            exprs,
            vec![
                SExpr::List(vec![
                    symbol("and"),
                    SExpr::List(vec![symbol("at"), symbol("?x")]),
                    SExpr::List(vec![
                        symbol("not"),
                        SExpr::List(vec![symbol("at"), symbol("b")]),
                    ]),
                ]),
                symbol("x"),
            ]
        );
        assert_eq!(parse_all("  ; only a comment").unwrap(), Vec::new());
        assert_eq!(parse_one("()").unwrap(), SExpr::List(Vec::new()));

        assert!(matches!(parse_all("(at a"), Err(DomainError::Syntax { .. })));
        assert!(matches!(parse_all("at a)"), Err(DomainError::Syntax { .. })));
        assert!(matches!(parse_one("(a) (b)"), Err(DomainError::Syntax { .. })));
        assert!(matches!(parse_one(""), Err(DomainError::Syntax { .. })));
    }

    #[test]
    fn either_types_in_parameters() {
        let text = LOGISTICS.replace(
            "parameters = \"?t - truck ?from ?to - location\"",
            "parameters = \"?t - (either truck airplane) ?from ?to - location\"",
        );
        let problem = parse_problem(&text).unwrap();
        let types = problem.types();
        let ty = problem.domain.actions[0].parameters[0];
        assert!(types.subtype(types.find("truck").unwrap(), ty));
        assert!(types.subtype(ty, types.find("vehicle").unwrap()));
    }
}
