//! Sugar-form rewriting: forms that are not themselves special
//! forms in the IR, but are rewritten at the `Form` level into the
//! primitive special forms before analysis continues. Kept separate from
//! the special-form dispatch in `analyzer::mod` the way `graphix-compiler`
//! keeps `expr::resolver`'s rewriting pass separate from `env`'s lookup
//! tables — a form-to-form transform, re-entered through `analyze`
//! afterwards.

use crate::form::{Form, Symbol};
use anyhow::{bail, Result};
use triomphe::Arc;

fn sym(name: &str) -> Form {
    Form::Symbol(Symbol::unqualified(name))
}

fn list(items: Vec<Form>) -> Form {
    Form::List(Arc::from(items), None)
}

/// `(when test body...)` => `(if test (do body...) nil)`
pub fn when(items: &[Form]) -> Result<Form> {
    if items.len() < 2 {
        bail!("when requires a test and at least one body form");
    }
    let test = items[1].clone();
    let body = &items[2..];
    Ok(list(vec![sym("if"), test, wrap_do(body), Form::Nil]))
}

/// `(when-not test body...)` => `(if test nil (do body...))`
pub fn when_not(items: &[Form]) -> Result<Form> {
    if items.len() < 2 {
        bail!("when-not requires a test and at least one body form");
    }
    let test = items[1].clone();
    let body = &items[2..];
    Ok(list(vec![sym("if"), test, Form::Nil, wrap_do(body)]))
}

/// `(if-not test then else?)` => `(if test else? then)`
pub fn if_not(items: &[Form]) -> Result<Form> {
    if items.len() < 3 || items.len() > 4 {
        bail!("if-not requires a test, then-branch, and optional else-branch");
    }
    let test = items[1].clone();
    let then = items[2].clone();
    let els = items.get(3).cloned().unwrap_or(Form::Nil);
    Ok(list(vec![sym("if"), test, els, then]))
}

/// `(if-let [name test] then else?)` => `(let [name test] (if name then else?))`
pub fn if_let(items: &[Form]) -> Result<Form> {
    if items.len() < 3 {
        bail!("if-let requires a binding vector and a then-branch");
    }
    let Form::Vector(binding, _) = &items[1] else { bail!("if-let requires a binding vector") };
    if binding.len() != 2 {
        bail!("if-let binding vector must have exactly one name/test pair");
    }
    let name = binding[0].clone();
    let test = binding[1].clone();
    let then = items[2].clone();
    let els = items.get(3).cloned().unwrap_or(Form::Nil);
    Ok(list(vec![
        sym("let"),
        Form::Vector(Arc::from(vec![name.clone(), test]), None),
        list(vec![sym("if"), name, then, els]),
    ]))
}

/// `(when-let [name test] body...)` => `(let [name test] (if name (do body...) nil))`
pub fn when_let(items: &[Form]) -> Result<Form> {
    if items.len() < 3 {
        bail!("when-let requires a binding vector and at least one body form");
    }
    let Form::Vector(binding, _) = &items[1] else {
        bail!("when-let requires a binding vector")
    };
    if binding.len() != 2 {
        bail!("when-let binding vector must have exactly one name/test pair");
    }
    let name = binding[0].clone();
    let test = binding[1].clone();
    let body = &items[2..];
    Ok(list(vec![
        sym("let"),
        Form::Vector(Arc::from(vec![name.clone(), test]), None),
        list(vec![sym("if"), name, wrap_do(body), Form::Nil]),
    ]))
}

/// `(cond test1 expr1 test2 expr2 ... :else default)` right-folds into
/// nested `if`s; an odd trailing test with no expression is an error, an
/// exhausted cond with no match falls through to `nil`.
pub fn cond(items: &[Form]) -> Result<Form> {
    let clauses = &items[1..];
    if clauses.len() % 2 != 0 {
        bail!("cond requires an even number of test/expr forms");
    }
    let mut result = Form::Nil;
    for pair in clauses.chunks(2).rev() {
        let (test, expr) = (&pair[0], &pair[1]);
        result = list(vec![sym("if"), test.clone(), expr.clone(), result]);
    }
    Ok(result)
}

fn wrap_do(body: &[Form]) -> Form {
    if body.len() == 1 {
        body[0].clone()
    } else {
        let mut items = vec![sym("do")];
        items.extend(body.iter().cloned());
        list(items)
    }
}

/// `and`/`or` use an internal fresh-name `let` to avoid double evaluation
/// of the first operand. Empty `and` is `true`, empty `or` is `nil`.
pub fn and(items: &[Form], gensym: impl Fn(&str) -> String) -> Result<Form> {
    let args = &items[1..];
    if args.is_empty() {
        return Ok(Form::Bool(true));
    }
    if args.len() == 1 {
        return Ok(args[0].clone());
    }
    let g = gensym("and");
    let rest = and(&{
        let mut v = vec![sym("and")];
        v.extend(args[1..].iter().cloned());
        v
    }, gensym)?;
    Ok(list(vec![
        sym("let"),
        Form::Vector(Arc::from(vec![sym(&g), args[0].clone()]), None),
        list(vec![sym("if"), sym(&g), rest, sym(&g)]),
    ]))
}

pub fn or(items: &[Form], gensym: impl Fn(&str) -> String) -> Result<Form> {
    let args = &items[1..];
    if args.is_empty() {
        return Ok(Form::Nil);
    }
    if args.len() == 1 {
        return Ok(args[0].clone());
    }
    let g = gensym("or");
    let rest = or(&{
        let mut v = vec![sym("or")];
        v.extend(args[1..].iter().cloned());
        v
    }, gensym)?;
    Ok(list(vec![
        sym("let"),
        Form::Vector(Arc::from(vec![sym(&g), args[0].clone()]), None),
        list(vec![sym("if"), sym(&g), sym(&g), rest]),
    ]))
}

/// Thread `x` as the second element of each step (`->`) or as the last
/// element (`->>`). A bare symbol step `f` is treated as `(f)`.
fn thread(items: &[Form], append: bool) -> Result<Form> {
    if items.is_empty() {
        bail!("threading macro requires at least a seed value");
    }
    let mut acc = items[0].clone();
    for step in &items[1..] {
        let step_items: Vec<Form> = match step {
            Form::List(v, _) => v.to_vec(),
            Form::Symbol(_) => vec![step.clone()],
            _ => bail!("threading macro steps must be lists or symbols"),
        };
        let mut rewritten = vec![step_items[0].clone()];
        if append {
            rewritten.extend(step_items[1..].iter().cloned());
            rewritten.push(acc);
        } else {
            rewritten.push(acc);
            rewritten.extend(step_items[1..].iter().cloned());
        }
        acc = list(rewritten);
    }
    Ok(acc)
}

pub fn thread_first(items: &[Form]) -> Result<Form> {
    thread(&items[1..], false)
}

pub fn thread_last(items: &[Form]) -> Result<Form> {
    thread(&items[1..], true)
}

/// `(doto target step...)` captures `target` into a fresh local, threads
/// it as the first arg into each step, and returns the local.
pub fn doto(items: &[Form], gensym: impl Fn(&str) -> String) -> Result<Form> {
    if items.len() < 2 {
        bail!("doto requires a target expression");
    }
    let target = items[1].clone();
    let steps = &items[2..];
    let g = gensym("doto");
    let mut body = vec![sym("do")];
    for step in steps {
        let step_items: Vec<Form> = match step {
            Form::List(v, _) => v.to_vec(),
            Form::Symbol(_) => vec![step.clone()],
            _ => bail!("doto steps must be lists or symbols"),
        };
        let mut rewritten = vec![step_items[0].clone(), sym(&g)];
        rewritten.extend(step_items[1..].iter().cloned());
        body.push(list(rewritten));
    }
    body.push(sym(&g));
    Ok(list(vec![
        sym("let"),
        Form::Vector(Arc::from(vec![sym(&g), target]), None),
        list(body),
    ]))
}

/// `(dotimes [i n] body...)` desugars to a `let`-wrapped `loop`/`recur`
/// with a counter bound while it's less than the limit:
/// `(let [n* limit] (loop [i 0] (when (< i n*) body... (recur (inc i)))))`
pub fn dotimes(items: &[Form], gensym: impl Fn(&str) -> String) -> Result<Form> {
    if items.len() < 2 {
        bail!("dotimes requires a binding vector");
    }
    let Form::Vector(binding, _) = &items[1] else { bail!("dotimes requires a binding vector") };
    if binding.len() != 2 {
        bail!("dotimes binding vector must have exactly one var/limit pair");
    }
    let var = binding[0].clone();
    let limit = binding[1].clone();
    let body = &items[2..];
    let limit_name = gensym("dotimes_limit");
    let mut when_body = vec![sym("when"), list(vec![sym("<"), var.clone(), sym(&limit_name)])];
    when_body.extend(body.iter().cloned());
    when_body.push(list(vec![sym("recur"), list(vec![sym("inc"), var.clone()])]));
    Ok(list(vec![
        sym("let"),
        Form::Vector(Arc::from(vec![sym(&limit_name), limit]), None),
        list(vec![
            sym("loop"),
            Form::Vector(Arc::from(vec![var, Form::Int(0)]), None),
            list(when_body),
        ]),
    ]))
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse_items(form: &Form) -> Vec<Form> {
        form.as_list().unwrap().to_vec()
    }

    #[test]
    fn when_desugars_to_if() {
        let form = list(vec![sym("when"), Form::Bool(true), Form::Int(1), Form::Int(2)]);
        let items = parse_items(&form);
        let result = when(&items).unwrap();
        assert_eq!(format!("{result}"), "(if true (do 1 2) nil)");
    }

    #[test]
    fn cond_right_folds() {
        let form = list(vec![
            sym("cond"),
            Form::Bool(false),
            Form::Int(1),
            Form::Bool(true),
            Form::Int(2),
        ]);
        let items = parse_items(&form);
        let result = cond(&items).unwrap();
        assert_eq!(format!("{result}"), "(if false 1 (if true 2 nil))");
    }

    #[test]
    fn thread_first_pushes_as_second_arg() {
        let form = list(vec![
            sym("->"),
            Form::Int(1),
            list(vec![sym("+"), Form::Int(2)]),
        ]);
        let items = parse_items(&form);
        let result = thread_first(&items).unwrap();
        assert_eq!(format!("{result}"), "(+ 1 2)");
    }

    #[test]
    fn thread_last_appends_as_last_arg() {
        let form = list(vec![
            sym("->>"),
            Form::Int(1),
            list(vec![sym("+"), Form::Int(2)]),
        ]);
        let items = parse_items(&form);
        let result = thread_last(&items).unwrap();
        assert_eq!(format!("{result}"), "(+ 2 1)");
    }

    #[test]
    fn thread_first_bare_symbol_step_is_treated_as_call() {
        let form = list(vec![sym("->"), Form::Int(1), sym("inc")]);
        let items = parse_items(&form);
        let result = thread_first(&items).unwrap();
        assert_eq!(format!("{result}"), "(inc 1)");
    }
}
