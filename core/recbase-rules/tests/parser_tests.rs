use pretty_assertions::assert_eq;
use proptest::prelude::*;
use recbase_rules::ast::{Comparison, Expr, Modifier, OpKind, Operand, Operator, Source};
use recbase_rules::{parse, RuleError};
use recbase_types::Value;

fn field(name: &str) -> Operand {
    Operand::Path {
        source: Source::Record,
        segments: name.split('.').map(str::to_string).collect(),
        modifier: None,
    }
}

fn cmp(left: Operand, kind: OpKind, right: Operand) -> Expr {
    Expr::Cmp(Comparison {
        left,
        op: Operator { kind, any: false },
        right,
    })
}

fn num(n: f64) -> Operand {
    Operand::Literal(Value::Number(n))
}

// ── Structure ────────────────────────────────────────────────────

#[test]
fn and_binds_tighter_than_or() {
    let expr = parse("a = 1 || b = 2 && c = 3").unwrap();
    let expected = Expr::Or(
        Box::new(cmp(field("a"), OpKind::Eq, num(1.0))),
        Box::new(Expr::And(
            Box::new(cmp(field("b"), OpKind::Eq, num(2.0))),
            Box::new(cmp(field("c"), OpKind::Eq, num(3.0))),
        )),
    );
    assert_eq!(expr, expected);
}

#[test]
fn parentheses_override_precedence() {
    let expr = parse("(a = 1 || b = 2) && c = 3").unwrap();
    assert!(matches!(expr, Expr::And(ref left, _) if matches!(**left, Expr::Or(..))));
}

#[test]
fn every_operator_parses() {
    let cases = [
        ("=", OpKind::Eq, false),
        ("!=", OpKind::Neq, false),
        (">", OpKind::Gt, false),
        (">=", OpKind::Gte, false),
        ("<", OpKind::Lt, false),
        ("<=", OpKind::Lte, false),
        ("~", OpKind::Like, false),
        ("!~", OpKind::NotLike, false),
        ("?=", OpKind::Eq, true),
        ("?!=", OpKind::Neq, true),
        ("?>", OpKind::Gt, true),
        ("?>=", OpKind::Gte, true),
        ("?<", OpKind::Lt, true),
        ("?<=", OpKind::Lte, true),
        ("?~", OpKind::Like, true),
        ("?!~", OpKind::NotLike, true),
    ];
    for (text, kind, any) in cases {
        let expr = parse(&format!("tags {text} 'x'")).unwrap();
        let Expr::Cmp(c) = expr else {
            panic!("expected comparison for {text}");
        };
        assert_eq!(c.op, Operator { kind, any }, "operator {text}");
        assert_eq!(c.op.to_string(), text);
    }
}

#[test]
fn literals() {
    let Expr::Cmp(c) = parse(r#"a = 'it\'s'"#).unwrap() else { panic!() };
    assert_eq!(c.right, Operand::Literal(Value::text("it's")));

    let Expr::Cmp(c) = parse(r#"a = "double""#).unwrap() else { panic!() };
    assert_eq!(c.right, Operand::Literal(Value::text("double")));

    let Expr::Cmp(c) = parse("a = -2.5").unwrap() else { panic!() };
    assert_eq!(c.right, num(-2.5));

    let Expr::Cmp(c) = parse("true != null").unwrap() else { panic!() };
    assert_eq!(c.left, Operand::Literal(Value::Bool(true)));
    assert_eq!(c.right, Operand::Literal(Value::Null));
}

#[test]
fn request_operands() {
    let Expr::Cmp(c) = parse("@request.auth.team.name = @request.body.title:lower").unwrap() else {
        panic!()
    };
    assert_eq!(
        c.left,
        Operand::Path {
            source: Source::Auth,
            segments: vec!["team".into(), "name".into()],
            modifier: None,
        }
    );
    assert_eq!(
        c.right,
        Operand::Path {
            source: Source::Body,
            segments: vec!["title".into()],
            modifier: Some(Modifier::Lower),
        }
    );

    let Expr::Cmp(c) = parse("@request.headers.X_Token = @request.query.page").unwrap() else {
        panic!()
    };
    assert_eq!(c.left, Operand::Header("x_token".into()));
    assert_eq!(c.right, Operand::Query("page".into()));

    let Expr::Cmp(c) = parse("@request.context = @request.method").unwrap() else { panic!() };
    assert_eq!(c.left, Operand::Context);
    assert_eq!(c.right, Operand::Method);

    let Expr::Cmp(c) = parse("created < @now").unwrap() else { panic!() };
    assert_eq!(c.right, Operand::Now);
}

#[test]
fn collection_operand() {
    let expr = parse("@collection.settings.key = 'a' && @collection.settings.value = 'b'").unwrap();
    assert_eq!(expr.joined_collections(), vec!["settings".to_string()]);
}

#[test]
fn comments_are_ignored() {
    let expr = parse("a = 1 // trailing note\n && b = 2").unwrap();
    assert_eq!(expr.comparisons().len(), 2);
}

// ── Errors ───────────────────────────────────────────────────────

#[test]
fn syntax_errors() {
    for input in [
        "",
        "   ",
        "a =",
        "a 1",
        "(a = 1",
        "a = 1)",
        "a = 1 &&",
        "a = 'unterminated",
        "@request.bogus = 1",
        "a:nope = 1",
        "@collection.settings = 1",
        "a..b = 1",
    ] {
        assert!(
            matches!(parse(input), Err(RuleError::Syntax { .. })),
            "expected syntax error for {input:?}"
        );
    }
}

proptest! {
    #[test]
    fn parser_never_panics(input in "\\PC{0,64}") {
        let _ = parse(&input);
    }

    #[test]
    fn parse_is_deterministic(a in "[a-z]{1,8}", n in -1000i32..1000) {
        let source = format!("{a} >= {n} || {a} ?~ 'x'");
        prop_assert_eq!(parse(&source).unwrap(), parse(&source).unwrap());
    }
}
