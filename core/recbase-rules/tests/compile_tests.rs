mod support;

use pretty_assertions::assert_eq;
use recbase_rules::{Filter, RuleError};
use support::fixture;

fn compile(source: &str) -> Result<Filter, RuleError> {
    let f = fixture();
    Filter::compile(source, &f.coll("posts"), &f)
}

#[test]
fn valid_paths_compile() {
    for source in [
        "title = 'x'",
        "author.team.name = 'core'",
        "editors.name ?= 'bob'",
        "created > '2024-01-01' && id != ''",
        "@request.auth.anything.at.all = 1",
        "@request.body.unknown = 1",
        "@request.body.author.name = 'bob'",
        "@request.body.tags:length > 1",
        "@collection.settings.key = 'mode'",
        "tags:length = 0 && title:lower ~ 'x'",
    ] {
        assert!(compile(source).is_ok(), "{source}: {:?}", compile(source).err());
    }
}

#[test]
fn compiled_filter_remembers_its_source() {
    let filter = compile("title = 'x'").unwrap();
    assert_eq!(filter.source(), "title = 'x'");
    assert_eq!(filter.collection(), "posts");
    assert_eq!(filter.expr().comparisons().len(), 1);
}

#[test]
fn unknown_fields_are_rejected() {
    assert_eq!(
        compile("nope = 1").unwrap_err(),
        RuleError::UnknownField {
            collection: "posts".into(),
            field: "nope".into()
        }
    );
    assert_eq!(
        compile("author.nope = 1").unwrap_err(),
        RuleError::UnknownField {
            collection: "users".into(),
            field: "nope".into()
        }
    );
    assert_eq!(
        compile("@collection.nope.x = 1").unwrap_err(),
        RuleError::UnknownCollection("nope".into())
    );
}

#[test]
fn only_relations_can_be_traversed() {
    assert_eq!(
        compile("title.name = 1").unwrap_err(),
        RuleError::NotARelation { field: "title".into() }
    );
    assert_eq!(
        compile("id.name = 1").unwrap_err(),
        RuleError::NotARelation { field: "id".into() }
    );
}

// ── Modifiers ────────────────────────────────────────────────────

#[test]
fn presence_and_length_on_file_fields_are_diagnosed() {
    let err = compile("cover:length = 1").unwrap_err();
    assert_eq!(
        err,
        RuleError::UnsupportedModifier {
            modifier: "length",
            field: "cover".into()
        }
    );
    assert_eq!(err.to_string(), "unsupported modifier ':length' on file field 'cover'");

    assert!(matches!(
        compile("gallery:length > 0"),
        Err(RuleError::UnsupportedModifier { modifier: "length", .. })
    ));
    assert!(matches!(
        compile("@request.body.cover:isset = true"),
        Err(RuleError::UnsupportedModifier { modifier: "isset", .. })
    ));
}

#[test]
fn misplaced_modifiers_are_rejected() {
    assert!(matches!(
        compile("title:isset = true"),
        Err(RuleError::InvalidModifier { modifier: "isset", .. })
    ));
    assert!(matches!(
        compile("title:length = 1"),
        Err(RuleError::InvalidModifier { modifier: "length", .. })
    ));
    assert!(matches!(
        compile("@request.body.author.name:isset = true"),
        Err(RuleError::InvalidModifier { modifier: "isset", .. })
    ));
}

#[test]
fn syntax_errors_surface() {
    assert!(matches!(compile("title ="), Err(RuleError::Syntax { .. })));
}
