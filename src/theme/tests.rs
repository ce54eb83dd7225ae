//! Tests for the template engine

use super::*;
use chrono::Duration;
use tempfile::TempDir;

fn write_override(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

#[test]
fn test_embedded_templates_load() {
    let engine = ThemeEngine::new(None).unwrap();

    for name in [
        "base.html",
        "macros.html",
        "articles/list.html",
        "articles/detail.html",
        "articles/form.html",
        "account/login.html",
        "account/profile.html",
        "admin/dashboard.html",
        "errors/404.html",
    ] {
        assert!(engine.has_template(name), "missing template {}", name);
    }
    assert!(!engine.has_template("missing.html"));
}

#[test]
fn test_override_replaces_embedded_template() {
    let dir = TempDir::new().unwrap();
    write_override(dir.path(), "errors/404.html", "<p>custom not found</p>");

    let engine = ThemeEngine::new(Some(dir.path())).unwrap();
    let html = engine
        .render("errors/404.html", &TeraContext::new())
        .unwrap();
    assert_eq!(html, "<p>custom not found</p>");

    // Templates without an override stay embedded
    assert!(engine.has_template("articles/search.html"));
}

#[test]
fn test_override_can_add_templates_extending_base() {
    let dir = TempDir::new().unwrap();
    write_override(
        dir.path(),
        "pages/about.html",
        r#"{% extends "base.html" %}{% block content %}<h1>About {{ name }}</h1>{% endblock content %}"#,
    );

    let engine = ThemeEngine::new(Some(dir.path())).unwrap();
    let mut ctx = TeraContext::new();
    ctx.insert("name", "us");
    ctx.insert("categories", &Vec::<String>::new());
    ctx.insert("top_categories", &Vec::<String>::new());
    ctx.insert("viewer", &Option::<String>::None);
    ctx.insert("flash", &Option::<String>::None);

    let html = engine.render("pages/about.html", &ctx).unwrap();
    assert!(html.contains("<h1>About us</h1>"));
    assert!(html.contains("<title>LibertyPost</title>"));
}

#[test]
fn test_html_is_autoescaped() {
    let dir = TempDir::new().unwrap();
    write_override(dir.path(), "probe.html", "{{ value }}|{{ value | safe }}");

    let engine = ThemeEngine::new(Some(dir.path())).unwrap();
    let mut ctx = TeraContext::new();
    ctx.insert("value", "<b>hi</b>");

    let html = engine.render("probe.html", &ctx).unwrap();
    assert_eq!(html, "&lt;b&gt;hi&lt;&#x2F;b&gt;|<b>hi</b>");
}

#[test]
fn test_broken_override_is_a_template_error() {
    let dir = TempDir::new().unwrap();
    write_override(dir.path(), "broken.html", "{% if %}");

    let result = ThemeEngine::new(Some(dir.path()));
    assert!(matches!(result, Err(ThemeError::TemplateError(_))));
}

#[test]
fn test_missing_override_dir_uses_embedded() {
    let dir = TempDir::new().unwrap();
    let engine = ThemeEngine::new(Some(&dir.path().join("nope"))).unwrap();
    assert!(engine.has_template("base.html"));
}

#[test]
fn test_render_unknown_template_fails() {
    let engine = ThemeEngine::new(None).unwrap();
    let result = engine.render("nope.html", &TeraContext::new());
    match result {
        Err(ThemeError::TemplateError(msg)) => assert!(msg.contains("nope.html")),
        other => panic!("expected template error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_reload_picks_up_new_overrides() {
    let dir = TempDir::new().unwrap();
    let mut engine = ThemeEngine::new(Some(dir.path())).unwrap();
    assert!(!engine.has_template("late.html"));

    write_override(dir.path(), "late.html", "late");
    engine.reload().unwrap();
    assert_eq!(engine.render("late.html", &TeraContext::new()).unwrap(), "late");
}

#[test]
fn test_timesince_picks_largest_unit() {
    let now = Utc::now();
    assert_eq!(timesince(now, now), "0 minutes");
    assert_eq!(timesince(now - Duration::seconds(59), now), "0 minutes");
    assert_eq!(timesince(now - Duration::minutes(1), now), "1 minute");
    assert_eq!(timesince(now - Duration::minutes(45), now), "45 minutes");
    assert_eq!(timesince(now - Duration::hours(1), now), "1 hour");
    assert_eq!(timesince(now - Duration::hours(23), now), "23 hours");
    assert_eq!(timesince(now - Duration::days(3), now), "3 days");
    assert_eq!(timesince(now - Duration::days(14), now), "2 weeks");
    assert_eq!(timesince(now - Duration::days(60), now), "2 months");
    assert_eq!(timesince(now - Duration::days(365), now), "1 year");
    assert_eq!(timesince(now - Duration::days(800), now), "2 years");
}

#[test]
fn test_timesince_future_is_zero() {
    let now = Utc::now();
    assert_eq!(timesince(now + Duration::days(2), now), "0 minutes");
}

#[test]
fn test_timesince_filter() {
    let dir = TempDir::new().unwrap();
    write_override(dir.path(), "ago.html", "{{ ts | timesince }}");
    let engine = ThemeEngine::new(Some(dir.path())).unwrap();

    let mut ctx = TeraContext::new();
    ctx.insert("ts", &(Utc::now() - Duration::hours(2) - Duration::minutes(5)));
    assert_eq!(engine.render("ago.html", &ctx).unwrap(), "2 hours");

    ctx.insert("ts", "yesterday");
    assert!(engine.render("ago.html", &ctx).is_err());
}
