//! Tests for the template engine

use super::*;
use tempfile::TempDir;

fn engine_with_overrides(dir: Option<&Path>) -> ThemeEngine {
    ThemeEngine::new(&TemplateConfig {
        override_path: dir.map(Path::to_path_buf),
    })
    .unwrap()
}

fn base_context() -> TeraContext {
    let mut context = TeraContext::new();
    StandardTemplateVars {
        site_name: "Барбершоп 'Арбуз'".to_string(),
        request_path: "/".to_string(),
        year: 2026,
        current_user: None,
    }
    .insert_into(&mut context);
    context.insert("flashes", &Vec::<String>::new());
    context
}

#[test]
fn test_embedded_templates_are_loaded() {
    let engine = engine_with_overrides(None);
    for name in [
        "base.html",
        "landing.html",
        "about.html",
        "thanks.html",
        "error.html",
        "barbershop/master_detail.html",
        "barbershop/order_form.html",
        "barbershop/review_form.html",
        "blog/post_list.html",
        "blog/post_detail.html",
        "users/login.html",
    ] {
        assert!(engine.has_template(name), "missing {}", name);
    }
}

#[test]
fn test_error_page_renders() {
    let engine = engine_with_overrides(None);
    let mut context = base_context();
    context.insert("status", &404);
    context.insert("message", "Страница не найдена");

    let html = engine.render("error.html", &context).unwrap();
    assert!(html.contains("Страница не найдена"));
    assert!(html.contains("Арбуз"));
}

#[test]
fn test_override_replaces_embedded_template() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("error.html"), "custom {{ status }}").unwrap();

    let engine = engine_with_overrides(Some(dir.path()));
    let mut context = base_context();
    context.insert("status", &418);
    context.insert("message", "");
    assert_eq!(engine.render("error.html", &context).unwrap(), "custom 418");
    assert!(engine.has_template("landing.html"));
}

#[test]
fn test_missing_override_dir_falls_back() {
    let dir = TempDir::new().unwrap();
    let engine = engine_with_overrides(Some(&dir.path().join("absent")));
    assert!(engine.has_template("base.html"));
}

#[test]
fn test_render_failure_falls_back_to_simple_page() {
    let engine = engine_with_overrides(None);
    let html = engine.render_with_fallback("no-such-template.html", &TeraContext::new());
    assert!(html.contains("500"));
    assert!(engine.render("no-such-template.html", &TeraContext::new()).is_err());
}

#[test]
fn test_filters_are_registered() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("probe.html"),
        "{{ price | format_price }}|{{ rating | stars }}|{% for i in count | to_range %}{{ i }}{% endfor %}",
    )
    .unwrap();

    let engine = engine_with_overrides(Some(dir.path()));
    let mut context = TeraContext::new();
    context.insert("price", "2500.00");
    context.insert("rating", &4.5);
    context.insert("count", &3);
    assert_eq!(engine.render("probe.html", &context).unwrap(), "2 500 ₽|⭐⭐⭐⭐|012");
}
