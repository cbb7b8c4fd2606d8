// src/render.rs

//! Page rendering for leaf and root listings
//!
//! The indexer only decides *what* goes on a page; markup lives behind the
//! `TemplateRenderer` trait. `HandlebarsRenderer` ships the two built-in
//! templates, `leaf` and `root`, and HTML-escapes every value.

use crate::error::{Error, Result};
use handlebars::Handlebars;
use serde_json::Value;

/// Template name for a package's version listing
pub const LEAF_TEMPLATE: &str = "leaf";

/// Template name for the listing of all packages
pub const ROOT_TEMPLATE: &str = "root";

const LEAF_SOURCE: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <title>{{title}}</title>
  </head>
  <body>
    <h1>{{package_title}}</h1>
    {{#each versions}}
    <a href="{{url}}">{{name}}</a><br/>
    {{/each}}
  </body>
</html>
"#;

const ROOT_SOURCE: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <title>{{title}}</title>
  </head>
  <body>
    <h1>{{title}}</h1>
    {{#each packages}}
    <a href="{{url}}">{{name}}</a><br/>
    {{/each}}
  </body>
</html>
"#;

/// Turns a named template and its variables into text
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, name: &str, vars: &Value) -> Result<String>;
}

/// Handlebars renderer preloaded with the `leaf` and `root` templates
pub struct HandlebarsRenderer {
    registry: Handlebars<'static>,
}

impl HandlebarsRenderer {
    pub fn new() -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry
            .register_template_string(LEAF_TEMPLATE, LEAF_SOURCE)
            .map_err(|e| Error::RenderError(format!("Invalid leaf template: {}", e)))?;
        registry
            .register_template_string(ROOT_TEMPLATE, ROOT_SOURCE)
            .map_err(|e| Error::RenderError(format!("Invalid root template: {}", e)))?;
        Ok(Self { registry })
    }

    /// Replace or add a template, e.g. to restyle the pages
    pub fn register(&mut self, name: &str, source: &str) -> Result<()> {
        self.registry
            .register_template_string(name, source)
            .map_err(|e| Error::RenderError(format!("Invalid template {}: {}", name, e)))
    }
}

/// Join a link prefix and a path segment with exactly one '/'
///
/// An empty prefix yields a relative link.
pub(crate) fn join_url(base: &str, tail: &str) -> String {
    if base.is_empty() {
        tail.to_string()
    } else if base.ends_with('/') {
        format!("{}{}", base, tail)
    } else {
        format!("{}/{}", base, tail)
    }
}

impl TemplateRenderer for HandlebarsRenderer {
    fn render(&self, name: &str, vars: &Value) -> Result<String> {
        self.registry
            .render(name, vars)
            .map_err(|e| Error::RenderError(format!("Failed to render {}: {}", name, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_leaf() {
        let renderer = HandlebarsRenderer::new().unwrap();
        let html = renderer
            .render(
                LEAF_TEMPLATE,
                &json!({
                    "title": "Index: mypkg",
                    "package_title": "mypkg",
                    "versions": [
                        {"url": "/index/mypkg-1.0.tar.gz", "name": "mypkg-1.0.tar.gz"},
                    ],
                }),
            )
            .unwrap();

        assert!(html.contains(r#"<a href="/index/mypkg-1.0.tar.gz">mypkg-1.0.tar.gz</a>"#));
        assert!(html.contains("<h1>mypkg</h1>"));
    }

    #[test]
    fn test_render_escapes_values() {
        let renderer = HandlebarsRenderer::new().unwrap();
        let html = renderer
            .render(
                ROOT_TEMPLATE,
                &json!({
                    "title": "<Index>",
                    "packages": [{"url": "../a&b", "name": "a&b"}],
                }),
            )
            .unwrap();

        assert!(html.contains("&lt;Index&gt;"));
        assert!(html.contains("a&amp;b"));
    }

    #[test]
    fn test_missing_variable_fails_in_strict_mode() {
        let renderer = HandlebarsRenderer::new().unwrap();
        let result = renderer.render(ROOT_TEMPLATE, &json!({"packages": []}));
        assert!(matches!(result, Err(Error::RenderError(_))));
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("..", "mypkg"), "../mypkg");
        assert_eq!(join_url("/index/", "a-1.0.tar.gz"), "/index/a-1.0.tar.gz");
        assert_eq!(join_url("", "mypkg"), "mypkg");
    }

    #[test]
    fn test_custom_template() {
        let mut renderer = HandlebarsRenderer::new().unwrap();
        renderer.register(ROOT_TEMPLATE, "{{#each packages}}{{name}};{{/each}}").unwrap();
        let text = renderer
            .render(ROOT_TEMPLATE, &json!({"packages": [{"name": "a"}, {"name": "b"}]}))
            .unwrap();
        assert_eq!(text, "a;b;");
    }
}
