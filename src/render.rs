//! Template rendering for dirty resources.
//!
//! Templates are minijinja sources read from the template root. Each render
//! gets a fresh environment and the following context:
//!
//! - `hosts`: every resolved host mapped to its sorted address list
//! - `resource`: `id`, `source`, `destination` and `hosts` (fully-qualified)
//!
//! ```jinja
//! {% for addr in hosts["web.svc.example.com"] %}
//! server {{ addr }}:8080;
//! {% endfor %}
//! ```
//!
//! Output goes to a temporary file beside the destination, gets its mode and
//! ownership applied, then replaces the destination in one rename. A failing
//! template therefore never truncates the previous file.

use minijinja::{context, Environment, ErrorKind};
use std::fs::{self, Permissions};
use std::os::unix::fs::{chown, PermissionsExt};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::OverseerError;
use crate::resource::Resource;
use crate::state::{write_atomic, AddressView};

/// Mode for new destinations whose resource declares none.
pub const DEFAULT_MODE: u32 = 0o644;

/// Renders resources from templates under a root directory.
#[derive(Debug, Clone)]
pub struct Renderer {
    templates_dir: PathBuf,
}

impl Renderer {
    /// Create a renderer for templates under `templates_dir`.
    pub fn new(templates_dir: impl Into<PathBuf>) -> Self {
        Self {
            templates_dir: templates_dir.into(),
        }
    }

    /// Template root.
    pub fn templates_dir(&self) -> &Path {
        &self.templates_dir
    }

    /// Evaluate the resource's template against `view`.
    pub fn render_to_string(
        &self,
        resource: &Resource,
        view: &AddressView,
    ) -> Result<String, OverseerError> {
        let template_err = |source| OverseerError::Template {
            name: resource.source.clone(),
            source,
        };

        let path = self.templates_dir.join(&resource.source);
        let source = fs::read_to_string(&path).map_err(|e| {
            template_err(minijinja::Error::new(
                ErrorKind::TemplateNotFound,
                format!("cannot read {}: {}", path.display(), e),
            ))
        })?;

        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);

        let template = env
            .template_from_named_str(&resource.source, &source)
            .map_err(template_err)?;

        let ctx = context! {
            hosts => view,
            resource => context! {
                id => resource.id.as_str(),
                source => &resource.source,
                destination => resource.destination.display().to_string(),
                hosts => resource.fqdns(),
            },
        };

        template.render(ctx).map_err(template_err)
    }

    /// Render the resource and replace its destination file.
    pub fn render(&self, resource: &Resource, view: &AddressView) -> Result<(), OverseerError> {
        let rendered = self.render_to_string(resource, view)?;
        let destination = &resource.destination;

        let mode = resource
            .mode
            .or_else(|| existing_mode(destination))
            .unwrap_or(DEFAULT_MODE);

        write_atomic(destination, rendered.as_bytes(), |tmp| {
            fs::set_permissions(tmp, Permissions::from_mode(mode))?;
            if resource.owner.is_some() || resource.group.is_some() {
                chown(tmp, resource.owner, resource.group)?;
            }
            Ok(())
        })
        .map_err(|source| OverseerError::Destination {
            path: destination.clone(),
            source,
        })?;

        debug!(
            resource = %resource.id,
            destination = %destination.display(),
            bytes = rendered.len(),
            mode = format_args!("{:o}", mode),
            "rendered destination"
        );
        Ok(())
    }
}

fn existing_mode(path: &Path) -> Option<u32> {
    fs::metadata(path)
        .ok()
        .map(|meta| meta.permissions().mode() & 0o7777)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ResourceDefinition, ResourceId};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        templates: PathBuf,
        out: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let templates = dir.path().join("templates");
            let out = dir.path().join("out");
            fs::create_dir_all(&templates).unwrap();
            Self {
                _dir: dir,
                templates,
                out,
            }
        }

        fn template(&self, name: &str, body: &str) {
            fs::write(self.templates.join(name), body).unwrap();
        }

        fn resource(&self, src: &str, dest: &str, mode: Option<&str>) -> Resource {
            Resource::from_definition(
                ResourceId::new("r.toml"),
                Path::new("r.toml"),
                ResourceDefinition {
                    src: src.to_string(),
                    dest: self.out.join(dest),
                    hosts: vec!["a".to_string()],
                    uid: None,
                    gid: None,
                    mode: mode.map(str::to_string),
                    reload_cmd: String::new(),
                    domain: "example.com".to_string(),
                },
            )
            .unwrap()
        }
    }

    fn view(entries: &[(&str, &[&str])]) -> AddressView {
        entries
            .iter()
            .map(|(h, a)| (h.to_string(), a.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_render_writes_addresses_and_creates_parents() {
        let fx = Fixture::new();
        fx.template(
            "upstream.j2",
            "{% for ip in hosts[\"a.example.com\"] %}server {{ ip }};\n{% endfor %}",
        );
        let resource = fx.resource("upstream.j2", "nginx/conf.d/upstream.conf", None);

        Renderer::new(&fx.templates)
            .render(&resource, &view(&[("a.example.com", &["10.0.0.1", "10.0.0.2"])]))
            .unwrap();

        let written = fs::read_to_string(&resource.destination).unwrap();
        assert_eq!(written, "server 10.0.0.1;\nserver 10.0.0.2;\n");
    }

    #[test]
    fn test_template_sees_other_hosts_and_resource() {
        let fx = Fixture::new();
        fx.template(
            "all.j2",
            "{{ resource.id }} {{ hosts[\"b.example.com\"] | join(\",\") }}",
        );
        let resource = fx.resource("all.j2", "all.conf", None);

        let out = Renderer::new(&fx.templates)
            .render_to_string(
                &resource,
                &view(&[
                    ("a.example.com", &["10.0.0.1"]),
                    ("b.example.com", &["10.0.1.1", "10.0.1.2"]),
                ]),
            )
            .unwrap();

        assert_eq!(out, "r.toml 10.0.1.1,10.0.1.2");
    }

    #[test]
    fn test_unknown_host_renders_empty() {
        let fx = Fixture::new();
        fx.template(
            "t.j2",
            "[{% for ip in hosts[\"nope.example.com\"] %}{{ ip }}{% endfor %}]",
        );
        let resource = fx.resource("t.j2", "t.conf", None);

        let out = Renderer::new(&fx.templates)
            .render_to_string(&resource, &AddressView::new())
            .unwrap();
        assert_eq!(out, "[]");
    }

    #[test]
    fn test_missing_template_leaves_destination_untouched() {
        let fx = Fixture::new();
        let resource = fx.resource("absent.j2", "keep.conf", None);
        fs::create_dir_all(&fx.out).unwrap();
        fs::write(&resource.destination, "previous").unwrap();

        let err = Renderer::new(&fx.templates)
            .render(&resource, &AddressView::new())
            .unwrap_err();

        assert!(matches!(err, OverseerError::Template { .. }));
        assert_eq!(fs::read_to_string(&resource.destination).unwrap(), "previous");
    }

    #[test]
    fn test_invalid_template_is_template_error() {
        let fx = Fixture::new();
        fx.template("broken.j2", "{% for ip in %}");
        let resource = fx.resource("broken.j2", "broken.conf", None);

        let err = Renderer::new(&fx.templates)
            .render(&resource, &AddressView::new())
            .unwrap_err();
        assert!(matches!(err, OverseerError::Template { .. }));
        assert!(!resource.destination.exists());
    }

    #[test]
    fn test_declared_mode_is_applied() {
        let fx = Fixture::new();
        fx.template("t.j2", "x");
        let resource = fx.resource("t.j2", "secret.conf", Some("0600"));

        Renderer::new(&fx.templates)
            .render(&resource, &AddressView::new())
            .unwrap();

        let mode = fs::metadata(&resource.destination).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn test_existing_mode_preserved_without_declaration() {
        let fx = Fixture::new();
        fx.template("t.j2", "new");
        let resource = fx.resource("t.j2", "keep-mode.conf", None);
        fs::create_dir_all(&fx.out).unwrap();
        fs::write(&resource.destination, "old").unwrap();
        fs::set_permissions(&resource.destination, Permissions::from_mode(0o640)).unwrap();

        Renderer::new(&fx.templates)
            .render(&resource, &AddressView::new())
            .unwrap();

        let meta = fs::metadata(&resource.destination).unwrap();
        assert_eq!(meta.permissions().mode() & 0o7777, 0o640);
        assert_eq!(fs::read_to_string(&resource.destination).unwrap(), "new");
    }
}
