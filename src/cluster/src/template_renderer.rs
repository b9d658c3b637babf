/// Tera renderer over the embedded kubeadm templates
use crate::embedded_templates;
use crate::error::{BootstrapError, Result};
use tera::{Context, Tera};

pub struct TemplateRenderer {
    tera: Tera,
}

impl TemplateRenderer {
    /// Register every template compiled into the crate
    pub fn from_embedded() -> Result<Self> {
        let mut tera = Tera::default();

        for (name, content) in embedded_templates::ALL_TEMPLATES {
            tera.add_raw_template(name, content).map_err(|e| {
                BootstrapError::ConfigGeneration(format!("template {} does not parse: {}", name, e))
            })?;
        }
        tracing::debug!(
            "[TemplateRenderer] Registered {} embedded templates",
            embedded_templates::ALL_TEMPLATES.len()
        );

        Ok(Self { tera })
    }

    pub fn render_with_context(&self, template_name: &str, context: &Context) -> Result<String> {
        self.tera.render(template_name, context).map_err(|e| {
            BootstrapError::ConfigGeneration(format!("cannot render {}: {}", template_name, e))
        })
    }

    pub fn list_templates(&self) -> Vec<String> {
        self.tera.get_template_names().map(String::from).collect()
    }
}
