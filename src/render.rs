// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Chart rendering into a set of named manifests

use crate::error::{Result, SeedletError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use k8s_openapi::ByteString;
use minijinja::{context, Environment};
use std::collections::BTreeMap;

/// Rendered manifests of one release, keyed by file name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderedRelease {
    pub name: String,
    pub namespace: String,
    pub manifests: BTreeMap<String, String>,
}

impl RenderedRelease {
    /// Data for the bundle secret. Path separators become `_` so every file
    /// name is a valid secret key.
    pub fn as_secret_data(&self) -> BTreeMap<String, ByteString> {
        self.manifests
            .iter()
            .map(|(file, content)| {
                (
                    file.replace('/', "_"),
                    ByteString(content.clone().into_bytes()),
                )
            })
            .collect()
    }
}

/// Renders a chart for a release. Pure: the only input is the arguments.
pub trait ChartRenderer: Send + Sync {
    fn render(
        &self,
        chart: &str,
        release_name: &str,
        namespace: &str,
        values: &serde_json::Value,
    ) -> Result<RenderedRelease>;
}

/// Renders charts written as minijinja templates. `Values` and
/// `Release.Name` / `Release.Namespace` are in scope.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateRenderer;

impl ChartRenderer for TemplateRenderer {
    fn render(
        &self,
        chart: &str,
        release_name: &str,
        namespace: &str,
        values: &serde_json::Value,
    ) -> Result<RenderedRelease> {
        let mut env = Environment::new();
        env.add_template("chart", chart)
            .map_err(|e| SeedletError::RenderError(format!("invalid chart template: {}", e)))?;
        let output = env
            .get_template("chart")
            .and_then(|t| {
                t.render(context! {
                    Values => values,
                    Release => context! { Name => release_name, Namespace => namespace },
                })
            })
            .map_err(|e| SeedletError::RenderError(format!("rendering {}: {}", release_name, e)))?;

        Ok(RenderedRelease {
            name: release_name.to_string(),
            namespace: namespace.to_string(),
            manifests: split_manifests(&output),
        })
    }
}

/// Splits multi-document YAML and groups documents by their `# Source:`
/// marker. Unmarked documents get positional names.
pub fn split_manifests(output: &str) -> BTreeMap<String, String> {
    let mut manifests: BTreeMap<String, String> = BTreeMap::new();
    let mut unnamed = 0;

    for doc in output.split("\n---").map(str::trim) {
        let doc = doc.trim_start_matches("---").trim();
        if doc.is_empty() || doc.lines().all(|l| l.trim().is_empty() || l.trim_start().starts_with('#')) {
            continue;
        }

        let source = doc
            .lines()
            .find_map(|l| l.trim().strip_prefix("# Source:"))
            .map(|s| s.trim().to_string());
        let file = match source {
            Some(s) => s,
            None => {
                unnamed += 1;
                format!("manifest-{}.yaml", unnamed)
            }
        };

        manifests
            .entry(file)
            .and_modify(|existing| {
                existing.push_str("\n---\n");
                existing.push_str(doc);
            })
            .or_insert_with(|| doc.to_string());
    }

    manifests
}

/// Chart text of a `{chart: <base64>, values: {...}}` provider config.
pub fn decode_chart(encoded: &str) -> Result<String> {
    let raw = STANDARD
        .decode(encoded.trim())
        .map_err(|e| SeedletError::InvalidConfiguration(format!("chart is not base64: {}", e)))?;
    String::from_utf8(raw)
        .map_err(|e| SeedletError::InvalidConfiguration(format!("chart is not UTF-8: {}", e)))
}
