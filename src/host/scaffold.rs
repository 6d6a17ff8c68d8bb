use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;

use super::Scaffolder;
use crate::archive::extract_tar_gz;

/// File written into every namespace directory describing the instance to
/// its serving process.
pub const INSTANCE_MANIFEST: &str = "instance.toml";

#[derive(Serialize)]
struct InstanceManifest<'a> {
    namespace: &'a str,
    listen: &'a str,
    port: u16,
}

/// Extracts the configured template archive into `<dir>/app` and writes the
/// instance manifest.
pub struct TemplateScaffolder {
    template: Option<PathBuf>,
}

impl TemplateScaffolder {
    pub fn new(template: Option<PathBuf>) -> Self {
        Self { template }
    }
}

#[async_trait]
impl Scaffolder for TemplateScaffolder {
    async fn scaffold(&self, namespace: &str, dir: &Path, port: u16) -> Result<(), String> {
        if let Some(template) = &self.template {
            let template = template.clone();
            let app_dir = dir.join("app");
            tokio::task::spawn_blocking(move || extract_tar_gz(&template, &app_dir))
                .await
                .map_err(|e| format!("Template extraction task failed: {}", e))?
                .map_err(|e| format!("Failed to extract template: {}", e.message()))?;
        }

        let manifest = toml::to_string(&InstanceManifest {
            namespace,
            listen: "127.0.0.1",
            port,
        })
        .map_err(|e| e.to_string())?;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| format!("Failed to create {}: {}", dir.display(), e))?;
        tokio::fs::write(dir.join(INSTANCE_MANIFEST), manifest)
            .await
            .map_err(|e| format!("Failed to write {}: {}", INSTANCE_MANIFEST, e))
    }
}
