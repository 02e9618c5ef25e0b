use anyhow::{Context, Result};
use async_trait::async_trait;
use noor_bridge_core::urls::audio_url_from_template;
use url::Url;

#[async_trait]
pub trait AudioUrlResolver: Send + Sync {
    async fn resolve_audio_url(&self, source_id: &str, track_id: &str) -> Result<Url>;
}

pub struct TemplateResolver {
    template: String,
}

impl TemplateResolver {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

#[async_trait]
impl AudioUrlResolver for TemplateResolver {
    async fn resolve_audio_url(&self, source_id: &str, track_id: &str) -> Result<Url> {
        if source_id.trim().is_empty() {
            anyhow::bail!("no reciter selected");
        }
        if track_id.trim().is_empty() {
            anyhow::bail!("no surah selected");
        }
        audio_url_from_template(&self.template, source_id, track_id).with_context(|| {
            format!("template {} produced an invalid url", self.template)
        })
    }
}
