use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::PipelineError;
use crate::pipeline::step::{FailurePolicy, PipelineEntry, Step, StepDescriptor};

/// Declarative pipeline description, loaded from `.relayrs/pipelines/*.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineManifest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub steps: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ManifestEntry {
    Parallel { parallel: Vec<ManifestStep> },
    Single(ManifestStep),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestStep {
    pub step: String,
    #[serde(default)]
    pub on_failure: OnFailure,
    #[serde(default)]
    pub fallback: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnFailure {
    #[default]
    Abort,
    ContinueWithFallback,
}

impl PipelineManifest {
    pub fn load_from_directory(dir: &PathBuf) -> anyhow::Result<Vec<Self>> {
        let mut manifests = Vec::new();

        if !dir.exists() {
            return Ok(manifests);
        }

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.extension().and_then(|s| s.to_str()) != Some("yaml")
                && path.extension().and_then(|s| s.to_str()) != Some("yml")
            {
                continue;
            }

            match Self::parse_manifest(&path) {
                Ok(manifest) => manifests.push(manifest),
                Err(e) => log::warn!("Failed to load pipeline {}: {}", path.display(), e),
            }
        }

        manifests.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(manifests)
    }

    fn parse_manifest(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let manifest: Self = serde_yaml::from_str(&content)?;

        if manifest.name.trim().is_empty() {
            anyhow::bail!("Pipeline name cannot be empty");
        }
        if manifest.steps.is_empty() {
            anyhow::bail!("Pipeline '{}' declares no steps", manifest.name);
        }

        Ok(manifest)
    }

    /// Bind the manifest's step names to implementations and produce runnable
    /// entries. Fails on the first name the registry does not know.
    pub fn resolve(&self, registry: &StepRegistry) -> Result<Vec<PipelineEntry>, PipelineError> {
        self.steps
            .iter()
            .map(|entry| match entry {
                ManifestEntry::Single(step) => {
                    Ok(PipelineEntry::Step(resolve_step(step, registry)?))
                }
                ManifestEntry::Parallel { parallel } => {
                    let branches = parallel
                        .iter()
                        .map(|step| resolve_step(step, registry))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(PipelineEntry::Parallel(branches))
                }
            })
            .collect()
    }
}

fn resolve_step(
    manifest_step: &ManifestStep,
    registry: &StepRegistry,
) -> Result<StepDescriptor, PipelineError> {
    let step = registry
        .get(&manifest_step.step)
        .ok_or_else(|| PipelineError::UnknownStep(manifest_step.step.clone()))?;

    let mut descriptor = StepDescriptor::from_arc(step);
    descriptor.on_failure = FailurePolicy::from(manifest_step);
    Ok(descriptor)
}

impl From<&ManifestStep> for FailurePolicy {
    fn from(step: &ManifestStep) -> Self {
        match step.on_failure {
            OnFailure::Abort => FailurePolicy::Abort,
            OnFailure::ContinueWithFallback => {
                FailurePolicy::ContinueWithFallback(step.fallback.clone().unwrap_or_default())
            }
        }
    }
}

/// Named step implementations that manifests can reference.
#[derive(Default, Clone)]
pub struct StepRegistry {
    steps: HashMap<String, Arc<dyn Step>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self {
            steps: HashMap::new(),
        }
    }

    /// Register under the step's own name; the latest registration wins.
    pub fn register(&mut self, step: Arc<dyn Step>) {
        self.steps.insert(step.name().to_string(), step);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Step>> {
        self.steps.get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.steps.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
