// src/graph_agent.rs

use crate::chart::{extract_chart_spec, ChartBindings, ChartSpec};
use crate::error::{Error, Result};
use crate::llm::LanguageModel;
use crate::renderer::{self, RenderOptions};
use crate::summary::CommitSummary;
use crate::templates::ChartTemplate;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A drawn answer to a chart question
#[derive(Debug, Clone)]
pub struct RenderedChart {
    pub template: &'static str,
    pub spec: ChartSpec,
    pub png: Vec<u8>,
}

/// Asks the model for a chart spec shaped like the selected template, then
/// binds and draws it.
pub struct GraphAgent {
    model: Arc<dyn LanguageModel>,
    options: RenderOptions,
    max_context_chars: usize,
}

impl GraphAgent {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        options: RenderOptions,
        max_context_chars: usize,
    ) -> Self {
        Self {
            model,
            options,
            max_context_chars,
        }
    }

    pub fn prompt(
        &self,
        query: &str,
        template: &ChartTemplate,
        bindings: &ChartBindings,
        summary: &CommitSummary,
    ) -> String {
        format!(
            "You design charts for GitHub repository data.\n\n\
             Available datasets and their fields:\n{}\n\
             Repository summary:\n{}\n\
             The chart type is {}. Use this JSON as the reference shape:\n{}\n\n\
             Fields: \"chart\" (chart type), \"dataset\" (one of the datasets above), \
             \"x\" and optional \"y\" (field names of that dataset), optional \"size\" \
             (bubble size, or heatmap cell value), optional \"aggregate\" \
             (count, sum, mean or none), optional \"title\".\n\
             For trends over time use the commits dataset with x \"date\" \
             or the months dataset.\n\n\
             Query: \"{}\"\n\n\
             Reply with a single JSON object and nothing else.",
            bindings.describe(),
            summary.context(self.max_context_chars),
            template.name,
            template.syntax_skeleton,
            query.trim()
        )
    }

    /// Model failures are `ExternalService`; a reply without a usable spec is
    /// `Generation`; a spec that cannot be bound or drawn is `Execution`.
    pub async fn compose(
        &self,
        query: &str,
        template: &'static ChartTemplate,
        bindings: &ChartBindings,
        summary: &CommitSummary,
    ) -> Result<RenderedChart> {
        info!(template = template.name, provider = self.model.name(), "generating chart spec");
        let reply = self
            .model
            .complete(&self.prompt(query, template, bindings, summary))
            .await?;
        debug!(reply = %reply, "chart spec reply");

        let mut spec = extract_chart_spec(&reply)?;
        if spec.chart != template.kind {
            warn!(
                requested = %spec.chart,
                selected = template.name,
                "model changed chart type, keeping selected template"
            );
            spec.chart = template.kind;
        }

        let chart = bindings.interpret(&spec)?;
        let png = renderer::render_png(&chart, &self.options).map_err(|e| match e {
            Error::Execution(_) => e,
            other => Error::Execution(format!("rendering failed: {}", other)),
        })?;

        Ok(RenderedChart {
            template: template.name,
            spec,
            png,
        })
    }
}
