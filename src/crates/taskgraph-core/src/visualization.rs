//! Pipeline visualization
//!
//! Renders a [`CompiledPipeline`] as a Mermaid flowchart (for Markdown docs and
//! review UIs) or as a one-line ASCII chain (for logs).
//!
//! ```text
//! START -> analyze -> retrieve -> write -> <review_draft> -> END
//! ```
//!
//! Checkpoint nodes are drawn as hexagons; with `human_review` set they are also
//! highlighted as suspension points.
//!
//! # Example
//!
//! ```rust
//! use taskgraph_core::{compile, StageRegistry, TaskProfile, TaskType};
//! use taskgraph_core::context::StageOutput;
//! use taskgraph_core::visualization::VisualizationOptions;
//!
//! let mut registry = StageRegistry::new();
//! for stage in ["analyze", "write"] {
//!     registry.register_stage(stage, |_ctx| async { Ok(StageOutput::empty()) });
//! }
//! let profile = TaskProfile::new(TaskType::Documentation, ["analyze", "write"])
//!     .with_checkpoints(["review_draft"]);
//! let pipeline = compile(&profile, &registry).unwrap();
//!
//! let mermaid = pipeline.to_mermaid();
//! assert!(mermaid.contains("write --> review_draft"));
//!
//! let chain = pipeline.render(&VisualizationOptions::ascii());
//! assert_eq!(chain, "START -> analyze -> write -> <review_draft> -> END");
//! ```

use crate::compiled::CompiledPipeline;
use crate::graph::{NodeKind, END, START};

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualizationFormat {
    Mermaid,
    Ascii,
}

/// Rendering options
#[derive(Debug, Clone)]
pub struct VisualizationOptions {
    pub format: VisualizationFormat,
    /// Optional diagram title (Mermaid only)
    pub title: Option<String>,
    /// Highlight checkpoints as suspension points
    pub human_review: bool,
}

impl Default for VisualizationOptions {
    fn default() -> Self {
        Self {
            format: VisualizationFormat::Mermaid,
            title: None,
            human_review: false,
        }
    }
}

impl VisualizationOptions {
    /// Create with Mermaid format
    pub fn mermaid() -> Self {
        Self::default()
    }

    /// Create with ASCII format
    pub fn ascii() -> Self {
        Self {
            format: VisualizationFormat::Ascii,
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_human_review(mut self, enabled: bool) -> Self {
        self.human_review = enabled;
        self
    }
}

impl CompiledPipeline {
    /// Mermaid flowchart with default options
    pub fn to_mermaid(&self) -> String {
        self.render(&VisualizationOptions::mermaid())
    }

    pub fn render(&self, options: &VisualizationOptions) -> String {
        match options.format {
            VisualizationFormat::Mermaid => render_mermaid(self, options),
            VisualizationFormat::Ascii => render_ascii(self),
        }
    }
}

fn render_mermaid(pipeline: &CompiledPipeline, options: &VisualizationOptions) -> String {
    let mut output = String::new();
    output.push_str("graph TD\n");

    if let Some(title) = &options.title {
        output.push_str(&format!("    title[\"{}\"]\n", escape_mermaid(title)));
    }

    output.push_str(&format!("    {}((START))\n", sanitize_id(START)));
    output.push_str(&format!(
        "    style {} fill:#90EE90,stroke:#228B22,stroke-width:3px\n",
        sanitize_id(START)
    ));
    output.push_str(&format!("    {}((END))\n", sanitize_id(END)));
    output.push_str(&format!(
        "    style {} fill:#FFB6C1,stroke:#DC143C,stroke-width:3px\n",
        sanitize_id(END)
    ));

    let suspending = pipeline.suspension_set(options.human_review);
    for node in &pipeline.nodes {
        let id = sanitize_id(&node.id);
        match node.kind {
            NodeKind::Stage => {
                output.push_str(&format!("    {}[\"{}\"]\n", id, escape_mermaid(&node.name)));
            }
            NodeKind::Checkpoint => {
                output.push_str(&format!("    {}{{{{\"{}\"}}}}\n", id, escape_mermaid(&node.name)));
                let fill = if suspending.contains(&node.id) {
                    "fill:#FFE4B5,stroke:#FF8C00,stroke-width:3px"
                } else {
                    "fill:#F0F0F0,stroke:#999,stroke-dasharray:4"
                };
                output.push_str(&format!("    style {} {}\n", id, fill));
            }
        }
    }

    output.push_str(&format!(
        "    {} --> {}\n",
        sanitize_id(START),
        sanitize_id(&pipeline.entry)
    ));
    for node in &pipeline.nodes {
        output.push_str(&format!(
            "    {} --> {}\n",
            sanitize_id(&node.id),
            sanitize_id(&node.successor)
        ));
    }

    output
}

fn render_ascii(pipeline: &CompiledPipeline) -> String {
    let mut parts = vec!["START".to_string()];
    for node in &pipeline.nodes {
        match node.kind {
            NodeKind::Stage => parts.push(node.id.clone()),
            NodeKind::Checkpoint => parts.push(format!("<{}>", node.id)),
        }
    }
    parts.push("END".to_string());
    parts.join(" -> ")
}

/// Escape special characters for Mermaid labels
fn escape_mermaid(s: &str) -> String {
    s.replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Mermaid ids must be alphanumeric plus underscore; lowercase `end` is a keyword
fn sanitize_id(s: &str) -> String {
    match s {
        START => "START".to_string(),
        END => "END".to_string(),
        _ => s.replace(['-', '.', '#'], "_"),
    }
}
