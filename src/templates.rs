// src/templates.rs
//
// The fixed chart catalog. Each skeleton is an example of the declarative
// chart spec the model is asked to fill in.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    #[serde(rename = "pie_chart", alias = "pie")]
    Pie,
    #[serde(rename = "bar_chart", alias = "bar")]
    Bar,
    #[serde(rename = "line_chart", alias = "line")]
    Line,
    #[serde(rename = "scatter_plot", alias = "scatter")]
    Scatter,
    #[serde(rename = "box_plot", alias = "box")]
    Box,
    Histogram,
    Heatmap,
    #[serde(rename = "bubble_chart", alias = "bubble")]
    Bubble,
    #[serde(rename = "violin_plot", alias = "violin")]
    Violin,
}

impl ChartKind {
    pub fn name(&self) -> &'static str {
        template(*self).name
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartTemplate {
    pub kind: ChartKind,
    pub name: &'static str,
    pub description: &'static str,
    pub syntax_skeleton: &'static str,
}

pub static CATALOG: [ChartTemplate; 9] = [
    ChartTemplate {
        kind: ChartKind::Pie,
        name: "pie_chart",
        description: "Pie chart that represents the proportion of items in each category.",
        syntax_skeleton: concat!(
            r#"{"chart": "pie_chart", "dataset": "authors", "x": "author", "y": "commits", "#,
            r#""title": "Distribution by Category"}"#
        ),
    },
    ChartTemplate {
        kind: ChartKind::Bar,
        name: "bar_chart",
        description: "Bar chart for showing categorical data with rectangular bars.",
        syntax_skeleton: concat!(
            r#"{"chart": "bar_chart", "dataset": "commits", "x": "author", "aggregate": "count", "#,
            r#""title": "Values by Category"}"#
        ),
    },
    ChartTemplate {
        kind: ChartKind::Line,
        name: "line_chart",
        description: "Line chart that shows data trends over time or another continuous variable.",
        syntax_skeleton: concat!(
            r#"{"chart": "line_chart", "dataset": "commits", "x": "date", "aggregate": "count", "#,
            r#""title": "Trend Over Time"}"#
        ),
    },
    ChartTemplate {
        kind: ChartKind::Scatter,
        name: "scatter_plot",
        description: "Scatter plot showing relationships between two variables.",
        syntax_skeleton: concat!(
            r#"{"chart": "scatter_plot", "dataset": "commits", "x": "additions", "#,
            r#""y": "deletions", "title": "Relationship Between Variables"}"#
        ),
    },
    ChartTemplate {
        kind: ChartKind::Box,
        name: "box_plot",
        description: "Box plot to show distribution of numerical data and identify outliers.",
        syntax_skeleton: concat!(
            r#"{"chart": "box_plot", "dataset": "commits", "x": "author", "y": "message_length", "#,
            r#""title": "Distribution and Outliers"}"#
        ),
    },
    ChartTemplate {
        kind: ChartKind::Histogram,
        name: "histogram",
        description: "Histogram to show the distribution of a single numerical variable.",
        syntax_skeleton: concat!(
            r#"{"chart": "histogram", "dataset": "commits", "x": "hour", "#,
            r#""title": "Distribution of Values"}"#
        ),
    },
    ChartTemplate {
        kind: ChartKind::Heatmap,
        name: "heatmap",
        description: "Heatmap showing the magnitude of a phenomenon as color in two dimensions.",
        syntax_skeleton: concat!(
            r#"{"chart": "heatmap", "dataset": "commits", "x": "hour", "y": "weekday", "#,
            r#""aggregate": "count", "title": "Activity Heatmap"}"#
        ),
    },
    ChartTemplate {
        kind: ChartKind::Bubble,
        name: "bubble_chart",
        description: "Bubble chart to show relationships between three or four variables.",
        syntax_skeleton: concat!(
            r#"{"chart": "bubble_chart", "dataset": "commits", "x": "additions", "#,
            r#""y": "deletions", "size": "files_changed", "title": "Multi-variable Relationship"}"#
        ),
    },
    ChartTemplate {
        kind: ChartKind::Violin,
        name: "violin_plot",
        description: "Violin plot to visualize the distribution of data across several groups.",
        syntax_skeleton: concat!(
            r#"{"chart": "violin_plot", "dataset": "commits", "x": "author", "y": "additions", "#,
            r#""title": "Distribution Across Categories"}"#
        ),
    },
];

pub fn template(kind: ChartKind) -> &'static ChartTemplate {
    CATALOG
        .iter()
        .find(|t| t.kind == kind)
        .unwrap_or(&CATALOG[0])
}

pub fn by_name(name: &str) -> Option<&'static ChartTemplate> {
    CATALOG.iter().find(|t| t.name == name)
}
