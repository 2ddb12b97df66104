// src/chart.rs
//
// Declarative chart specs and their interpretation against named datasets.
// The model only ever produces a `ChartSpec`; nothing it writes is executed.

use crate::analyzer::{self, rank_contributors, WEEKDAYS};
use crate::entities::EntityCounts;
use crate::error::{Error, Result};
use crate::model::CommitRecord;
use crate::templates::ChartKind;
use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    Count,
    Sum,
    Mean,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub chart: ChartKind,
    pub dataset: String,
    pub x: String,
    #[serde(default)]
    pub y: Option<String>,
    /// Bubble radius, or the cell value of a heatmap
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub aggregate: Option<Aggregate>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Interpreted, ready-to-draw chart
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub kind: ChartKind,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub data: ChartData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChartData {
    /// Labelled values: pie, bar, line, histogram
    Categories(Vec<(String, f64)>),
    /// `(x, y, size)`: scatter and bubble
    Points(Vec<(f64, f64, f64)>),
    /// Samples per group: box and violin
    Groups(Vec<(String, Vec<f64>)>),
    /// `values[row][column]`, rows follow `ys`
    Grid {
        xs: Vec<String>,
        ys: Vec<String>,
        values: Vec<Vec<f64>>,
    },
}

impl ChartData {
    pub fn is_empty(&self) -> bool {
        match self {
            ChartData::Categories(c) => c.is_empty(),
            ChartData::Points(p) => p.is_empty(),
            ChartData::Groups(g) => g.iter().all(|(_, v)| v.is_empty()),
            ChartData::Grid { xs, ys, .. } => xs.is_empty() || ys.is_empty(),
        }
    }
}

/// Pulls the JSON chart spec out of a model reply. Markdown fences and
/// surrounding prose are tolerated.
pub fn extract_chart_spec(reply: &str) -> Result<ChartSpec> {
    let body = fenced_block(reply).unwrap_or(reply);
    let start = body
        .find('{')
        .ok_or_else(|| Error::Generation("no chart spec found in model reply".to_string()))?;
    let end = body
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| Error::Generation("unterminated chart spec in model reply".to_string()))?;

    serde_json::from_str(&body[start..=end])
        .map_err(|e| Error::Generation(format!("chart spec is not valid: {}", e)))
}

fn fenced_block(reply: &str) -> Option<&str> {
    let open = reply.find("```")?;
    let after = &reply[open + 3..];
    // Skip a language tag such as ```json
    let content_start = after.find('\n').map_or(0, |i| i + 1);
    let content = &after[content_start..];
    let close = content.find("```")?;
    Some(&content[..close])
}

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Num(f64),
    Text(String),
}

impl Cell {
    fn label(&self) -> String {
        match self {
            Cell::Num(n) if n.fract() == 0.0 => format!("{}", *n as i64),
            Cell::Num(n) => format!("{:.2}", n),
            Cell::Text(t) => t.clone(),
        }
    }

    fn number(&self) -> Option<f64> {
        match self {
            Cell::Num(n) => Some(*n),
            Cell::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Dataset {
    name: &'static str,
    fields: Vec<&'static str>,
    rows: Vec<Vec<Cell>>,
}

impl Dataset {
    fn column(&self, field: &str) -> Result<Vec<&Cell>> {
        let idx = self.fields.iter().position(|f| *f == field).ok_or_else(|| {
            Error::Execution(format!(
                "unknown field '{}' in dataset '{}' (available: {})",
                field,
                self.name,
                self.fields.join(", ")
            ))
        })?;
        Ok(self.rows.iter().map(|row| &row[idx]).collect())
    }

    fn numbers(&self, field: &str) -> Result<Vec<f64>> {
        self.column(field)?
            .into_iter()
            .map(|cell| {
                cell.number().ok_or_else(|| {
                    Error::Execution(format!(
                        "field '{}' in dataset '{}' is not numeric",
                        field, self.name
                    ))
                })
            })
            .collect()
    }

    fn labels(&self, field: &str) -> Result<Vec<String>> {
        Ok(self.column(field)?.into_iter().map(Cell::label).collect())
    }
}

/// The datasets a chart spec may refer to, bound by name
#[derive(Debug, Clone)]
pub struct ChartBindings {
    datasets: Vec<Dataset>,
}

impl ChartBindings {
    pub fn new(commits: &[CommitRecord], entities: &EntityCounts) -> Self {
        let commit_rows = commits
            .iter()
            .map(|c| {
                vec![
                    Cell::Text(c.sha.clone()),
                    Cell::Text(c.author.clone()),
                    Cell::Text(c.timestamp.format("%Y-%m-%d").to_string()),
                    Cell::Text(analyzer::month_key(c.timestamp)),
                    Cell::Num(c.timestamp.hour() as f64),
                    Cell::Text(
                        WEEKDAYS[c.timestamp.weekday().num_days_from_monday() as usize].to_string(),
                    ),
                    Cell::Num(c.additions as f64),
                    Cell::Num(c.deletions as f64),
                    Cell::Num(c.files_changed as f64),
                    Cell::Num((c.additions + c.deletions) as f64),
                    Cell::Num(c.message.chars().count() as f64),
                    Cell::Text(analyzer::commit_type(&c.message)),
                ]
            })
            .collect();

        let author_rows = rank_contributors(commits)
            .into_iter()
            .map(|rank| {
                let (additions, deletions) = commits
                    .iter()
                    .filter(|c| c.author == rank.author)
                    .fold((0, 0), |(a, d), c| (a + c.additions, d + c.deletions));
                vec![
                    Cell::Text(rank.author),
                    Cell::Num(rank.commits as f64),
                    Cell::Num(additions as f64),
                    Cell::Num(deletions as f64),
                ]
            })
            .collect();

        let entity_rows = entities
            .ranked()
            .iter()
            .map(|(entity, count)| vec![Cell::Text(entity.clone()), Cell::Num(*count as f64)])
            .collect();

        let hour_rows = analyzer::commits_by_hour(commits)
            .iter()
            .enumerate()
            .map(|(hour, n)| vec![Cell::Num(hour as f64), Cell::Num(*n as f64)])
            .collect();

        let weekday_rows = analyzer::commits_by_weekday(commits)
            .iter()
            .zip(WEEKDAYS)
            .map(|(n, day)| vec![Cell::Text(day.to_string()), Cell::Num(*n as f64)])
            .collect();

        let month_rows = analyzer::commits_by_month(commits)
            .into_iter()
            .map(|(month, n)| vec![Cell::Text(month), Cell::Num(n as f64)])
            .collect();

        Self {
            datasets: vec![
                Dataset {
                    name: "commits",
                    fields: vec![
                        "sha",
                        "author",
                        "date",
                        "month",
                        "hour",
                        "weekday",
                        "additions",
                        "deletions",
                        "files_changed",
                        "churn",
                        "message_length",
                        "type",
                    ],
                    rows: commit_rows,
                },
                Dataset {
                    name: "authors",
                    fields: vec!["author", "commits", "additions", "deletions"],
                    rows: author_rows,
                },
                Dataset {
                    name: "entities",
                    fields: vec!["entity", "mentions"],
                    rows: entity_rows,
                },
                Dataset {
                    name: "hours",
                    fields: vec!["hour", "commits"],
                    rows: hour_rows,
                },
                Dataset {
                    name: "weekdays",
                    fields: vec!["weekday", "commits"],
                    rows: weekday_rows,
                },
                Dataset {
                    name: "months",
                    fields: vec!["month", "commits"],
                    rows: month_rows,
                },
            ],
        }
    }

    pub fn dataset_names(&self) -> Vec<&'static str> {
        self.datasets.iter().map(|d| d.name).collect()
    }

    /// Schema listing for prompts: one line per dataset
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for dataset in &self.datasets {
            let fields: Vec<String> = dataset
                .fields
                .iter()
                .enumerate()
                .map(|(i, f)| {
                    let numeric =
                        dataset.rows.first().is_some_and(|r| matches!(r[i], Cell::Num(_)));
                    format!("{}{}", f, if numeric { " (number)" } else { "" })
                })
                .collect();
            let _ = writeln!(
                out,
                "- {} ({} rows): {}",
                dataset.name,
                dataset.rows.len(),
                fields.join(", ")
            );
        }
        out
    }

    fn dataset(&self, name: &str) -> Result<&Dataset> {
        self.datasets.iter().find(|d| d.name == name).ok_or_else(|| {
            Error::Execution(format!(
                "unknown dataset '{}' (available: {})",
                name,
                self.dataset_names().join(", ")
            ))
        })
    }

    pub fn interpret(&self, spec: &ChartSpec) -> Result<Chart> {
        let dataset = self.dataset(&spec.dataset)?;
        let aggregate = spec.aggregate.unwrap_or(if spec.y.is_some() {
            Aggregate::None
        } else {
            Aggregate::Count
        });
        let y_label = match (&spec.y, aggregate) {
            (Some(y), Aggregate::Mean) => format!("mean {}", y),
            (Some(y), _) => y.clone(),
            (None, _) => "count".to_string(),
        };

        let data = match spec.chart {
            ChartKind::Pie | ChartKind::Bar | ChartKind::Line => {
                let mut pairs = aggregate_by(
                    dataset.labels(&spec.x)?,
                    y_values(dataset, spec, aggregate)?,
                    aggregate,
                );
                if spec.chart == ChartKind::Line || has_natural_order(&pairs) {
                    sort_labels(&mut pairs);
                }
                if spec.chart == ChartKind::Pie && pairs.iter().any(|(_, v)| *v < 0.0) {
                    return Err(Error::Execution(
                        "pie chart values must not be negative".to_string(),
                    ));
                }
                ChartData::Categories(pairs)
            }
            ChartKind::Histogram => ChartData::Categories(histogram(&dataset.numbers(&spec.x)?)),
            ChartKind::Scatter | ChartKind::Bubble => {
                let y = spec
                    .y
                    .as_deref()
                    .ok_or_else(|| Error::Execution(format!("{} needs a y field", spec.chart)))?;
                let xs = dataset.numbers(&spec.x)?;
                let ys = dataset.numbers(y)?;
                let sizes = match (&spec.size, spec.chart) {
                    (Some(size), ChartKind::Bubble) => dataset.numbers(size)?,
                    _ => vec![1.0; xs.len()],
                };
                ChartData::Points(
                    xs.into_iter()
                        .zip(ys)
                        .zip(sizes)
                        .map(|((x, y), s)| (x, y, s))
                        .collect(),
                )
            }
            ChartKind::Box | ChartKind::Violin => match &spec.y {
                Some(y) => {
                    ChartData::Groups(group_by(dataset.labels(&spec.x)?, dataset.numbers(y)?))
                }
                None => ChartData::Groups(vec![(spec.x.clone(), dataset.numbers(&spec.x)?)]),
            },
            ChartKind::Heatmap => {
                let y = spec
                    .y
                    .as_deref()
                    .ok_or_else(|| Error::Execution("heatmap needs a y field".to_string()))?;
                let values = match &spec.size {
                    Some(field) => Some(dataset.numbers(field)?),
                    None => None,
                };
                grid(dataset.labels(&spec.x)?, dataset.labels(y)?, values, aggregate)
            }
        };

        if data.is_empty() {
            return Err(Error::Execution(format!(
                "dataset '{}' has no data to plot",
                spec.dataset
            )));
        }

        Ok(Chart {
            kind: spec.chart,
            title: spec
                .title
                .clone()
                .unwrap_or_else(|| format!("{} by {}", y_label, spec.x)),
            x_label: spec.x.clone(),
            y_label,
            data,
        })
    }
}

fn y_values(dataset: &Dataset, spec: &ChartSpec, aggregate: Aggregate) -> Result<Option<Vec<f64>>> {
    match (&spec.y, aggregate) {
        (_, Aggregate::Count) => Ok(None),
        (Some(y), _) => Ok(Some(dataset.numbers(y)?)),
        (None, Aggregate::None) => Ok(None),
        (None, other) => Err(Error::Execution(format!(
            "aggregate '{}' needs a y field",
            format!("{:?}", other).to_lowercase()
        ))),
    }
}

/// Groups values by key in first-seen order
fn aggregate_by(
    keys: Vec<String>,
    values: Option<Vec<f64>>,
    aggregate: Aggregate,
) -> Vec<(String, f64)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut acc: Vec<(String, f64, u64)> = Vec::new();

    for (i, key) in keys.into_iter().enumerate() {
        let value = values.as_ref().map_or(1.0, |v| v[i]);
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            acc.push((key, 0.0, 0));
            acc.len() - 1
        });
        acc[slot].1 += value;
        acc[slot].2 += 1;
    }

    acc.into_iter()
        .map(|(key, sum, n)| {
            let value = match aggregate {
                Aggregate::Count => n as f64,
                Aggregate::Mean => sum / n as f64,
                Aggregate::Sum | Aggregate::None => sum,
            };
            (key, value)
        })
        .collect()
}

fn group_by(keys: Vec<String>, values: Vec<f64>) -> Vec<(String, Vec<f64>)> {
    let mut groups: Vec<(String, Vec<f64>)> = Vec::new();
    for (key, value) in keys.into_iter().zip(values) {
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, samples)) => samples.push(value),
            None => groups.push((key, vec![value])),
        }
    }
    groups
}

fn grid(
    xs: Vec<String>,
    ys: Vec<String>,
    values: Option<Vec<f64>>,
    aggregate: Aggregate,
) -> ChartData {
    let mut x_axis = distinct(&xs);
    let mut y_axis = distinct(&ys);
    sort_axis(&mut x_axis);
    sort_axis(&mut y_axis);

    let mut sums = vec![vec![0.0; x_axis.len()]; y_axis.len()];
    let mut counts = vec![vec![0u64; x_axis.len()]; y_axis.len()];
    for (i, (x, y)) in xs.iter().zip(&ys).enumerate() {
        let col = x_axis.iter().position(|v| v == x);
        let row = y_axis.iter().position(|v| v == y);
        let (Some(col), Some(row)) = (col, row) else {
            continue;
        };
        sums[row][col] += values.as_ref().map_or(1.0, |v| v[i]);
        counts[row][col] += 1;
    }

    let values = match (aggregate, values.is_some()) {
        (Aggregate::Count, _) | (_, false) => counts
            .into_iter()
            .map(|row| row.into_iter().map(|n| n as f64).collect())
            .collect(),
        (Aggregate::Mean, true) => sums
            .into_iter()
            .zip(counts)
            .map(|(row, n)| {
                row.into_iter()
                    .zip(n)
                    .map(|(s, n)| if n == 0 { 0.0 } else { s / n as f64 })
                    .collect()
            })
            .collect(),
        _ => sums,
    };

    ChartData::Grid {
        xs: x_axis,
        ys: y_axis,
        values,
    }
}

fn distinct(labels: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for label in labels {
        if !out.contains(label) {
            out.push(label.clone());
        }
    }
    out
}

fn weekday_index(label: &str) -> Option<usize> {
    WEEKDAYS.iter().position(|d| *d == label)
}

fn has_natural_order<T>(items: &[(String, T)]) -> bool {
    items.iter().all(|(l, _)| l.parse::<f64>().is_ok())
        || items.iter().all(|(l, _)| weekday_index(l).is_some())
}

/// Numeric labels sort by value, weekday names Monday first, anything
/// else lexicographically (dates and `YYYY-MM` sort correctly this way).
fn sort_labels<T>(items: &mut [(String, T)]) {
    if items.iter().all(|(l, _)| l.parse::<f64>().is_ok()) {
        items.sort_by(|a, b| {
            let (a, b) = (a.0.parse::<f64>().unwrap_or(0.0), b.0.parse::<f64>().unwrap_or(0.0));
            a.total_cmp(&b)
        });
    } else if items.iter().all(|(l, _)| weekday_index(l).is_some()) {
        items.sort_by_key(|(l, _)| weekday_index(l));
    } else {
        items.sort_by(|a, b| a.0.cmp(&b.0));
    }
}

fn sort_axis(axis: &mut Vec<String>) {
    let mut keyed: Vec<(String, ())> = axis.drain(..).map(|l| (l, ())).collect();
    sort_labels(&mut keyed);
    axis.extend(keyed.into_iter().map(|(l, _)| l));
}

/// Integer data over a short range gets one bin per value; anything else
/// gets up to 20 equal-width bins.
fn histogram(values: &[f64]) -> Vec<(String, f64)> {
    if values.is_empty() {
        return Vec::new();
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    if values.iter().all(|v| v.fract() == 0.0) && max - min <= 48.0 {
        let mut bins = vec![0.0; (max - min) as usize + 1];
        for v in values {
            bins[(v - min) as usize] += 1.0;
        }
        return bins
            .into_iter()
            .enumerate()
            .map(|(i, n)| (format!("{}", min as i64 + i as i64), n))
            .collect();
    }

    let count = ((values.len() as f64).sqrt().ceil() as usize).clamp(1, 20);
    let width = (max - min) / count as f64;
    let mut bins = vec![0.0; count];
    for v in values {
        let idx = if width > 0.0 {
            (((v - min) / width) as usize).min(count - 1)
        } else {
            0
        };
        bins[idx] += 1.0;
    }
    bins.into_iter()
        .enumerate()
        .map(|(i, n)| (format!("{:.1}", min + width * i as f64), n))
        .collect()
}
