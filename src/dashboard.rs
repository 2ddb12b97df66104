// src/dashboard.rs
//
// The fixed chart set written by `repo-pulse charts`.

use crate::analyzer::{self, WEEKDAYS};
use crate::chart::{Chart, ChartData};
use crate::entities::EntityCounts;
use crate::error::Result;
use crate::model::RepoTables;
use crate::renderer::{self, RenderOptions};
use crate::templates::ChartKind;
use chrono::{Datelike, Timelike};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardChart {
    /// File stem, e.g. `commits_by_author`
    pub name: &'static str,
    pub chart: Chart,
}

fn chart(kind: ChartKind, title: &str, x: &str, y: &str, data: ChartData) -> Chart {
    Chart {
        kind,
        title: title.to_string(),
        x_label: x.to_string(),
        y_label: y.to_string(),
        data,
    }
}

/// Builds every dashboard chart that has data to show
pub fn dashboard_charts(
    tables: &RepoTables,
    entities: &EntityCounts,
    top_authors: usize,
) -> Vec<DashboardChart> {
    let commits = &tables.commits;
    let prs = &tables.pull_requests;
    let mut charts = Vec::new();

    let timeline = analyzer::commits_by_day(commits)
        .into_iter()
        .map(|(day, n)| (day.format("%Y-%m-%d").to_string(), n as f64))
        .collect();
    charts.push(DashboardChart {
        name: "commit_timeline",
        chart: chart(
            ChartKind::Line,
            "Commits over time",
            "date",
            "commits",
            ChartData::Categories(timeline),
        ),
    });

    let by_author = analyzer::rank_contributors(commits)
        .into_iter()
        .take(top_authors)
        .map(|rank| (rank.author, rank.commits as f64))
        .collect();
    charts.push(DashboardChart {
        name: "commits_by_author",
        chart: chart(
            ChartKind::Bar,
            "Commits by author",
            "author",
            "commits",
            ChartData::Categories(by_author),
        ),
    });

    let types = analyzer::commit_types(commits)
        .into_iter()
        .map(|(t, n)| (t, n as f64))
        .collect();
    charts.push(DashboardChart {
        name: "commit_types",
        chart: chart(
            ChartKind::Pie,
            "Commit types",
            "type",
            "commits",
            ChartData::Categories(types),
        ),
    });

    let weekdays = WEEKDAYS
        .iter()
        .zip(analyzer::commits_by_weekday(commits))
        .map(|(day, n)| (day.to_string(), n as f64))
        .collect();
    charts.push(DashboardChart {
        name: "commits_by_weekday",
        chart: chart(
            ChartKind::Bar,
            "Commits by day of week",
            "weekday",
            "commits",
            ChartData::Categories(weekdays),
        ),
    });

    let hours = analyzer::commits_by_hour(commits)
        .iter()
        .enumerate()
        .map(|(hour, n)| (hour.to_string(), *n as f64))
        .collect();
    charts.push(DashboardChart {
        name: "commits_by_hour",
        chart: chart(
            ChartKind::Histogram,
            "Commits by hour of day (UTC)",
            "hour",
            "commits",
            ChartData::Categories(hours),
        ),
    });

    let mut activity = vec![vec![0.0; 24]; 7];
    for commit in commits {
        let day = commit.timestamp.weekday().num_days_from_monday() as usize;
        activity[day][commit.timestamp.hour() as usize] += 1.0;
    }
    charts.push(DashboardChart {
        name: "activity_heatmap",
        chart: chart(
            ChartKind::Heatmap,
            "Commit activity by weekday and hour",
            "hour",
            "weekday",
            ChartData::Grid {
                xs: (0..24).map(|h| h.to_string()).collect(),
                ys: WEEKDAYS.iter().map(|d| d.to_string()).collect(),
                values: activity,
            },
        ),
    });

    let states = analyzer::ranked_counts(prs.iter().map(|p| p.state.clone()))
        .into_iter()
        .map(|(s, n)| (s, n as f64))
        .collect();
    charts.push(DashboardChart {
        name: "pull_request_states",
        chart: chart(
            ChartKind::Pie,
            "Pull request states",
            "state",
            "pull requests",
            ChartData::Categories(states),
        ),
    });

    let sizes = prs
        .iter()
        .map(|p| (p.additions as f64, p.deletions as f64, 1.0))
        .collect();
    charts.push(DashboardChart {
        name: "pull_request_sizes",
        chart: chart(
            ChartKind::Scatter,
            "Pull request additions vs deletions",
            "additions",
            "deletions",
            ChartData::Points(sizes),
        ),
    });

    let entity_bars = entities
        .top(10)
        .iter()
        .map(|(e, n)| (e.clone(), *n as f64))
        .collect();
    charts.push(DashboardChart {
        name: "top_entities",
        chart: chart(
            ChartKind::Bar,
            "Most mentioned entities",
            "entity",
            "mentions",
            ChartData::Categories(entity_bars),
        ),
    });

    charts.retain(|c| has_data(&c.chart.data));
    charts
}

fn has_data(data: &ChartData) -> bool {
    match data {
        ChartData::Categories(values) => values.iter().any(|(_, v)| *v > 0.0),
        ChartData::Grid { values, .. } => values.iter().flatten().any(|v| *v > 0.0),
        other => !other.is_empty(),
    }
}

/// Renders the charts in parallel into `dir` as `<name>.png`
pub fn render_dashboard(
    charts: &[DashboardChart],
    dir: &Path,
    options: &RenderOptions,
    show_progress: bool,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;

    let bar = if show_progress {
        ProgressBar::new(charts.len() as u64)
    } else {
        ProgressBar::hidden()
    };
    bar.set_style(
        ProgressStyle::with_template("{msg} [{bar:30}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.set_message("Rendering charts");

    let paths = charts
        .par_iter()
        .progress_with(bar)
        .map(|entry| {
            let path = dir.join(format!("{}.png", entry.name));
            renderer::save_png(&entry.chart, &path, options)?;
            debug!(path = %path.display(), "chart written");
            Ok(path)
        })
        .collect::<Result<Vec<_>>>()?;

    info!(charts = paths.len(), dir = %dir.display(), "dashboard rendered");
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CommitRecord, PullRequestRecord};
    use chrono::{TimeZone, Utc};

    fn tables() -> RepoTables {
        RepoTables {
            commits: vec![
                CommitRecord {
                    sha: "a".into(),
                    author: "ana".into(),
                    timestamp: Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap(),
                    message: "feat: add Kafka sink".into(),
                    additions: 10,
                    deletions: 2,
                    files_changed: 1,
                },
                CommitRecord {
                    sha: "b".into(),
                    author: "bo".into(),
                    timestamp: Utc.with_ymd_and_hms(2024, 5, 7, 17, 0, 0).unwrap(),
                    message: "fix: typo".into(),
                    additions: 1,
                    deletions: 1,
                    files_changed: 1,
                },
            ],
            pull_requests: Vec::<PullRequestRecord>::new(),
            issues: Vec::new(),
        }
    }

    #[test]
    fn charts_without_data_are_skipped() {
        let charts = dashboard_charts(&tables(), &EntityCounts::default(), 5);
        let names: Vec<&str> = charts.iter().map(|c| c.name).collect();
        assert_eq!(
            names,
            vec![
                "commit_timeline",
                "commits_by_author",
                "commit_types",
                "commits_by_weekday",
                "commits_by_hour",
                "activity_heatmap",
            ]
        );
    }

    #[test]
    fn heatmap_counts_weekday_hour_cells() {
        let charts = dashboard_charts(&tables(), &EntityCounts::default(), 5);
        let heatmap = charts.iter().find(|c| c.name == "activity_heatmap").unwrap();
        let ChartData::Grid { values, .. } = &heatmap.chart.data else {
            panic!("expected a grid");
        };
        // 2024-05-06 is a Monday
        assert_eq!(values[0][9], 1.0);
        assert_eq!(values[1][17], 1.0);
    }

    #[test]
    fn renders_every_chart_to_png() {
        let dir = tempfile::tempdir().unwrap();
        let charts = dashboard_charts(&tables(), &EntityCounts::default(), 5);
        let paths =
            render_dashboard(&charts, dir.path(), &RenderOptions::default(), false).unwrap();
        assert_eq!(paths.len(), charts.len());
        for path in paths {
            assert!(path.exists(), "{}", path.display());
        }
    }
}
