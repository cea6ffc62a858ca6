use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use agenda_core::cli::init_tracing;
use agenda_core::commands::parse_ops;
use agenda_core::groups::GroupDirectory;
use agenda_core::model::{Event, Group};
use agenda_core::session::Session;
use agenda_core::visibility::Facet;
use anyhow::{Context, anyhow};
use chrono::Utc;
use clap::{ArgAction, Parser};
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "agenda-scenarios",
    about = "Runs visibility scenarios through an in-process agenda session"
)]
struct Args {
    /// Scenario files; defaults to every `.json` under the bundled scenarios dir.
    #[arg(long)]
    scenario: Vec<PathBuf>,

    #[arg(long)]
    allow_failures: bool,

    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    quiet: u8,
}

#[derive(Debug, Deserialize)]
struct Scenario {
    name: String,
    #[serde(default)]
    events: Vec<Event>,
    #[serde(default)]
    groups: Vec<Group>,
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
struct Step {
    #[serde(default)]
    ops: Vec<String>,
    #[serde(default)]
    expect_error: bool,
    #[serde(default)]
    expect_visible: Option<Vec<u64>>,
    #[serde(default)]
    expect_actors: Option<BTreeMap<String, bool>>,
    /// `"off"` or `"<facet>:<id>"`.
    #[serde(default)]
    expect_focus: Option<String>,
}

#[derive(Debug, Default)]
struct StepReport {
    failures: Vec<String>,
    visible_score: Option<f64>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose, args.quiet)?;

    let paths = if args.scenario.is_empty() {
        bundled_scenarios()?
    } else {
        args.scenario.clone()
    };
    let scenarios = load_scenarios(&paths)?;
    if scenarios.is_empty() {
        return Err(anyhow!("no scenarios loaded"));
    }

    let mut overall_scores = Vec::new();
    let mut failed_steps = 0usize;

    for scenario in &scenarios {
        info!(scenario = %scenario.name, steps = scenario.steps.len(), "running scenario");
        let reports = run_scenario(scenario);

        let passed = reports.iter().filter(|r| r.failures.is_empty()).count();
        let scenario_score = if reports.is_empty() {
            1.0
        } else {
            passed as f64 / reports.len() as f64
        };
        overall_scores.push(scenario_score);
        failed_steps += reports.len() - passed;

        println!("Scenario: {}", scenario.name);
        println!("  steps passed    : {passed}/{}", reports.len());
        let visible_scores: Vec<f64> = reports.iter().filter_map(|r| r.visible_score).collect();
        if !visible_scores.is_empty() {
            let mean = visible_scores.iter().sum::<f64>() / visible_scores.len() as f64;
            println!("  visible overlap : {mean:.3}");
        }
        println!("  scenario score  : {scenario_score:.3}");

        for (idx, report) in reports.iter().enumerate() {
            for failure in &report.failures {
                println!("  step {}: {failure}", idx + 1);
            }
        }
    }

    let mean = overall_scores.iter().sum::<f64>() / overall_scores.len() as f64;
    println!("\nOverall scenario score: {mean:.3}");

    if failed_steps > 0 && !args.allow_failures {
        return Err(anyhow!("{failed_steps} scenario step(s) failed"));
    }
    Ok(())
}

fn bundled_scenarios() -> anyhow::Result<Vec<PathBuf>> {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios");
    let mut out = Vec::new();
    for entry in fs::read_dir(&dir)
        .with_context(|| format!("failed to list scenarios in {}", dir.display()))?
    {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

fn load_scenarios(paths: &[PathBuf]) -> anyhow::Result<Vec<Scenario>> {
    let mut out = Vec::new();

    for path in paths {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        let scenario: Scenario = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse scenario {}", path.display()))?;
        out.push(scenario);
    }

    Ok(out)
}

fn run_scenario(scenario: &Scenario) -> Vec<StepReport> {
    let mut session = Session::with_snapshots(
        scenario.events.clone(),
        GroupDirectory::from_groups(scenario.groups.clone()),
        None,
    );
    scenario
        .steps
        .iter()
        .enumerate()
        .map(|(idx, step)| {
            debug!(step = idx + 1, ops = ?step.ops, "running step");
            run_step(&mut session, step)
        })
        .collect()
}

fn run_step(session: &mut Session, step: &Step) -> StepReport {
    let mut report = StepReport::default();

    let applied = parse_ops(&step.ops, Utc::now()).and_then(|ops| session.apply_all(&ops));
    match (applied, step.expect_error) {
        (Ok(()), true) => report.failures.push("expected the ops to be rejected".to_string()),
        (Err(err), false) => {
            warn!(error = %format!("{err:#}"), "step ops failed");
            report.failures.push(format!("ops failed: {err:#}"));
            return report;
        }
        _ => {}
    }

    if let Some(expected) = &step.expect_visible {
        let actual: Vec<u64> = session.visible_events().iter().map(|e| e.id).collect();
        report.visible_score = Some(score_ids(&actual, expected));
        if let Some(diff) = describe_diff(&actual, expected) {
            report.failures.push(diff);
        }
    }

    if let Some(expected) = &step.expect_actors {
        let actual = session.state().mapping(Facet::Actor);
        if actual != expected {
            report
                .failures
                .push(format!("actors mapping {actual:?}, expected {expected:?}"));
        }
    }

    if let Some(expected) = &step.expect_focus {
        let focus = session.store().focus();
        let actual = match (focus.target_facet(), focus.target_id()) {
            (Some(facet), Some(id)) => format!("{facet}:{id}"),
            _ => "off".to_string(),
        };
        if &actual != expected {
            report
                .failures
                .push(format!("focus is {actual}, expected {expected}"));
        }
    }

    report
}

/// Jaccard similarity of two id sets; two empty sets score 1.
fn score_ids(actual: &[u64], expected: &[u64]) -> f64 {
    let a: BTreeSet<_> = actual.iter().copied().collect();
    let e: BTreeSet<_> = expected.iter().copied().collect();

    let union = a.union(&e).count() as f64;
    if union == 0.0 {
        return 1.0;
    }
    a.intersection(&e).count() as f64 / union
}

fn describe_diff(actual: &[u64], expected: &[u64]) -> Option<String> {
    if actual == expected {
        return None;
    }
    let a: BTreeSet<_> = actual.iter().copied().collect();
    let e: BTreeSet<_> = expected.iter().copied().collect();
    let unexpected: Vec<_> = a.difference(&e).collect();
    let missing: Vec<_> = e.difference(&a).collect();
    Some(format!(
        "visible {actual:?}, expected {expected:?} (unexpected {unexpected:?}, missing {missing:?})"
    ))
}
