use anyhow::Result;
use cartflow_core::extract::ExtractSummary;
use cartflow_core::graph::{RunReport, TaskGraph, TaskStatus};
use cartflow_core::transform::TransformReport;
use cartflow_core::upload::UploadReport;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use serde::Serialize;

fn styled(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header);
    table
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_run(report: &RunReport, json: bool) -> Result<()> {
    if json {
        return print_json(report);
    }

    let mut table = styled(vec!["Level", "Task", "Attempts", "Status", "Detail"]);
    for task in &report.tasks {
        let (status, detail) = match &task.status {
            TaskStatus::Succeeded { summary } => ("succeeded", summary.as_str()),
            TaskStatus::Failed { error } => ("failed", error.as_str()),
            TaskStatus::Skipped => ("skipped", ""),
        };
        table.add_row(vec![
            task.level.to_string(),
            task.name.clone(),
            task.attempts.to_string(),
            status.to_string(),
            detail.to_string(),
        ]);
    }

    println!("Run {}", report.run_id);
    println!("{table}");
    Ok(())
}

pub fn print_extracts(summaries: &[ExtractSummary], json: bool) -> Result<()> {
    if json {
        return print_json(&summaries);
    }

    let mut table = styled(vec!["Resource", "Rows", "Columns", "File"]);
    for summary in summaries {
        table.add_row(vec![
            summary.resource.clone(),
            summary.rows.to_string(),
            summary.columns.to_string(),
            summary.path.display().to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub fn print_transform(report: &TransformReport, json: bool) -> Result<()> {
    if json {
        return print_json(report);
    }

    let mut table = styled(vec!["Input", "Output", "Rows in", "Rows out", "Collisions"]);
    for file in &report.processed {
        let collisions = file
            .collisions
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(vec![
            file.input.clone(),
            file.output.clone(),
            file.rows_in.to_string(),
            file.rows_out.to_string(),
            collisions,
        ]);
    }
    println!("{table}");
    println!("Processed {} files", report.count());

    for failure in &report.failures {
        eprintln!("failed: {} ({})", failure.input, failure.message);
    }
    if !report.skipped.is_empty() {
        println!("Skipped: {}", report.skipped.join(", "));
    }
    if !report.removed.is_empty() {
        println!("Removed stale: {}", report.removed.join(", "));
    }
    Ok(())
}

pub fn print_uploads(report: &UploadReport, json: bool) -> Result<()> {
    if json {
        return print_json(report);
    }

    let mut table = styled(vec!["File", "Key"]);
    for entry in &report.entries {
        table.add_row(vec![entry.file.clone(), entry.key.clone()]);
    }
    println!("{table}");
    println!("Uploaded {} files", report.entries.len());
    Ok(())
}

#[derive(Serialize)]
struct PlannedLevel<'a> {
    level: usize,
    tasks: Vec<PlannedTask<'a>>,
}

#[derive(Serialize)]
struct PlannedTask<'a> {
    name: &'a str,
    after: Vec<&'a str>,
}

pub fn print_plan(graph: &TaskGraph, json: bool) -> Result<()> {
    let levels: Vec<PlannedLevel> = graph
        .levels()?
        .iter()
        .enumerate()
        .map(|(level, ids)| PlannedLevel {
            level,
            tasks: ids
                .iter()
                .map(|&id| PlannedTask {
                    name: graph.task_name(id),
                    after: graph.dependencies(id),
                })
                .collect(),
        })
        .collect();

    if json {
        return print_json(&levels);
    }

    let mut table = styled(vec!["Level", "Task", "Runs after"]);
    for level in &levels {
        for task in &level.tasks {
            table.add_row(vec![
                level.level.to_string(),
                task.name.to_string(),
                task.after.join(", "),
            ]);
        }
    }
    println!("{table}");
    Ok(())
}
