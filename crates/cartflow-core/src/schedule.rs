use chrono::{DateTime, Duration, NaiveTime, Utc};
use tracing::{error, info};

use crate::config::ScheduleConfig;
use crate::error::{PipelineError, Result};
use crate::graph::{GraphRunner, TaskGraph};

/// Next daily trigger strictly after `now`.
pub fn next_run_after(now: DateTime<Utc>, schedule: ScheduleConfig) -> Result<DateTime<Utc>> {
    let time = NaiveTime::from_hms_opt(schedule.hour, schedule.minute, 0).ok_or_else(|| {
        PipelineError::Config(format!(
            "schedule {:02}:{:02} is not a valid time of day",
            schedule.hour, schedule.minute
        ))
    })?;

    let today = now.date_naive().and_time(time).and_utc();
    if today > now {
        Ok(today)
    } else {
        Ok(today + Duration::days(1))
    }
}

/// Runs `graph` once per day at the configured time until the process stops.
/// A failed run is logged; the loop keeps going.
pub async fn run_daily(
    runner: &GraphRunner,
    graph: &TaskGraph,
    schedule: ScheduleConfig,
) -> Result<()> {
    loop {
        let now = Utc::now();
        let next = next_run_after(now, schedule)?;
        let wait = (next - now).to_std().unwrap_or_default();
        info!(next_run = %next, wait_secs = wait.as_secs(), "waiting for next scheduled run");
        tokio::time::sleep(wait).await;

        let report = runner.run(graph).await?;
        if report.is_success() {
            info!(run_id = %report.run_id, "scheduled run succeeded");
        } else {
            let failed: Vec<&str> = report
                .failed_tasks()
                .iter()
                .map(|task| task.name.as_str())
                .collect();
            error!(run_id = %report.run_id, ?failed, "scheduled run failed");
        }
    }
}
