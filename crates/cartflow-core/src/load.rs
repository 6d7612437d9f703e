use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{error, info};

use crate::config::WarehouseConfig;
use crate::error::{PipelineError, Result};
use crate::secrets::WarehouseCredentials;

#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub stdout: String,
}

/// Runs the warehouse CLI against the load script:
/// `<program> -a <account> -u <user> -d <database> -s <schema> -f <script>`.
#[derive(Debug, Clone)]
pub struct WarehouseLoader {
    program: String,
    credentials: WarehouseCredentials,
    database: String,
    schema: String,
    script: PathBuf,
}

impl WarehouseLoader {
    pub fn new(config: &WarehouseConfig, credentials: WarehouseCredentials) -> Self {
        Self {
            program: config.program.clone(),
            credentials,
            database: config.database.clone(),
            schema: config.schema.clone(),
            script: config.script.clone(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> Vec<String> {
        vec![
            "-a".into(),
            self.credentials.account.clone(),
            "-u".into(),
            self.credentials.user.clone(),
            "-d".into(),
            self.database.clone(),
            "-s".into(),
            self.schema.clone(),
            "-f".into(),
            self.script.display().to_string(),
        ]
    }

    pub async fn load(&self) -> Result<LoadOutcome> {
        info!(
            program = %self.program,
            database = %self.database,
            schema = %self.schema,
            script = %self.script.display(),
            "starting warehouse load"
        );

        let output = Command::new(&self.program)
            .args(self.args())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| PipelineError::Load {
                code: None,
                stderr: format!("failed to start {}: {err}", self.program),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(code = ?output.status.code(), stderr = %stderr, "warehouse load failed");
            return Err(PipelineError::Load {
                code: output.status.code(),
                stderr,
            });
        }

        info!("warehouse load completed");
        Ok(LoadOutcome {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}
