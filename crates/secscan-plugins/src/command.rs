//! Plugins backed by a single external process.

use std::io::ErrorKind;
use std::process::Command;

use tracing::{debug, warn};

use secscan_core::config::CommandSpec;
use secscan_core::{Artifact, Plugin, PluginError, PluginOutcome, RunContext};

/// Captured result of one external process.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub log: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn describe(&self) -> String {
        match self.code {
            Some(code) => format!("exited with status {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Substitute run placeholders in a program or argument template.
pub fn expand(template: &str, name: &str, artifact: &Artifact, ctx: &RunContext) -> String {
    template
        .replace("{artifact}", &artifact.path().to_string_lossy())
        .replace("{report_dir}", &artifact.report_dir().to_string_lossy())
        .replace("{decompiled}", &artifact.decompiled_dir().to_string_lossy())
        .replace("{tools}", &ctx.tools_dir.to_string_lossy())
        .replace("{name}", name)
}

/// Run `spec` for `artifact`, capturing stdout and stderr.
pub fn execute(
    name: &str,
    spec: &CommandSpec,
    artifact: &Artifact,
    ctx: &RunContext,
) -> Result<CommandOutput, PluginError> {
    let program = expand(&spec.program, name, artifact, ctx);
    let args: Vec<String> = spec
        .args
        .iter()
        .map(|a| expand(a, name, artifact, ctx))
        .collect();
    debug!(plugin = name, %program, ?args, "spawning tool");

    let output = Command::new(&program).args(&args).output().map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            PluginError::MissingTool(program.clone())
        } else {
            PluginError::Io(e)
        }
    })?;

    let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
    log.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(CommandOutput {
        code: output.status.code(),
        log,
    })
}

/// Write a tool's output to `<report_dir>/<name>.error`.
pub fn write_diagnostic(artifact: &Artifact, name: &str, log: &str) {
    let path = artifact.report_dir().join(format!("{name}.error"));
    if let Err(e) = std::fs::write(&path, log) {
        warn!(path = %path.display(), error = %e, "failed to write diagnostic");
    }
}

/// Generic external analyzer (androbugs, qark, apkid, ...).
pub struct CommandPlugin {
    name: String,
    spec: CommandSpec,
    output: Option<String>,
    side_effect_only: bool,
}

impl CommandPlugin {
    pub fn new(name: impl Into<String>, spec: CommandSpec) -> Self {
        Self {
            name: name.into(),
            spec,
            output: None,
            side_effect_only: false,
        }
    }

    /// Require `path` (relative to the report dir) to exist after the tool ran.
    pub fn expect_output(mut self, path: Option<String>) -> Self {
        self.output = path;
        self
    }

    pub fn side_effect_only(mut self, yes: bool) -> Self {
        self.side_effect_only = yes;
        self
    }
}

impl Plugin for CommandPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, artifact: &Artifact, ctx: &RunContext) -> Result<PluginOutcome, PluginError> {
        let out = execute(&self.name, &self.spec, artifact, ctx)?;

        if self.side_effect_only {
            return Ok(PluginOutcome::Success);
        }

        if !out.success() {
            write_diagnostic(artifact, &self.name, &out.log);
            return Ok(PluginOutcome::failure(out.describe()));
        }

        if let Some(ref expected) = self.output {
            let path = artifact
                .report_dir()
                .join(expand(expected, &self.name, artifact, ctx));
            if !path.exists() {
                write_diagnostic(artifact, &self.name, &out.log);
                return Ok(PluginOutcome::failure(format!(
                    "expected output {} was not produced",
                    path.display()
                )));
            }
        }

        Ok(PluginOutcome::Success)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh", &["-c", script])
    }

    fn setup() -> (tempfile::TempDir, Artifact, RunContext) {
        let tmp = tempfile::tempdir().unwrap();
        let artifact = Artifact::new(tmp.path().join("app.apk"));
        artifact.ensure_report_dir().unwrap();
        let ctx = RunContext::new(tmp.path().join("tools"));
        (tmp, artifact, ctx)
    }

    #[test]
    fn test_expand_placeholders() {
        let ctx = RunContext::new("/opt/tools");
        let artifact = Artifact::from("/data/app.apk");
        let expanded = expand(
            "{tools}/x {artifact} {report_dir}/{name}.json {decompiled}",
            "qark",
            &artifact,
            &ctx,
        );
        assert_eq!(
            expanded,
            "/opt/tools/x /data/app.apk /data/SecScan/qark.json /data/app"
        );
    }

    #[test]
    fn test_zero_exit_is_success() {
        let (_tmp, artifact, ctx) = setup();
        let plugin = CommandPlugin::new("apkid", sh("exit 0"));
        assert_eq!(plugin.run(&artifact, &ctx).unwrap(), PluginOutcome::Success);
    }

    #[test]
    fn test_non_zero_exit_writes_diagnostic() {
        let (_tmp, artifact, ctx) = setup();
        let plugin = CommandPlugin::new("qark", sh("echo broken manifest; exit 3"));

        let outcome = plugin.run(&artifact, &ctx).unwrap();

        assert_eq!(outcome, PluginOutcome::failure("exited with status 3"));
        let diag = std::fs::read_to_string(artifact.report_dir().join("qark.error")).unwrap();
        assert!(diag.contains("broken manifest"));
    }

    #[test]
    fn test_side_effect_only_ignores_exit_status() {
        let (_tmp, artifact, ctx) = setup();
        let plugin = CommandPlugin::new("leaks", sh("exit 1")).side_effect_only(true);
        assert_eq!(plugin.run(&artifact, &ctx).unwrap(), PluginOutcome::Success);
    }

    #[test]
    fn test_missing_expected_output_is_failure() {
        let (_tmp, artifact, ctx) = setup();
        let plugin =
            CommandPlugin::new("mobsfscan", sh("true")).expect_output(Some("{name}.json".into()));

        let outcome = plugin.run(&artifact, &ctx).unwrap();
        assert!(!outcome.is_success());
        assert!(artifact.report_dir().join("mobsfscan.error").exists());
    }

    #[test]
    fn test_expected_output_present_is_success() {
        let (_tmp, artifact, ctx) = setup();
        let plugin = CommandPlugin::new("mobsfscan", sh("echo {} > {report_dir}/{name}.json"))
            .expect_output(Some("mobsfscan.json".into()));

        assert_eq!(plugin.run(&artifact, &ctx).unwrap(), PluginOutcome::Success);
    }

    #[test]
    fn test_missing_program_is_fatal() {
        let (_tmp, artifact, ctx) = setup();
        let plugin = CommandPlugin::new(
            "speck",
            CommandSpec::new("/nonexistent/secscan-tool-does-not-exist", &[]),
        );
        assert!(matches!(
            plugin.run(&artifact, &ctx),
            Err(PluginError::MissingTool(_))
        ));
    }
}
