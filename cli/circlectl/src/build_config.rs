//! Offline validation of CircleCI `config.yml` files.
//!
//! Only structural checks are made: the file must parse, declare a supported
//! version, define jobs with steps and an executor, and reference defined
//! jobs from its workflows.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde_yaml::{Mapping, Value};

const SUPPORTED_VERSIONS: &[&str] = &["2", "2.0", "2.1"];
const EXECUTORS: &[&str] = &["docker", "machine", "macos", "executor"];

/// One structural problem, located by a dotted path into the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Validate the build configuration at `path`.
pub fn validate_path(path: &Path) -> Result<()> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let errors = validate_str(&contents)
        .with_context(|| format!("invalid YAML: {}", path.display()))?;

    if errors.is_empty() {
        return Ok(());
    }

    let details = errors
        .iter()
        .map(|err| format!("  {err}"))
        .collect::<Vec<_>>()
        .join("\n");
    anyhow::bail!(
        "{} is not a valid config file ({} error(s)):\n{}",
        path.display(),
        errors.len(),
        details
    )
}

/// Parse `contents` and collect every structural error.
///
/// Fails only when the text is not YAML at all.
pub fn validate_str(contents: &str) -> Result<Vec<ValidationError>> {
    let document: Value = serde_yaml::from_str(contents)?;
    let mut errors = Vec::new();

    let Some(root) = document.as_mapping() else {
        errors.push(ValidationError::new("$", "top level must be a mapping"));
        return Ok(errors);
    };

    check_version(root, &mut errors);
    let job_names = check_jobs(root, &mut errors);
    check_workflows(root, &job_names, &mut errors);

    Ok(errors)
}

fn check_version(root: &Mapping, errors: &mut Vec<ValidationError>) {
    let version = match root.get("version") {
        None => {
            errors.push(ValidationError::new("version", "is required"));
            return;
        }
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(_) => {
            errors.push(ValidationError::new("version", "must be a number"));
            return;
        }
    };

    if !SUPPORTED_VERSIONS.contains(&version.as_str()) {
        errors.push(ValidationError::new(
            "version",
            format!("unsupported version {version} (expected 2, 2.0 or 2.1)"),
        ));
    }
}

fn check_jobs(root: &Mapping, errors: &mut Vec<ValidationError>) -> Vec<String> {
    let jobs = match root.get("jobs") {
        None => {
            errors.push(ValidationError::new("jobs", "is required"));
            return Vec::new();
        }
        Some(Value::Mapping(jobs)) if jobs.is_empty() => {
            errors.push(ValidationError::new("jobs", "must define at least one job"));
            return Vec::new();
        }
        Some(Value::Mapping(jobs)) => jobs,
        Some(_) => {
            errors.push(ValidationError::new("jobs", "must be a mapping"));
            return Vec::new();
        }
    };

    let mut names = Vec::new();
    for (name, job) in jobs {
        let Some(name) = name.as_str() else {
            errors.push(ValidationError::new("jobs", "job names must be strings"));
            continue;
        };
        names.push(name.to_string());
        check_job(&format!("jobs.{name}"), job, errors);
    }
    names
}

fn check_job(path: &str, job: &Value, errors: &mut Vec<ValidationError>) {
    let Some(job) = job.as_mapping() else {
        errors.push(ValidationError::new(path, "must be a mapping"));
        return;
    };

    match job.get("steps") {
        None => errors.push(ValidationError::new(format!("{path}.steps"), "is required")),
        Some(Value::Sequence(_)) => {}
        Some(_) => errors.push(ValidationError::new(
            format!("{path}.steps"),
            "must be a list",
        )),
    }

    let executors: Vec<&str> = EXECUTORS
        .iter()
        .copied()
        .filter(|key| job.contains_key(*key))
        .collect();
    match executors.as_slice() {
        [] => errors.push(ValidationError::new(
            path,
            "must declare an executor (docker, machine, macos or executor)",
        )),
        [_] => {}
        many => errors.push(ValidationError::new(
            path,
            format!("declares more than one executor ({})", many.join(", ")),
        )),
    }

    if let Some(docker) = job.get("docker") {
        check_docker(&format!("{path}.docker"), docker, errors);
    }
}

fn check_docker(path: &str, docker: &Value, errors: &mut Vec<ValidationError>) {
    let Some(images) = docker.as_sequence() else {
        errors.push(ValidationError::new(path, "must be a list of images"));
        return;
    };
    if images.is_empty() {
        errors.push(ValidationError::new(path, "must list at least one image"));
    }
    for (index, image) in images.iter().enumerate() {
        let has_image = image
            .get("image")
            .and_then(Value::as_str)
            .is_some_and(|s| !s.trim().is_empty());
        if !has_image {
            errors.push(ValidationError::new(
                format!("{path}[{index}].image"),
                "is required",
            ));
        }
    }
}

fn check_workflows(root: &Mapping, job_names: &[String], errors: &mut Vec<ValidationError>) {
    let Some(workflows) = root.get("workflows") else {
        return;
    };
    let Some(workflows) = workflows.as_mapping() else {
        errors.push(ValidationError::new("workflows", "must be a mapping"));
        return;
    };

    for (name, workflow) in workflows {
        let Some(name) = name.as_str() else {
            errors.push(ValidationError::new("workflows", "workflow names must be strings"));
            continue;
        };
        if name == "version" {
            continue;
        }

        let path = format!("workflows.{name}");
        let Some(jobs) = workflow.get("jobs") else {
            errors.push(ValidationError::new(format!("{path}.jobs"), "is required"));
            continue;
        };
        let Some(jobs) = jobs.as_sequence() else {
            errors.push(ValidationError::new(format!("{path}.jobs"), "must be a list"));
            continue;
        };

        for (index, entry) in jobs.iter().enumerate() {
            check_workflow_job(&format!("{path}.jobs[{index}]"), entry, job_names, errors);
        }
    }
}

fn check_workflow_job(
    path: &str,
    entry: &Value,
    job_names: &[String],
    errors: &mut Vec<ValidationError>,
) {
    let (name, params) = match entry {
        Value::String(name) => (name.as_str(), None),
        Value::Mapping(map) if map.len() == 1 => {
            let Some((Value::String(name), params)) = map.iter().next() else {
                errors.push(ValidationError::new(path, "job name must be a string"));
                return;
            };
            (name.as_str(), Some(params))
        }
        _ => {
            errors.push(ValidationError::new(
                path,
                "must be a job name or a single-key mapping",
            ));
            return;
        }
    };

    let is_approval = params
        .and_then(|p| p.get("type"))
        .and_then(Value::as_str)
        .is_some_and(|t| t == "approval");
    let is_orb_job = name.contains('/');

    if !is_approval && !is_orb_job && !job_names.iter().any(|job| job == name) {
        errors.push(ValidationError::new(
            path,
            format!("references undefined job '{name}'"),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
version: 2.1

jobs:
  build:
    docker:
      - image: cimg/rust:1.90
    steps:
      - checkout
      - run: cargo test
  deploy:
    machine: true
    steps:
      - run: ./deploy.sh

workflows:
  version: 2
  main:
    jobs:
      - build
      - hold:
          type: approval
          requires: [build]
      - deploy:
          requires: [hold]
      - slack/notify
"#;

    #[test]
    fn valid_config_has_no_errors() {
        assert!(validate_str(VALID).unwrap().is_empty());
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(validate_str("jobs: [unterminated").is_err());
    }

    #[test]
    fn top_level_must_be_a_mapping() {
        let errors = validate_str("- a\n- b\n").unwrap();
        assert_eq!(errors, vec![ValidationError::new("$", "top level must be a mapping")]);
    }

    #[test]
    fn missing_version_and_jobs_are_reported() {
        let errors = validate_str("workflows: {}\n").unwrap();
        let paths: Vec<_> = errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["version", "jobs"]);
    }

    #[test]
    fn unsupported_version_is_reported() {
        let errors = validate_str(
            "version: 1\njobs:\n  a:\n    machine: true\n    steps: []\n",
        )
        .unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("unsupported version 1"));
    }

    #[test]
    fn job_needs_steps_and_one_executor() {
        let errors = validate_str(
            "version: 2\njobs:\n  a:\n    docker:\n      - name: db\n  b:\n    machine: true\n    macos: {}\n    steps: run\n",
        )
        .unwrap();
        let rendered: Vec<_> = errors.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "jobs.a.steps: is required".to_string(),
                "jobs.a.docker[0].image: is required".to_string(),
                "jobs.b.steps: must be a list".to_string(),
                "jobs.b: declares more than one executor (machine, macos)".to_string(),
            ]
        );
    }

    #[test]
    fn workflow_must_reference_defined_jobs() {
        let errors = validate_str(
            "version: 2.1\njobs:\n  build:\n    machine: true\n    steps: []\nworkflows:\n  main:\n    jobs:\n      - build\n      - test\n",
        )
        .unwrap();
        assert_eq!(
            errors,
            vec![ValidationError::new(
                "workflows.main.jobs[1]",
                "references undefined job 'test'"
            )]
        );
    }

    #[test]
    fn validate_path_reports_all_errors() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.yml");
        std::fs::write(&file, "version: 3\n").unwrap();

        let err = validate_path(&file).unwrap_err().to_string();
        assert!(err.contains("2 error(s)"));
        assert!(err.contains("version: unsupported version 3"));
        assert!(err.contains("jobs: is required"));
    }

    #[test]
    fn validate_path_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_path(&dir.path().join("nope.yml")).is_err());
    }
}
