//! CLI surface and action dispatch.

mod builds;
mod check;
mod context;
mod me;
mod projects;
mod status;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::{ArgAction, CommandFactory, Parser};

use crate::client::{ApiClient, ProjectRef, DEFAULT_STATUS_URL};
use crate::config::{self, Configuration, EnvOverrides, FileStore, Prompt};
use crate::error::{ApiError, CliError};
use crate::filters::{build_filters, Filters};

/// circlectl - query and drive CircleCI builds from the command line.
#[derive(Debug, Parser)]
#[command(name = "circlectl")]
#[command(author, version, about, long_about = None)]
#[command(disable_help_flag = true)]
#[command(after_help = ACTIONS_HELP)]
pub struct Cli {
    /// Action to run (see ACTIONS below).
    action: Option<String>,

    /// `help` for action-specific help, or the file to validate for `check`.
    extra: Option<String>,

    /// Print help (for the given action, if any).
    #[arg(short = 'h', long = "help", action = ArgAction::SetTrue)]
    help: bool,

    /// Project (repository) name.
    #[arg(short, long)]
    project: Option<String>,

    /// Username or organization owning the project. Defaults to `default_username`.
    #[arg(short, long)]
    username: Option<String>,

    /// API base URL for this run.
    #[arg(short = 'a', long = "api-baseurl", value_name = "URL")]
    api_baseurl: Option<String>,

    /// Build number.
    #[arg(short, long = "build-num", value_name = "NUM")]
    build_num: Option<u64>,

    /// Print the resolved configuration and exit.
    #[arg(short, long)]
    config: bool,

    /// Suppress error messages.
    #[arg(short, long)]
    quiet: bool,

    /// Environment variable assignment for `env` (repeatable).
    #[arg(short, long = "set", value_name = "NAME=VALUE")]
    set: Vec<String>,

    /// Only keep listing entries whose field equals the value (repeatable).
    #[arg(short, long = "filter", value_name = "KEY=VALUE")]
    filter: Vec<String>,

    /// Print the full API response.
    #[arg(short, long)]
    verbose: bool,

    /// Config file to use instead of ~/.circlectl.toml.
    #[arg(long, value_name = "PATH")]
    config_file: Option<PathBuf>,

    /// VCS host of the project.
    #[arg(long, default_value = "github", value_parser = ["github", "bitbucket"])]
    vcs_type: String,
}

const ACTIONS_HELP: &str = "\
ACTIONS:
  me            Show the authenticated user
  projects      List followed projects
  builds        List builds for a project, or show one build
  artifacts     List artifacts of a build
  retry         Retry a build
  cancel        Cancel a build
  clear-cache   Clear a project's build cache
  env           List or set project environment variables
  check <file>  Validate a build configuration file (offline)
  status        Show CircleCI service status
  config        Print the resolved configuration
  help          Print this help

Run `circlectl <action> help` for action-specific help.";

/// The fixed set of actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Me,
    Projects,
    Builds,
    Artifacts,
    Retry,
    Cancel,
    ClearCache,
    Env,
    Check,
    Status,
    Help,
    Config,
}

impl Action {
    pub const ALL: [Action; 12] = [
        Action::Me,
        Action::Projects,
        Action::Builds,
        Action::Artifacts,
        Action::Retry,
        Action::Cancel,
        Action::ClearCache,
        Action::Env,
        Action::Check,
        Action::Status,
        Action::Help,
        Action::Config,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Action::Me => "me",
            Action::Projects => "projects",
            Action::Builds => "builds",
            Action::Artifacts => "artifacts",
            Action::Retry => "retry",
            Action::Cancel => "cancel",
            Action::ClearCache => "clear-cache",
            Action::Env => "env",
            Action::Check => "check",
            Action::Status => "status",
            Action::Help => "help",
            Action::Config => "config",
        }
    }

    /// Exit code when the action fails.
    pub fn exit_code(self) -> i32 {
        match self {
            Action::Check => 1,
            Action::Me => 2,
            Action::Projects => 3,
            Action::Builds => 4,
            Action::Artifacts => 5,
            Action::Retry => 6,
            Action::Cancel => 7,
            Action::ClearCache => 8,
            Action::Env => 9,
            Action::Status => 10,
            Action::Help | Action::Config => 1,
        }
    }

    fn usage(self) -> &'static str {
        match self {
            Action::Me => "circlectl me [-v]\n\nShow the account of the authenticated user.",
            Action::Projects => {
                "circlectl projects [-f KEY=VALUE]... [-v]\n\nList the projects you follow."
            }
            Action::Builds => {
                "circlectl builds -p PROJECT [-u USERNAME] [-b NUM] [-f KEY=VALUE]... [-v]\n\n\
                 List recent builds of a project, or show one build with --build-num."
            }
            Action::Artifacts => {
                "circlectl artifacts -p PROJECT [-u USERNAME] -b NUM [-f KEY=VALUE]... [-v]\n\n\
                 List the artifacts produced by a build."
            }
            Action::Retry => {
                "circlectl retry -p PROJECT [-u USERNAME] -b NUM [-v]\n\nRetry a build."
            }
            Action::Cancel => {
                "circlectl cancel -p PROJECT [-u USERNAME] -b NUM [-v]\n\nCancel a running build."
            }
            Action::ClearCache => {
                "circlectl clear-cache -p PROJECT [-u USERNAME] [-v]\n\n\
                 Clear the dependency cache of a project."
            }
            Action::Env => {
                "circlectl env -p PROJECT [-u USERNAME] [-s NAME=VALUE]... [-v]\n\n\
                 List environment variable names, or set variables with --set."
            }
            Action::Check => {
                "circlectl check FILE\n\nValidate a CircleCI config file without contacting the API."
            }
            Action::Status => "circlectl status [-v]\n\nShow the CircleCI status page summary.",
            Action::Help => "circlectl help\n\nPrint the overall help.",
            Action::Config => {
                "circlectl config\n\nPrint every resolved configuration value as key=value."
            }
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Action {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.name() == s)
            .ok_or_else(|| CliError::UnknownAction(s.to_string()))
    }
}

/// Everything one invocation asked for.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub action: Action,
    pub username: Option<String>,
    pub project: Option<String>,
    pub build_num: Option<u64>,
    pub verbose: bool,
    pub filters: Filters,
    pub assignments: Filters,
}

/// Shared command context.
pub struct CommandContext {
    pub config: Configuration,
    pub request: ActionRequest,
    pub vcs_type: String,
}

impl CommandContext {
    /// Get an authenticated API client.
    pub fn client(&self) -> Result<ApiClient, CliError> {
        ApiClient::new(&self.config, &self.vcs_type)
            .map_err(|e| CliError::action(self.request.action, e))
    }

    /// Resolve the username, preferring the flag over `default_username`.
    pub fn resolve_username(&self) -> Option<&str> {
        self.request
            .username
            .as_deref()
            .or(self.config.default_username.as_deref())
    }

    /// Require a project, and with it a username.
    pub fn require_project(&self) -> Result<ProjectRef, CliError> {
        let action = self.request.action;
        let project = self.request.project.as_deref().ok_or_else(|| {
            CliError::Usage(format!("`{action}` requires --project"))
        })?;
        let username = self.resolve_username().ok_or_else(|| {
            CliError::Usage(format!(
                "`{action}` requires --username (or default_username in the config file) \
                 when --project is given"
            ))
        })?;
        Ok(ProjectRef::new(username, project))
    }

    /// Require a build number.
    pub fn require_build_num(&self) -> Result<u64, CliError> {
        let action = self.request.action;
        self.request
            .build_num
            .ok_or_else(|| CliError::Usage(format!("`{action}` requires --build-num")))
    }

    /// Wrap an API error with this action's exit code.
    pub fn api_error(&self, err: ApiError) -> CliError {
        CliError::action(self.request.action, err)
    }
}

impl Cli {
    pub fn quiet(&self) -> bool {
        self.quiet
    }

    /// Run the requested action.
    pub async fn execute(
        self,
        env: &EnvOverrides,
        prompt: &mut dyn Prompt,
    ) -> Result<(), CliError> {
        let action = match self.action.as_deref() {
            Some(name) => Some(name.parse::<Action>()?),
            None => None,
        };

        if self.help || self.extra.as_deref() == Some("help") || action == Some(Action::Help) {
            print_help(action);
            return Ok(());
        }

        if self.config || action == Some(Action::Config) {
            let config = self.resolve_config(env, prompt)?;
            context::show(&config);
            return Ok(());
        }

        let Some(action) = action else {
            return Err(CliError::Usage("an action is required".to_string()));
        };

        tracing::debug!(%action, "Dispatching action");

        match action {
            Action::Check => {
                let file = self
                    .extra
                    .ok_or_else(|| CliError::Usage("`check` requires a file argument".into()))?;
                check::run(&PathBuf::from(file))
            }
            Action::Status => {
                let url = env.status_url.as_deref().unwrap_or(DEFAULT_STATUS_URL);
                status::run(url, self.verbose).await
            }
            _ => {
                let config = self.resolve_config(env, prompt)?;
                let ctx = CommandContext {
                    config,
                    request: ActionRequest {
                        action,
                        username: self.username,
                        project: self.project,
                        build_num: self.build_num,
                        verbose: self.verbose,
                        filters: build_filters(&self.filter),
                        assignments: build_filters(&self.set),
                    },
                    vcs_type: self.vcs_type,
                };
                dispatch(ctx).await
            }
        }
    }

    fn resolve_config(
        &self,
        env: &EnvOverrides,
        prompt: &mut dyn Prompt,
    ) -> Result<Configuration, CliError> {
        let path = match self.config_file.clone().or_else(|| env.config_path.clone()) {
            Some(path) => path,
            None => config::default_config_path().map_err(CliError::Config)?,
        };
        let store = FileStore::new(path);
        tracing::debug!(path = %store.path().display(), "Resolving configuration");

        let mut config = config::resolve(&store, env, prompt).map_err(CliError::Config)?;
        if let Some(baseurl) = &self.api_baseurl {
            config.baseurl = baseurl.clone();
        }
        Ok(config)
    }
}

async fn dispatch(ctx: CommandContext) -> Result<(), CliError> {
    match ctx.request.action {
        Action::Me => me::run(&ctx).await,
        Action::Projects => projects::list(&ctx).await,
        Action::Builds => builds::list_or_show(&ctx).await,
        Action::Artifacts => builds::artifacts(&ctx).await,
        Action::Retry => builds::retry(&ctx).await,
        Action::Cancel => builds::cancel(&ctx).await,
        Action::ClearCache => projects::clear_cache(&ctx).await,
        Action::Env => projects::envvars(&ctx).await,
        Action::Check | Action::Status | Action::Help | Action::Config => {
            unreachable!("handled before configuration is resolved")
        }
    }
}

fn print_help(action: Option<Action>) {
    match action {
        Some(action) if action != Action::Help => println!("{}", action.usage()),
        _ => {
            let _ = Cli::command().print_help();
            println!();
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::testing::ScriptedPrompt;
    use crate::config::{Settings, SettingsStore};

    struct Harness {
        server: MockServer,
        dir: tempfile::TempDir,
    }

    impl Harness {
        async fn start() -> Self {
            Self {
                server: MockServer::start().await,
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn config_path(&self) -> PathBuf {
            self.dir.path().join("circlectl.toml")
        }

        fn write_config(&self, settings: Settings) {
            FileStore::new(self.config_path()).save(&settings).unwrap();
        }

        fn env(&self) -> EnvOverrides {
            EnvOverrides {
                token: Some("test-token".to_string()),
                baseurl: Some(self.server.uri()),
                status_url: Some(format!("{}/summary.json", self.server.uri())),
                config_path: Some(self.config_path()),
            }
        }

        async fn run(&self, args: &[&str]) -> Result<(), CliError> {
            self.run_with(self.env(), args).await
        }

        async fn run_with(&self, env: EnvOverrides, args: &[&str]) -> Result<(), CliError> {
            let cli = Cli::try_parse_from(std::iter::once("circlectl").chain(args.iter().copied()))
                .unwrap();
            let mut prompt = ScriptedPrompt::default();
            cli.execute(&env, &mut prompt).await
        }

        async fn request_count(&self) -> usize {
            self.server
                .received_requests()
                .await
                .map(|requests| requests.len())
                .unwrap_or_default()
        }

        async fn fail_everything(&self) {
            Mock::given(wiremock::matchers::any())
                .respond_with(
                    ResponseTemplate::new(500)
                        .set_body_json(serde_json::json!({ "message": "simulated failure" })),
                )
                .mount(&self.server)
                .await;
        }
    }

    #[test]
    fn action_names_round_trip() {
        for action in Action::ALL {
            assert_eq!(action.name().parse::<Action>().unwrap(), action);
        }
        assert!(matches!(
            "deploy".parse::<Action>(),
            Err(CliError::UnknownAction(name)) if name == "deploy"
        ));
    }

    #[test]
    fn flags_parse_with_short_forms() {
        let cli = Cli::try_parse_from([
            "circlectl", "env", "-p", "hello", "-u", "octocat", "-s", "FOO=BAR=BAZ", "-f", "a=1",
            "-b", "12", "-v", "-q",
        ])
        .unwrap();
        assert_eq!(cli.action.as_deref(), Some("env"));
        assert_eq!(cli.build_num, Some(12));
        assert!(cli.verbose && cli.quiet);
        assert_eq!(
            build_filters(&cli.set).get("FOO").map(String::as_str),
            Some("BAR=BAZ")
        );
    }

    #[tokio::test]
    async fn builds_without_username_is_a_usage_error_before_any_request() {
        let harness = Harness::start().await;

        let err = harness.run(&["builds", "--project", "foo"]).await.unwrap_err();

        assert!(matches!(err, CliError::Usage(_)));
        assert_eq!(err.exit_code(), 2);
        assert_eq!(harness.request_count().await, 0);
    }

    #[tokio::test]
    async fn missing_project_and_build_number_are_usage_errors() {
        let harness = Harness::start().await;

        for args in [
            &["builds"][..],
            &["artifacts", "-p", "hello", "-u", "octocat"][..],
            &["retry", "-p", "hello", "-u", "octocat"][..],
            &["cancel", "-u", "octocat", "-b", "3"][..],
            &["clear-cache", "-u", "octocat"][..],
            &["env", "-u", "octocat"][..],
            &["check"][..],
        ] {
            let err = harness.run(args).await.unwrap_err();
            assert!(matches!(err, CliError::Usage(_)), "{args:?} gave {err:?}");
        }
        assert_eq!(harness.request_count().await, 0);
    }

    #[tokio::test]
    async fn default_username_satisfies_the_username_requirement() {
        let harness = Harness::start().await;
        harness.write_config(Settings {
            default_username: Some("octocat".to_string()),
            ..Settings::default()
        });
        Mock::given(method("GET"))
            .and(path("/project/github/octocat/hello"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&harness.server)
            .await;

        harness.run(&["builds", "-p", "hello"]).await.unwrap();
    }

    #[tokio::test]
    async fn each_action_fails_with_its_own_exit_code() {
        let harness = Harness::start().await;
        harness.fail_everything().await;

        let cases: [(&[&str], i32); 9] = [
            (&["me"], 2),
            (&["projects"], 3),
            (&["builds", "-p", "hello", "-u", "octocat"], 4),
            (&["artifacts", "-p", "hello", "-u", "octocat", "-b", "1"], 5),
            (&["retry", "-p", "hello", "-u", "octocat", "-b", "1"], 6),
            (&["cancel", "-p", "hello", "-u", "octocat", "-b", "1"], 7),
            (&["clear-cache", "-p", "hello", "-u", "octocat"], 8),
            (&["env", "-p", "hello", "-u", "octocat"], 9),
            (&["status"], 10),
        ];

        for (args, code) in cases {
            let err = harness.run(args).await.unwrap_err();
            assert_eq!(err.exit_code(), code, "{args:?} gave {err:?}");
        }
    }

    #[tokio::test]
    async fn api_failure_message_is_the_api_message() {
        let harness = Harness::start().await;
        harness.fail_everything().await;

        let err = harness.run(&["me", "-q"]).await.unwrap_err();
        assert_eq!(err.to_string(), "simulated failure (HTTP 500)");
    }

    #[tokio::test]
    async fn unreachable_status_feed_exits_ten() {
        let harness = Harness::start().await;
        let env = EnvOverrides {
            status_url: Some("http://127.0.0.1:1/summary.json".to_string()),
            ..harness.env()
        };

        let err = harness.run_with(env, &["status"]).await.unwrap_err();
        assert_eq!(err.to_string(), "Could not reach CircleCI");
        assert_eq!(err.exit_code(), 10);
    }

    #[tokio::test]
    async fn config_mode_makes_no_requests() {
        let harness = Harness::start().await;
        harness.run(&["--config"]).await.unwrap();
        harness.run(&["config"]).await.unwrap();
        harness.run(&["builds", "--config"]).await.unwrap();
        assert_eq!(harness.request_count().await, 0);
    }

    #[tokio::test]
    async fn config_mode_prompts_and_persists_on_first_run() {
        let harness = Harness::start().await;
        let env = EnvOverrides {
            token: None,
            ..harness.env()
        };
        let cli = Cli::try_parse_from(["circlectl", "--config"]).unwrap();
        let mut prompt = ScriptedPrompt::new(&["fresh-token", "octocat"]);

        cli.execute(&env, &mut prompt).await.unwrap();

        let saved = FileStore::new(harness.config_path()).load().unwrap();
        assert_eq!(saved.token.as_deref(), Some("fresh-token"));
        assert_eq!(saved.default_username.as_deref(), Some("octocat"));
    }

    #[tokio::test]
    async fn help_needs_no_configuration() {
        let harness = Harness::start().await;
        let env = EnvOverrides {
            token: None,
            ..harness.env()
        };

        for args in [
            &["builds", "help"][..],
            &["retry", "--help"][..],
            &["cancel", "-h"][..],
            &["help"][..],
            &["--help"][..],
        ] {
            harness.run_with(env.clone(), args).await.unwrap();
        }
        assert!(!harness.config_path().exists());
        assert_eq!(harness.request_count().await, 0);
    }

    #[tokio::test]
    async fn unknown_action_is_reported() {
        let harness = Harness::start().await;
        let err = harness.run(&["deploy"]).await.unwrap_err();
        assert_eq!(err.exit_code(), crate::error::UNKNOWN_ACTION_EXIT_CODE);
        assert_eq!(harness.request_count().await, 0);
    }

    #[tokio::test]
    async fn missing_action_is_a_usage_error() {
        let harness = Harness::start().await;
        let err = harness.run(&[]).await.unwrap_err();
        assert!(matches!(err, CliError::Usage(_)));
    }

    #[tokio::test]
    async fn env_set_splits_on_first_equals() {
        let harness = Harness::start().await;
        Mock::given(method("POST"))
            .and(path("/project/github/octocat/hello/envvar"))
            .and(body_json(serde_json::json!({ "name": "FOO", "value": "BAR=BAZ" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "name": "FOO",
                "value": "xxxxBAZ"
            })))
            .expect(1)
            .mount(&harness.server)
            .await;

        harness
            .run(&["env", "-p", "hello", "-u", "octocat", "--set", "FOO=BAR=BAZ"])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn api_baseurl_flag_overrides_environment() {
        let harness = Harness::start().await;
        Mock::given(method("GET"))
            .and(path("/custom/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "login": "octocat"
            })))
            .expect(1)
            .mount(&harness.server)
            .await;

        let custom = format!("{}/custom", harness.server.uri());
        harness.run(&["me", "-a", &custom]).await.unwrap();
    }

    #[tokio::test]
    async fn check_runs_offline() {
        let harness = Harness::start().await;
        let file = harness.dir.path().join("config.yml");
        std::fs::write(
            &file,
            "version: 2.1\njobs:\n  build:\n    docker:\n      - image: cimg/base:stable\n    steps: [checkout]\n",
        )
        .unwrap();
        let file = file.to_string_lossy().to_string();

        harness.run(&["check", &file]).await.unwrap();

        std::fs::write(harness.dir.path().join("bad.yml"), "version: 2\n").unwrap();
        let bad = harness.dir.path().join("bad.yml").to_string_lossy().to_string();
        let err = harness.run(&["check", &bad]).await.unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert_eq!(harness.request_count().await, 0);
    }
}
