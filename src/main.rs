use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Args, CommandFactory, Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use cumulus_core::{CumulusConfig, CumulusError, ReleaseVersion};
use cumulus_github::{GitHubChangeNotesProvider, GitHubClient};
use cumulus_notes::generator::{read_release_notes, write_release_notes};
use cumulus_notes::ReleaseNotesGenerator;
use cumulus_push::{
    read_org_ids, ApexTestRunner, PollSchedule, PushApi, PushReport, PushStatus, SalesforceClient,
    TestReport,
};

#[derive(Parser)]
#[command(
    name = "cumulus",
    version,
    about = "Release automation for Salesforce managed packages",
    long_about = "Release automation for Salesforce managed packages.\n\n\
                   Generates release notes from pull requests, manages GitHub release tags\n\
                   and feature branches, builds package.xml manifests, and schedules push\n\
                   upgrades to subscriber orgs, and runs Apex tests in an org.\n\n\
                   Examples:\n  \
                     cumulus release-notes --current-tag release/1.2    Publish notes for a release\n  \
                     cumulus release-notes --dir notes --print-only     Render notes from files\n  \
                     cumulus release create --version 1.3               Tag master and create a release\n  \
                     cumulus package-xml --path src                     Print package.xml for src/\n  \
                     cumulus push schedule --version 1.2 --orgs orgs.txt --wait\n  \
                     cumulus run-tests --match '%_TEST' --json          Run Apex tests, print JSON"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (default: .cumulus.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log progress to stderr (-v info, -vv debug, -vvv trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Generate release notes and publish them to the GitHub release
    #[command(long_about = "Generate release notes and publish them to the GitHub release.\n\n\
        Change notes come from the bodies of pull requests merged between the previous\n\
        release tag and the current one, or from the files in --dir. The notes are\n\
        written to release_notes.md, printed, and merged into the release body unless\n\
        --print-only is given.\n\n\
        Examples:\n  cumulus release-notes --current-tag release/1.2\n  \
        cumulus release-notes --current-tag beta/1.3-Beta_1 --last-tag release/1.2\n  \
        cumulus release-notes --dir change_notes --print-only")]
    ReleaseNotes {
        /// Tag of the release being described (env: CURRENT_REL_TAG)
        #[arg(long)]
        current_tag: Option<String>,

        /// Tag of the previous release (env: LAST_REL_TAG; default: found from tags)
        #[arg(long)]
        last_tag: Option<String>,

        /// Read change notes from the files in this directory instead of GitHub
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Where to write the notes (default: release_notes.md)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Print the notes without updating the GitHub release (env: PRINT_ONLY)
        #[arg(long)]
        print_only: bool,
    },
    /// Manage GitHub releases, tags and feature branches
    #[command(subcommand)]
    Release(ReleaseCommand),
    /// Generate package.xml from a metadata source folder
    #[command(long_about = "Generate package.xml from a metadata source folder.\n\n\
        Every top-level folder must be a known metadata folder. Members are listed\n\
        per type, sorted the way Salesforce sorts them.\n\n\
        Examples:\n  cumulus package-xml --path src\n  \
        cumulus package-xml --path src --name Cumulus --output src/package.xml")]
    PackageXml {
        /// Metadata source folder (default: src)
        #[arg(long, default_value = "src")]
        path: PathBuf,

        /// Package name written to <fullName>
        #[arg(long)]
        name: Option<String>,

        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Schedule and monitor push upgrades
    #[command(subcommand)]
    Push(PushCommand),
    /// Run Apex test classes in the org and report the results
    #[command(long_about = "Run Apex test classes in the org and report the results.\n\n\
        Classes whose name matches one of the comma separated SOQL LIKE patterns are\n\
        queued through the Tooling API, polled until every class has finished, and\n\
        reported per method. Exits 1 if any test fails, 2 on any other error.\n\n\
        Examples:\n  cumulus run-tests\n  \
        cumulus run-tests --match '%_TEST,TDTM%' --namespace npsp --json")]
    RunTests(RunTestsArgs),
    /// Create a default .cumulus.toml configuration file
    #[command(long_about = "Create a default .cumulus.toml configuration file.\n\n\
        Generates a commented-out template with all available options.\n\
        Fails if .cumulus.toml already exists.")]
    Init,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum ReleaseCommand {
    /// Tag a commit and create a GitHub release for a version
    Create {
        /// Version number, e.g. 1.3 or "1.3 (Beta 2)" (env: VERSION)
        #[arg(long = "version")]
        release_version: Option<String>,

        /// Commit to tag (default: head of the master branch)
        #[arg(long)]
        commit: Option<String>,
    },
    /// Create a tag pointing at the same commit as another tag
    CloneTag {
        /// Existing tag
        #[arg(long)]
        src: String,

        /// Tag to create
        #[arg(long)]
        dst: String,
    },
    /// Merge master into every feature branch
    MergeMaster {
        /// Branch name prefix (default: feature/)
        #[arg(long)]
        prefix: Option<String>,
    },
}

#[derive(Subcommand)]
enum PushCommand {
    /// Schedule a push upgrade of a released version to a list of orgs
    #[command(long_about = "Schedule a push upgrade of a released version to a list of orgs.\n\n\
        Exits 1 if --wait is given and the push does not succeed, 2 on any other error.\n\n\
        Examples:\n  cumulus push schedule --version 1.2 --orgs orgs.txt\n  \
        cumulus push schedule --version 1.2 --orgs orgs.txt --start-time 2024-05-01T08:00:00Z --wait")]
    Schedule {
        /// Version to push (env: VERSION)
        #[arg(long = "version")]
        release_version: Option<String>,

        /// File with one subscriber org Id per line
        #[arg(long)]
        orgs: PathBuf,

        /// When the push should start, RFC 3339 (default: now)
        #[arg(long)]
        start_time: Option<DateTime<Utc>>,

        /// Poll until the push request finishes and print its report
        #[arg(long)]
        wait: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Report on an existing push request
    #[command(long_about = "Report on an existing push request.\n\n\
        Exits 1 if the request finished without succeeding, 2 on any other error.")]
    Status {
        /// Push request Id (env: PUSH_REQUEST)
        #[arg(long)]
        request_id: Option<String>,

        /// Poll until the push request finishes
        #[arg(long)]
        wait: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct RunTestsArgs {
    /// Class name patterns, comma separated (env: APEX_TEST_NAME_MATCH; default: %_TEST)
    #[arg(long = "match")]
    test_name_match: Option<String>,

    /// Namespace of the test classes (env: APEX_NAMESPACE; default: none)
    #[arg(long)]
    namespace: Option<String>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

const DEFAULT_CONFIG: &str = r#"# Cumulus Configuration
# Every value can also be set through the environment variable named in its comment.

[github]
# org_name = "SalesforceFoundation"     # GITHUB_ORG_NAME
# repo_name = "Cumulus"                 # GITHUB_REPO_NAME
# username = "octocat"                  # GITHUB_USERNAME
# password = ""                         # GITHUB_PASSWORD (use a token)
# master_branch = "master"              # MASTER_BRANCH
# api_url = "https://api.github.com"

[release]
# release = "release/"                 # PREFIX_RELEASE
# beta = "beta/"                        # PREFIX_BETA
# last_tag = "release/1.1"              # LAST_REL_TAG
# current_tag = "release/1.2"           # CURRENT_REL_TAG
# print_only = false                    # PRINT_ONLY
# notes_file = "release_notes.md"
# feature_prefix = "feature/"

[salesforce]
# username = "packaging@example.com"    # SF_USERNAME
# password = ""                         # SF_PASSWORD (password + security token)
# server_url = "https://login.salesforce.com"  # SF_SERVERURL
# api_version = "38.0"                  # SF_API_VERSION

[push]
# namespace = "npsp"                    # NAMESPACE
# version = "1.2"                       # VERSION
# request_id = ""                       # PUSH_REQUEST
# poll_interval_secs = 10
# slow_poll_interval_secs = 30
# slow_after_polls = 10

[package]
# name = "Cumulus"
# api_version = "38.0"
# install_class = "STG_InstallScript"
# uninstall_class = ""

[apex]
# test_name_match = "%_TEST"            # APEX_TEST_NAME_MATCH
# namespace = "npsp"                    # APEX_NAMESPACE
"#;

fn init_tracing(verbose: u8) {
    if verbose == 0 {
        return;
    }

    let base_filter = match std::env::var("RUST_LOG") {
        Ok(filter) => filter,
        Err(_) => match verbose {
            1 => "warn,cumulus=info,cumulus_notes=info,cumulus_github=info,cumulus_package=info,cumulus_push=info"
                .to_string(),
            2 => "info,cumulus=debug,cumulus_notes=debug,cumulus_github=debug,cumulus_package=debug,cumulus_push=debug"
                .to_string(),
            _ => "debug,cumulus_notes=trace,cumulus_github=trace,cumulus_package=trace,cumulus_push=trace"
                .to_string(),
        },
    };
    let filter = EnvFilter::try_new(&base_filter).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();
}

fn load_config(path: Option<&Path>) -> Result<CumulusConfig> {
    let default_path = Path::new(".cumulus.toml");
    let path = path.or_else(|| default_path.exists().then_some(default_path));
    let mut config = match path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading configuration");
            CumulusConfig::from_file(path)?
        }
        None => CumulusConfig::default(),
    };
    config.apply_env(|name| std::env::var(name).ok())?;
    Ok(config)
}

fn required<'a>(value: Option<&'a str>, what: &str) -> Result<&'a str, CumulusError> {
    value.ok_or_else(|| CumulusError::Config(format!("{what} not set")))
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .expect("miette handler");
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Push and test commands report their own errors so they can use distinct exit codes.
    if matches!(cli.command, Command::Push(_) | Command::RunTests(_)) {
        let code = match load_config(cli.config.as_deref()) {
            Ok(config) => match cli.command {
                Command::Push(push) => run_push(push, &config).await,
                Command::RunTests(args) => run_apex_tests(args, &config).await,
                _ => unreachable!(),
            },
            Err(report) => {
                eprintln!("{report:?}");
                2
            }
        };
        std::process::exit(code);
    }

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::ReleaseNotes {
            current_tag,
            last_tag,
            dir,
            output,
            print_only,
        } => {
            let current_tag = current_tag.or_else(|| config.release.current_tag.clone());
            let last_tag = last_tag.or_else(|| config.release.last_tag.clone());
            let print_only = print_only || config.release.print_only;

            let mut generator = match &dir {
                Some(dir) => ReleaseNotesGenerator::directory(dir),
                None => {
                    let tag = required(current_tag.as_deref(), "CURRENT_REL_TAG")?;
                    let github = GitHubClient::new(&config.github)?;
                    eprintln!("Collecting pull requests for {tag} from {}...", github.repository());
                    let provider = GitHubChangeNotesProvider::fetch(
                        &github,
                        &config.github.master_branch,
                        &config.release.prefixes,
                        tag,
                        last_tag.as_deref(),
                    )
                    .await?;
                    ReleaseNotesGenerator::with_default_parsers(provider)
                }
            };
            let notes = generator.generate()?;

            let path = output.unwrap_or_else(|| PathBuf::from(&config.release.notes_file));
            write_release_notes(&path, &notes)?;
            let notes = read_release_notes(&path)?;
            println!("{notes}");

            if !print_only {
                let tag = required(current_tag.as_deref(), "CURRENT_REL_TAG")?;
                let github = GitHubClient::new(&config.github)?;
                let release = cumulus_github::publish_release_notes(&github, tag, &notes).await?;
                eprintln!(
                    "Updated release notes for {tag}{}",
                    release
                        .html_url
                        .map(|url| format!(" ({url})"))
                        .unwrap_or_default()
                );
            }
        }
        Command::Release(command) => {
            let github = GitHubClient::new(&config.github)?;
            match command {
                ReleaseCommand::Create {
                    release_version,
                    commit,
                } => {
                    let raw = release_version.or_else(|| config.push.version.clone());
                    let version = ReleaseVersion::parse(required(raw.as_deref(), "VERSION")?)?;
                    let release = cumulus_github::create_release(
                        &github,
                        &version,
                        commit.as_deref(),
                        &config.github.master_branch,
                        &config.release.prefixes,
                    )
                    .await?;
                    println!("{}", release.tag_name);
                    if let Some(url) = release.html_url {
                        eprintln!("Created release {version}: {url}");
                    }
                }
                ReleaseCommand::CloneTag { src, dst } => {
                    let sha = cumulus_github::clone_tag(&github, &src, &dst).await?;
                    eprintln!("Created {dst} at {sha}");
                }
                ReleaseCommand::MergeMaster { prefix } => {
                    let prefix = prefix.unwrap_or_else(|| config.release.feature_prefix.clone());
                    let report = cumulus_github::merge_master_to_feature(
                        &github,
                        &config.github.master_branch,
                        &prefix,
                    )
                    .await?;
                    for branch in &report.merged {
                        println!("merged      {branch}");
                    }
                    for branch in &report.up_to_date {
                        println!("up to date  {branch}");
                    }
                    for (branch, number) in &report.conflicts {
                        println!("conflict    {branch} (pull request #{number})");
                    }
                }
            }
        }
        Command::PackageXml { path, name, output } => {
            let mut package = config.package.clone();
            if name.is_some() {
                package.name = name;
            }
            let xml = cumulus_package::generate_package_xml(&path, &package)?;
            match output {
                Some(out) => {
                    std::fs::write(&out, xml).into_diagnostic()?;
                    eprintln!("Wrote {}", out.display());
                }
                None => print!("{xml}"),
            }
        }
        Command::Init => {
            let path = Path::new(".cumulus.toml");
            if path.exists() {
                miette::bail!(".cumulus.toml already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created .cumulus.toml with default configuration");
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "cumulus", &mut std::io::stdout());
        }
        Command::Push(_) | Command::RunTests(_) => unreachable!(),
    }

    Ok(())
}

/// Run a push command and return the process exit code: 0 on success, 1 if
/// the request finished without succeeding, 2 on any error.
async fn run_push(command: PushCommand, config: &CumulusConfig) -> i32 {
    match push(command, config).await {
        Ok(Some(status)) if status != PushStatus::Succeeded && status.is_terminal() => 1,
        Ok(_) => 0,
        Err(e) => {
            eprintln!("{:?}", miette::Report::new(e));
            2
        }
    }
}

async fn push(command: PushCommand, config: &CumulusConfig) -> Result<Option<PushStatus>, CumulusError> {
    let client = SalesforceClient::login(&config.salesforce).await?;
    let api = PushApi::new(&client);
    let schedule = PollSchedule::from_config(&config.push);

    match command {
        PushCommand::Schedule {
            release_version,
            orgs,
            start_time,
            wait,
            json,
        } => {
            let namespace = required(config.push.namespace.as_deref(), "NAMESPACE")?;
            let raw = release_version.or_else(|| config.push.version.clone());
            let version = ReleaseVersion::parse(required(raw.as_deref(), "VERSION")?)?;
            let org_ids = read_org_ids(&orgs)?;

            let version_id = api.find_version(namespace, &version).await?;
            let request_id = api.schedule(&version_id, &org_ids, start_time).await?;
            eprintln!(
                "Scheduled push of {namespace} {version} to {} orgs",
                org_ids.len()
            );
            println!("{request_id}");

            if !wait {
                return Ok(None);
            }
            let status = wait_with_progress(&api, &request_id, &schedule).await?;
            print_report(&api.report(&request_id).await?, json)?;
            Ok(Some(status))
        }
        PushCommand::Status {
            request_id,
            wait,
            json,
        } => {
            let request_id = request_id.or_else(|| config.push.request_id.clone());
            let request_id = required(request_id.as_deref(), "PUSH_REQUEST")?;
            if wait {
                wait_with_progress(&api, request_id, &schedule).await?;
            }
            let report = api.report(request_id).await?;
            print_report(&report, json)?;
            Ok(Some(report.status))
        }
    }
}

fn spinner(message: String) -> Option<indicatif::ProgressBar> {
    if !std::io::stderr().is_terminal() {
        return None;
    }
    let pb = indicatif::ProgressBar::new_spinner();
    pb.set_style(
        indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})").unwrap(),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    Some(pb)
}

async fn wait_with_progress(
    api: &PushApi<'_>,
    request_id: &str,
    schedule: &PollSchedule,
) -> Result<PushStatus, CumulusError> {
    let spinner = spinner(format!("Waiting for push request {request_id}..."));

    let result = api
        .wait_for_completion(request_id, schedule, |polls, status| match &spinner {
            Some(pb) => pb.set_message(format!("Push request {request_id}: {status} (poll {polls})")),
            None => eprintln!("Push request {request_id}: {status}"),
        })
        .await;

    if let Some(pb) = spinner {
        match &result {
            Ok(status) => pb.finish_with_message(format!("Push request {request_id}: {status}")),
            Err(_) => pb.finish_with_message("Failed"),
        }
    }
    result
}

fn print_report(report: &PushReport, json: bool) -> Result<(), CumulusError> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Push request {}: {}", report.request_id, report.status);
    println!("Jobs: {}", report.total_jobs());
    for (status, count) in &report.jobs {
        println!("  {status}: {count}");
    }
    if !report.errors.is_empty() {
        println!("Errors:");
        for error in &report.errors {
            println!(
                "  {} {}: {}",
                error.org_id,
                error.title.as_deref().unwrap_or("error"),
                error.message.as_deref().unwrap_or_default()
            );
            if let Some(details) = &error.details {
                println!("    {details}");
            }
        }
    }
    Ok(())
}

/// Run Apex tests and return the process exit code: 0 when every test
/// passed, 1 if any test or class failed, 2 on any error.
async fn run_apex_tests(args: RunTestsArgs, config: &CumulusConfig) -> i32 {
    match apex_tests(args, config).await {
        Ok(report) if report.is_success() => 0,
        Ok(_) => 1,
        Err(e) => {
            eprintln!("{:?}", miette::Report::new(e));
            2
        }
    }
}

async fn apex_tests(args: RunTestsArgs, config: &CumulusConfig) -> Result<TestReport, CumulusError> {
    let name_match = args
        .test_name_match
        .unwrap_or_else(|| config.apex.test_name_match.clone());
    let namespace = args.namespace.or_else(|| config.apex.namespace.clone());

    let client = SalesforceClient::login(&config.salesforce).await?;
    let runner = ApexTestRunner::new(&client);
    let classes = runner
        .find_test_classes(&name_match, namespace.as_deref())
        .await?;
    eprintln!("Running {} test classes matching {name_match}", classes.len());
    let job_id = runner.enqueue(&classes).await?;

    let spinner = spinner(format!("Waiting for test run {job_id}..."));
    let schedule = PollSchedule::from_config(&config.push);
    let result = runner
        .wait_for_completion(&job_id, &schedule, |polls, progress| match &spinner {
            Some(pb) => pb.set_message(format!("Test run {job_id}: {progress} (poll {polls})")),
            None => eprintln!("Test run {job_id}: {progress}"),
        })
        .await;
    if let Some(pb) = spinner {
        match &result {
            Ok(progress) => pb.finish_with_message(format!("Test run {job_id}: {progress}")),
            Err(_) => pb.finish_with_message("Failed"),
        }
    }
    result?;

    let report = runner.report(&job_id).await?;
    print_test_report(&report, args.json)?;
    Ok(report)
}

fn print_test_report(report: &TestReport, json: bool) -> Result<(), CumulusError> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Apex test run {}: {} methods", report.job_id, report.results.len());
    for (outcome, count) in &report.outcomes {
        println!("  {outcome:?}: {count}");
    }
    let failures: Vec<_> = report.failures().collect();
    if !failures.is_empty() {
        println!("Failures:");
        for failure in failures {
            println!(
                "  {}.{}: {}",
                failure.class_name,
                failure.method_name,
                failure.message.as_deref().unwrap_or_default()
            );
            if let Some(trace) = &failure.stack_trace {
                println!("    {trace}");
            }
        }
    }
    if !report.class_errors.is_empty() {
        println!("Classes that did not run:");
        for error in &report.class_errors {
            println!(
                "  {} ({}): {}",
                error.class_name,
                error.status,
                error.detail.as_deref().unwrap_or_default()
            );
        }
    }
    Ok(())
}
