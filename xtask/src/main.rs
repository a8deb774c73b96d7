use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{exit, Command, ExitStatus};

use clap::{Parser, Subcommand, ValueEnum};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the warehouse sync workspace",
    long_about = "A unified CLI for CI checks and packaging the sync function\n\
                  binary as a deployable bootstrap archive."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run CI checks (fmt, clippy, tests)
    Ci {
        /// Job to run
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
    /// Build the sync function and package it as a `bootstrap` zip
    Package {
        /// Compilation target triple for the function binary
        #[arg(long, default_value = "x86_64-unknown-linux-gnu")]
        target: String,
        /// Build profile used for the binary
        #[arg(value_enum, long, default_value_t = BuildProfile::Release)]
        profile: BuildProfile,
        /// Directory receiving the zip archive
        #[arg(long, default_value = "dist")]
        out_dir: String,
    },
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting and clippy
    Lint,
    /// Workspace tests
    Test,
    /// Lint and test
    Check,
}

#[derive(Clone, Copy, ValueEnum)]
enum BuildProfile {
    Debug,
    Release,
}

impl BuildProfile {
    fn dir_name(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
        }
    }

    fn as_cargo_flag(self) -> Option<&'static str> {
        match self {
            Self::Debug => None,
            Self::Release => Some("--release"),
        }
    }
}

const FUNCTION_PACKAGE: &str = "sync_function";
const FUNCTION_BINARY: &str = "sync_function";

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn cargo(args: &[&str]) -> ExitStatus {
    eprintln!("+ cargo {}", args.join(" "));
    Command::new("cargo")
        .args(args)
        .status()
        .expect("failed to execute cargo")
}

fn run_cargo(args: &[&str]) {
    let status = cargo(args);
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn package_function(target: &str, profile: BuildProfile, out_dir: &str) {
    if !target_is_installed(target) {
        eprintln!("error: add the target with `rustup target add {target}` first");
        exit(1);
    }

    step("Build sync function binary");
    let mut cargo_args = vec![
        "build",
        "-p",
        FUNCTION_PACKAGE,
        "--target",
        target,
        "--bin",
        FUNCTION_BINARY,
    ];
    if let Some(flag) = profile.as_cargo_flag() {
        cargo_args.push(flag);
    }
    run_cargo(&cargo_args);

    step("Package bootstrap zip");
    let binary_path = Path::new("target")
        .join(target)
        .join(profile.dir_name())
        .join(FUNCTION_BINARY);
    let binary = fs::read(&binary_path)
        .unwrap_or_else(|error| panic!("cannot read {}: {error}", binary_path.display()));

    fs::create_dir_all(out_dir).expect("failed to create output directory");
    let zip_path = Path::new(out_dir).join(format!("{FUNCTION_BINARY}.zip"));
    write_bootstrap_zip(&zip_path, &binary)
        .unwrap_or_else(|error| panic!("cannot write {}: {error}", zip_path.display()));

    eprintln!("\nPackaged artifact:\n- {}", zip_path.display());
}

/// Unknown when `rustup` is unavailable, in which case the build decides.
fn target_is_installed(target: &str) -> bool {
    match Command::new("rustup")
        .args(["target", "list", "--installed"])
        .output()
    {
        Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
            .lines()
            .any(|line| line.trim() == target),
        _ => true,
    }
}

/// The function runtime executes the archive entry named `bootstrap`.
fn write_bootstrap_zip(zip_path: &Path, binary: &[u8]) -> zip::result::ZipResult<()> {
    let mut zip = ZipWriter::new(fs::File::create(zip_path)?);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755);
    zip.start_file("bootstrap", options)?;
    zip.write_all(binary)?;
    zip.finish()?;
    Ok(())
}

// ── CI jobs ────────────────────────────────────────────────────────

fn ci_lint() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);

    step("Clippy");
    run_cargo(&[
        "clippy",
        "--all-targets",
        "--all-features",
        "--",
        "-D",
        "warnings",
    ]);
}

fn ci_test() {
    step("Test sync_core");
    run_cargo(&["test", "-p", "sync_core"]);

    step("Test sync_function");
    run_cargo(&["test", "-p", FUNCTION_PACKAGE]);
}

// ── main ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ci { job } => {
            match job {
                CiJob::Lint => ci_lint(),
                CiJob::Test => ci_test(),
                CiJob::Check => {
                    ci_lint();
                    ci_test();
                }
            }
            eprintln!("\nCI job passed.");
        }
        Commands::Package {
            target,
            profile,
            out_dir,
        } => {
            package_function(&target, profile, &out_dir);
        }
    }
}
