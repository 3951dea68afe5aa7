use std::io;
use std::process::exit;

use clap::Parser;
use cli::Cli;
use error::Abort;
use exitcode::ExitCode;
use harness::{ExecutionContext, Harness, Measurement};
use log::{error, info, LevelFilter};
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use strategy::Strategy;

mod cli;
mod digest;
mod error;
mod harness;
mod strategy;

/// Bad arguments, same as clap uses.
const USAGE: ExitCode = 2;

pub fn init_logging(debug: bool) {
    let level = if debug {
        LevelFilter::Trace
    } else {
        LevelFilter::Warn
    };

    // Stdout belongs to the report.
    if TermLogger::init(
        level,
        simplelog::Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .is_err()
    {
        eprintln!("Logger was already initialized.");
    }
}

pub fn exit_with_message(message: impl AsRef<str>, exitcode: ExitCode) -> ! {
    let mut prepend = String::new();
    let mut append = String::new();
    if exitcode::is_error(exitcode) {
        prepend.push_str("\x1b[31mError!\x1b[0m ");
        append.push_str("\nAborting...");
    }
    eprintln!("{prepend}{}{append}", message.as_ref());
    exit(exitcode);
}

fn main() {
    if let Err(e) = color_eyre::install() {
        eprintln!("Couldn't install error report handler: {e}");
    }

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            exit(USAGE);
        }
    };

    init_logging(cli.debug);

    match read_args(&cli) {
        Ok(measurement) => info!(
            "Strategy {} took {:?}.",
            measurement.strategy, measurement.elapsed
        ),
        Err(abort) => {
            let code = exit_code(&abort);
            if abort.is_usage() {
                exit_with_message(abort.to_string(), code);
            }

            let report = color_eyre::Report::new(abort);
            error!("{report:#}");
            exit_with_message("The run produced no trustworthy result.", code);
        }
    }
}

/// The exit code a run ends with after `abort`.
fn exit_code(abort: &Abort) -> ExitCode {
    if abort.is_usage() {
        USAGE
    } else {
        exitcode::SOFTWARE
    }
}

fn read_args(cli: &Cli) -> Result<Measurement, Abort> {
    let strategy = Strategy::from_id(cli.strategy).ok_or(Abort::Selector(cli.strategy))?;
    let harness = Harness::new(&cli.source, strategy, cli.digest)?;

    let context = if cli.unconfined {
        ExecutionContext::Unconfined
    } else {
        ExecutionContext::Confined
    };

    let stdout = io::stdout();
    context.block_on(async { harness.run(&mut stdout.lock()) })?
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;
    use std::fs;
    use std::path::{Path, PathBuf};

    use super::*;

    #[test]
    fn parses_two_positionals() {
        let cli = Cli::try_parse_from(["gzrace", "1", "data.tgz"]).unwrap();
        assert_eq!(cli.strategy, 1);
        assert_eq!(cli.source, PathBuf::from("data.tgz"));
        assert_eq!(cli.digest, cli::DigestMethod::External);
        assert!(!cli.unconfined);
    }

    #[test]
    fn rejects_bad_selectors() {
        let cases: [&[&str]; 6] = [
            &["gzrace", "256", "data.tgz"],
            &["gzrace", "-1", "data.tgz"],
            &["gzrace", "x", "data.tgz"],
            &["gzrace", "1"],
            &["gzrace"],
            &["gzrace", "1", "data.tgz", "extra"],
        ];
        for args in cases {
            let err = Cli::try_parse_from(args).err().unwrap();
            assert!(err.use_stderr(), "{args:?} should be a usage error");
            assert_eq!(err.exit_code(), USAGE);
        }
    }

    fn parse(strategy: &str, source: &Path) -> Cli {
        Cli::try_parse_from([
            OsStr::new("gzrace"),
            OsStr::new(strategy),
            source.as_os_str(),
        ])
        .unwrap()
    }

    #[test]
    fn usage_errors_touch_nothing() {
        let tmpdir = tempfile::tempdir().unwrap();
        let source = tmpdir.path().join("data.zip");
        fs::write(&source, b"zip").unwrap();

        let err = read_args(&parse("1", &source)).unwrap_err();

        assert!(matches!(err, Abort::Suffix(_)));
        assert_eq!(exit_code(&err), USAGE);
        assert_eq!(fs::read_dir(tmpdir.path()).unwrap().count(), 1);
    }

    #[test]
    fn out_of_range_selector_touches_nothing() {
        let tmpdir = tempfile::tempdir().unwrap();
        let source = tmpdir.path().join("data.tgz");
        fs::write(&source, b"not read").unwrap();

        for strategy in ["6", "255"] {
            let err = read_args(&parse(strategy, &source)).unwrap_err();

            assert!(matches!(err, Abort::Selector(_)));
            assert_eq!(exit_code(&err), USAGE);
        }
        assert_eq!(fs::read_dir(tmpdir.path()).unwrap().count(), 1);
    }

    #[test]
    fn failed_runs_exit_with_software_error() {
        let tmpdir = tempfile::tempdir().unwrap();
        let source = tmpdir.path().join("missing.tgz");

        let err = read_args(&parse("1", &source)).unwrap_err();

        assert!(matches!(err, Abort::Warm { .. }));
        assert_eq!(exit_code(&err), exitcode::SOFTWARE);
        assert!(!tmpdir.path().join("missing.tar").exists());
    }

    #[test]
    fn exit_codes() {
        let io_err = || io::Error::new(io::ErrorKind::Other, "boom");
        let path = PathBuf::from("data.tgz");

        let fatal = [
            Abort::Warm {
                path: path.clone(),
                source: io_err(),
            },
            Abort::Decode {
                strategy: Strategy::Zlib,
                path: path.clone(),
                source: io_err().into(),
            },
            Abort::Digest {
                path: path.clone(),
                source: io_err(),
            },
            Abort::Report(io_err()),
            Abort::Runtime(io_err()),
        ];
        for abort in &fatal {
            assert_eq!(exit_code(abort), exitcode::SOFTWARE, "{abort}");
        }

        assert_eq!(exit_code(&Abort::Suffix(path)), USAGE);
        assert_eq!(exit_code(&Abort::Selector(6)), USAGE);
        assert_ne!(USAGE, exitcode::SOFTWARE);
    }
}
